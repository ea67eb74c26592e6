pub mod backend_wheel_game;
