pub mod auth_handlers;

pub use self::auth_handlers::{google_login, logout, refresh_token};
