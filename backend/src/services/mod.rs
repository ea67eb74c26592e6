pub mod points_service;
pub mod referral_service;
pub mod user_service;
pub mod wheel_sessions;
pub mod withdrawal_service;
