use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const API_WINDOW: Duration = Duration::from_secs(60);
pub const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const REFERRAL_WINDOW: Duration = Duration::from_secs(3600);
pub const WITHDRAWAL_WINDOW: Duration = Duration::from_secs(3600);

pub const API_MAX_REQUESTS: u32 = 3000;
pub const LOGIN_MAX_ATTEMPTS: u32 = 10;
pub const REFERRAL_MAX_ATTEMPTS: u32 = 10;
pub const WITHDRAWAL_MAX_ATTEMPTS: u32 = 5;

pub const API_RATE_LIMIT_ERROR: &str = "Too Many Requests";
pub const LOGIN_RATE_LIMIT_ERROR: &str = "Too many sign-in attempts. Please try again in 15 minutes.";
pub const REFERRAL_RATE_LIMIT_ERROR: &str = "Too many referral attempts. Please try again in 1 hour.";
pub const WITHDRAWAL_RATE_LIMIT_ERROR: &str = "Too many withdrawal requests. Please try again in 1 hour.";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitType {
    Api,
    Login,
    Referral,
    Withdrawal,
}

impl RateLimitType {
    pub fn get_window(&self) -> Duration {
        match self {
            Self::Api => API_WINDOW,
            Self::Login => LOGIN_WINDOW,
            Self::Referral => REFERRAL_WINDOW,
            Self::Withdrawal => WITHDRAWAL_WINDOW,
        }
    }

    pub fn get_max_attempts(&self) -> u32 {
        match self {
            Self::Api => API_MAX_REQUESTS,
            Self::Login => LOGIN_MAX_ATTEMPTS,
            Self::Referral => REFERRAL_MAX_ATTEMPTS,
            Self::Withdrawal => WITHDRAWAL_MAX_ATTEMPTS,
        }
    }

    pub fn get_error_message(&self) -> &'static str {
        match self {
            Self::Api => API_RATE_LIMIT_ERROR,
            Self::Login => LOGIN_RATE_LIMIT_ERROR,
            Self::Referral => REFERRAL_RATE_LIMIT_ERROR,
            Self::Withdrawal => WITHDRAWAL_RATE_LIMIT_ERROR,
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Login => "login",
            Self::Referral => "referral",
            Self::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitCheck {
    pub current_attempts: u32,
    pub remaining_attempts: u32,
    pub is_locked: bool,
}

impl RateLimitCheck {
    pub fn new(attempts: u32, limit_type: RateLimitType) -> Self {
        Self::with_max(attempts, limit_type.get_max_attempts())
    }

    pub fn with_max(attempts: u32, max_attempts: u32) -> Self {
        Self {
            current_attempts: attempts,
            remaining_attempts: max_attempts.saturating_sub(attempts),
            is_locked: attempts >= max_attempts,
        }
    }
}

pub fn get_rate_limit_key(limit_type: RateLimitType, identifier: &str) -> String {
    format!("rate_limit:{}:{}", limit_type.key_prefix(), identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_at_max_attempts() {
        let check = RateLimitCheck::new(WITHDRAWAL_MAX_ATTEMPTS - 1, RateLimitType::Withdrawal);
        assert!(!check.is_locked);
        assert_eq!(check.remaining_attempts, 1);

        let check = RateLimitCheck::new(WITHDRAWAL_MAX_ATTEMPTS, RateLimitType::Withdrawal);
        assert!(check.is_locked);
        assert_eq!(check.remaining_attempts, 0);
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(get_rate_limit_key(RateLimitType::Referral, "u1"), "rate_limit:referral:u1");
        assert_ne!(
            get_rate_limit_key(RateLimitType::Api, "u1"),
            get_rate_limit_key(RateLimitType::Login, "u1")
        );
    }
}
