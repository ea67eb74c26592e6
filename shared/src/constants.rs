pub const INVALID_NAME_ERROR: &str = "Name must be at least 2 characters.";
pub const INVALID_EMAIL_ERROR: &str = "Please enter a valid email address.";
pub const INVALID_MOBILE_ERROR: &str = "Must be a valid 10-digit mobile number.";
pub const INVALID_REFERRAL_CODE_ERROR: &str = "Referral code is too short.";

pub const MIN_NAME_LENGTH: usize = 2;
pub const MIN_REFERRAL_CODE_LENGTH: usize = 3;
pub const REFERRAL_CODE_LENGTH: usize = 8;

/// Points granted to both sides when a referral code is applied.
pub const REFERRAL_BONUS: i64 = 100;
