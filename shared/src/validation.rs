use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

use crate::constants::*;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

static MOBILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").expect("valid mobile regex"));

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < MIN_NAME_LENGTH {
        return Err(ValidationError::new("name_too_short"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(ValidationError::new("invalid_email_format"));
    }
    Ok(())
}

pub fn validate_mobile(mobile: &str) -> Result<(), ValidationError> {
    if !MOBILE_RE.is_match(mobile.trim()) {
        return Err(ValidationError::new("invalid_mobile"));
    }
    Ok(())
}

pub fn validate_referral_code(code: &str) -> Result<(), ValidationError> {
    if code.trim().chars().count() < MIN_REFERRAL_CODE_LENGTH {
        return Err(ValidationError::new("referral_code_too_short"));
    }
    Ok(())
}

/// Contact details captured with a withdrawal request.
pub struct WithdrawalForm<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub mobile: &'a str,
}

impl WithdrawalForm<'_> {
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_name(self.name).map_err(|_| INVALID_NAME_ERROR)?;
        validate_email(self.email).map_err(|_| INVALID_EMAIL_ERROR)?;
        validate_mobile(self.mobile).map_err(|_| INVALID_MOBILE_ERROR)?;
        Ok(())
    }
}

pub struct ProfileForm<'a> {
    pub name: &'a str,
    pub mobile: &'a str,
}

impl ProfileForm<'_> {
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_name(self.name).map_err(|_| INVALID_NAME_ERROR)?;
        validate_mobile(self.mobile).map_err(|_| INVALID_MOBILE_ERROR)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_must_be_ten_digits() {
        assert!(validate_mobile("9876543210").is_ok());
        assert!(validate_mobile("987654321").is_err());
        assert!(validate_mobile("98765432100").is_err());
        assert!(validate_mobile("98765x3210").is_err());
    }

    #[test]
    fn test_name_and_code_lengths() {
        assert!(validate_name("Al").is_ok());
        assert!(validate_name(" A ").is_err());
        assert!(validate_referral_code("AB").is_err());
        assert!(validate_referral_code("ABC").is_ok());
    }

    #[test]
    fn test_withdrawal_form_reports_first_problem() {
        let form = WithdrawalForm { name: "Asha", email: "asha@gmail", mobile: "12" };
        assert_eq!(form.validate(), Err(INVALID_EMAIL_ERROR));

        let form = WithdrawalForm { name: "Asha", email: "asha@gmail.com", mobile: "9876543210" };
        assert!(form.validate().is_ok());
    }
}
