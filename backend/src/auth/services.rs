use sqlx::PgPool;
use tracing::warn;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use super::google::GoogleIdentity;
use super::AuthError;

/// Stored in place of the address when Google never told us who signed in.
pub const UNKNOWN_EMAIL: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct LoginAttempt {
    pub email: String,
    pub ip: IpNetwork,
    pub successful: bool,
}

impl LoginAttempt {
    pub fn from_verification(verified: &Result<GoogleIdentity, AuthError>, ip_address: &str) -> Self {
        let ip = IpNetwork::from_str(ip_address).unwrap_or_else(|_| {
            warn!("Invalid IP address: {}", ip_address);
            IpNetwork::from(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        });

        match verified {
            Ok(identity) => Self { email: identity.email.clone(), ip, successful: true },
            Err(_) => Self { email: UNKNOWN_EMAIL.to_string(), ip, successful: false },
        }
    }
}

pub async fn record_login_attempt(pool: &PgPool, attempt: &LoginAttempt) -> Result<(), AuthError> {
    sqlx::query("INSERT INTO login_attempts (email, ip_address, successful) VALUES ($1, $2, $3)")
        .bind(&attempt.email)
        .bind(attempt.ip)
        .bind(attempt.successful)
        .execute(pool)
        .await
        .map_err(AuthError::Database)?;

    Ok(())
}
