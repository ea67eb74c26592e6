use serde::Deserialize;
use once_cell::sync::Lazy;

use super::AuthError;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

static HTTP: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Fields of Google's tokeninfo response that sign-in relies on.
#[derive(Debug, Deserialize)]
pub struct TokenInfo {
    pub aud: String,
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: serde_json::Value,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub avatar_url: String,
}

fn is_verified(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s == "true",
        _ => false,
    }
}

pub fn check_token_info(info: TokenInfo, client_id: &str) -> Result<GoogleIdentity, AuthError> {
    if info.aud != client_id {
        return Err(AuthError::GoogleRejected("token issued for another client"));
    }
    if !is_verified(&info.email_verified) {
        return Err(AuthError::GoogleRejected("email not verified"));
    }
    let email = info
        .email
        .filter(|e| !e.is_empty())
        .ok_or(AuthError::GoogleRejected("token carries no email"))?;
    let name = info
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Ok(GoogleIdentity {
        subject: info.sub,
        email,
        name,
        avatar_url: info.picture.unwrap_or_default(),
    })
}

/// Asks Google to validate an ID token from the client and checks it was issued to us.
pub async fn verify_id_token(id_token: &str, client_id: &str) -> Result<GoogleIdentity, AuthError> {
    let res = HTTP
        .get(TOKENINFO_URL)
        .query(&[("id_token", id_token)])
        .send()
        .await?;

    if !res.status().is_success() {
        tracing::warn!("Google rejected an ID token with status {}", res.status());
        return Err(AuthError::GoogleRejected("invalid id token"));
    }

    let info: TokenInfo = res.json().await?;
    check_token_info(info, client_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aud: &str, verified: serde_json::Value) -> TokenInfo {
        TokenInfo {
            aud: aud.to_string(),
            sub: "1234".to_string(),
            email: Some("asha@gmail.com".to_string()),
            email_verified: verified,
            name: None,
            picture: None,
        }
    }

    #[test]
    fn test_accepts_matching_audience() {
        let identity = check_token_info(info("client", "true".into()), "client").unwrap();
        assert_eq!(identity.email, "asha@gmail.com");
        assert_eq!(identity.name, "asha");
    }

    #[test]
    fn test_rejects_foreign_audience_and_unverified_email() {
        assert!(matches!(
            check_token_info(info("other", true.into()), "client"),
            Err(AuthError::GoogleRejected(_))
        ));
        assert!(matches!(
            check_token_info(info("client", "false".into()), "client"),
            Err(AuthError::GoogleRejected(_))
        ));
    }
}
