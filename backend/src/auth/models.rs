use serde::{Deserialize, Serialize};
use shared::models::UserProfile;

#[derive(Deserialize)]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub csrf_token: String,
    pub token: String,
    pub user: UserProfile,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub csrf_token: String,
    pub token: String,
}
