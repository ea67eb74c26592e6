use serde::{Serialize, Deserialize};
use strum::{AsRefStr, Display, EnumString};

use crate::notice::Notice;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum WithdrawalMethod {
    #[serde(rename = "Google Play")]
    #[strum(serialize = "Google Play")]
    GooglePlay,
    #[serde(rename = "UPI")]
    #[strum(serialize = "UPI")]
    Upi,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    /// Requests are reviewed once: Pending moves to Completed or Failed and stays there.
    pub fn can_transition_to(self, next: WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }
}

/// A redeemable (points cost, rupee payout) pair.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalTier {
    pub id: i32,
    pub rs: i32,
    pub points: i64,
}

pub const WITHDRAWAL_TIERS: [WithdrawalTier; 4] = [
    WithdrawalTier { id: 1, rs: 10, points: 1_000 },
    WithdrawalTier { id: 2, rs: 25, points: 2_500 },
    WithdrawalTier { id: 3, rs: 50, points: 5_000 },
    WithdrawalTier { id: 4, rs: 100, points: 10_000 },
];

pub fn find_tier(id: i32) -> Option<WithdrawalTier> {
    WITHDRAWAL_TIERS.iter().copied().find(|tier| tier.id == id)
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalInfo {
    pub name: String,
    pub mobile: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    pub points: i64,
    pub referral_code: String,
    pub has_used_referral: bool,
    pub referred_by: Option<String>,
    pub withdrawal_info: WithdrawalInfo,
    pub daily_spins: i32,
    pub last_spin_date: Option<String>,
}

impl UserProfile {
    pub fn can_afford(&self, tier: &WithdrawalTier) -> bool {
        self.points >= tier.points
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WithdrawalRequest {
    pub id: String,
    pub user_id: String,
    pub amount: i32,
    pub points: i64,
    pub method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    pub request_time: String,
    pub user_name: String,
    pub user_email: String,
    pub user_mobile: String,
}

/// `{success, message, user?}` result of a referral or withdrawal submission.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    pub user: Option<UserProfile>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>, user: UserProfile) -> Self {
        Self { success: true, message: message.into(), user: Some(user) }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), user: None }
    }
}

// === API Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct ReferralRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub tier_id: i32,
    pub method: WithdrawalMethod,
    pub name: String,
    pub email: String,
    pub mobile: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub mobile: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WheelSpinResponse {
    pub success: bool,
    pub target_rotation: Option<f64>,
    pub settle_ms: u64,
    pub spins_left: u32,
    pub notice: Option<Notice>,
}

impl WheelSpinResponse {
    pub fn limit_reached() -> Self {
        Self {
            success: false,
            target_rotation: None,
            settle_ms: 0,
            spins_left: 0,
            notice: Some(Notice::spin_limit_reached()),
        }
    }
}

/// Sent once the ad is claimed, skipped, or forfeited by closing the dialog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WheelResolveResponse {
    pub awarded: bool,
    pub credited: i64,
    pub notice: Notice,
    pub new_balance: i64,
    pub spins_left: u32,
    pub user: UserProfile,
}
