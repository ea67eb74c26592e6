use serde::{Serialize, Deserialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoticeVariant {
    #[default]
    Default,
    Destructive,
}

/// A user-facing toast the client renders as-is.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }

    pub fn points_awarded(points: u32) -> Self {
        Self::new("Points Awarded!", format!("You've earned {} points.", points))
    }

    pub fn better_luck() -> Self {
        Self::new("Better luck next time!", "You won 0 points. Keep spinning!")
    }

    pub fn ad_skipped() -> Self {
        Self::destructive("Ad Skipped", "You skipped the ad and didn't receive any points.")
    }

    pub fn spin_limit_reached() -> Self {
        Self::destructive(
            "Spin Limit Reached",
            "You have used all your spins for today. Come back tomorrow!",
        )
    }
}
