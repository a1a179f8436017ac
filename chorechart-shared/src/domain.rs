use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// How often a chore assignment resets to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recurrence {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "one-time")]
    OneTime,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::OneTime => "one-time",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "one-time" => Ok(Recurrence::OneTime),
            other => Err(format!("unknown recurrence: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Denied,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Approved => "approved",
            RedemptionStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedemptionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RedemptionStatus::Pending),
            "approved" => Ok(RedemptionStatus::Approved),
            "denied" => Ok(RedemptionStatus::Denied),
            other => Err(format!("unknown redemption status: {other}")),
        }
    }
}

/// Reporting window. `Week` and `Month` mean "the last 7 / 30 days" for
/// history views and "back one week / calendar month" for analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    All,
    #[default]
    Week,
    Month,
    Year,
}

// Config seeds

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    pub role: Role,
    /// bcrypt hash; users without one cannot log in
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Starting balance, applied only when the user is first created.
    #[serde(default)]
    pub points: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoreSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub point_value: i32,
    pub recurrence: Recurrence,
    #[serde(default)]
    pub assigned_to: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    pub point_cost: i32,
}

pub const DEFAULT_REWARD_ICON: &str = "🎁";
