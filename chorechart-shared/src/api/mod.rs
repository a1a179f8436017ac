use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::{Recurrence, RedemptionStatus, Timeframe};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
    pub user: UserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionDto {
    pub version: String,
}

// Users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub points: i32,
    pub role: Role,
    pub created_at: String, // RFC3339 UTC
    pub updated_at: String, // RFC3339 UTC
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateUserReq {
    /// Defaults to a slug of the name when absent
    pub id: Option<String>,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Option<Role>,
    pub points: Option<i32>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateUserReq {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<Role>,
    pub points: Option<i32>,
    pub password: Option<String>,
}

// Chores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoreDto {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub point_value: i32,
    pub recurrence: Recurrence,
    pub due_date: Option<String>,
    pub assigned_to: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChoreReq {
    pub title: String,
    pub description: Option<String>,
    pub point_value: i32,
    pub recurrence: Recurrence,
    pub due_date: Option<String>, // RFC3339
    pub assigned_to: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateChoreReq {
    pub title: Option<String>,
    pub description: Option<String>,
    pub point_value: Option<i32>,
    pub recurrence: Option<Recurrence>,
    pub due_date: Option<String>,
    /// Replaces the assignment set when present
    pub assigned_to: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentDto {
    pub id: String,
    pub user_id: String,
    pub chore_instance_id: String,
    pub title: String,
    pub description: Option<String>,
    pub point_value: i32,
    pub recurrence: Recurrence,
    pub due_date: Option<String>,
    pub open: bool,
    pub last_completed_at: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OpenQuery {
    pub open: Option<bool>,
}

// Completions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionDto {
    pub id: String,
    pub chore_instance_id: String,
    pub chore_title: Option<String>,
    pub user_id: String,
    pub completed_at: String,
    pub points_earned: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResp {
    pub completion: CompletionDto,
    pub points: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TimeframeQuery {
    pub timeframe: Option<Timeframe>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryDayDto {
    pub date: String, // YYYY-MM-DD, family timezone
    pub points: i32,
    pub completions: Vec<CompletionDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserStatsDto {
    pub user_id: String,
    pub points: i32,
    pub streak_days: u32,
    pub completed_this_week: u32,
    pub points_this_week: i32,
    pub expected_this_week: u32,
    pub completion_rate: u32,
}

// Rewards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDto {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub icon: String,
    pub point_cost: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRewardReq {
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub point_cost: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateRewardReq {
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub point_cost: Option<i32>,
}

// Redemptions
#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemReq {
    pub reward_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionDto {
    pub id: String,
    pub reward_id: String,
    pub reward_title: Option<String>,
    pub user_id: String,
    pub redeemed_at: String,
    pub status: RedemptionStatus,
    pub points_spent: i32,
    pub updated_at: String,
}

/// Redemption plus the owner's balance after the operation.
#[derive(Debug, Serialize, Deserialize)]
pub struct RedemptionResp {
    pub redemption: RedemptionDto,
    pub points: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StatusQuery {
    pub status: Option<RedemptionStatus>,
}

// Reports
#[derive(Debug, Serialize, Deserialize)]
pub struct UserPointsDto {
    pub user_id: String,
    pub name: String,
    pub avatar: String,
    pub points: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecurrenceCountDto {
    pub recurrence: Recurrence,
    pub completions: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionRateDto {
    pub user_id: String,
    pub name: String,
    pub expected: u32,
    pub actual: u32,
    pub rate: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsDto {
    pub timeframe: Timeframe,
    pub from: String,
    pub to: String,
    pub points_by_user: Vec<UserPointsDto>,
    pub completions_by_recurrence: Vec<RecurrenceCountDto>,
    pub completion_rates: Vec<CompletionRateDto>,
}
