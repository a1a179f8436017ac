use crate::storage::StorageError;
use crate::storage::schema::{
    chore_assignments, chore_instances, completed_chores, redeemed_rewards, rewards, sessions,
    users,
};
use chorechart_shared::auth::Role;
use chorechart_shared::domain::{Recurrence, RedemptionStatus};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub points: i32,
    pub role: String,
    pub password_hash: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn role(&self) -> Result<Role, StorageError> {
        self.role.parse().map_err(StorageError::Corrupt)
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub avatar: &'a str,
    pub points: i32,
    pub role: &'a str,
    pub password_hash: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<Role>,
    pub points: Option<i32>,
    pub password_hash: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
pub(crate) struct UserChangeset<'a> {
    pub name: Option<&'a str>,
    pub avatar: Option<&'a str>,
    pub role: Option<&'a str>,
    pub points: Option<i32>,
    pub password_hash: Option<&'a str>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = chore_instances)]
pub struct ChoreInstance {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub point_value: i32,
    pub recurrence: String,
    pub due_date: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ChoreInstance {
    pub fn recurrence(&self) -> Result<Recurrence, StorageError> {
        self.recurrence.parse().map_err(StorageError::Corrupt)
    }
}

#[derive(Insertable)]
#[diesel(table_name = chore_instances)]
pub struct NewChoreInstance<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub point_value: i32,
    pub recurrence: &'a str,
    pub due_date: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields accepted when defining a chore, before it has an id.
#[derive(Debug, Clone)]
pub struct ChoreDraft {
    pub title: String,
    pub description: Option<String>,
    pub point_value: i32,
    pub recurrence: Recurrence,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct ChorePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub point_value: Option<i32>,
    pub recurrence: Option<Recurrence>,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(AsChangeset)]
#[diesel(table_name = chore_instances)]
pub(crate) struct ChoreChangeset<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub point_value: Option<i32>,
    pub recurrence: Option<&'a str>,
    pub due_date: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = chore_assignments)]
#[diesel(belongs_to(ChoreInstance, foreign_key = chore_instance_id))]
#[diesel(belongs_to(User, foreign_key = user_id))]
pub struct ChoreAssignment {
    pub id: String,
    pub chore_instance_id: String,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = chore_assignments)]
pub struct NewChoreAssignment<'a> {
    pub id: &'a str,
    pub chore_instance_id: &'a str,
    pub user_id: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = completed_chores)]
pub struct CompletedChore {
    pub id: String,
    pub chore_instance_id: String,
    pub user_id: String,
    pub completed_at: NaiveDateTime,
    pub points_earned: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = completed_chores)]
pub struct NewCompletedChore<'a> {
    pub id: &'a str,
    pub chore_instance_id: &'a str,
    pub user_id: &'a str,
    pub completed_at: NaiveDateTime,
    pub points_earned: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = rewards)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub icon: String,
    pub point_cost: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = rewards)]
pub struct NewReward<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub icon: &'a str,
    pub point_cost: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct RewardPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub point_cost: Option<i32>,
}

#[derive(AsChangeset)]
#[diesel(table_name = rewards)]
pub(crate) struct RewardChangeset<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub icon: Option<&'a str>,
    pub point_cost: Option<i32>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = redeemed_rewards)]
pub struct RedeemedReward {
    pub id: String,
    pub reward_id: String,
    pub user_id: String,
    pub redeemed_at: NaiveDateTime,
    pub status: String,
    pub points_spent: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl RedeemedReward {
    pub fn status(&self) -> Result<RedemptionStatus, StorageError> {
        self.status.parse().map_err(StorageError::Corrupt)
    }
}

#[derive(Insertable)]
#[diesel(table_name = redeemed_rewards)]
pub struct NewRedeemedReward<'a> {
    pub id: &'a str,
    pub reward_id: &'a str,
    pub user_id: &'a str,
    pub redeemed_at: NaiveDateTime,
    pub status: &'a str,
    pub points_spent: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(primary_key(jti))]
pub struct Session {
    pub jti: String,
    pub user_id: String,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub user_id: &'a str,
}
