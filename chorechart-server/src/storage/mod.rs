pub mod models;
pub mod schema;

use std::collections::{HashMap, HashSet};

use chorechart_shared::auth::Role;
use chorechart_shared::domain::{
    ChoreSeed, DEFAULT_REWARD_ICON, RedemptionStatus, RewardSeed, UserSeed,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    ChoreAssignment, ChoreChangeset, ChoreDraft, ChoreInstance, ChorePatch, CompletedChore,
    NewChoreAssignment, NewChoreInstance, NewCompletedChore, NewRedeemedReward, NewReward,
    NewSession, NewUser, RedeemedReward, Reward, RewardChangeset, RewardPatch, Session, User,
    UserChangeset, UserPatch,
};
use tracing::trace;
use uuid::Uuid;

use crate::schedule;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The row exists but is in a state that forbids the operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Redemption would take the balance below zero.
    #[error("insufficient points: balance {balance}, cost {cost}")]
    InsufficientPoints { balance: i32, cost: i32 },

    /// A stored enum column holds an unknown value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// An assignment with its chore and the completion instants of that
/// (chore, user) pair.
#[derive(Debug, Clone)]
pub struct AssignmentRow {
    pub assignment: ChoreAssignment,
    pub chore: ChoreInstance,
    pub completions: Vec<NaiveDateTime>,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    /// Upserts configured users, chores and rewards. Balances of existing
    /// users are left alone; a seeded chore's assignees are replaced by the
    /// configured list.
    pub async fn seed_from_config(
        &self,
        cfg_users: &[UserSeed],
        cfg_chores: &[ChoreSeed],
        cfg_rewards: &[RewardSeed],
    ) -> Result<(), StorageError> {
        use schema::{chore_instances, rewards, users};

        let users_owned = cfg_users.to_owned();
        let chores_owned = cfg_chores.to_owned();
        let rewards_owned = cfg_rewards.to_owned();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                let now = Utc::now().naive_utc();
                for u in &users_owned {
                    let new_user = NewUser {
                        id: &u.id,
                        name: &u.name,
                        avatar: &u.avatar,
                        points: u.points.unwrap_or(0),
                        role: u.role.as_str(),
                        password_hash: u.password_hash.as_deref(),
                        created_at: now,
                        updated_at: now,
                    };
                    diesel::insert_into(users::table)
                        .values(&new_user)
                        .on_conflict(users::id)
                        .do_update()
                        .set((
                            users::name.eq(new_user.name),
                            users::avatar.eq(new_user.avatar),
                            users::role.eq(new_user.role),
                            users::password_hash.eq(new_user.password_hash),
                            users::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                }

                for c in &chores_owned {
                    let chore_id = seed_id(c.id.as_deref(), &c.title);
                    let new_chore = NewChoreInstance {
                        id: &chore_id,
                        title: &c.title,
                        description: c.description.as_deref(),
                        point_value: c.point_value,
                        recurrence: c.recurrence.as_str(),
                        due_date: None,
                        created_at: now,
                        updated_at: now,
                    };
                    diesel::insert_into(chore_instances::table)
                        .values(&new_chore)
                        .on_conflict(chore_instances::id)
                        .do_update()
                        .set((
                            chore_instances::title.eq(new_chore.title),
                            chore_instances::description.eq(new_chore.description),
                            chore_instances::point_value.eq(new_chore.point_value),
                            chore_instances::recurrence.eq(new_chore.recurrence),
                            chore_instances::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    sync_assignments(conn, &chore_id, &c.assigned_to, now)?;
                }

                for r in &rewards_owned {
                    let reward_id = seed_id(r.id.as_deref(), &r.title);
                    let new_reward = NewReward {
                        id: &reward_id,
                        title: &r.title,
                        description: r.description.as_deref(),
                        icon: r.icon.as_deref().unwrap_or(DEFAULT_REWARD_ICON),
                        point_cost: r.point_cost,
                        created_at: now,
                        updated_at: now,
                    };
                    diesel::insert_into(rewards::table)
                        .values(&new_reward)
                        .on_conflict(rewards::id)
                        .do_update()
                        .set((
                            rewards::title.eq(new_reward.title),
                            rewards::description.eq(new_reward.description),
                            rewards::icon.eq(new_reward.icon),
                            rewards::point_cost.eq(new_reward.point_cost),
                            rewards::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    // Users

    pub async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        use schema::users::dsl::*;
        self.with_conn(|conn| Ok(users.order(name.asc()).load::<User>(conn)?))
            .await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, StorageError> {
        use schema::users::dsl::*;
        let uid = user_id.to_string();
        self.with_conn(move |conn| {
            Ok(users
                .filter(id.eq(&uid))
                .first::<User>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn create_user(
        &self,
        user_id: Option<&str>,
        name: &str,
        avatar: &str,
        role: Role,
        points: i32,
        password_hash: Option<&str>,
    ) -> Result<User, StorageError> {
        use schema::users;
        let explicit = user_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let base = seed_id(None, name);
        let name = name.to_string();
        let avatar = avatar.to_string();
        let hash = password_hash.map(|s| s.to_string());
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<User, StorageError> {
                let uid = match explicit {
                    Some(uid) => {
                        if user_exists(conn, &uid)? {
                            return Err(StorageError::Conflict(format!(
                                "user already exists: {uid}"
                            )));
                        }
                        uid
                    }
                    None => free_user_id(conn, &base)?,
                };
                let now = Utc::now().naive_utc();
                diesel::insert_into(users::table)
                    .values(&NewUser {
                        id: &uid,
                        name: &name,
                        avatar: &avatar,
                        points,
                        role: role.as_str(),
                        password_hash: hash.as_deref(),
                        created_at: now,
                        updated_at: now,
                    })
                    .execute(conn)?;
                Ok(users::table
                    .filter(users::id.eq(&uid))
                    .first::<User>(conn)?)
            })
        })
        .await
    }

    pub async fn update_user(&self, user_id: &str, patch: UserPatch) -> Result<User, StorageError> {
        use schema::users;
        let uid = user_id.to_string();
        self.with_conn(move |conn| {
            let changes = UserChangeset {
                name: patch.name.as_deref(),
                avatar: patch.avatar.as_deref(),
                role: patch.role.map(|r| r.as_str()),
                points: patch.points,
                password_hash: patch.password_hash.as_deref(),
                updated_at: Utc::now().naive_utc(),
            };
            let updated = diesel::update(users::table.filter(users::id.eq(&uid)))
                .set(&changes)
                .execute(conn)?;
            if updated == 0 {
                return Err(StorageError::NotFound(format!("user not found: {uid}")));
            }
            Ok(users::table
                .filter(users::id.eq(&uid))
                .first::<User>(conn)?)
        })
        .await
    }

    // Chores

    pub async fn list_chores(&self) -> Result<Vec<(ChoreInstance, Vec<String>)>, StorageError> {
        use schema::{chore_assignments as ca, chore_instances as ci};
        self.with_conn(|conn| {
            let chores = ci::table
                .order(ci::title.asc())
                .load::<ChoreInstance>(conn)?;
            let pairs: Vec<(String, String)> = ca::table
                .select((ca::chore_instance_id, ca::user_id))
                .order(ca::user_id.asc())
                .load(conn)?;
            let mut assigned: HashMap<String, Vec<String>> = HashMap::new();
            for (chore_id, user_id) in pairs {
                assigned.entry(chore_id).or_default().push(user_id);
            }
            Ok(chores
                .into_iter()
                .map(|c| {
                    let users = assigned.remove(&c.id).unwrap_or_default();
                    (c, users)
                })
                .collect())
        })
        .await
    }

    pub async fn get_chore(
        &self,
        chore_id: &str,
    ) -> Result<Option<(ChoreInstance, Vec<String>)>, StorageError> {
        let cid = chore_id.to_string();
        self.with_conn(move |conn| load_chore(conn, &cid)).await
    }

    /// Creates a chore and fans it out into one assignment per user.
    pub async fn create_chore(
        &self,
        draft: ChoreDraft,
        assignees: Vec<String>,
    ) -> Result<(ChoreInstance, Vec<String>), StorageError> {
        use schema::chore_instances;
        if assignees.is_empty() {
            return Err(StorageError::InvalidInput(
                "chore must be assigned to at least one user".into(),
            ));
        }
        self.with_conn(move |conn| {
            conn.immediate_transaction(
                |conn| -> Result<(ChoreInstance, Vec<String>), StorageError> {
                    ensure_users_exist(conn, &assignees)?;
                    let now = Utc::now().naive_utc();
                    let chore_id = Uuid::new_v4().to_string();
                    diesel::insert_into(chore_instances::table)
                        .values(&NewChoreInstance {
                            id: &chore_id,
                            title: &draft.title,
                            description: draft.description.as_deref(),
                            point_value: draft.point_value,
                            recurrence: draft.recurrence.as_str(),
                            due_date: draft.due_date,
                            created_at: now,
                            updated_at: now,
                        })
                        .execute(conn)?;
                    sync_assignments(conn, &chore_id, &assignees, now)?;
                    load_chore(conn, &chore_id)?.ok_or_else(|| {
                        StorageError::NotFound(format!("chore not found: {chore_id}"))
                    })
                },
            )
        })
        .await
    }

    /// Applies `patch` and, when `assignees` is given, replaces the
    /// assignment set. Assignments of users that stay keep their ids.
    pub async fn update_chore(
        &self,
        chore_id: &str,
        patch: ChorePatch,
        assignees: Option<Vec<String>>,
    ) -> Result<(ChoreInstance, Vec<String>), StorageError> {
        use schema::chore_instances as ci;
        if matches!(&assignees, Some(a) if a.is_empty()) {
            return Err(StorageError::InvalidInput(
                "chore must be assigned to at least one user".into(),
            ));
        }
        let cid = chore_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(
                |conn| -> Result<(ChoreInstance, Vec<String>), StorageError> {
                    let now = Utc::now().naive_utc();
                    let changes = ChoreChangeset {
                        title: patch.title.as_deref(),
                        description: patch.description.as_deref(),
                        point_value: patch.point_value,
                        recurrence: patch.recurrence.map(|r| r.as_str()),
                        due_date: patch.due_date,
                        updated_at: now,
                    };
                    let updated = diesel::update(ci::table.filter(ci::id.eq(&cid)))
                        .set(&changes)
                        .execute(conn)?;
                    if updated == 0 {
                        return Err(StorageError::NotFound(format!("chore not found: {cid}")));
                    }
                    if let Some(users) = &assignees {
                        ensure_users_exist(conn, users)?;
                        sync_assignments(conn, &cid, users, now)?;
                    }
                    load_chore(conn, &cid)?
                        .ok_or_else(|| StorageError::NotFound(format!("chore not found: {cid}")))
                },
            )
        })
        .await
    }

    /// Removes a chore and its assignments; its completions stay in history.
    pub async fn delete_chore(&self, chore_id: &str) -> Result<bool, StorageError> {
        use schema::{chore_assignments as ca, chore_instances as ci};
        let cid = chore_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                diesel::delete(ca::table.filter(ca::chore_instance_id.eq(&cid))).execute(conn)?;
                let deleted = diesel::delete(ci::table.filter(ci::id.eq(&cid))).execute(conn)?;
                Ok(deleted > 0)
            })
        })
        .await
    }

    /// Assignments (of one user, or everyone) with their completion history.
    pub async fn list_assignments(
        &self,
        user: Option<&str>,
    ) -> Result<Vec<AssignmentRow>, StorageError> {
        use schema::{chore_assignments as ca, chore_instances as ci, completed_chores as cc};
        let user = user.map(|s| s.to_string());
        self.with_conn(move |conn| {
            let rows: Vec<(ChoreAssignment, ChoreInstance)> = match &user {
                Some(uid) => ca::table
                    .inner_join(ci::table)
                    .filter(ca::user_id.eq(uid))
                    .order(ci::title.asc())
                    .load(conn)?,
                None => ca::table
                    .inner_join(ci::table)
                    .order((ca::user_id.asc(), ci::title.asc()))
                    .load(conn)?,
            };
            let done: Vec<(String, String, NaiveDateTime)> = match &user {
                Some(uid) => cc::table
                    .filter(cc::user_id.eq(uid))
                    .select((cc::chore_instance_id, cc::user_id, cc::completed_at))
                    .load(conn)?,
                None => cc::table
                    .select((cc::chore_instance_id, cc::user_id, cc::completed_at))
                    .load(conn)?,
            };
            let mut by_pair: HashMap<(String, String), Vec<NaiveDateTime>> = HashMap::new();
            for (chore_id, user_id, at) in done {
                by_pair.entry((chore_id, user_id)).or_default().push(at);
            }
            Ok(rows
                .into_iter()
                .map(|(assignment, chore)| {
                    let key = (
                        assignment.chore_instance_id.clone(),
                        assignment.user_id.clone(),
                    );
                    let completions = by_pair.remove(&key).unwrap_or_default();
                    AssignmentRow {
                        assignment,
                        chore,
                        completions,
                    }
                })
                .collect())
        })
        .await
    }

    /// Records a completion and credits the chore's current point value, in
    /// one transaction. Fails unless the assignment exists and is open.
    pub async fn complete_chore(
        &self,
        user_id: &str,
        chore_id: &str,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<(CompletedChore, i32), StorageError> {
        use schema::{chore_assignments as ca, chore_instances as ci, completed_chores as cc};
        let uid = user_id.to_string();
        let cid = chore_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(CompletedChore, i32), StorageError> {
                let chore = ci::table
                    .filter(ci::id.eq(&cid))
                    .first::<ChoreInstance>(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("chore not found: {cid}")))?;
                let assigned: i64 = ca::table
                    .filter(ca::chore_instance_id.eq(&cid))
                    .filter(ca::user_id.eq(&uid))
                    .count()
                    .get_result(conn)?;
                if assigned == 0 {
                    return Err(StorageError::NotFound(format!(
                        "chore {cid} is not assigned to {uid}"
                    )));
                }
                let history: Vec<DateTime<Utc>> = cc::table
                    .filter(cc::chore_instance_id.eq(&cid))
                    .filter(cc::user_id.eq(&uid))
                    .select(cc::completed_at)
                    .load::<NaiveDateTime>(conn)?
                    .into_iter()
                    .map(schedule::utc)
                    .collect();
                let recurrence = chore.recurrence()?;
                if !schedule::is_open(recurrence, &history, &now.with_timezone(&tz)) {
                    return Err(StorageError::Conflict(format!(
                        "{recurrence} chore {cid} is already done"
                    )));
                }

                let ts = now.naive_utc();
                let completion_id = Uuid::new_v4().to_string();
                diesel::insert_into(cc::table)
                    .values(&NewCompletedChore {
                        id: &completion_id,
                        chore_instance_id: &cid,
                        user_id: &uid,
                        completed_at: ts,
                        points_earned: chore.point_value,
                        created_at: ts,
                        updated_at: ts,
                    })
                    .execute(conn)?;
                let balance = adjust_points(conn, &uid, chore.point_value, ts)?;
                trace!(user_id = %uid, chore_id = %cid, balance, "completion recorded");
                let completion = cc::table
                    .filter(cc::id.eq(&completion_id))
                    .first::<CompletedChore>(conn)?;
                Ok((completion, balance))
            })
        })
        .await
    }

    /// Deletes a completion and takes its points back.
    pub async fn delete_completion(
        &self,
        completion_id: &str,
    ) -> Result<(CompletedChore, i32), StorageError> {
        use schema::completed_chores as cc;
        let id = completion_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(CompletedChore, i32), StorageError> {
                let rec = cc::table
                    .filter(cc::id.eq(&id))
                    .first::<CompletedChore>(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("completion not found: {id}")))?;
                diesel::delete(cc::table.filter(cc::id.eq(&id))).execute(conn)?;
                let balance = adjust_points(
                    conn,
                    &rec.user_id,
                    -rec.points_earned,
                    Utc::now().naive_utc(),
                )?;
                Ok((rec, balance))
            })
        })
        .await
    }

    /// Completions newest first, optionally narrowed to a user and a
    /// half-open `[since, until)` window.
    pub async fn list_completions(
        &self,
        user: Option<&str>,
        since: Option<NaiveDateTime>,
        until: Option<NaiveDateTime>,
    ) -> Result<Vec<CompletedChore>, StorageError> {
        use schema::completed_chores::dsl::*;
        let user = user.map(|s| s.to_string());
        self.with_conn(move |conn| {
            let mut q = completed_chores.into_boxed();
            if let Some(uid) = user {
                q = q.filter(user_id.eq(uid));
            }
            if let Some(from) = since {
                q = q.filter(completed_at.ge(from));
            }
            if let Some(to) = until {
                q = q.filter(completed_at.lt(to));
            }
            Ok(q.order(completed_at.desc()).load::<CompletedChore>(conn)?)
        })
        .await
    }

    // Rewards

    pub async fn list_rewards(&self) -> Result<Vec<Reward>, StorageError> {
        use schema::rewards::dsl::*;
        self.with_conn(|conn| {
            Ok(rewards
                .order((point_cost.asc(), title.asc()))
                .load::<Reward>(conn)?)
        })
        .await
    }

    pub async fn get_reward(&self, reward_id: &str) -> Result<Option<Reward>, StorageError> {
        use schema::rewards::dsl::*;
        let rid = reward_id.to_string();
        self.with_conn(move |conn| {
            Ok(rewards
                .filter(id.eq(&rid))
                .first::<Reward>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn create_reward(
        &self,
        title: &str,
        description: Option<&str>,
        icon: &str,
        point_cost: i32,
    ) -> Result<Reward, StorageError> {
        use schema::rewards;
        let title = title.to_string();
        let description = description.map(|s| s.to_string());
        let icon = icon.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            let reward_id = Uuid::new_v4().to_string();
            diesel::insert_into(rewards::table)
                .values(&NewReward {
                    id: &reward_id,
                    title: &title,
                    description: description.as_deref(),
                    icon: &icon,
                    point_cost,
                    created_at: now,
                    updated_at: now,
                })
                .execute(conn)?;
            Ok(rewards::table
                .filter(rewards::id.eq(&reward_id))
                .first::<Reward>(conn)?)
        })
        .await
    }

    pub async fn update_reward(
        &self,
        reward_id: &str,
        patch: RewardPatch,
    ) -> Result<Reward, StorageError> {
        use schema::rewards;
        let rid = reward_id.to_string();
        self.with_conn(move |conn| {
            let changes = RewardChangeset {
                title: patch.title.as_deref(),
                description: patch.description.as_deref(),
                icon: patch.icon.as_deref(),
                point_cost: patch.point_cost,
                updated_at: Utc::now().naive_utc(),
            };
            let updated = diesel::update(rewards::table.filter(rewards::id.eq(&rid)))
                .set(&changes)
                .execute(conn)?;
            if updated == 0 {
                return Err(StorageError::NotFound(format!("reward not found: {rid}")));
            }
            Ok(rewards::table
                .filter(rewards::id.eq(&rid))
                .first::<Reward>(conn)?)
        })
        .await
    }

    /// Deletes a reward definition; redemptions that reference it remain.
    pub async fn delete_reward(&self, reward_id: &str) -> Result<bool, StorageError> {
        use schema::rewards::dsl::*;
        let rid = reward_id.to_string();
        self.with_conn(move |conn| {
            let deleted = diesel::delete(rewards.filter(id.eq(&rid))).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    // Redemptions

    /// Deducts the reward cost and files a pending redemption, atomically.
    pub async fn redeem_reward(
        &self,
        user_id: &str,
        reward_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(RedeemedReward, i32), StorageError> {
        use schema::{redeemed_rewards as rr, rewards as rw, users as u};
        let uid = user_id.to_string();
        let rid = reward_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(RedeemedReward, i32), StorageError> {
                let reward = rw::table
                    .filter(rw::id.eq(&rid))
                    .first::<Reward>(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("reward not found: {rid}")))?;
                let balance: i32 = u::table
                    .filter(u::id.eq(&uid))
                    .select(u::points)
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("user not found: {uid}")))?;
                if balance < reward.point_cost {
                    return Err(StorageError::InsufficientPoints {
                        balance,
                        cost: reward.point_cost,
                    });
                }
                let ts = now.naive_utc();
                let balance = adjust_points(conn, &uid, -reward.point_cost, ts)?;
                let redemption_id = Uuid::new_v4().to_string();
                diesel::insert_into(rr::table)
                    .values(&NewRedeemedReward {
                        id: &redemption_id,
                        reward_id: &rid,
                        user_id: &uid,
                        redeemed_at: ts,
                        status: RedemptionStatus::Pending.as_str(),
                        points_spent: reward.point_cost,
                        created_at: ts,
                        updated_at: ts,
                    })
                    .execute(conn)?;
                let redemption = rr::table
                    .filter(rr::id.eq(&redemption_id))
                    .first::<RedeemedReward>(conn)?;
                Ok((redemption, balance))
            })
        })
        .await
    }

    pub async fn list_redemptions(
        &self,
        user: Option<&str>,
        status_filter: Option<RedemptionStatus>,
    ) -> Result<Vec<RedeemedReward>, StorageError> {
        use schema::redeemed_rewards::dsl::*;
        let user = user.map(|s| s.to_string());
        self.with_conn(move |conn| {
            let mut q = redeemed_rewards.into_boxed();
            if let Some(uid) = user {
                q = q.filter(user_id.eq(uid));
            }
            if let Some(s) = status_filter {
                q = q.filter(status.eq(s.as_str()));
            }
            Ok(q.order(redeemed_at.desc()).load::<RedeemedReward>(conn)?)
        })
        .await
    }

    /// Moves a pending redemption to `decision`. Denial refunds the points
    /// spent; approval leaves the balance as it is.
    pub async fn decide_redemption(
        &self,
        redemption_id: &str,
        decision: RedemptionStatus,
        now: DateTime<Utc>,
    ) -> Result<(RedeemedReward, i32), StorageError> {
        use schema::{redeemed_rewards as rr, users as u};
        if decision == RedemptionStatus::Pending {
            return Err(StorageError::InvalidInput(
                "decision must be approved or denied".into(),
            ));
        }
        let id = redemption_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(RedeemedReward, i32), StorageError> {
                let rec = rr::table
                    .filter(rr::id.eq(&id))
                    .first::<RedeemedReward>(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("redemption not found: {id}")))?;
                let current = rec.status()?;
                if current != RedemptionStatus::Pending {
                    return Err(StorageError::Conflict(format!(
                        "redemption {id} is already {current}"
                    )));
                }
                let ts = now.naive_utc();
                let balance = if decision == RedemptionStatus::Denied {
                    adjust_points(conn, &rec.user_id, rec.points_spent, ts)?
                } else {
                    u::table
                        .filter(u::id.eq(&rec.user_id))
                        .select(u::points)
                        .first::<i32>(conn)?
                };
                diesel::update(rr::table.filter(rr::id.eq(&id)))
                    .set((rr::status.eq(decision.as_str()), rr::updated_at.eq(ts)))
                    .execute(conn)?;
                let updated = rr::table
                    .filter(rr::id.eq(&id))
                    .first::<RedeemedReward>(conn)?;
                Ok((updated, balance))
            })
        })
        .await
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, user: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let j = jti_.to_string();
        let u = user.to_string();
        self.with_conn(move |conn| {
            let new = NewSession {
                jti: &j,
                user_id: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, jti_: &str) -> Result<Option<Session>, StorageError> {
        use schema::sessions::dsl::*;
        let j = jti_.to_string();
        self.with_conn(move |conn| {
            Ok(sessions
                .filter(jti.eq(&j))
                .first::<Session>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn delete_session(&self, jti_: &str) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let j = jti_.to_string();
        self.with_conn(move |conn| {
            let deleted = diesel::delete(sessions.filter(jti.eq(&j))).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let j = jti_.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }
}

fn seed_id(explicit: Option<&str>, title: &str) -> String {
    match explicit {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => {
            let slugged = slug::slugify(title);
            if slugged.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                slugged
            }
        }
    }
}

fn user_exists(conn: &mut SqliteConnection, uid: &str) -> Result<bool, StorageError> {
    use schema::users;
    let n: i64 = users::table
        .filter(users::id.eq(uid))
        .count()
        .get_result(conn)?;
    Ok(n > 0)
}

/// First of `base`, `base-2`, `base-3`, ... not taken by another user.
fn free_user_id(conn: &mut SqliteConnection, base: &str) -> Result<String, StorageError> {
    if !user_exists(conn, base)? {
        return Ok(base.to_string());
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !user_exists(conn, &candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn load_chore(
    conn: &mut SqliteConnection,
    chore_id: &str,
) -> Result<Option<(ChoreInstance, Vec<String>)>, StorageError> {
    use schema::{chore_assignments as ca, chore_instances as ci};
    let Some(chore) = ci::table
        .filter(ci::id.eq(chore_id))
        .first::<ChoreInstance>(conn)
        .optional()?
    else {
        return Ok(None);
    };
    let users = ca::table
        .filter(ca::chore_instance_id.eq(chore_id))
        .select(ca::user_id)
        .order(ca::user_id.asc())
        .load::<String>(conn)?;
    Ok(Some((chore, users)))
}

fn ensure_users_exist(conn: &mut SqliteConnection, ids: &[String]) -> Result<(), StorageError> {
    use schema::users;
    let found: HashSet<String> = users::table
        .filter(users::id.eq_any(ids))
        .select(users::id)
        .load::<String>(conn)?
        .into_iter()
        .collect();
    let missing: Vec<&str> = ids
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .map(|s| s.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StorageError::InvalidInput(format!(
            "unknown users: {}",
            missing.join(", ")
        )))
    }
}

fn sync_assignments(
    conn: &mut SqliteConnection,
    chore_id: &str,
    users: &[String],
    now: NaiveDateTime,
) -> Result<(), StorageError> {
    use schema::chore_assignments as ca;
    diesel::delete(
        ca::table
            .filter(ca::chore_instance_id.eq(chore_id))
            .filter(diesel::dsl::not(ca::user_id.eq_any(users))),
    )
    .execute(conn)?;
    for user_id in users {
        let assignment_id = Uuid::new_v4().to_string();
        diesel::insert_into(ca::table)
            .values(&NewChoreAssignment {
                id: &assignment_id,
                chore_instance_id: chore_id,
                user_id,
                created_at: now,
                updated_at: now,
            })
            .on_conflict_do_nothing()
            .execute(conn)?;
    }
    Ok(())
}

/// Adds `delta` to the user's balance and returns the new balance.
fn adjust_points(
    conn: &mut SqliteConnection,
    user_id: &str,
    delta: i32,
    now: NaiveDateTime,
) -> Result<i32, StorageError> {
    use schema::users as u;
    let updated = diesel::update(u::table.filter(u::id.eq(user_id)))
        .set((u::points.eq(u::points + delta), u::updated_at.eq(now)))
        .execute(conn)?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("user not found: {user_id}")));
    }
    Ok(u::table
        .filter(u::id.eq(user_id))
        .select(u::points)
        .first::<i32>(conn)?)
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
