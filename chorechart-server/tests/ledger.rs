use chorechart_server::storage::models::{ChoreDraft, ChorePatch, RewardPatch};
use chorechart_server::storage::{Store, StorageError};
use chorechart_shared::auth::Role;
use chorechart_shared::domain::{ChoreSeed, Recurrence, RedemptionStatus, RewardSeed, UserSeed};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;

struct Fixture {
    store: Store,
    _dir: tempfile::TempDir,
}

fn user(id: &str, role: Role, points: i32) -> UserSeed {
    UserSeed {
        id: id.into(),
        name: id.to_uppercase(),
        avatar: String::new(),
        role,
        password_hash: None,
        points: Some(points),
    }
}

fn chore(id: &str, points: i32, recurrence: Recurrence, to: &[&str]) -> ChoreSeed {
    ChoreSeed {
        id: Some(id.into()),
        title: format!("Chore {id}"),
        description: None,
        point_value: points,
        recurrence,
        assigned_to: to.iter().map(|s| s.to_string()).collect(),
    }
}

fn reward(id: &str, cost: i32) -> RewardSeed {
    RewardSeed {
        id: Some(id.into()),
        title: format!("Reward {id}"),
        description: None,
        icon: None,
        point_cost: cost,
    }
}

async fn fixture(emma_points: i32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let store = Store::connect_sqlite(path.to_str().unwrap()).await.unwrap();
    store
        .seed_from_config(
            &[
                user("mom", Role::Admin, 0),
                user("emma", Role::Child, emma_points),
                user("liam", Role::Child, 0),
            ],
            &[
                chore("dishes", 10, Recurrence::Daily, &["emma", "liam"]),
                chore("lawn", 30, Recurrence::Weekly, &["emma"]),
                chore("garage", 50, Recurrence::OneTime, &["emma"]),
            ],
            &[reward("movie", 20), reward("bike", 500)],
        )
        .await
        .unwrap();
    Fixture { store, _dir: dir }
}

const TZ: Tz = Tz::UTC;

// Wednesday
fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 11, 15, 0, 0).unwrap()
}

async fn balance(store: &Store, id: &str) -> i32 {
    store.get_user(id).await.unwrap().unwrap().points
}

#[tokio::test]
async fn completing_credits_point_value() {
    let f = fixture(5).await;
    let (done, points) = f
        .store
        .complete_chore("emma", "dishes", TZ, wednesday())
        .await
        .unwrap();
    assert_eq!(points, 15);
    assert_eq!(done.points_earned, 10);
    assert_eq!(done.completed_at, wednesday().naive_utc());
    assert_eq!(balance(&f.store, "emma").await, 15);
}

#[tokio::test]
async fn daily_chore_cannot_be_completed_twice_a_day() {
    let f = fixture(0).await;
    f.store
        .complete_chore("emma", "dishes", TZ, wednesday())
        .await
        .unwrap();
    let err = f
        .store
        .complete_chore("emma", "dishes", TZ, wednesday() + Duration::hours(2))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)), "{err:?}");
    assert_eq!(balance(&f.store, "emma").await, 10);
    assert_eq!(
        f.store.list_completions(Some("emma"), None, None).await.unwrap().len(),
        1
    );

    // Liam's assignment of the same chore is independent
    f.store
        .complete_chore("liam", "dishes", TZ, wednesday())
        .await
        .unwrap();

    // Next day it is open again
    let (_, points) = f
        .store
        .complete_chore("emma", "dishes", TZ, wednesday() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(points, 20);
}

#[tokio::test]
async fn weekly_and_one_time_follow_their_periods() {
    let f = fixture(0).await;
    let last_week = wednesday() - Duration::days(8);
    f.store
        .complete_chore("emma", "lawn", TZ, last_week)
        .await
        .unwrap();
    f.store
        .complete_chore("emma", "lawn", TZ, wednesday())
        .await
        .unwrap();
    assert!(matches!(
        f.store
            .complete_chore("emma", "lawn", TZ, wednesday() + Duration::days(2))
            .await,
        Err(StorageError::Conflict(_))
    ));

    f.store
        .complete_chore("emma", "garage", TZ, last_week)
        .await
        .unwrap();
    assert!(matches!(
        f.store
            .complete_chore("emma", "garage", TZ, wednesday() + Duration::days(365))
            .await,
        Err(StorageError::Conflict(_))
    ));
    assert_eq!(balance(&f.store, "emma").await, 30 + 30 + 50);
}

#[tokio::test]
async fn completing_unassigned_or_unknown_chore_is_rejected() {
    let f = fixture(0).await;
    assert!(matches!(
        f.store
            .complete_chore("liam", "lawn", TZ, wednesday())
            .await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        f.store
            .complete_chore("emma", "nope", TZ, wednesday())
            .await,
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(balance(&f.store, "liam").await, 0);
}

#[tokio::test]
async fn redeeming_deducts_cost_and_files_pending_record() {
    let f = fixture(25).await;
    let (r, points) = f
        .store
        .redeem_reward("emma", "movie", wednesday())
        .await
        .unwrap();
    assert_eq!(points, 5);
    assert_eq!(r.status().unwrap(), RedemptionStatus::Pending);
    assert_eq!(r.points_spent, 20);
    assert_eq!(balance(&f.store, "emma").await, 5);

    let pending = f
        .store
        .list_redemptions(None, Some(RedemptionStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, r.id);
}

#[tokio::test]
async fn redemption_beyond_balance_changes_nothing() {
    let f = fixture(25).await;
    let err = f
        .store
        .redeem_reward("emma", "bike", wednesday())
        .await
        .unwrap_err();
    assert!(
        matches!(err, StorageError::InsufficientPoints { balance: 25, cost: 500 }),
        "{err:?}"
    );
    assert_eq!(balance(&f.store, "emma").await, 25);
    assert!(f.store.list_redemptions(Some("emma"), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn denial_refunds_and_decisions_are_final() {
    let f = fixture(45).await;
    let (first, _) = f.store.redeem_reward("emma", "movie", wednesday()).await.unwrap();
    let (second, points) = f.store.redeem_reward("emma", "movie", wednesday()).await.unwrap();
    assert_eq!(points, 5);

    let (denied, points) = f
        .store
        .decide_redemption(&first.id, RedemptionStatus::Denied, wednesday())
        .await
        .unwrap();
    assert_eq!(denied.status().unwrap(), RedemptionStatus::Denied);
    assert_eq!(points, 25);

    let (approved, points) = f
        .store
        .decide_redemption(&second.id, RedemptionStatus::Approved, wednesday())
        .await
        .unwrap();
    assert_eq!(approved.status().unwrap(), RedemptionStatus::Approved);
    assert_eq!(points, 25);

    for (id, decision) in [
        (&first.id, RedemptionStatus::Denied),
        (&first.id, RedemptionStatus::Approved),
        (&second.id, RedemptionStatus::Denied),
    ] {
        assert!(matches!(
            f.store.decide_redemption(id, decision, wednesday()).await,
            Err(StorageError::Conflict(_))
        ));
    }
    assert_eq!(balance(&f.store, "emma").await, 25);
    assert!(matches!(
        f.store
            .decide_redemption(&first.id, RedemptionStatus::Pending, wednesday())
            .await,
        Err(StorageError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn refund_uses_cost_at_redemption_time() {
    let f = fixture(20).await;
    let (r, _) = f.store.redeem_reward("emma", "movie", wednesday()).await.unwrap();
    f.store
        .update_reward(
            "movie",
            RewardPatch {
                point_cost: Some(35),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let (_, points) = f
        .store
        .decide_redemption(&r.id, RedemptionStatus::Denied, wednesday())
        .await
        .unwrap();
    assert_eq!(points, 20);
}

#[tokio::test]
async fn deleting_a_completion_takes_points_back() {
    let f = fixture(0).await;
    let (done, _) = f
        .store
        .complete_chore("emma", "lawn", TZ, wednesday())
        .await
        .unwrap();
    let (removed, points) = f.store.delete_completion(&done.id).await.unwrap();
    assert_eq!(removed.id, done.id);
    assert_eq!(points, 0);
    // The weekly chore is open again
    f.store
        .complete_chore("emma", "lawn", TZ, wednesday())
        .await
        .unwrap();
    assert!(matches!(
        f.store.delete_completion("missing").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn deleting_a_chore_keeps_history() {
    let f = fixture(0).await;
    f.store
        .complete_chore("emma", "dishes", TZ, wednesday())
        .await
        .unwrap();
    assert!(f.store.delete_chore("dishes").await.unwrap());
    assert!(!f.store.delete_chore("dishes").await.unwrap());
    assert!(f.store.get_chore("dishes").await.unwrap().is_none());

    let rows = f.store.list_assignments(Some("emma")).await.unwrap();
    assert!(rows.iter().all(|r| r.chore.id != "dishes"));
    let history = f.store.list_completions(Some("emma"), None, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].chore_instance_id, "dishes");
    assert_eq!(balance(&f.store, "emma").await, 10);
}

#[tokio::test]
async fn chore_fan_out_and_reassignment() {
    let f = fixture(0).await;
    let draft = ChoreDraft {
        title: "Feed the cat".into(),
        description: Some("Half a can".into()),
        point_value: 5,
        recurrence: Recurrence::Daily,
        due_date: None,
    };
    let (c, users) = f
        .store
        .create_chore(draft.clone(), vec!["emma".into(), "liam".into()])
        .await
        .unwrap();
    assert_eq!(users, vec!["emma", "liam"]);
    assert_eq!(f.store.list_assignments(None).await.unwrap().len(), 6);

    let before = f.store.list_assignments(Some("emma")).await.unwrap();
    let emma_assignment = before.iter().find(|r| r.chore.id == c.id).unwrap().assignment.id.clone();

    let (updated, users) = f
        .store
        .update_chore(
            &c.id,
            ChorePatch {
                point_value: Some(7),
                ..Default::default()
            },
            Some(vec!["emma".into()]),
        )
        .await
        .unwrap();
    assert_eq!(updated.point_value, 7);
    assert_eq!(updated.title, "Feed the cat");
    assert_eq!(users, vec!["emma"]);
    let after = f.store.list_assignments(Some("emma")).await.unwrap();
    let kept = after.iter().find(|r| r.chore.id == c.id).unwrap();
    assert_eq!(kept.assignment.id, emma_assignment);

    assert!(matches!(
        f.store.create_chore(draft.clone(), vec!["ghost".into()]).await,
        Err(StorageError::InvalidInput(_))
    ));
    assert!(matches!(
        f.store.create_chore(draft, vec![]).await,
        Err(StorageError::InvalidInput(_))
    ));
    assert!(matches!(
        f.store.update_chore("missing", ChorePatch::default(), None).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn reseeding_keeps_balances() {
    let f = fixture(5).await;
    f.store
        .complete_chore("emma", "dishes", TZ, wednesday())
        .await
        .unwrap();
    f.store
        .seed_from_config(
            &[user("emma", Role::Child, 999)],
            &[chore("dishes", 12, Recurrence::Daily, &["emma"])],
            &[],
        )
        .await
        .unwrap();
    assert_eq!(balance(&f.store, "emma").await, 15);
    let (c, users) = f.store.get_chore("dishes").await.unwrap().unwrap();
    assert_eq!(c.point_value, 12);
    assert_eq!(users, vec!["emma"]);
}

#[tokio::test]
async fn reseeding_drops_unlisted_assignees_but_keeps_history() {
    let f = fixture(0).await;
    f.store
        .complete_chore("liam", "dishes", TZ, wednesday())
        .await
        .unwrap();
    f.store
        .seed_from_config(
            &[],
            &[chore("dishes", 10, Recurrence::Daily, &["emma"])],
            &[],
        )
        .await
        .unwrap();
    let liam = f.store.list_assignments(Some("liam")).await.unwrap();
    assert!(liam.iter().all(|row| row.chore.id != "dishes"));
    assert!(matches!(
        f.store
            .complete_chore("liam", "dishes", TZ, wednesday() + Duration::days(1))
            .await,
        Err(StorageError::NotFound(_))
    ));
    let history = f
        .store
        .list_completions(Some("liam"), None, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(balance(&f.store, "liam").await, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_cannot_overdraw() {
    let f = fixture(30).await;
    let a = f.store.clone();
    let b = f.store.clone();
    let (r1, r2) = tokio::join!(
        a.redeem_reward("emma", "movie", wednesday()),
        b.redeem_reward("emma", "movie", wednesday()),
    );
    let ok = [r1.is_ok(), r2.is_ok()].iter().filter(|x| **x).count();
    assert_eq!(ok, 1);
    assert!(
        [r1, r2]
            .into_iter()
            .any(|r| matches!(r, Err(StorageError::InsufficientPoints { .. })))
    );
    assert_eq!(balance(&f.store, "emma").await, 10);
}

#[tokio::test]
async fn user_crud_round_trip() {
    let f = fixture(0).await;
    let created = f
        .store
        .create_user(None, "Zoë Smith", "🦊", Role::Child, 3, None)
        .await
        .unwrap();
    assert_eq!(created.id, "zoe-smith");
    assert!(matches!(
        f.store
            .create_user(Some("zoe-smith"), "Other", "", Role::Child, 0, None)
            .await,
        Err(StorageError::Conflict(_))
    ));
    let updated = f
        .store
        .update_user(
            "zoe-smith",
            chorechart_server::storage::models::UserPatch {
                points: Some(40),
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.points, 40);
    assert_eq!(updated.role().unwrap(), Role::Admin);
    assert_eq!(updated.name, "Zoë Smith");
    assert_eq!(f.store.list_users().await.unwrap().len(), 4);
}

#[tokio::test]
async fn same_name_users_get_distinct_ids() {
    let f = fixture(0).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let u = f
            .store
            .create_user(None, "Sam", "", Role::Child, 0, None)
            .await
            .unwrap();
        ids.push(u.id);
    }
    assert_eq!(ids, vec!["sam", "sam-2", "sam-3"]);
    // Seeded "emma" is taken, so a new Emma gets a suffix
    let emma = f
        .store
        .create_user(None, "Emma", "", Role::Child, 0, None)
        .await
        .unwrap();
    assert_eq!(emma.id, "emma-2");
    assert_eq!(balance(&f.store, "emma").await, 0);
}
