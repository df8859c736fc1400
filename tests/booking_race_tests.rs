//! Double booking under concurrent writers on a file-backed database

use appoint::{
    account::AccountManager,
    clock::{Clock, FixedClock},
    config::ServerConfig,
    db::{self, DatabaseOptions},
    error::AppError,
    roster::RosterManager,
    scheduling::{Actor, AppointmentManager, NewAppointment},
};
use chrono::{NaiveDate, NaiveTime};
use sqlx::SqlitePool;
use std::sync::Arc;

async fn file_pool(dir: &tempfile::TempDir) -> SqlitePool {
    let pool = db::create_pool(&dir.path().join("race.sqlite"), DatabaseOptions::default())
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

fn fixed_clock() -> Arc<dyn Clock> {
    let start = NaiveDate::from_ymd_opt(2026, 5, 4)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    Arc::new(FixedClock::new(start))
}

fn walk_in(name: &str) -> NewAppointment {
    NewAppointment {
        scheduler: None,
        booker: None,
        booker_name: Some(name.to_string()),
        date: NaiveDate::from_ymd_opt(2026, 5, 5).unwrap(),
        time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        note: None,
    }
}

#[tokio::test]
async fn test_concurrent_reservations_for_one_slot() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    let clock = fixed_clock();

    let accounts = AccountManager::new(
        pool.clone(),
        Arc::new(ServerConfig::for_tests()),
        clock.clone(),
    );
    let scheduler = accounts
        .register_scheduler("09350000001", "Reza", "Moradi", "")
        .await
        .unwrap();

    let manager = Arc::new(AppointmentManager::new(pool.clone(), clock));

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = Arc::clone(&manager);
        let actor = Actor::Scheduler(scheduler.id);
        handles.push(tokio::spawn(async move {
            manager.create(actor, walk_in(&format!("Guest {}", i))).await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::SlotAlreadyBooked) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(rejected, 7);

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appointment")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_concurrent_reservations_by_one_booker() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    let clock = fixed_clock();

    let accounts = AccountManager::new(
        pool.clone(),
        Arc::new(ServerConfig::for_tests()),
        clock.clone(),
    );
    let scheduler = accounts
        .register_scheduler("09350000001", "Reza", "Moradi", "")
        .await
        .unwrap();
    let booker = accounts
        .register_booker("09120000002", "Sara", "Karimi")
        .await
        .unwrap();
    RosterManager::new(pool.clone())
        .add_to_roster(booker.id, "09350000001")
        .await
        .unwrap();

    let manager = Arc::new(AppointmentManager::new(pool.clone(), clock));

    let mut handles = Vec::new();
    for hour in 9..17 {
        let manager = Arc::clone(&manager);
        let actor = Actor::Booker(booker.id);
        let reservation = NewAppointment {
            scheduler: Some(scheduler.id),
            booker: None,
            booker_name: None,
            date: NaiveDate::from_ymd_opt(2026, 5, 5).unwrap(),
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            note: None,
        };
        handles.push(tokio::spawn(async move {
            manager.create(actor, reservation).await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::ActiveAppointmentExists) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(rejected, 7);

    let held: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appointment WHERE booker_id = ?1")
        .bind(booker.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(held, 1);
}
