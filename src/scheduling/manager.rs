/// Appointment manager: create, update, delete and list under per-role rules
use super::rules::{self, deserialize_some};
use crate::{
    clock::Clock,
    db::models::Appointment,
    error::{AppError, AppResult},
    metrics,
    pagination::{invalid_cursor, paginate, Cursor, Page, PAGE_SIZE},
    roster,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{pool::PoolConnection, FromRow, QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use std::sync::Arc;

const REQUIRED: &str = "This field is required.";

const VIEW_SELECT: &str = "SELECT a.id, a.scheduler_id, sa.username AS scheduler_username,
        a.booker_id, ba.username AS booker_username,
        b.name AS linked_name, b.family AS linked_family,
        a.booker_name, a.date, a.time, a.note, a.created_at
    FROM appointment a
    LEFT JOIN scheduler_profile s ON s.id = a.scheduler_id
    LEFT JOIN role_profile srp ON srp.id = s.owner_id
    LEFT JOIN account sa ON sa.id = srp.account_id
    LEFT JOIN booker_profile b ON b.id = a.booker_id
    LEFT JOIN role_profile brp ON brp.id = b.owner_id
    LEFT JOIN account ba ON ba.id = brp.account_id";

/// Who is acting; carries the actor's profile id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Scheduler(i64),
    Booker(i64),
}

impl Actor {
    pub fn label(&self) -> &'static str {
        match self {
            Actor::Admin => "admin",
            Actor::Scheduler(_) => "scheduler",
            Actor::Booker(_) => "booker",
        }
    }

    fn can_see(&self, appointment: &Appointment) -> bool {
        match *self {
            Actor::Admin => true,
            Actor::Scheduler(id) => appointment.scheduler_id == id,
            Actor::Booker(id) => appointment.booker_id == Some(id),
        }
    }
}

/// Appointment creation payload
///
/// `scheduler` is ignored for schedulers (they book on their own calendar),
/// `booker` and `booker_name` are ignored for bookers (they book for themselves).
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    #[serde(default)]
    pub scheduler: Option<i64>,
    #[serde(default)]
    pub booker: Option<i64>,
    #[serde(default)]
    pub booker_name: Option<String>,
    pub date: NaiveDate,
    #[serde(deserialize_with = "rules::time_format::deserialize")]
    pub time: NaiveTime,
    #[serde(default)]
    pub note: Option<String>,
}

/// Partial appointment update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentPatch {
    #[serde(default)]
    pub scheduler: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub booker: Option<Option<i64>>,
    #[serde(default)]
    pub booker_name: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "rules::time_format::deserialize_option")]
    pub time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub note: Option<Option<String>>,
}

/// Which appointments a listing covers
#[derive(Debug, Clone, Copy)]
pub enum AppointmentScope {
    All,
    Scheduler(i64),
}

/// Ordering contract of a paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentOrdering {
    /// Time of day ascending (scheduler panel)
    TimeAsc,
    /// Creation timestamp descending (admin panel)
    CreatedDesc,
}

#[derive(Debug, FromRow)]
struct AppointmentRow {
    id: i64,
    scheduler_id: i64,
    scheduler_username: Option<String>,
    booker_id: Option<i64>,
    booker_username: Option<String>,
    linked_name: Option<String>,
    linked_family: Option<String>,
    booker_name: String,
    date: NaiveDate,
    time: NaiveTime,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

/// Appointment as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    pub id: i64,
    pub scheduler_id: i64,
    pub scheduler_username: Option<String>,
    pub booker_id: Option<i64>,
    pub booker_username: Option<String>,
    pub booker_name: String,
    pub display_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AppointmentRow> for AppointmentView {
    fn from(row: AppointmentRow) -> Self {
        let linked = match (row.booker_id, &row.linked_name, &row.linked_family) {
            (Some(_), Some(name), Some(family)) => Some((name.as_str(), family.as_str())),
            _ => None,
        };
        let display_name = rules::display_name(linked, &row.booker_name);

        AppointmentView {
            id: row.id,
            scheduler_id: row.scheduler_id,
            scheduler_username: row.scheduler_username,
            booker_id: row.booker_id,
            booker_username: row.booker_username,
            booker_name: row.booker_name,
            display_name,
            date: row.date,
            time: row.time,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

/// Appointment manager
pub struct AppointmentManager {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl AppointmentManager {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create an appointment on behalf of `actor`
    pub async fn create(&self, actor: Actor, new: NewAppointment) -> AppResult<AppointmentView> {
        let result = self.create_inner(actor, new).await;

        match &result {
            Ok(id) => {
                metrics::record_appointment_created(actor.label());
                tracing::info!(appointment_id = id, actor = actor.label(), "appointment created");
            }
            Err(e) => record_rejection(actor, e),
        }

        self.view(result?).await
    }

    async fn create_inner(&self, actor: Actor, new: NewAppointment) -> AppResult<i64> {
        let time = rules::normalize_time(new.time);
        let date = new.date;
        let now = self.local_now();

        let (scheduler_id, booker_id, booker_name) = match actor {
            Actor::Admin => {
                let scheduler_id = new
                    .scheduler
                    .ok_or_else(|| AppError::field_error("scheduler", REQUIRED))?;
                rules::check_time_window(time)?;
                self.ensure_scheduler(scheduler_id).await?;
                if let Some(booker_id) = new.booker {
                    self.ensure_booker(booker_id).await?;
                }
                (scheduler_id, new.booker, new.booker_name.unwrap_or_default())
            }
            Actor::Scheduler(scheduler_id) => {
                rules::require_booker_identity(new.booker, new.booker_name.as_deref())?;
                rules::check_time_window(time)?;
                if let Some(booker_id) = new.booker {
                    self.ensure_booker(booker_id).await?;
                }
                (scheduler_id, new.booker, new.booker_name.unwrap_or_default())
            }
            Actor::Booker(booker_id) => {
                let scheduler_id = new
                    .scheduler
                    .ok_or_else(|| AppError::field_error("scheduler", REQUIRED))?;
                if !roster::contains(&self.db, booker_id, scheduler_id).await? {
                    return Err(AppError::SchedulerNotInRoster);
                }
                rules::check_time_window(time)?;
                rules::check_not_past(date, time, now)?;
                (scheduler_id, Some(booker_id), String::new())
            }
        };
        let note = new.note;
        let created_at = self.clock.now().trunc_subsecs(0);

        // The one-active check and the insert share SQLite's write lock
        let mut conn = self.begin_write().await?;
        let result: AppResult<i64> = async {
            if let Actor::Booker(booker_id) = actor {
                if has_upcoming(&mut *conn, booker_id, now, None).await? {
                    return Err(AppError::ActiveAppointmentExists);
                }
            }
            check_slot_free(&mut *conn, scheduler_id, date, time, None).await?;

            let id = sqlx::query(
                "INSERT INTO appointment (scheduler_id, booker_id, booker_name, date, time, note, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(scheduler_id)
            .bind(booker_id)
            .bind(&booker_name)
            .bind(date)
            .bind(time)
            .bind(&note)
            .bind(created_at)
            .execute(&mut *conn)
            .await
            .map_err(slot_conflict)?
            .last_insert_rowid();
            Ok(id)
        }
        .await;

        finish_write(conn, result).await
    }

    /// Apply a partial update on behalf of `actor`
    pub async fn update(
        &self,
        actor: Actor,
        id: i64,
        patch: AppointmentPatch,
    ) -> AppResult<AppointmentView> {
        let result = self.update_inner(actor, id, patch).await;

        match &result {
            Ok(()) => tracing::info!(appointment_id = id, actor = actor.label(), "appointment updated"),
            Err(e) => record_rejection(actor, e),
        }

        result?;
        self.view(id).await
    }

    async fn update_inner(&self, actor: Actor, id: i64, patch: AppointmentPatch) -> AppResult<()> {
        let current = self.fetch_for(actor, id).await?;
        let mut next = current.clone();

        match actor {
            Actor::Admin => {
                if let Some(scheduler_id) = patch.scheduler {
                    self.ensure_scheduler(scheduler_id).await?;
                    next.scheduler_id = scheduler_id;
                }
            }
            Actor::Scheduler(_) => {
                rules::require_booker_identity(patch.booker.flatten(), patch.booker_name.as_deref())?;
            }
            Actor::Booker(_) => {}
        }

        if !matches!(actor, Actor::Booker(_)) {
            if let Some(booker) = patch.booker {
                if let Some(booker_id) = booker {
                    self.ensure_booker(booker_id).await?;
                }
                next.booker_id = booker;
            }
            if let Some(name) = patch.booker_name {
                next.booker_name = name;
            }
        }

        if let Some(date) = patch.date {
            next.date = date;
        }
        if let Some(time) = patch.time {
            next.time = rules::normalize_time(time);
        }
        if let Some(note) = patch.note {
            next.note = note;
        }

        rules::check_time_window(next.time)?;
        let now = self.local_now();
        if let Actor::Booker(_) = actor {
            rules::check_not_past(next.date, next.time, now)?;
        }

        let mut conn = self.begin_write().await?;
        let result: AppResult<()> = async {
            // A booker moving a past appointment forward must not end up with two upcoming
            if let Actor::Booker(booker_id) = actor {
                if has_upcoming(&mut *conn, booker_id, now, Some(id)).await? {
                    return Err(AppError::ActiveAppointmentExists);
                }
            }
            check_slot_free(&mut *conn, next.scheduler_id, next.date, next.time, Some(id)).await?;

            sqlx::query(
                "UPDATE appointment
                 SET scheduler_id = ?1, booker_id = ?2, booker_name = ?3, date = ?4, time = ?5, note = ?6
                 WHERE id = ?7",
            )
            .bind(next.scheduler_id)
            .bind(next.booker_id)
            .bind(&next.booker_name)
            .bind(next.date)
            .bind(next.time)
            .bind(&next.note)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(slot_conflict)?;
            Ok(())
        }
        .await;

        finish_write(conn, result).await
    }

    /// Delete an appointment; bookers may not delete
    pub async fn delete(&self, actor: Actor, id: i64) -> AppResult<()> {
        if let Actor::Booker(_) = actor {
            return Err(AppError::Forbidden(
                "Bookers cannot delete appointments".to_string(),
            ));
        }

        self.fetch_for(actor, id).await?;

        sqlx::query("DELETE FROM appointment WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::info!(appointment_id = id, actor = actor.label(), "appointment deleted");
        Ok(())
    }

    /// Single appointment visible to `actor`
    pub async fn get(&self, actor: Actor, id: i64) -> AppResult<AppointmentView> {
        self.fetch_for(actor, id).await?;
        self.view(id).await
    }

    /// Earliest upcoming appointment of a booker
    pub async fn upcoming_for_booker(&self, booker_id: i64) -> AppResult<Option<AppointmentView>> {
        let now = self.local_now();
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "{VIEW_SELECT}
             WHERE a.booker_id = ?1 AND (a.date > ?2 OR (a.date = ?2 AND a.time > ?3))
             ORDER BY a.date ASC, a.time ASC
             LIMIT 1"
        ))
        .bind(booker_id)
        .bind(now.date())
        .bind(now.time())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(AppointmentView::from))
    }

    /// Past appointments of a booker, most recent first
    pub async fn past_for_booker(&self, booker_id: i64) -> AppResult<Vec<AppointmentView>> {
        let now = self.local_now();
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            "{VIEW_SELECT}
             WHERE a.booker_id = ?1 AND (a.date < ?2 OR (a.date = ?2 AND a.time <= ?3))
             ORDER BY a.date DESC, a.time DESC"
        ))
        .bind(booker_id)
        .bind(now.date())
        .bind(now.time())
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(AppointmentView::from).collect())
    }

    /// All appointments of a scheduler in date, time order
    pub async fn list_for_scheduler(&self, scheduler_id: i64) -> AppResult<Vec<AppointmentView>> {
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            "{VIEW_SELECT} WHERE a.scheduler_id = ?1 ORDER BY a.date ASC, a.time ASC, a.id ASC"
        ))
        .bind(scheduler_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(AppointmentView::from).collect())
    }

    /// One page of a cursor-ordered listing
    pub async fn list_page(
        &self,
        scope: AppointmentScope,
        ordering: AppointmentOrdering,
        cursor: Option<&Cursor>,
    ) -> AppResult<Page<AppointmentView>> {
        let reverse = cursor.is_some_and(|c| c.reverse);
        let descending = match ordering {
            AppointmentOrdering::TimeAsc => reverse,
            AppointmentOrdering::CreatedDesc => !reverse,
        };
        let column = match ordering {
            AppointmentOrdering::TimeAsc => "a.time",
            AppointmentOrdering::CreatedDesc => "a.created_at",
        };

        let mut qb = QueryBuilder::<Sqlite>::new(VIEW_SELECT);
        qb.push(" WHERE 1 = 1");
        if let AppointmentScope::Scheduler(scheduler_id) = scope {
            qb.push(" AND a.scheduler_id = ").push_bind(scheduler_id);
        }

        if let Some(cursor) = cursor {
            let op = if descending { "<" } else { ">" };
            qb.push(format!(" AND ({column}, a.id) {op} ("));
            match ordering {
                AppointmentOrdering::TimeAsc => {
                    let key = rules::parse_time(&cursor.key).ok_or_else(invalid_cursor)?;
                    qb.push_bind(key);
                }
                AppointmentOrdering::CreatedDesc => {
                    let key = DateTime::parse_from_rfc3339(&cursor.key)
                        .map_err(|_| invalid_cursor())?
                        .with_timezone(&Utc);
                    qb.push_bind(key);
                }
            }
            qb.push(", ").push_bind(cursor.id).push(")");
        }

        let dir = if descending { "DESC" } else { "ASC" };
        qb.push(format!(
            " ORDER BY {column} {dir}, a.id {dir} LIMIT {}",
            PAGE_SIZE + 1
        ));

        let rows = qb
            .build_query_as::<AppointmentRow>()
            .fetch_all(&self.db)
            .await?;
        let views: Vec<AppointmentView> = rows.into_iter().map(AppointmentView::from).collect();

        Ok(paginate(views, cursor, |v| match ordering {
            AppointmentOrdering::TimeAsc => (v.time.format("%H:%M:%S").to_string(), v.id),
            AppointmentOrdering::CreatedDesc => (v.created_at.to_rfc3339(), v.id),
        }))
    }

    async fn view(&self, id: i64) -> AppResult<AppointmentView> {
        sqlx::query_as::<_, AppointmentRow>(&format!("{VIEW_SELECT} WHERE a.id = ?1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(AppointmentView::from)
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))
    }

    /// Load an appointment, hiding ones the actor has no claim on
    async fn fetch_for(&self, actor: Actor, id: i64) -> AppResult<Appointment> {
        sqlx::query_as::<_, Appointment>(
            "SELECT id, scheduler_id, booker_id, booker_name, date, time, note, created_at
             FROM appointment WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .filter(|appointment| actor.can_see(appointment))
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))
    }

    /// Local wall-clock time at slot precision
    fn local_now(&self) -> NaiveDateTime {
        self.clock.local().trunc_subsecs(0)
    }

    /// Pooled connection holding SQLite's write lock until `finish_write`
    async fn begin_write(&self) -> AppResult<PoolConnection<Sqlite>> {
        let mut conn = self.db.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }

    async fn ensure_scheduler(&self, scheduler_id: i64) -> AppResult<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM scheduler_profile WHERE id = ?1)")
                .bind(scheduler_id)
                .fetch_one(&self.db)
                .await?;
        if !exists {
            return Err(AppError::field_error("scheduler", "Scheduler does not exist."));
        }
        Ok(())
    }

    async fn ensure_booker(&self, booker_id: i64) -> AppResult<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM booker_profile WHERE id = ?1)")
                .bind(booker_id)
                .fetch_one(&self.db)
                .await?;
        if !exists {
            return Err(AppError::field_error("booker", "Booker does not exist."));
        }
        Ok(())
    }
}

/// Commit on success, roll back otherwise
async fn finish_write<T>(mut conn: PoolConnection<Sqlite>, result: AppResult<T>) -> AppResult<T> {
    let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
    if let Err(e) = sqlx::query(end).execute(&mut *conn).await {
        tracing::warn!(error = %e, "{} failed, discarding connection", end);
        drop(conn.detach());
        return result.and(Err(AppError::Database(e)));
    }
    result
}

/// Fast-fail slot check; the UNIQUE constraint remains authoritative
async fn check_slot_free<'e, E: SqliteExecutor<'e>>(
    executor: E,
    scheduler_id: i64,
    date: NaiveDate,
    time: NaiveTime,
    exclude: Option<i64>,
) -> AppResult<()> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM appointment
            WHERE scheduler_id = ?1 AND date = ?2 AND time = ?3 AND id != ?4
         )",
    )
    .bind(scheduler_id)
    .bind(date)
    .bind(time)
    .bind(exclude.unwrap_or(0))
    .fetch_one(executor)
    .await?;

    if taken {
        return Err(AppError::SlotAlreadyBooked);
    }
    Ok(())
}

/// Whether the booker holds an upcoming appointment other than `exclude`
async fn has_upcoming<'e, E: SqliteExecutor<'e>>(
    executor: E,
    booker_id: i64,
    now: NaiveDateTime,
    exclude: Option<i64>,
) -> AppResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM appointment
            WHERE booker_id = ?1 AND id != ?4 AND (date > ?2 OR (date = ?2 AND time > ?3))
         )",
    )
    .bind(booker_id)
    .bind(now.date())
    .bind(now.time())
    .bind(exclude.unwrap_or(0))
    .fetch_one(executor)
    .await?;

    Ok(exists)
}

/// Storage-level uniqueness rejections surface as the same conflict as the pre-check
fn slot_conflict(e: sqlx::Error) -> AppError {
    let err = AppError::Database(e);
    if err.is_unique_violation() {
        AppError::SlotAlreadyBooked
    } else {
        err
    }
}

fn record_rejection(actor: Actor, err: &AppError) {
    match err {
        AppError::InvalidTimeWindow
        | AppError::SlotAlreadyBooked
        | AppError::PastDateOrTime
        | AppError::SchedulerNotInRoster
        | AppError::ActiveAppointmentExists
        | AppError::MissingBookerIdentity => {
            metrics::record_scheduling_rejection(err.code());
            tracing::debug!(actor = actor.label(), reason = err.code(), "scheduling rejected");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::AccountManager, clock::FixedClock, config::ServerConfig, db,
        roster::RosterManager,
    };
    use chrono::Duration;

    struct Fixture {
        appointments: AppointmentManager,
        clock: Arc<FixedClock>,
        scheduler: i64,
        booker: i64,
        pool: SqlitePool,
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn today() -> NaiveDate {
        start().date()
    }

    fn tomorrow() -> NaiveDate {
        today() + Duration::days(1)
    }

    async fn setup() -> Fixture {
        let pool = db::create_memory_pool().await.unwrap();
        let clock = Arc::new(FixedClock::new(start()));
        let accounts = AccountManager::new(
            pool.clone(),
            Arc::new(ServerConfig::for_tests()),
            clock.clone(),
        );
        let scheduler = accounts
            .register_scheduler("09987654321", "Alice", "Smith", "Dentist")
            .await
            .unwrap();
        let booker = accounts
            .register_booker("09123456789", "John", "Doe")
            .await
            .unwrap();
        RosterManager::new(pool.clone())
            .add_to_roster(booker.id, "09987654321")
            .await
            .unwrap();

        Fixture {
            appointments: AppointmentManager::new(pool.clone(), clock.clone()),
            clock,
            scheduler: scheduler.id,
            booker: booker.id,
            pool,
        }
    }

    fn walk_in(date: NaiveDate, time: NaiveTime) -> NewAppointment {
        NewAppointment {
            scheduler: None,
            booker: None,
            booker_name: Some("Walk-in".to_string()),
            date,
            time,
            note: None,
        }
    }

    fn reservation(scheduler: i64, date: NaiveDate, time: NaiveTime) -> NewAppointment {
        NewAppointment {
            scheduler: Some(scheduler),
            booker: None,
            booker_name: None,
            date,
            time,
            note: Some("checkup".to_string()),
        }
    }

    #[tokio::test]
    async fn test_scheduler_walk_in_then_duplicate() {
        let f = setup().await;
        let actor = Actor::Scheduler(f.scheduler);

        let created = f
            .appointments
            .create(actor, walk_in(tomorrow(), t(8, 30)))
            .await
            .unwrap();
        assert_eq!(created.display_name, "Walk-in");
        assert_eq!(created.scheduler_username.as_deref(), Some("09987654321"));

        let err = f
            .appointments
            .create(actor, walk_in(tomorrow(), t(8, 30)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotAlreadyBooked));
    }

    #[tokio::test]
    async fn test_time_window_on_create() {
        let f = setup().await;
        let actor = Actor::Scheduler(f.scheduler);

        assert!(f
            .appointments
            .create(actor, walk_in(tomorrow(), t(8, 0)))
            .await
            .is_ok());
        for time in [t(20, 0), t(7, 59)] {
            let err = f
                .appointments
                .create(actor, walk_in(tomorrow(), time))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidTimeWindow));
        }
    }

    #[tokio::test]
    async fn test_scheduler_requires_booker_identity() {
        let f = setup().await;
        let mut payload = walk_in(tomorrow(), t(9, 0));
        payload.booker_name = None;

        let err = f
            .appointments
            .create(Actor::Scheduler(f.scheduler), payload)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingBookerIdentity));

        let mut linked = walk_in(tomorrow(), t(9, 0));
        linked.booker_name = None;
        linked.booker = Some(f.booker);
        let created = f
            .appointments
            .create(Actor::Scheduler(f.scheduler), linked)
            .await
            .unwrap();
        assert_eq!(created.display_name, "John Doe");
    }

    #[tokio::test]
    async fn test_booker_rules() {
        let f = setup().await;
        let actor = Actor::Booker(f.booker);

        // Today at the current minute is already past
        let err = f
            .appointments
            .create(actor, reservation(f.scheduler, today(), t(10, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PastDateOrTime));

        let yesterday = today() - Duration::days(1);
        let err = f
            .appointments
            .create(actor, reservation(f.scheduler, yesterday, t(12, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PastDateOrTime));

        let booked = f
            .appointments
            .create(actor, reservation(f.scheduler, today(), t(10, 30)))
            .await
            .unwrap();
        assert_eq!(booked.booker_id, Some(f.booker));

        let err = f
            .appointments
            .create(actor, reservation(f.scheduler, tomorrow(), t(9, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ActiveAppointmentExists));
    }

    #[tokio::test]
    async fn test_booker_may_book_again_once_appointment_is_past() {
        let f = setup().await;
        let actor = Actor::Booker(f.booker);

        f.appointments
            .create(actor, reservation(f.scheduler, today(), t(10, 30)))
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(30));
        assert!(f.appointments.upcoming_for_booker(f.booker).await.unwrap().is_none());

        let second = f
            .appointments
            .create(actor, reservation(f.scheduler, tomorrow(), t(9, 0)))
            .await
            .unwrap();
        assert_eq!(
            f.appointments
                .upcoming_for_booker(f.booker)
                .await
                .unwrap()
                .map(|a| a.id),
            Some(second.id)
        );
        assert_eq!(f.appointments.past_for_booker(f.booker).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_active_rule_only_binds_bookers() {
        let f = setup().await;

        f.appointments
            .create(Actor::Booker(f.booker), reservation(f.scheduler, tomorrow(), t(9, 0)))
            .await
            .unwrap();

        let mut on_behalf = walk_in(tomorrow(), t(11, 0));
        on_behalf.booker = Some(f.booker);
        assert!(f
            .appointments
            .create(Actor::Scheduler(f.scheduler), on_behalf)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_sub_second_clock_agrees_on_slot_boundary() {
        let f = setup().await;
        let mut linked = walk_in(today(), t(10, 30));
        linked.booker = Some(f.booker);
        f.appointments
            .create(Actor::Scheduler(f.scheduler), linked)
            .await
            .unwrap();

        f.clock
            .set(today().and_hms_milli_opt(10, 30, 0, 500).unwrap());

        let err = f
            .appointments
            .create(Actor::Booker(f.booker), reservation(f.scheduler, today(), t(10, 30)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PastDateOrTime));
        assert!(f.appointments.upcoming_for_booker(f.booker).await.unwrap().is_none());
        assert_eq!(f.appointments.past_for_booker(f.booker).await.unwrap().len(), 1);

        let next = NaiveTime::from_hms_opt(10, 30, 1).unwrap();
        let booked = f
            .appointments
            .create(Actor::Booker(f.booker), reservation(f.scheduler, today(), next))
            .await
            .unwrap();
        assert_eq!(
            f.appointments
                .upcoming_for_booker(f.booker)
                .await
                .unwrap()
                .map(|a| a.id),
            Some(booked.id)
        );
    }

    #[tokio::test]
    async fn test_booker_cannot_revive_past_appointment_alongside_upcoming() {
        let f = setup().await;
        let actor = Actor::Booker(f.booker);

        let first = f
            .appointments
            .create(actor, reservation(f.scheduler, today(), t(10, 30)))
            .await
            .unwrap();
        f.clock.advance(Duration::hours(1));
        f.appointments
            .create(actor, reservation(f.scheduler, tomorrow(), t(9, 0)))
            .await
            .unwrap();

        let err = f
            .appointments
            .update(
                actor,
                first.id,
                AppointmentPatch {
                    date: Some(tomorrow()),
                    time: Some(t(12, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ActiveAppointmentExists));
        assert_eq!(f.appointments.past_for_booker(f.booker).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_releases_connection() {
        let f = setup().await;
        let actor = Actor::Scheduler(f.scheduler);
        f.appointments
            .create(actor, walk_in(tomorrow(), t(9, 0)))
            .await
            .unwrap();
        assert!(f
            .appointments
            .create(actor, walk_in(tomorrow(), t(9, 0)))
            .await
            .is_err());

        // The single in-memory connection is back in the pool with no open transaction
        let again = f
            .appointments
            .create(actor, walk_in(tomorrow(), t(9, 30)))
            .await
            .unwrap();
        assert_eq!(again.time, t(9, 30));
    }

    #[tokio::test]
    async fn test_booker_needs_roster_membership() {
        let f = setup().await;
        let accounts = AccountManager::new(
            f.pool.clone(),
            Arc::new(ServerConfig::for_tests()),
            f.clock.clone(),
        );
        let stranger = accounts
            .register_scheduler("09111111111", "Bob", "Brown", "")
            .await
            .unwrap();

        let err = f
            .appointments
            .create(
                Actor::Booker(f.booker),
                reservation(stranger.id, tomorrow(), t(9, 0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SchedulerNotInRoster));
    }

    #[tokio::test]
    async fn test_update_excludes_itself_from_slot_check() {
        let f = setup().await;
        let actor = Actor::Scheduler(f.scheduler);

        let first = f
            .appointments
            .create(actor, walk_in(tomorrow(), t(9, 0)))
            .await
            .unwrap();
        f.appointments
            .create(actor, walk_in(tomorrow(), t(10, 0)))
            .await
            .unwrap();

        // Same slot, new note
        let updated = f
            .appointments
            .update(
                actor,
                first.id,
                AppointmentPatch {
                    booker_name: Some("Walk-in".to_string()),
                    note: Some(Some("moved".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.note.as_deref(), Some("moved"));

        let err = f
            .appointments
            .update(
                actor,
                first.id,
                AppointmentPatch {
                    booker_name: Some("Walk-in".to_string()),
                    time: Some(t(10, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotAlreadyBooked));
    }

    #[tokio::test]
    async fn test_booker_update_rules() {
        let f = setup().await;
        let actor = Actor::Booker(f.booker);
        let booked = f
            .appointments
            .create(actor, reservation(f.scheduler, tomorrow(), t(9, 0)))
            .await
            .unwrap();

        let err = f
            .appointments
            .update(
                actor,
                booked.id,
                AppointmentPatch {
                    date: Some(today()),
                    time: Some(t(9, 30)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PastDateOrTime));

        let moved = f
            .appointments
            .update(
                actor,
                booked.id,
                AppointmentPatch {
                    time: Some(t(15, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.time, t(15, 0));
    }

    #[tokio::test]
    async fn test_foreign_appointments_are_hidden() {
        let f = setup().await;
        let created = f
            .appointments
            .create(Actor::Scheduler(f.scheduler), walk_in(tomorrow(), t(9, 0)))
            .await
            .unwrap();

        let other = Actor::Scheduler(f.scheduler + 100);
        assert!(matches!(
            f.appointments.get(other, created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.appointments.delete(other, created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.appointments.delete(Actor::Booker(f.booker), created.id).await,
            Err(AppError::Forbidden(_))
        ));

        f.appointments.delete(Actor::Admin, created.id).await.unwrap();
        assert!(f.appointments.get(Actor::Admin, created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_time_ordered_pages() {
        let f = setup().await;
        let actor = Actor::Scheduler(f.scheduler);
        for hour in 8..15 {
            f.appointments
                .create(actor, walk_in(tomorrow(), t(hour, 0)))
                .await
                .unwrap();
        }

        let scope = AppointmentScope::Scheduler(f.scheduler);
        let first = f
            .appointments
            .list_page(scope, AppointmentOrdering::TimeAsc, None)
            .await
            .unwrap();
        assert_eq!(first.results.len(), 5);
        assert_eq!(first.results[0].time, t(8, 0));
        assert!(first.previous.is_none());

        let next = Cursor::decode(first.next.as_deref().unwrap()).unwrap();
        let second = f
            .appointments
            .list_page(scope, AppointmentOrdering::TimeAsc, Some(&next))
            .await
            .unwrap();
        let times: Vec<_> = second.results.iter().map(|a| a.time).collect();
        assert_eq!(times, vec![t(13, 0), t(14, 0)]);
        assert!(second.next.is_none());

        let back = Cursor::decode(second.previous.as_deref().unwrap()).unwrap();
        let again = f
            .appointments
            .list_page(scope, AppointmentOrdering::TimeAsc, Some(&back))
            .await
            .unwrap();
        let ids: Vec<_> = again.results.iter().map(|a| a.id).collect();
        let first_ids: Vec<_> = first.results.iter().map(|a| a.id).collect();
        assert_eq!(ids, first_ids);
    }

    #[tokio::test]
    async fn test_created_desc_pages() {
        let f = setup().await;
        let actor = Actor::Scheduler(f.scheduler);
        for hour in 8..14 {
            f.appointments
                .create(actor, walk_in(tomorrow(), t(hour, 0)))
                .await
                .unwrap();
            f.clock.advance(Duration::seconds(1));
        }

        let first = f
            .appointments
            .list_page(AppointmentScope::All, AppointmentOrdering::CreatedDesc, None)
            .await
            .unwrap();
        assert_eq!(first.results[0].time, t(13, 0));
        assert_eq!(first.results.len(), 5);

        let next = Cursor::decode(first.next.as_deref().unwrap()).unwrap();
        let second = f
            .appointments
            .list_page(AppointmentScope::All, AppointmentOrdering::CreatedDesc, Some(&next))
            .await
            .unwrap();
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0].time, t(8, 0));
    }

    #[tokio::test]
    async fn test_bad_cursor_key_rejected() {
        let f = setup().await;
        let cursor = Cursor::new("not-a-time", 1, false);
        let err = f
            .appointments
            .list_page(AppointmentScope::All, AppointmentOrdering::TimeAsc, Some(&cursor))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
