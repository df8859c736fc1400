/// Booker panel endpoints
use crate::{
    account::BookerPatch,
    auth::BookerContext,
    context::AppContext,
    db::models::{BookerProfile, SchedulerProfile},
    error::{AppError, AppResult},
    rate_limit::ThrottleScope,
    roster::AddSchedulerRequest,
    scheduling::{Actor, AppointmentPatch, AppointmentView, NewAppointment},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

/// Build booker panel routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/booker/profile/", get(get_profile).put(update_profile))
        .route(
            "/api/booker/my-appointment/",
            get(my_appointment).put(update_my_appointment),
        )
        .route("/api/booker/reserve-appointment/", post(reserve_appointment))
        .route("/api/booker/past-appointments/", get(past_appointments))
        .route("/api/booker/add-scheduler/", post(add_scheduler))
        .route("/api/booker/list-schedulers/", get(list_schedulers))
}

/// Fields a booker may change on its own appointment
#[derive(Debug, Deserialize)]
struct MyAppointmentPatch {
    #[serde(default)]
    date: Option<chrono::NaiveDate>,
    #[serde(
        default,
        deserialize_with = "crate::scheduling::rules::time_format::deserialize_option"
    )]
    time: Option<chrono::NaiveTime>,
    #[serde(default, deserialize_with = "crate::scheduling::rules::deserialize_some")]
    note: Option<Option<String>>,
}

async fn get_profile(auth: BookerContext) -> Json<BookerProfile> {
    Json(auth.booker)
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: BookerContext,
    Json(patch): Json<BookerPatch>,
) -> AppResult<Json<BookerProfile>> {
    let profile = ctx.profile_manager.update_booker(auth.booker.id, patch).await?;
    Ok(Json(profile))
}

async fn my_appointment(
    State(ctx): State<AppContext>,
    auth: BookerContext,
) -> AppResult<Json<AppointmentView>> {
    ctx.appointment_manager
        .upcoming_for_booker(auth.booker.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("You do not have any active appointment.".to_string()))
}

async fn update_my_appointment(
    State(ctx): State<AppContext>,
    auth: BookerContext,
    Json(patch): Json<MyAppointmentPatch>,
) -> AppResult<Json<AppointmentView>> {
    let current = ctx
        .appointment_manager
        .upcoming_for_booker(auth.booker.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No appointment found to update.".to_string()))?;

    let view = ctx
        .appointment_manager
        .update(
            Actor::Booker(auth.booker.id),
            current.id,
            AppointmentPatch {
                date: patch.date,
                time: patch.time,
                note: patch.note,
                ..Default::default()
            },
        )
        .await?;
    Ok(Json(view))
}

async fn reserve_appointment(
    State(ctx): State<AppContext>,
    auth: BookerContext,
    Json(new): Json<NewAppointment>,
) -> AppResult<(StatusCode, Json<AppointmentView>)> {
    ctx.rate_limiter
        .check_scope(ThrottleScope::ReserveAppointment, auth.account_id)?;

    let view = ctx
        .appointment_manager
        .create(Actor::Booker(auth.booker.id), new)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn past_appointments(
    State(ctx): State<AppContext>,
    auth: BookerContext,
) -> AppResult<Json<Vec<AppointmentView>>> {
    Ok(Json(
        ctx.appointment_manager.past_for_booker(auth.booker.id).await?,
    ))
}

async fn add_scheduler(
    State(ctx): State<AppContext>,
    auth: BookerContext,
    Json(req): Json<AddSchedulerRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    req.validate()?;

    let scheduler = ctx
        .roster_manager
        .add_to_roster(auth.booker.id, &req.scheduler_code)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "detail": format!("Scheduler {} has been added to your list.", scheduler.name)
        })),
    ))
}

async fn list_schedulers(
    State(ctx): State<AppContext>,
    auth: BookerContext,
) -> AppResult<Json<Vec<SchedulerProfile>>> {
    Ok(Json(ctx.roster_manager.list_roster(auth.booker.id).await?))
}
