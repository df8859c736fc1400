/// Scheduler panel endpoints
use crate::{
    account::SchedulerPatch,
    api::{summaries, ProfileSummary},
    auth::SchedulerContext,
    context::AppContext,
    db::models::SchedulerProfile,
    error::{AppError, AppResult},
    pagination::{Page, PageQuery},
    rate_limit::ThrottleScope,
    scheduling::{Actor, AppointmentOrdering, AppointmentScope, AppointmentView},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Build scheduler panel routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/scheduler/profile/", get(get_profile).put(update_profile))
        .route("/api/scheduler/bookers/", get(list_bookers))
        .route("/api/scheduler/appointments/", get(list_appointments))
        .route("/api/scheduler/manage-appointments/", post(manage_appointments))
        .route("/api/scheduler/dashboard/", get(dashboard))
}

/// Envelope for the single appointment-management endpoint
#[derive(Debug, Deserialize)]
struct ManageAppointmentRequest {
    action: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct Dashboard {
    profile: SchedulerProfile,
    bookers: Vec<ProfileSummary>,
    appointments: Vec<AppointmentView>,
}

async fn get_profile(auth: SchedulerContext) -> Json<SchedulerProfile> {
    Json(auth.scheduler)
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: SchedulerContext,
    Json(patch): Json<SchedulerPatch>,
) -> AppResult<Json<SchedulerProfile>> {
    let profile = ctx
        .profile_manager
        .update_scheduler(auth.scheduler.id, patch)
        .await?;
    Ok(Json(profile))
}

/// Bookers who added this scheduler to their roster
async fn list_bookers(
    State(ctx): State<AppContext>,
    auth: SchedulerContext,
) -> AppResult<Json<Vec<ProfileSummary>>> {
    let bookers = ctx
        .roster_manager
        .bookers_for_scheduler(auth.scheduler.id)
        .await?;
    Ok(Json(summaries(bookers)))
}

async fn list_appointments(
    State(ctx): State<AppContext>,
    auth: SchedulerContext,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<AppointmentView>>> {
    let cursor = query.cursor()?;
    let page = ctx
        .appointment_manager
        .list_page(
            AppointmentScope::Scheduler(auth.scheduler.id),
            AppointmentOrdering::TimeAsc,
            cursor.as_ref(),
        )
        .await?;
    Ok(Json(page))
}

fn parse_payload<T: DeserializeOwned>(payload: Map<String, Value>) -> AppResult<T> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|e| AppError::Validation(format!("Invalid appointment payload: {}", e)))
}

async fn manage_appointments(
    State(ctx): State<AppContext>,
    auth: SchedulerContext,
    Json(req): Json<ManageAppointmentRequest>,
) -> AppResult<Response> {
    let actor = Actor::Scheduler(auth.scheduler.id);
    let require_id =
        |id: Option<i64>| id.ok_or_else(|| AppError::field_error("id", "This field is required."));

    match req.action.as_deref() {
        Some("create") => {
            ctx.rate_limiter
                .check_scope(ThrottleScope::AppointmentCreate, auth.account_id)?;
            let view = ctx
                .appointment_manager
                .create(actor, parse_payload(req.payload)?)
                .await?;
            Ok((StatusCode::CREATED, Json(view)).into_response())
        }
        Some("update") => {
            let id = require_id(req.id)?;
            let view = ctx
                .appointment_manager
                .update(actor, id, parse_payload(req.payload)?)
                .await?;
            Ok(Json(view).into_response())
        }
        Some("delete") => {
            let id = require_id(req.id)?;
            ctx.appointment_manager.delete(actor, id).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        _ => Err(AppError::field_error(
            "action",
            "Invalid action type. Use 'create', 'update' or 'delete'.",
        )),
    }
}

async fn dashboard(
    State(ctx): State<AppContext>,
    auth: SchedulerContext,
) -> AppResult<Json<Dashboard>> {
    let scheduler_id = auth.scheduler.id;
    let bookers = ctx.roster_manager.bookers_for_scheduler(scheduler_id).await?;
    let appointments = ctx
        .appointment_manager
        .list_for_scheduler(scheduler_id)
        .await?;

    Ok(Json(Dashboard {
        profile: auth.scheduler,
        bookers: summaries(bookers),
        appointments,
    }))
}
