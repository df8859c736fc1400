/// Admin panel endpoints
use crate::{
    account::{BookerDetail, BookerPatch, SchedulerDetail, SchedulerPatch},
    api::{summaries, ProfileSummary},
    auth::AdminContext,
    context::AppContext,
    error::AppResult,
    pagination::{Page, PageQuery},
    rate_limit::ThrottleScope,
    scheduling::{
        Actor, AppointmentOrdering, AppointmentPatch, AppointmentScope, AppointmentView,
        NewAppointment,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/schedulers/", get(list_schedulers))
        .route(
            "/api/admin/:id/scheduler/",
            get(get_scheduler).put(update_scheduler).delete(delete_scheduler),
        )
        .route("/api/admin/bookers/", get(list_bookers))
        .route(
            "/api/admin/:id/booker/",
            get(get_booker).put(update_booker).delete(delete_booker),
        )
        .route("/api/admin/appointments/", get(list_appointments))
        .route(
            "/api/admin/:id/appointment/",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/api/admin/create-appointment/", post(create_appointment))
}

async fn list_schedulers(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
) -> AppResult<Json<Vec<ProfileSummary>>> {
    let schedulers = ctx.profile_manager.list_schedulers().await?;
    Ok(Json(summaries(schedulers)))
}

async fn get_scheduler(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<i64>,
) -> AppResult<Json<SchedulerDetail>> {
    Ok(Json(ctx.profile_manager.scheduler_detail(id).await?))
}

async fn update_scheduler(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<i64>,
    Json(patch): Json<SchedulerPatch>,
) -> AppResult<Json<SchedulerDetail>> {
    ctx.profile_manager.update_scheduler(id, patch).await?;
    Ok(Json(ctx.profile_manager.scheduler_detail(id).await?))
}

async fn delete_scheduler(
    State(ctx): State<AppContext>,
    admin: AdminContext,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ctx.profile_manager.delete_scheduler(id).await?;
    tracing::info!(admin = admin.account_id, scheduler_id = id, "admin deleted scheduler");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_bookers(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
) -> AppResult<Json<Vec<ProfileSummary>>> {
    let bookers = ctx.profile_manager.list_bookers().await?;
    Ok(Json(summaries(bookers)))
}

async fn get_booker(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<i64>,
) -> AppResult<Json<BookerDetail>> {
    Ok(Json(ctx.profile_manager.booker_detail(id).await?))
}

async fn update_booker(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<i64>,
    Json(patch): Json<BookerPatch>,
) -> AppResult<Json<BookerDetail>> {
    ctx.profile_manager.update_booker(id, patch).await?;
    Ok(Json(ctx.profile_manager.booker_detail(id).await?))
}

async fn delete_booker(
    State(ctx): State<AppContext>,
    admin: AdminContext,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ctx.profile_manager.delete_booker(id).await?;
    tracing::info!(admin = admin.account_id, booker_id = id, "admin deleted booker");
    Ok(StatusCode::NO_CONTENT)
}

/// All appointments, newest first
async fn list_appointments(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<AppointmentView>>> {
    let cursor = query.cursor()?;
    let page = ctx
        .appointment_manager
        .list_page(
            AppointmentScope::All,
            AppointmentOrdering::CreatedDesc,
            cursor.as_ref(),
        )
        .await?;
    Ok(Json(page))
}

async fn get_appointment(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<i64>,
) -> AppResult<Json<AppointmentView>> {
    Ok(Json(ctx.appointment_manager.get(Actor::Admin, id).await?))
}

async fn update_appointment(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<i64>,
    Json(patch): Json<AppointmentPatch>,
) -> AppResult<Json<AppointmentView>> {
    let view = ctx
        .appointment_manager
        .update(Actor::Admin, id, patch)
        .await?;
    Ok(Json(view))
}

async fn delete_appointment(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ctx.appointment_manager.delete(Actor::Admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_appointment(
    State(ctx): State<AppContext>,
    admin: AdminContext,
    Json(new): Json<NewAppointment>,
) -> AppResult<(StatusCode, Json<AppointmentView>)> {
    ctx.rate_limiter
        .check_scope(ThrottleScope::AppointmentCreate, admin.account_id)?;

    let view = ctx.appointment_manager.create(Actor::Admin, new).await?;
    Ok((StatusCode::CREATED, Json(view)))
}
