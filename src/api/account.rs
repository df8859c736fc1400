/// Account endpoints: role selection, phone registration, OTP login and sessions
use crate::{
    account::{
        self, LoginRequest, RefreshTokenRequest, RegisterBookerRequest,
        RegisterSchedulerRequest, RoleSelectionRequest, TokenPair, VerifyOtpRequest,
    },
    auth::AuthContext,
    context::AppContext,
    error::{AppError, AppResult},
    otp::OtpPurpose,
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use validator::Validate;

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/account/role/", post(select_role))
        .route("/api/account/register-phone/booker/", post(register_booker))
        .route("/api/account/register-phone/scheduler/", post(register_scheduler))
        .route("/api/account/verify/", post(verify_otp))
        .route("/api/account/login/", post(login))
        .route("/api/account/login/verify/", post(verify_otp))
        .route("/api/account/logout/", post(logout))
        .route("/api/account/token/refresh/", post(refresh_token))
}

fn otp_sent() -> Json<Value> {
    Json(json!({ "message": "OTP sent" }))
}

/// Echo a validated role choice
async fn select_role(Json(req): Json<RoleSelectionRequest>) -> AppResult<Json<Value>> {
    match req.role.as_str() {
        "booker" | "scheduler" => Ok(Json(json!({
            "message": "Role selected",
            "role": req.role,
        }))),
        _ => Err(AppError::field_error(
            "role",
            "Role must be either 'booker' or 'scheduler'.",
        )),
    }
}

async fn register_booker(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterBookerRequest>,
) -> AppResult<Json<Value>> {
    req.validate()?;

    ctx.account_manager
        .register_booker_with_code(&req.phone, &req.name, &req.family, &ctx.otp_manager)
        .await?;

    Ok(otp_sent())
}

async fn register_scheduler(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterSchedulerRequest>,
) -> AppResult<Json<Value>> {
    req.validate()?;

    ctx.account_manager
        .register_scheduler_with_code(
            &req.phone,
            &req.name,
            &req.family,
            &req.bio,
            &ctx.otp_manager,
        )
        .await?;

    Ok(otp_sent())
}

/// Exchange a valid (phone, code) pair for a token pair
///
/// Serves both post-registration verification and login verification.
async fn verify_otp(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyOtpRequest>,
) -> AppResult<Json<TokenPair>> {
    req.validate()?;

    let role = ctx.otp_manager.verify(&req.phone, &req.code).await?;
    let tokens = ctx.account_manager.create_session(role.account_id).await?;

    tracing::info!(account_id = role.account_id, role = role.role.as_str(), "phone verified");
    Ok(Json(tokens))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    req.validate()?;

    if account::role_profile_for_phone(&ctx.db, &req.phone)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    ctx.otp_manager.issue(&req.phone, OtpPurpose::Login).await?;
    Ok(otp_sent())
}

async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<RefreshTokenRequest>,
) -> AppResult<StatusCode> {
    let refresh = req
        .refresh
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::field_error("refresh", "Refresh token is required."))?;

    ctx.account_manager
        .revoke_refresh_token(auth.account_id, &refresh)
        .await?;

    Ok(StatusCode::RESET_CONTENT)
}

async fn refresh_token(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshTokenRequest>,
) -> AppResult<Json<TokenPair>> {
    let refresh = req
        .refresh
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::field_error("refresh", "Refresh token is required."))?;

    let tokens = ctx.account_manager.refresh_session(&refresh).await?;
    Ok(Json(tokens))
}
