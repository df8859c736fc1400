/// Authentication extractors and role gates
///
/// Every role-scoped handler takes one of the extractors below. A gate
/// rejects with `Forbidden` before the handler looks at any resource, so an
/// unauthorized caller learns nothing about resource state.
use crate::{
    account::{Claims, ValidatedSession},
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::models::{BookerProfile, Role, SchedulerProfile},
    error::{AppError, AppResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// True iff the account's role profile is tagged Scheduler
pub fn is_scheduler(session: &ValidatedSession) -> bool {
    session.role_tag() == Some(Role::Scheduler)
}

/// True iff the account's role profile is tagged Booker
pub fn is_booker(session: &ValidatedSession) -> bool {
    session.role_tag() == Some(Role::Booker)
}

/// True iff the account is flagged as a system administrator
pub fn is_admin(session: &ValidatedSession) -> bool {
    session.is_admin
}

fn require(allowed: bool, what: &str) -> AppResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("{} role required", what)))
    }
}

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: i64,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let session = state.account_manager.validate_access_token(&token).await?;

        Ok(AuthContext {
            account_id: session.account_id,
            session,
        })
    }
}

/// Admin authentication context - requires the administrator flag
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub account_id: i64,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        if !is_admin(&auth.session) {
            tracing::warn!(account_id = auth.account_id, "admin gate rejected");
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }

        Ok(AdminContext {
            account_id: auth.account_id,
        })
    }
}

/// Scheduler context - requires the Scheduler role and resolves its profile
#[derive(Debug, Clone)]
pub struct SchedulerContext {
    pub account_id: i64,
    pub scheduler: SchedulerProfile,
}

#[async_trait]
impl FromRequestParts<AppContext> for SchedulerContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        require(is_scheduler(&auth.session), "Scheduler")?;

        let role_id = auth.session.role.as_ref().map(|r| r.id).unwrap_or_default();
        let scheduler = state
            .profile_manager
            .scheduler_for_owner(role_id)
            .await
            .map_err(profile_gone)?;

        Ok(SchedulerContext {
            account_id: auth.account_id,
            scheduler,
        })
    }
}

/// Booker context - requires the Booker role and resolves its profile
#[derive(Debug, Clone)]
pub struct BookerContext {
    pub account_id: i64,
    pub booker: BookerProfile,
}

#[async_trait]
impl FromRequestParts<AppContext> for BookerContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        require(is_booker(&auth.session), "Booker")?;

        let role_id = auth.session.role.as_ref().map(|r| r.id).unwrap_or_default();
        let booker = state
            .profile_manager
            .booker_for_owner(role_id)
            .await
            .map_err(profile_gone)?;

        Ok(BookerContext {
            account_id: auth.account_id,
            booker,
        })
    }
}

/// A role whose profile was removed by an admin no longer passes its gate
fn profile_gone(err: AppError) -> AppError {
    match err {
        AppError::NotFound(_) => AppError::Forbidden("Role profile no longer exists".to_string()),
        other => other,
    }
}

/// Verify a JWT token with full validation
///
/// This performs:
/// 1. JWT signature verification
/// 2. Expiration checking
/// 3. Claims decoding
pub fn verify_jwt_token(token: &str, jwt_secret: &str) -> AppResult<Claims> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew
    validation.leeway = 30;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("JWT verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Authentication("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::Authentication("Invalid token signature".to_string())
                }
                _ => AppError::Authentication(format!("Invalid token: {}", e)),
            }
        })
}
