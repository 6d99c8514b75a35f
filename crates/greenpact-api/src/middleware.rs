use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::debug;

use greenpact_gateway::SessionUser;
use greenpact_gateway::auth::decode_token;
use greenpact_types::api::TokenKind;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Extract and validate the bearer access token, then load the account it
/// names. Requests without a usable token never reach the store.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> ApiResult<Response> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?;

    let claims = decode_token(&state.config.jwt_secret, bearer.token(), TokenKind::Access)
        .ok_or_else(|| ApiError::unauthorized("Given token not valid for any token type"))?;

    let user_id = claims.sub;
    let user = state
        .store(move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(|| {
            debug!("token for removed user {}", user_id);
            ApiError::unauthorized("User not found")
        })?;

    req.extensions_mut().insert(SessionUser {
        id: user.id,
        username: user.username,
        role: user.role,
    });
    Ok(next.run(req).await)
}

pub fn require_farmer(user: &SessionUser) -> ApiResult<()> {
    if user.role.is_farmer() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only farmers can perform this action"))
    }
}

pub fn require_contractor(user: &SessionUser) -> ApiResult<()> {
    if user.role.is_contractor() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only contractors can perform this action"))
    }
}

pub fn require_admin(user: &SessionUser) -> ApiResult<()> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("You do not have permission to perform this action."))
    }
}
