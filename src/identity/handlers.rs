use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use super::dto::{LinkRequest, LinkResponse};
use super::linker::LinkError;
use crate::{auth::AuthUser, state::AppState};

pub fn identity_routes() -> Router<AppState> {
    Router::new().route("/identity/link", post(link_identity))
}

#[instrument(skip(state, payload))]
pub async fn link_identity(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<LinkRequest>,
) -> Result<Json<LinkResponse>, LinkError> {
    let account = state.linker.link_identity(user_id, &payload.username).await?;
    let identity = account
        .identity
        .ok_or_else(|| LinkError::StorageUnavailable("identity missing after link".into()))?;
    Ok(Json(LinkResponse {
        identity,
        credits: account.credits,
    }))
}
