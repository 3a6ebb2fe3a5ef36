use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::LedgerError;
use crate::{
    auth::AdminUser,
    state::AppState,
    store::{SortOrder, WithdrawalRequest},
};

pub const EXPORT_FILENAME: &str = "withdrawals.csv";

pub fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/withdrawals", get(list_withdrawals))
        .route("/admin/withdrawals/export", get(export_withdrawals))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalList {
    pub items: Vec<WithdrawalRequest>,
    pub total: usize,
}

#[instrument(skip(state))]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<WithdrawalList>, LedgerError> {
    let items = state.ledger.list_withdrawals(query.order).await?;
    info!(%admin_id, total = items.len(), "ledger listed");
    Ok(Json(WithdrawalList {
        total: items.len(),
        items,
    }))
}

#[instrument(skip(state))]
pub async fn export_withdrawals(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
) -> Result<impl IntoResponse, LedgerError> {
    let body = state.ledger.export().await?;
    info!(%admin_id, bytes = body.len(), "ledger exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        body,
    ))
}
