//! Read-only view over the withdrawal ledger.

pub mod export;
pub mod handlers;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use time::UtcOffset;
use tracing::{error, instrument};

use crate::rewards::error::ErrorBody;
use crate::state::AppState;
use crate::store::{RewardStore, SortOrder, StoreError, WithdrawalRequest};

pub use export::export_as_delimited_text;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("export failed: {0}")]
    Export(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::StorageUnavailable(e.to_string())
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            LedgerError::StorageUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
            }
            LedgerError::Export(_) => (StatusCode::INTERNAL_SERVER_ERROR, "export_failed"),
        };
        (
            status,
            Json(ErrorBody {
                code,
                message: "An error occurred. Please try again.".into(),
            }),
        )
            .into_response()
    }
}

#[derive(Clone)]
pub struct WithdrawalLedger {
    store: Arc<dyn RewardStore>,
    export_offset: UtcOffset,
}

impl WithdrawalLedger {
    pub fn new(store: Arc<dyn RewardStore>, export_offset: UtcOffset) -> Self {
        Self {
            store,
            export_offset,
        }
    }

    /// Full current ledger; each call re-reads the store.
    #[instrument(skip(self))]
    pub async fn list_withdrawals(
        &self,
        order: SortOrder,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        self.store.list_withdrawals(order).await.map_err(|e| {
            error!(error = %e, "listing withdrawals failed");
            LedgerError::from(e)
        })
    }

    #[instrument(skip(self))]
    pub async fn export(&self) -> Result<String, LedgerError> {
        let records = self.list_withdrawals(SortOrder::Desc).await?;
        export_as_delimited_text(&records, self.export_offset)
    }
}

pub fn router() -> axum::Router<AppState> {
    handlers::ledger_routes()
}
