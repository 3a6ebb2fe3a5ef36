//! Credit accrual and withdrawal eligibility.

mod dto;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod policy;

use crate::state::AppState;
use axum::Router;

pub use engine::CreditEngine;
pub use error::RewardsError;
pub use locks::UserLocks;
pub use policy::{humanize_wait, Cooldown};

pub fn router() -> Router<AppState> {
    handlers::reward_routes()
}
