//! Linking a platform user to a game-platform account.

mod dto;
pub mod handlers;
pub mod http;
pub mod linker;
pub mod lookup;

use crate::state::AppState;
use axum::Router;

pub use http::HttpIdentityLookup;
pub use linker::IdentityLinker;
pub use lookup::IdentityLookup;

pub fn router() -> Router<AppState> {
    handlers::identity_routes()
}
