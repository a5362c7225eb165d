use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod session;

pub use dto::CurrentUser;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
