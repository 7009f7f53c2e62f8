use crate::state::AppState;
use axum::Router;

pub mod delivery;
mod dto;
pub mod handlers;
pub mod jwt;
pub mod model;
pub mod password;
pub mod repo;
mod repo_types;
pub mod reset;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
