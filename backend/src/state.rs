// src/state.rs

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::Config;

/// Shared state handed to every handler. Handlers pull out the piece they
/// need (`State<PgPool>`, `State<Config>`) through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
