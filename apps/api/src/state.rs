use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::assessment::pipeline::Pipeline;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
/// Holds collaborators only; every request builds its own pipeline state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    /// Cancelled on shutdown. Each request runs under a child token.
    pub shutdown: CancellationToken,
}
