use std::sync::Arc;

use crate::flow::{FlowController, SourceRef};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<FlowController>,
    /// Source document every HTTP-triggered run revises.
    pub source_ref: SourceRef,
}
