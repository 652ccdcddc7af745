//! API shared state

use crate::pipeline::Pipeline;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Running pipeline, queried for cached state and used to attach
    /// websocket connections to the gateway
    pub pipeline: Pipeline,
}

impl ApiState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}
