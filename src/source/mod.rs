//! Per-source tile working set: reconciliation, render list and queries.

mod manager;
mod query;
pub mod render;
mod update;

pub use manager::SourceTileManager;
pub use render::{ClipId, ClipIdGenerator, RenderConsumer, RenderListBuilder, RenderTile, RenderTileRef};

use crate::core::config::StyleParameters;
use crate::core::transform::TransformState;
use crate::prelude::Arc;

/// Everything a tile update needs from the caller for one frame or interaction
#[derive(Debug, Clone, Default)]
pub struct UpdateParameters {
    pub transform: TransformState,
    pub style: Arc<StyleParameters>,
}

impl UpdateParameters {
    pub fn new(transform: TransformState) -> Self {
        Self {
            transform,
            style: Arc::new(StyleParameters::default()),
        }
    }

    pub fn with_style(mut self, style: StyleParameters) -> Self {
        self.style = Arc::new(style);
        self
    }
}
