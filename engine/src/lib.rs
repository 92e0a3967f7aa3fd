use std::path::Path;

pub use crate::analysis::pointsto::PointsToSummary;
pub use crate::error::{AnalysisError, AnalysisResult};

use crate::flow::Workflow;

pub mod analysis;
pub mod ir;
pub mod memory;

mod error;
mod flow;

/// Main entrypoint
pub fn analyze(input: &Path) -> AnalysisResult<PointsToSummary> {
    let flow = Workflow::new(input.to_path_buf());
    flow.execute()
}
