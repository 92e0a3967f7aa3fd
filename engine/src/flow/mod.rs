use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::analysis::pointsto::{self, PointsToSummary};
use crate::error::{AnalysisError, AnalysisResult};
use crate::ir::{adapter, bridge};

/// End-to-end pipeline from a program description file to a points-to summary
pub struct Workflow {
    /// Program description in JSON
    input: PathBuf,
}

impl Workflow {
    pub fn new(input: PathBuf) -> Self {
        Self { input }
    }

    pub fn execute(&self) -> AnalysisResult<PointsToSummary> {
        // loading
        let program_adapted = self.deserialize()?;
        debug!("[0] program loaded");

        // conversion
        let program_bridge = bridge::convert(&program_adapted)?;
        debug!("[1] program converted");

        // analysis
        let summary = pointsto::execute_points_to(&program_bridge)?;
        debug!("[2] points-to fixpoint done");

        Ok(summary)
    }

    fn deserialize(&self) -> AnalysisResult<adapter::program::Program> {
        let content = fs::read_to_string(&self.input)
            .map_err(|e| AnalysisError::LoadingError(format!("corrupted program file: {}", e)))?;
        serde_json::from_str(&content).map_err(|e| {
            AnalysisError::LoadingError(format!("error during deserialization: {}", e))
        })
    }
}
