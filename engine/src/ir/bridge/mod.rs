use crate::error::AnalysisResult;
use crate::ir::adapter;
use crate::ir::bridge::program::Program;

pub mod cfg;
pub mod program;

/// Entrypoint of the conversion
pub fn convert(program: &adapter::program::Program) -> AnalysisResult<Program> {
    Program::convert(program)
}
