//! Runs the `rpmdiff` program over two downloaded packages.

use std::path::Path;

use async_trait::async_trait;

use crate::plugin::{ComparisonProcedure, PluginError};
use crate::process::{run_program, ProcedureOutput};

/// rpmdiff exits 0 when the packages are identical and 1 when they differ.
/// Anything else is a failure.
const SUCCESS_CODES: [i32; 2] = [0, 1];

#[derive(Debug, Clone)]
pub struct RpmdiffProcedure {
    program: String,
}

impl RpmdiffProcedure {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ComparisonProcedure for RpmdiffProcedure {
    async fn compare(&self, left: &Path, right: &Path) -> Result<ProcedureOutput, PluginError> {
        let output = run_program(&self.program, [left.as_os_str(), right.as_os_str()])
            .await
            .map_err(|e| PluginError::Procedure {
                message: format!("failed to launch {}: {e}", self.program),
                output: None,
            })?;

        match output.exit_code {
            Some(code) if SUCCESS_CODES.contains(&code) => Ok(output),
            code => Err(PluginError::Procedure {
                message: match code {
                    Some(code) => format!("{} exited with status {code}", self.program),
                    None => format!("{} was terminated by a signal", self.program),
                },
                output: Some(output.combined_lossy()),
            }),
        }
    }
}
