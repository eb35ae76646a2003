//! External program execution for plugins.
//!
//! Children are spawned with `kill_on_drop(true)`: when the caller's
//! timeout drops the future, the child is killed with it.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::process::Command;

/// Captured result of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcedureOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcedureOutput {
    /// stdout followed by stderr, lossily decoded, for diagnostics.
    pub fn combined_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `program` with `args` to completion, capturing its output.
///
/// Returns `Err` only if the program could not be started.
pub async fn run_program<I, S>(program: &str, args: I) -> Result<ProcedureOutput, std::io::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(ProcedureOutput {
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_keeps_both_streams() {
        let out = ProcedureOutput {
            exit_code: Some(2),
            stdout: b"partial".to_vec(),
            stderr: b"error: no such file\n".to_vec(),
        };
        assert_eq!(out.combined_lossy(), "partial\nerror: no such file\n");
        assert_eq!(out.stderr_lossy(), "error: no such file");
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let err = run_program("archdiffer-no-such-program", ["x"]).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
