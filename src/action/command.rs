use crate::error::{DeckError, Result};
use tracing::{debug, warn};

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run a command via `/bin/sh -c`, capturing its output.
///
/// A non-zero exit is data in the returned output, not an error.
///
/// # Errors
/// Returns `DeckError::Spawn` only if the shell cannot be started.
pub async fn run(command: &str) -> Result<CommandOutput> {
    let output = tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(|source| DeckError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    };

    if result.success() {
        if !result.stdout.is_empty() {
            debug!("command output: {}", result.stdout.trim_end());
        }
    } else {
        warn!(
            "command failed (exit {:?}): {}",
            result.exit_code,
            result.stderr.trim_end()
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let output = run("echo hello").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim_end(), "hello");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let output = run("echo oops >&2; exit 3").await.unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim_end(), "oops");
    }

    #[tokio::test]
    async fn missing_binary_reported_by_shell() {
        // The shell itself spawns fine; the 127 comes back as data.
        let output = run("definitely-not-a-real-binary-xyz").await.unwrap();
        assert_eq!(output.exit_code, Some(127));
    }
}
