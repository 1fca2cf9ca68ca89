//! Shell command execution for `RunCommand` actions.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use super::types::ActionError;

/// Run `command` through `/bin/sh -c` in `cwd` with exactly `env`.
///
/// The process environment is cleared first, so the command sees only the
/// variables passed in.
///
/// # Returns
///
/// The trimmed stdout of the command on success.
pub async fn execute_command(command: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<String, ActionError> {
  info!(cmd = %command, cwd = ?cwd, "executing command");

  let output = Command::new("/bin/sh")
    .arg("-c")
    .arg(command)
    .current_dir(cwd)
    .env_clear()
    .envs(env)
    .output()
    .await
    .map_err(|e| ActionError::io(cwd, e))?;

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command stdout");
  }
  if !stderr.is_empty() {
    debug!(stderr = %stderr, "command stderr");
  }

  if !output.status.success() {
    return Err(ActionError::CommandFailed {
      command: command.to_string(),
      exit_code: output.status.code(),
      stderr,
    });
  }

  Ok(stdout)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[tokio::test]
  async fn execute_simple_command() {
    let temp_dir = TempDir::new().unwrap();

    let result = execute_command("echo hello", &env(&[]), temp_dir.path()).await.unwrap();

    assert_eq!(result, "hello");
  }

  #[tokio::test]
  async fn environment_is_exactly_what_was_passed() {
    let temp_dir = TempDir::new().unwrap();

    let result = execute_command(
      "echo \"$MY_VAR:${HOME:-unset}\"",
      &env(&[("MY_VAR", "my_value")]),
      temp_dir.path(),
    )
    .await
    .unwrap();

    assert_eq!(result, "my_value:unset");
  }

  #[tokio::test]
  async fn runs_in_working_directory() {
    let temp_dir = TempDir::new().unwrap();

    execute_command("echo marker > cwd_marker", &env(&[]), temp_dir.path())
      .await
      .unwrap();

    assert!(temp_dir.path().join("cwd_marker").exists());
  }

  #[tokio::test]
  async fn failure_carries_exit_code_and_stderr() {
    let temp_dir = TempDir::new().unwrap();

    let err = execute_command("echo oops >&2; exit 3", &env(&[]), temp_dir.path())
      .await
      .unwrap_err();

    assert_eq!(
      err,
      ActionError::CommandFailed {
        command: "echo oops >&2; exit 3".to_string(),
        exit_code: Some(3),
        stderr: "oops".to_string(),
      }
    );
  }

  #[tokio::test]
  async fn missing_working_directory_is_an_io_error() {
    let temp_dir = TempDir::new().unwrap();

    let err = execute_command("true", &env(&[]), &temp_dir.path().join("missing"))
      .await
      .unwrap_err();

    assert!(matches!(err, ActionError::Io { .. }));
  }

  #[tokio::test]
  async fn multiline_command() {
    let temp_dir = TempDir::new().unwrap();

    let cmd = r#"
      x=1
      y=2
      echo $((x + y))
    "#;

    assert_eq!(execute_command(cmd, &env(&[]), temp_dir.path()).await.unwrap(), "3");
  }
}
