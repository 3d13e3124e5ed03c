//! External process execution for builds
//!
//! Package managers, VCS calls and user hooks all run through here so that
//! their exit codes and output are captured the same way.

use crate::error::{PlatformError, PlatformResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Extra environment variables passed to every command of one app build
pub type BuildEnv = BTreeMap<String, String>;

/// Exit code and captured output of a finished process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code (-1 when terminated by a signal)
    pub code: i32,
    /// Captured stdout followed by stderr
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run a program with arguments in `dir`, capturing its output
pub fn run(program: &str, args: &[&str], dir: &Path, env: &BuildEnv) -> PlatformResult<ProcessOutput> {
    let command = display_command(program, args);
    debug!("Executing in {}: {}", dir.display(), command);

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| PlatformError::command_failed(command.clone(), e))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    for line in combined.lines() {
        debug!("  {}", line);
    }

    Ok(ProcessOutput {
        code: output.status.code().unwrap_or(-1),
        output: combined,
    })
}

/// Run a shell script (one command per line) in `dir`
pub fn run_script(script: &str, dir: &Path, env: &BuildEnv) -> PlatformResult<ProcessOutput> {
    run("sh", &["-e", "-c", script], dir, env)
}

/// Run a program and return its trimmed stdout, or None on failure
pub fn capture(program: &str, args: &[&str], dir: &Path) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Check whether a command is available on PATH
pub fn command_exists(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn run_captures_output_and_code() {
        let dir = TempDir::new().unwrap();
        let out = run_script("echo hello; echo oops >&2; exit 3", dir.path(), &BuildEnv::new()).unwrap();
        assert_eq!(out.code, 3);
        assert!(!out.success());
        assert!(out.output.contains("hello"));
        assert!(out.output.contains("oops"));
    }

    #[test]
    fn run_script_uses_dir_and_env() {
        let dir = TempDir::new().unwrap();
        let mut env = BuildEnv::new();
        env.insert("GREETING".to_string(), "hi".to_string());
        let out = run_script("echo \"$GREETING\" > greeting.txt", dir.path(), &env).unwrap();
        assert!(out.success());
        let written = std::fs::read_to_string(dir.path().join("greeting.txt")).unwrap();
        assert_eq!(written.trim(), "hi");
    }

    #[test]
    fn script_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let out = run_script("false\ntouch after", dir.path(), &BuildEnv::new()).unwrap();
        assert!(!out.success());
        assert!(!dir.path().join("after").exists());
    }

    #[test]
    fn missing_program_is_command_failed() {
        let dir = TempDir::new().unwrap();
        let err = run("definitely-not-a-real-binary-xyz", &[], dir.path(), &BuildEnv::new())
            .unwrap_err();
        assert!(matches!(err, PlatformError::CommandFailed { .. }));
        assert!(!command_exists("definitely-not-a-real-binary-xyz"));
    }

    #[test]
    fn capture_trims_stdout() {
        let dir = TempDir::new().unwrap();
        assert_eq!(capture("echo", &["abc"], dir.path()).as_deref(), Some("abc"));
        assert_eq!(capture("false", &[], dir.path()), None);
    }
}
