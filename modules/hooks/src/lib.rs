//! External commands run during boot: schema migrations and one-shot jobs.
//! Their output is inherited so it lands in the deploy log.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hook {
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook `{0}` has an empty command")]
    EmptyCommand(String),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed: {status}")]
    Failed { program: String, status: ExitStatus },
}

impl Hook {
    pub fn new(name: impl Into<String>, command: &[&str]) -> Self {
        Hook {
            name: name.into(),
            command: command.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Run `hook` to completion. Returns the exit status on success.
pub fn run_hook(hook: &Hook) -> Result<ExitStatus, HookError> {
    let Some((program, args)) = hook.command.split_first() else {
        return Err(HookError::EmptyCommand(hook.name.clone()));
    };
    tracing::info!(hook = %hook.name, command = %hook.command.join(" "), "running hook");
    let started = Instant::now();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(&hook.env)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let status = cmd
        .status()
        .map_err(|source| HookError::Spawn { program: program.clone(), source })?;
    let duration_ms = started.elapsed().as_millis() as u64;
    if !status.success() {
        return Err(HookError::Failed { program: program.clone(), status });
    }
    tracing::info!(hook = %hook.name, duration_ms, "hook finished");
    Ok(status)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn successful_hook() {
        assert!(run_hook(&Hook::new("noop", &["true"])).unwrap().success());
    }

    #[test]
    fn failing_hook_reports_status() {
        let err = run_hook(&Hook::new("fail", &["sh", "-c", "exit 3"])).unwrap_err();
        let HookError::Failed { status, .. } = err else { panic!("expected Failed, got {err}") };
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn env_is_passed() {
        let hook = Hook::new("env", &["sh", "-c", "test \"$SEEDBOOT_PROBE\" = yes"])
            .with_env("SEEDBOOT_PROBE", "yes");
        assert!(run_hook(&hook).is_ok());
    }

    #[test]
    fn spawn_and_empty_errors() {
        assert!(matches!(
            run_hook(&Hook::new("ghost", &["definitely-not-a-real-binary-7f3a"])),
            Err(HookError::Spawn { .. })
        ));
        assert!(matches!(run_hook(&Hook::new("empty", &[])), Err(HookError::EmptyCommand(_))));
    }
}
