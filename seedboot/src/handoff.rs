//! Replace this process with the long-running server.

use anyhow::{anyhow, Result};
use std::process::Command;

/// Exec `argv` with `envs` added to the environment. `shown` is what gets
/// logged in place of `argv`. On unix this only returns if the exec itself
/// failed.
pub fn exec_server(argv: &[String], shown: &[String], envs: &[(&str, String)]) -> Result<()> {
    let (program, args) = argv.split_first().ok_or_else(|| anyhow!("empty server command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    for (k, v) in envs {
        cmd.env(k, v);
    }
    tracing::info!(command = %shown.join(" "), "handing off to server");
    replace_process(cmd, program)
}

#[cfg(unix)]
fn replace_process(mut cmd: Command, program: &str) -> Result<()> {
    use std::os::unix::process::CommandExt;
    let err = cmd.exec();
    Err(anyhow::Error::new(err).context(format!("failed to exec {program}")))
}

#[cfg(not(unix))]
fn replace_process(mut cmd: Command, program: &str) -> Result<()> {
    use anyhow::Context;
    let status = cmd.status().with_context(|| format!("failed to spawn {program}"))?;
    std::process::exit(status.code().unwrap_or(1));
}
