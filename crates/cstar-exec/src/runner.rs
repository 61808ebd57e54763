//! The command runner (§4.A): the sole subprocess surface for every higher
//! layer (git, scheduler queries, Lmod, compilation). Every call goes
//! through a shell, exactly like the original's `subprocess.run(cmd,
//! shell=True, ...)`.

use cstar_core::error::CStarError;
use cstar_core::{log_debug, log_error};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Options for [`run_cmd`]. `raise_on_error` defaults to `true`: a failing
/// command is fatal unless the caller opts out, matching the original's
/// default argument. `env_clear` backs the SLURM submission path's need to
/// scrub inherited `SLURM_*` variables (§4.F) without every call site
/// reaching for `std::process::Command` directly.
#[derive(Debug, Default, Clone)]
pub struct RunCmdOptions {
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub env_clear: bool,
    pub msg_pre: Option<String>,
    pub msg_post: Option<String>,
    pub msg_err: Option<String>,
    pub raise_on_error: bool,
}

impl RunCmdOptions {
    pub fn new() -> Self {
        RunCmdOptions {
            raise_on_error: true,
            ..Default::default()
        }
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn env_clear(mut self, clear: bool) -> Self {
        self.env_clear = clear;
        self
    }

    pub fn msg_pre(mut self, msg: impl Into<String>) -> Self {
        self.msg_pre = Some(msg.into());
        self
    }

    pub fn msg_post(mut self, msg: impl Into<String>) -> Self {
        self.msg_post = Some(msg.into());
        self
    }

    pub fn msg_err(mut self, msg: impl Into<String>) -> Self {
        self.msg_err = Some(msg.into());
        self
    }

    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }
}

/// Runs `cmd` through `/bin/sh -c`, capturing text stdout/stderr.
///
/// On success returns stripped stdout. On non-zero exit: if
/// `raise_on_error`, returns [`CStarError::Subprocess`]; otherwise logs at
/// error level (`msg_err` plus return code and stderr) and still returns
/// stripped stdout, matching the original's degrade-and-continue behaviour.
pub fn run_cmd(cmd: &str, opts: &RunCmdOptions) -> Result<String, CStarError> {
    if let Some(pre) = &opts.msg_pre {
        log_debug!("{}", pre);
    }
    log_debug!("[CMD] {}", cmd);

    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(cmd);
    if let Some(cwd) = &opts.cwd {
        command.current_dir(cwd);
    }
    if opts.env_clear {
        command.env_clear();
    }
    for (key, value) in &opts.env {
        command.env(key, value);
    }

    let output = command
        .output()
        .map_err(|source| CStarError::ProcessLaunchFailed {
            command: cmd.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        if let Some(post) = &opts.msg_post {
            log_debug!("{}", post);
        }
        return Ok(stdout);
    }

    let code = output.status.code();
    let err_context = opts.msg_err.as_deref().unwrap_or("Command failed");
    log_error!(
        "{} (exit code {:?}): {}\ncommand: {}",
        err_context,
        code,
        stderr,
        cmd
    );

    if opts.raise_on_error {
        Err(CStarError::Subprocess {
            command: cmd.to_string(),
            code,
            stderr,
        })
    } else {
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_on_success() {
        let out = run_cmd("echo hello", &RunCmdOptions::new()).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn raises_on_nonzero_exit_by_default() {
        let err = run_cmd("exit 7", &RunCmdOptions::new()).unwrap_err();
        match err {
            CStarError::Subprocess { code, .. } => assert_eq!(code, Some(7)),
            other => panic!("expected Subprocess error, got {other:?}"),
        }
    }

    #[test]
    fn returns_stdout_without_raising_when_disabled() {
        let opts = RunCmdOptions::new().raise_on_error(false);
        let out = run_cmd("echo partial; exit 1", &opts).unwrap();
        assert_eq!(out, "partial");
    }

    #[test]
    fn cwd_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RunCmdOptions::new().cwd(dir.path());
        let out = run_cmd("pwd", &opts).unwrap();
        assert_eq!(
            std::fs::canonicalize(&out).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn env_vars_are_applied() {
        let opts = RunCmdOptions::new().env("CSTAR_TEST_RUN_CMD_VAR", "xyz");
        let out = run_cmd("echo $CSTAR_TEST_RUN_CMD_VAR", &opts).unwrap();
        assert_eq!(out, "xyz");
    }

    #[test]
    fn env_clear_scrubs_inherited_variables() {
        std::env::set_var("CSTAR_TEST_INHERITED", "should-not-appear");
        let opts = RunCmdOptions::new()
            .env_clear(true)
            .env("PATH", std::env::var("PATH").unwrap_or_default());
        let out = run_cmd("echo ${CSTAR_TEST_INHERITED:-gone}", &opts).unwrap();
        assert_eq!(out, "gone");
        std::env::remove_var("CSTAR_TEST_INHERITED");
    }
}
