//! External-codebase lifecycle (§4.L), grounded in
//! `original_source/cstar/base/external_codebase.py`.
//!
//! The original is an ABC (`ExternalCodeBase`) with three abstract hooks
//! (`_default_source_repo`, `_default_checkout_target`, `expected_env_var`)
//! plus a `configure`/`_configure` pair for the post-install build step. That
//! becomes a trait here: the lifecycle logic (status computation, prompt
//! dispatch, install) is a set of default methods, and only the
//! codebase-specific facts are left abstract.

use super::confirm::{Confirm, PromptOutcome};
use super::source::Source;
use super::stager;
use super::staged::StagedHandle;
use crate::error::{ClientError, Result};
use crate::git;
use crate::system::environment::write_user_env_var;
use cstar_core::error::CStarError;
use cstar_core::{log_info, log_warn};
use cstar_exec::{run_cmd, RunCmdOptions};
use std::path::{Path, PathBuf};

/// §4.L "compute a local config status ∈ {0, 1, 2, 3}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalConfigStatus {
    Configured = 0,
    RemoteMismatch = 1,
    NeedsCheckout = 2,
    NotInstalled = 3,
}

fn normalize_repo(url: &str) -> &str {
    url.trim_end_matches('/').trim_end_matches(".git")
}

/// A third-party source tree C-Star clones, checks out, and compiles once
/// per installation (ROMS, MARBL, …). Implementors supply the fixed facts
/// (env var, default repo/target, how to build); the lifecycle itself
/// (§4.L) is provided.
pub trait ExternalCodeBase {
    /// The environment variable whose presence/value drives `local_config_status`
    /// (`ROMS_ROOT`, `MARBL_ROOT`, …).
    fn expected_env_var(&self) -> &str;

    fn source_repo(&self) -> &str;

    fn checkout_target(&self) -> &str;

    /// The resolved commit hash `checkout_target` points to, computed once
    /// at construction via [`git::get_hash_from_checkout_target`].
    fn checkout_hash(&self) -> &str;

    /// Directory name used under `externals/` when no explicit install
    /// directory is given (`"roms"`, `"marbl"`, …).
    fn externals_dir_name(&self) -> &str;

    /// The post-clone build step, if any. Returning `None` (the default)
    /// means this codebase needs no compile step.
    fn build_command(&self, _root: &Path) -> Option<String> {
        None
    }

    fn is_configured(&self) -> bool {
        self.local_config_status() == LocalConfigStatus::Configured
    }

    /// The on-disk root, if the expected env var is currently set, matching
    /// the original's `working_copy` property.
    fn working_copy(&self) -> Option<PathBuf> {
        std::env::var(self.expected_env_var()).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    /// §4.L status computation: env var presence, then remote match, then
    /// HEAD match.
    fn local_config_status(&self) -> LocalConfigStatus {
        let Some(root) = self.working_copy() else {
            return LocalConfigStatus::NotInstalled;
        };

        let Ok(remote) = git::get_repo_remote(&root) else {
            return LocalConfigStatus::RemoteMismatch;
        };
        if normalize_repo(&remote) != normalize_repo(self.source_repo()) {
            return LocalConfigStatus::RemoteMismatch;
        }

        match git::get_repo_head_hash(&root) {
            Ok(head) if head == self.checkout_hash() => LocalConfigStatus::Configured,
            Ok(_) => LocalConfigStatus::NeedsCheckout,
            Err(_) => LocalConfigStatus::RemoteMismatch,
        }
    }

    /// §4.L dispatch. `interactive` mirrors `CSTAR_INTERACTIVE`: when false,
    /// prompts auto-accept their default instead of asking `confirm`.
    fn handle_config_status(
        &self,
        confirm: &dyn Confirm,
        interactive: bool,
        default_install_dir: &Path,
    ) -> Result<()> {
        match self.local_config_status() {
            LocalConfigStatus::Configured => {
                log_info!("{} is already configured at the expected checkout.", self.expected_env_var());
                Ok(())
            }
            LocalConfigStatus::RemoteMismatch => {
                let actual = self
                    .working_copy()
                    .and_then(|p| git::get_repo_remote(&p).ok())
                    .unwrap_or_default();
                Err(ClientError::Core(CStarError::EnvironmentMismatch {
                    env_var: self.expected_env_var().to_string(),
                    expected_remote: self.source_repo().to_string(),
                    actual_remote: actual,
                }))
            }
            LocalConfigStatus::NeedsCheckout => {
                let outcome = if interactive {
                    confirm.confirm(&format!(
                        "{} points to the expected repository but not the expected checkout \
                         target ({}). Check it out now? [y/n] ",
                        self.expected_env_var(),
                        self.checkout_target()
                    ))?
                } else {
                    PromptOutcome::Yes
                };
                match outcome {
                    PromptOutcome::Yes => {
                        let root = self.working_copy().expect("status implies env var is set");
                        git::checkout(&root, self.checkout_target())?;
                        Ok(())
                    }
                    _ => Err(ClientError::Core(CStarError::InteractiveAbort(format!(
                        "user declined to check out {} in {}",
                        self.checkout_target(),
                        self.expected_env_var()
                    )))),
                }
            }
            LocalConfigStatus::NotInstalled => {
                let outcome = if interactive {
                    confirm.confirm(&format!(
                        "{} is not set. Install {} to '{}'? [y/n, or enter a custom path] ",
                        self.expected_env_var(),
                        self.externals_dir_name(),
                        default_install_dir.display()
                    ))?
                } else {
                    PromptOutcome::Yes
                };
                let target = match outcome {
                    PromptOutcome::Yes => default_install_dir.to_path_buf(),
                    PromptOutcome::Custom(path) => PathBuf::from(path),
                    PromptOutcome::No => {
                        return Err(ClientError::Core(CStarError::InteractiveAbort(format!(
                            "user declined to install {}",
                            self.expected_env_var()
                        ))))
                    }
                };
                self.get(&target)?;
                Ok(())
            }
        }
    }

    /// Clone + checkout + compile + `set_env_var` (§4.L). Fails if already
    /// staged, matching the original's "already staged" guard in `get`.
    fn get(&self, target_dir: &Path) -> Result<StagedHandle> {
        if self.working_copy().is_some() {
            return Err(ClientError::Core(CStarError::Validation(format!(
                "{} is already set; refusing to re-install over an existing checkout",
                self.expected_env_var()
            ))));
        }

        let source = Source::new(self.source_repo(), Some(self.checkout_hash().to_string()))?;
        let handle = stager::stage_cached_repository(&source, target_dir)?;

        if let Some(command) = self.build_command(target_dir) {
            run_cmd(
                &command,
                &RunCmdOptions::new()
                    .cwd(target_dir)
                    .msg_pre(format!("Building {}", self.externals_dir_name()))
                    .msg_err(format!("Failed to build {}", self.externals_dir_name())),
            )?;
        } else {
            log_warn!("{} defines no build command; skipping compile step.", self.externals_dir_name());
        }

        write_user_env_var(self.expected_env_var(), &target_dir.to_string_lossy())?;
        std::env::set_var(self.expected_env_var(), target_dir);

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubCodebase {
        env_var: String,
        repo: String,
        target: String,
        hash: String,
    }

    impl ExternalCodeBase for StubCodebase {
        fn expected_env_var(&self) -> &str {
            &self.env_var
        }
        fn source_repo(&self) -> &str {
            &self.repo
        }
        fn checkout_target(&self) -> &str {
            &self.target
        }
        fn checkout_hash(&self) -> &str {
            &self.hash
        }
        fn externals_dir_name(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn not_installed_when_env_var_absent() {
        std::env::remove_var("CSTAR_TEST_STUB_ROOT");
        let codebase = StubCodebase {
            env_var: "CSTAR_TEST_STUB_ROOT".to_string(),
            repo: "https://github.com/example/stub".to_string(),
            target: "main".to_string(),
            hash: "a".repeat(40),
        };
        assert_eq!(codebase.local_config_status(), LocalConfigStatus::NotInstalled);
        assert!(!codebase.is_configured());
    }

    #[test]
    fn repo_normalisation_ignores_trailing_git_and_slash() {
        assert_eq!(
            normalize_repo("https://github.com/foo/bar.git/"),
            normalize_repo("https://github.com/foo/bar")
        );
    }
}
