//! Interactive confirmation (§9 design note, §4.L), supplementing the
//! original's `input()` while-loop in
//! `original_source/cstar/base/external_codebase.py::handle_config_status`
//! with an injectable trait, per SPEC_FULL §11.

use std::io::{self, BufRead, Write};

/// What the user (or an injected test double) answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Yes,
    No,
    /// A free-form answer, used by the status-3 "custom install directory"
    /// branch of `handle_config_status`.
    Custom(String),
}

/// Factors the interactive I/O edge behind an interface so tests and
/// non-interactive runs (`CSTAR_INTERACTIVE=0`) can inject a fixed response
/// instead of blocking on stdin.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> io::Result<PromptOutcome>;
}

/// Prompts on stdin, looping on unrecognised input exactly like the
/// original's `while True` loop, until it sees `y`, `n`, or (when
/// `accept_custom` is set) anything else, which is returned verbatim as
/// [`PromptOutcome::Custom`].
pub struct StdinConfirm {
    pub accept_custom: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> io::Result<PromptOutcome> {
        let stdin = io::stdin();
        loop {
            print!("{prompt}");
            io::stdout().flush()?;
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            let trimmed = line.trim();
            match trimmed.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(PromptOutcome::Yes),
                "n" | "no" => return Ok(PromptOutcome::No),
                _ if self.accept_custom && !trimmed.is_empty() => {
                    return Ok(PromptOutcome::Custom(trimmed.to_string()))
                }
                _ => continue,
            }
        }
    }
}

/// A fixed-answer double for tests and `CSTAR_INTERACTIVE=0` auto-accept.
pub struct FixedConfirm(pub PromptOutcome);

impl Confirm for FixedConfirm {
    fn confirm(&self, _prompt: &str) -> io::Result<PromptOutcome> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_confirm_returns_injected_outcome() {
        let confirm = FixedConfirm(PromptOutcome::Custom("/opt/roms".to_string()));
        assert_eq!(
            confirm.confirm("install where? ").unwrap(),
            PromptOutcome::Custom("/opt/roms".to_string())
        );
    }
}
