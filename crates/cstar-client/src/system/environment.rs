//! `.env` layering and Lmod reproduction (§4.D "Environment loading",
//! "Lmod reproduction"), grounded in
//! `original_source/cstar/system/environment.py`.

use crate::error::Result;
use cstar_core::error::CStarError;
use cstar_core::log_debug;
use cstar_exec::{run_cmd, RunCmdOptions};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The compiled-in root of this crate, standing in for the original's
/// `importlib`-located package root: both resolve to "the directory the
/// bundled `additional_files/` assets live under."
fn package_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn user_env_path() -> PathBuf {
    cstar_core::paths::user_env_file()
}

fn system_env_path(system_name: &str) -> PathBuf {
    package_root()
        .join("additional_files/env_files")
        .join(format!("{system_name}.env"))
}

fn lmod_path(system_name: &str) -> PathBuf {
    package_root()
        .join("additional_files/lmod_lists")
        .join(format!("{system_name}.lmod"))
}

/// A fully constructed environment for one host: merged `.env` values plus
/// the MPI/compiler defaults the registry assigned this system (§4.D).
#[derive(Debug, Clone)]
pub struct CStarEnvironment {
    system_name: String,
    mpi_exec_prefix: String,
    compiler: String,
    env_vars: BTreeMap<String, String>,
}

impl CStarEnvironment {
    pub fn new(system_name: impl Into<String>, mpi_exec_prefix: impl Into<String>, compiler: impl Into<String>) -> Result<Self> {
        let system_name = system_name.into();
        let env_vars = load_env(&system_name)?;

        let env = CStarEnvironment {
            system_name,
            mpi_exec_prefix: mpi_exec_prefix.into(),
            compiler: compiler.into(),
            env_vars,
        };

        if env.uses_lmod() {
            env.load_lmod_modules()?;
        }

        Ok(env)
    }

    pub fn mpi_exec_prefix(&self) -> &str {
        &self.mpi_exec_prefix
    }

    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    pub fn environment_variables(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    pub fn system_env_path(&self) -> PathBuf {
        system_env_path(&self.system_name)
    }

    pub fn user_env_path(&self) -> PathBuf {
        user_env_path()
    }

    pub fn lmod_path(&self) -> PathBuf {
        lmod_path(&self.system_name)
    }

    /// §4.D: Linux plus `LMOD_CMD` present.
    pub fn uses_lmod(&self) -> bool {
        cfg!(target_os = "linux") && std::env::var_os("LMOD_CMD").is_some()
    }

    /// `set_env_var` (§4.D): persists to the user `.env` file, then re-loads
    /// the merged snapshot (system values still apply; the new value wins
    /// since user values override system ones).
    pub fn set_env_var(&mut self, key: &str, value: &str) -> Result<()> {
        write_user_env_var(key, value)?;
        self.env_vars = load_env(&self.system_name)?;
        Ok(())
    }

    fn call_lmod(&self, args: &str) -> Result<()> {
        let lmod_cmd = std::env::var("LMOD_CMD").map_err(|_| {
            CStarError::Configuration(
                "LMOD_CMD is not set; cannot drive Linux Environment Modules.".to_string(),
            )
        })?;
        let cmd = format!("{lmod_cmd} python {args}");
        let stdout = run_cmd(
            &cmd,
            &RunCmdOptions::new().msg_err(format!("Linux Environment Modules command `{cmd}` failed")),
        )?;
        replay_lmod_statements(&stdout);
        Ok(())
    }

    /// §4.D "Lmod reproduction": `module reset` then `module load <mod>` for
    /// each non-blank line of this system's `.lmod` file.
    fn load_lmod_modules(&self) -> Result<()> {
        self.call_lmod("reset")?;

        let contents = fs_err::read_to_string(self.lmod_path())
            .map_err(|source| CStarError::PathIo { path: self.lmod_path(), source })?;

        for module in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.call_lmod(&format!("load {module}"))?;
        }
        Ok(())
    }
}

impl std::fmt::Display for CStarEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CStarEnvironment")?;
        writeln!(f, "Compiler: {}", self.compiler)?;
        writeln!(f, "MPI Exec Prefix: {}", self.mpi_exec_prefix)?;
        writeln!(f, "Uses Lmod: {}", self.uses_lmod())?;
        writeln!(f, "Environment Variables:")?;
        for (key, value) in &self.env_vars {
            writeln!(f, "    {key}: {value}")?;
        }
        Ok(())
    }
}

fn parse_dotenv(path: &Path) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let Ok(iter) = dotenvy::from_path_iter(path) else {
        return map;
    };
    for item in iter.flatten() {
        map.insert(item.0, item.1);
    }
    map
}

/// §4.D "Environment loading": system file then user file, user wins;
/// reflected into the live process environment as a side effect, matching
/// the original's `os.environ.update(env_vars)`.
fn load_env(system_name: &str) -> Result<BTreeMap<String, String>> {
    let mut merged = parse_dotenv(&system_env_path(system_name));
    merged.extend(parse_dotenv(&user_env_path()));

    for (key, value) in &merged {
        std::env::set_var(key, value);
    }

    Ok(merged)
}

pub(crate) fn write_user_env_var(key: &str, value: &str) -> Result<()> {
    let path = user_env_path();
    let mut lines: Vec<String> = if path.exists() {
        fs_err::read_to_string(&path)
            .map_err(|source| CStarError::PathIo { path: path.clone(), source })?
            .lines()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let prefix = format!("{key}=");
    let new_line = format!("{key}={value}");
    if let Some(existing) = lines.iter_mut().find(|l| l.starts_with(&prefix)) {
        *existing = new_line;
    } else {
        lines.push(new_line);
    }

    fs_err::write(&path, lines.join("\n") + "\n")
        .map_err(|source| CStarError::PathIo { path, source })?;
    Ok(())
}

/// Lmod's `python` mode emits statements like `os.environ['KEY'] = 'value'`
/// and `del os.environ['KEY']`; rather than `exec`-ing them (§4.D note: "in
/// a typed re-implementation, by parsing the output as a series of
/// export/unset statements"), parse and replay just those two shapes.
fn replay_lmod_statements(stdout: &str) {
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("os.environ['").or_else(|| line.strip_prefix("os.environ[\"")) {
            if let Some((key, remainder)) = rest.split_once(['\'', '"']) {
                let remainder = remainder.trim_start();
                if let Some(value_part) = remainder.strip_prefix("] = ") {
                    let value = value_part.trim().trim_matches(['\'', '"']);
                    std::env::set_var(key, value);
                    continue;
                }
            }
        }
        if let Some(rest) = line
            .strip_prefix("del os.environ['")
            .or_else(|| line.strip_prefix("del os.environ[\""))
        {
            if let Some((key, _)) = rest.split_once(['\'', '"']) {
                std::env::remove_var(key);
                continue;
            }
        }
        log_debug!("Ignoring unrecognised Lmod python-mode line: {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_assignment_statements() {
        replay_lmod_statements("os.environ['CSTAR_TEST_LMOD_VAR'] = 'loaded'");
        assert_eq!(std::env::var("CSTAR_TEST_LMOD_VAR").unwrap(), "loaded");
        std::env::remove_var("CSTAR_TEST_LMOD_VAR");
    }

    #[test]
    fn replays_deletion_statements() {
        std::env::set_var("CSTAR_TEST_LMOD_DEL", "present");
        replay_lmod_statements("del os.environ['CSTAR_TEST_LMOD_DEL']");
        assert!(std::env::var("CSTAR_TEST_LMOD_DEL").is_err());
    }

    #[test]
    fn system_env_path_points_at_bundled_asset_tree() {
        let path = system_env_path("perlmutter");
        assert!(path.ends_with("additional_files/env_files/perlmutter.env"));
    }

    #[test]
    fn loading_perlmutter_env_populates_known_keys() {
        let vars = load_env("perlmutter").unwrap();
        assert!(vars.contains_key("MARBL_ROOT"));
    }
}
