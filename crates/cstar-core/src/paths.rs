//! XDG-rooted cache/config/data/state homes, keyed by the `CSTAR_*`
//! descriptors of §6, generalizing the teacher's `config.rs` XDG lookups
//! (which only ever resolved a config home) to all four base directories.

use crate::env::EnvVarDescriptor;
use std::path::PathBuf;

fn xdg_dirs() -> xdg::BaseDirectories {
    xdg::BaseDirectories::with_prefix("cstar")
}

fn cache_home_factory(_: &EnvVarDescriptor) -> String {
    xdg_dirs()
        .get_cache_home()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn config_home_factory(_: &EnvVarDescriptor) -> String {
    xdg_dirs()
        .get_config_home()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn state_home_factory(_: &EnvVarDescriptor) -> String {
    xdg_dirs()
        .get_state_home()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// HPC scratch fallback: first non-empty of `SCRATCH`, `SCRATCH_DIR`,
/// `LOCAL_SCRATCH`, falling back to the plain XDG data home. Putting this in
/// the default-factory slot (which outranks the `indirect` lookup) means a
/// scratch filesystem is preferred over a generic `XDG_DATA_HOME` on HPC
/// hosts, which is the whole point of naming it here.
fn data_home_factory(descriptor: &EnvVarDescriptor) -> String {
    for var in ["SCRATCH", "SCRATCH_DIR", "LOCAL_SCRATCH"] {
        if let Ok(v) = std::env::var(var) {
            if !v.is_empty() {
                return v;
            }
        }
    }
    let _ = descriptor;
    xdg_dirs()
        .get_data_home()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

pub static CSTAR_CACHE_HOME: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_CACHE_HOME",
    description: "Root directory for C-Star's transient cache (downloaded files, logs).",
    group: "paths",
    default: "",
    indirect: Some("XDG_CACHE_HOME"),
    default_factory: Some(cache_home_factory),
};

pub static CSTAR_CONFIG_HOME: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_CONFIG_HOME",
    description: "Root directory for C-Star's configuration files.",
    group: "paths",
    default: "",
    indirect: Some("XDG_CONFIG_HOME"),
    default_factory: Some(config_home_factory),
};

pub static CSTAR_DATA_HOME: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_DATA_HOME",
    description: "Root directory for C-Star's large input/output data, preferring HPC scratch.",
    group: "paths",
    default: "",
    indirect: Some("XDG_DATA_HOME"),
    default_factory: Some(data_home_factory),
};

pub static CSTAR_STATE_HOME: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_STATE_HOME",
    description: "Root directory for C-Star's persisted state, including the repository cache.",
    group: "paths",
    default: "",
    indirect: Some("XDG_STATE_HOME"),
    default_factory: Some(state_home_factory),
};

pub static CSTAR_SCRATCH_DIRS: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_SCRATCH_DIRS",
    description: "Colon-separated list of additional scratch directories a job may use.",
    group: "paths",
    default: "",
    indirect: None,
    default_factory: None,
};

pub static CSTAR_CLOBBER_WORKING_DIR: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_CLOBBER_WORKING_DIR",
    description: "If \"1\", permit overwriting a non-empty job working directory.",
    group: "execution",
    default: "0",
    indirect: None,
    default_factory: None,
};

pub static CSTAR_FRESH_CODEBASES: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_FRESH_CODEBASES",
    description: "If \"1\", force a re-clone of external codebases rather than reusing installs.",
    group: "execution",
    default: "0",
    indirect: None,
    default_factory: None,
};

pub static CSTAR_IN_ACTIVE_ALLOCATION: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_IN_ACTIVE_ALLOCATION",
    description: "If \"1\", the process is itself running inside a scheduler allocation.",
    group: "execution",
    default: "0",
    indirect: None,
    default_factory: None,
};

pub static CSTAR_NPROCS_POST: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_NPROCS_POST",
    description: "Number of processes to use for post-processing steps.",
    group: "execution",
    default: "1",
    indirect: None,
    default_factory: None,
};

pub static CSTAR_INTERACTIVE: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_INTERACTIVE",
    description: "If \"0\", prompts auto-accept their default instead of blocking on stdin.",
    group: "execution",
    default: "1",
    indirect: None,
    default_factory: None,
};

pub static CSTAR_LOG_LEVEL: EnvVarDescriptor = EnvVarDescriptor {
    name: "CSTAR_LOG_LEVEL",
    description: "Minimum log level written to the session log (ERROR/WARN/INFO/DEBUG/TRACE).",
    group: "logging",
    default: "INFO",
    indirect: None,
    default_factory: None,
};

pub static DESCRIPTORS: &[&EnvVarDescriptor] = &[
    &CSTAR_CACHE_HOME,
    &CSTAR_CONFIG_HOME,
    &CSTAR_DATA_HOME,
    &CSTAR_STATE_HOME,
    &CSTAR_SCRATCH_DIRS,
    &CSTAR_CLOBBER_WORKING_DIR,
    &CSTAR_FRESH_CODEBASES,
    &CSTAR_IN_ACTIVE_ALLOCATION,
    &CSTAR_NPROCS_POST,
    &CSTAR_INTERACTIVE,
    &CSTAR_LOG_LEVEL,
];

pub fn cache_home() -> PathBuf {
    PathBuf::from(CSTAR_CACHE_HOME.value())
}

pub fn config_home() -> PathBuf {
    PathBuf::from(CSTAR_CONFIG_HOME.value())
}

pub fn data_home() -> PathBuf {
    PathBuf::from(CSTAR_DATA_HOME.value())
}

pub fn state_home() -> PathBuf {
    PathBuf::from(CSTAR_STATE_HOME.value())
}

/// `~/.cstar.env`, the fixed per-user config path of §4.D/§6.
pub fn user_env_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cstar.env")
}

/// Lowercase ASCII-safe slug used to key the per-repo cache directory
/// under the state home (§6 "Persisted state layout").
pub fn slugify_repo_url(url: &str) -> String {
    url.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `${state_home}/cstar/<slugified-repo-url>/` (§6).
pub fn repo_cache_dir(repo_url: &str) -> PathBuf {
    state_home().join("cstar").join(slugify_repo_url(repo_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_is_lowercase_ascii_safe() {
        assert_eq!(
            slugify_repo_url("https://github.com/CESR-lab/ucla-roms.git"),
            "https_github_com_cesr_lab_ucla_roms_git"
        );
    }

    #[test]
    fn cache_home_defaults_to_xdg_when_unset() {
        std::env::remove_var("CSTAR_CACHE_HOME");
        std::env::remove_var("XDG_CACHE_HOME");
        let home = cache_home();
        assert!(home.to_string_lossy().contains("cache"));
    }
}
