//! Typed environment-variable descriptors (§3, §4.C) and the feature-flag
//! helper that sits on top of them.
//!
//! The original groups descriptors by annotating module-level string
//! constants and discovers them by introspecting annotations at runtime.
//! Rust has no such reflection, so each module that owns a family of
//! descriptors declares them as `pub static` values and exposes a
//! `descriptors()` slice; [`discover_env_vars`] simply flattens those
//! slices, which is the typed equivalent of the original's discovery walk.

/// One environment variable's resolution policy.
///
/// Resolution order on [`EnvVarDescriptor::value`]: (1) `name`'s own value
/// in the process environment if non-empty; (2) `default_factory`'s result
/// if non-empty; (3) `indirect`'s value in the process environment if
/// non-empty; (4) `default`.
pub struct EnvVarDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub group: &'static str,
    pub default: &'static str,
    pub indirect: Option<&'static str>,
    pub default_factory: Option<fn(&EnvVarDescriptor) -> String>,
}

impl EnvVarDescriptor {
    pub fn value(&self) -> String {
        if let Ok(v) = std::env::var(self.name) {
            if !v.is_empty() {
                return v;
            }
        }
        if let Some(factory) = self.default_factory {
            let v = factory(self);
            if !v.is_empty() {
                return v;
            }
        }
        if let Some(indirect) = self.indirect {
            if let Ok(v) = std::env::var(indirect) {
                if !v.is_empty() {
                    return v;
                }
            }
        }
        self.default.to_string()
    }
}

/// Flattens several modules' descriptor slices into one list, the typed
/// analogue of the original's `discover_env_vars(modules)`.
pub fn discover_env_vars(
    modules: &[&'static [&'static EnvVarDescriptor]],
) -> Vec<&'static EnvVarDescriptor> {
    modules.iter().flat_map(|m| m.iter().copied()).collect()
}

/// Looks up a single descriptor by variable name across the given modules.
pub fn get_env_item(
    modules: &[&'static [&'static EnvVarDescriptor]],
    name: &str,
) -> Option<&'static EnvVarDescriptor> {
    discover_env_vars(modules)
        .into_iter()
        .find(|d| d.name == name)
}

const FEATURE_FLAG_PREFIX: &str = "CSTAR_FF_";
const DEVELOPER_MODE_VAR: &str = "CSTAR_FF_DEVELOPER_MODE";

fn flag_raw_is_on(var_name: &str) -> bool {
    std::env::var(var_name)
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// `is_feature_enabled(name)` (§4.C): normalises an optional `CSTAR_FF_`
/// prefix, returns `true` unconditionally if `DEVELOPER_MODE` is on, then
/// walks `name`'s underscore-delimited prefixes (shortest first) checking
/// each as its own flag, then finally the full flag name itself.
pub fn is_feature_enabled(name: &str) -> bool {
    let bare = name.strip_prefix(FEATURE_FLAG_PREFIX).unwrap_or(name);

    if flag_raw_is_on(DEVELOPER_MODE_VAR) {
        return true;
    }

    let segments: Vec<&str> = bare.split('_').collect();
    for i in 1..segments.len() {
        let prefix = segments[..i].join("_");
        if flag_raw_is_on(&format!("{FEATURE_FLAG_PREFIX}{prefix}")) {
            return true;
        }
    }

    flag_raw_is_on(&format!("{FEATURE_FLAG_PREFIX}{bare}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear(vars: &[&str]) {
        for v in vars {
            std::env::remove_var(v);
        }
    }

    #[test]
    fn value_resolution_order() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear(&["CSTAR_TEST_VAR", "CSTAR_TEST_INDIRECT"]);

        let descriptor = EnvVarDescriptor {
            name: "CSTAR_TEST_VAR",
            description: "test",
            group: "test",
            default: "literal-default",
            indirect: Some("CSTAR_TEST_INDIRECT"),
            default_factory: None,
        };
        assert_eq!(descriptor.value(), "literal-default");

        std::env::set_var("CSTAR_TEST_INDIRECT", "from-indirect");
        assert_eq!(descriptor.value(), "from-indirect");

        std::env::set_var("CSTAR_TEST_VAR", "from-own-var");
        assert_eq!(descriptor.value(), "from-own-var");

        clear(&["CSTAR_TEST_VAR", "CSTAR_TEST_INDIRECT"]);
    }

    #[test]
    fn default_factory_outranks_indirect() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear(&["CSTAR_TEST_VAR2", "CSTAR_TEST_INDIRECT2"]);
        std::env::set_var("CSTAR_TEST_INDIRECT2", "from-indirect");

        let descriptor = EnvVarDescriptor {
            name: "CSTAR_TEST_VAR2",
            description: "test",
            group: "test",
            default: "literal-default",
            indirect: Some("CSTAR_TEST_INDIRECT2"),
            default_factory: Some(|_| "from-factory".to_string()),
        };
        assert_eq!(descriptor.value(), "from-factory");

        clear(&["CSTAR_TEST_VAR2", "CSTAR_TEST_INDIRECT2"]);
    }

    #[test]
    fn developer_mode_forces_all_flags_on() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear(&[DEVELOPER_MODE_VAR, "CSTAR_FF_SOME_RANDOM_FLAG"]);
        assert!(!is_feature_enabled("SOME_RANDOM_FLAG"));

        std::env::set_var(DEVELOPER_MODE_VAR, "1");
        assert!(is_feature_enabled("SOME_RANDOM_FLAG"));
        assert!(is_feature_enabled("CSTAR_FF_SOME_RANDOM_FLAG"));

        clear(&[DEVELOPER_MODE_VAR]);
    }

    #[test]
    fn hierarchical_prefix_enables_children() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear(&[
            DEVELOPER_MODE_VAR,
            "CSTAR_FF_EXPERIMENTAL",
            "CSTAR_FF_EXPERIMENTAL_ROMS_CODEC",
        ]);
        assert!(!is_feature_enabled("EXPERIMENTAL_ROMS_CODEC"));

        std::env::set_var("CSTAR_FF_EXPERIMENTAL", "1");
        assert!(is_feature_enabled("EXPERIMENTAL_ROMS_CODEC"));
        assert!(is_feature_enabled("EXPERIMENTAL"));

        clear(&["CSTAR_FF_EXPERIMENTAL"]);
        assert!(!is_feature_enabled("EXPERIMENTAL_ROMS_CODEC"));

        std::env::set_var("CSTAR_FF_EXPERIMENTAL_ROMS_CODEC", "1");
        assert!(is_feature_enabled("EXPERIMENTAL_ROMS_CODEC"));
        assert!(!is_feature_enabled("EXPERIMENTAL"));

        clear(&["CSTAR_FF_EXPERIMENTAL_ROMS_CODEC"]);
    }
}
