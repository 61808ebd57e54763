//! `SystemName` registry (§4.D "Registry & selection", supplemented per
//! SPEC_FULL §11 from `original_source/cstar/system/manager.py`).

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types)]
pub enum SystemName {
    Perlmutter,
    Expanse,
    Derecho,
    DarwinArm64,
    LinuxX86_64,
}

impl SystemName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemName::Perlmutter => "perlmutter",
            SystemName::Expanse => "expanse",
            SystemName::Derecho => "derecho",
            SystemName::DarwinArm64 => "darwin_arm64",
            SystemName::LinuxX86_64 => "linux_x86_64",
        }
    }

    pub fn from_str(s: &str) -> Result<SystemName> {
        match s.to_lowercase().as_str() {
            "perlmutter" => Ok(SystemName::Perlmutter),
            "expanse" => Ok(SystemName::Expanse),
            "derecho" => Ok(SystemName::Derecho),
            "darwin_arm64" => Ok(SystemName::DarwinArm64),
            "linux_x86_64" => Ok(SystemName::LinuxX86_64),
            other => Err(ClientError::UnknownSystem(other.to_string())),
        }
    }
}

/// macOS reports `aarch64` via `std::env::consts::ARCH`, but the registry
/// (and the original's `platform.machine()`) spells Apple Silicon `arm64`.
fn normalized_arch() -> &'static str {
    if cfg!(target_os = "macos") && std::env::consts::ARCH == "aarch64" {
        "arm64"
    } else {
        std::env::consts::ARCH
    }
}

fn normalized_os() -> &'static str {
    if cfg!(target_os = "macos") {
        "darwin"
    } else {
        std::env::consts::OS
    }
}

/// Host identification (§4.D): `LMOD_SYSHOST`, then `LMOD_SYSTEM_NAME`, then
/// `<platform>_<machine>`, lowercased. Both platform and machine must
/// resolve for the fallback to apply.
pub fn identify_host() -> Result<String> {
    if let Ok(v) = std::env::var("LMOD_SYSHOST") {
        if !v.is_empty() {
            return Ok(v.to_lowercase());
        }
    }
    if let Ok(v) = std::env::var("LMOD_SYSTEM_NAME") {
        if !v.is_empty() {
            return Ok(v.to_lowercase());
        }
    }

    let os = normalized_os();
    let machine = normalized_arch();
    if os.is_empty() || machine.is_empty() {
        return Err(ClientError::HostIdentificationFailed);
    }
    Ok(format!("{os}_{machine}").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_as_str() {
        for name in [
            SystemName::Perlmutter,
            SystemName::Expanse,
            SystemName::Derecho,
            SystemName::DarwinArm64,
            SystemName::LinuxX86_64,
        ] {
            assert_eq!(SystemName::from_str(name.as_str()).unwrap(), name);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(SystemName::from_str("not-a-system").is_err());
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!(SystemName::from_str("PERLMUTTER").unwrap(), SystemName::Perlmutter);
    }
}
