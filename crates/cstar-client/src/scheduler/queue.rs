//! Queue value objects (§3 "Queue", §4.E).

use crate::error::{ClientError, Result};
use cstar_core::error::CStarError;
use cstar_exec::{run_cmd, RunCmdOptions};
use once_cell::sync::Lazy;
use regex::Regex;

/// A named resource class exposed by a scheduler. SLURM has two flavours
/// (QOS and partition); PBS exposes plain named queues with a pre-declared
/// walltime literal since PBS has no uniform walltime introspection command.
#[derive(Debug, Clone)]
pub enum Queue {
    SlurmQos {
        name: String,
        query_name: Option<String>,
    },
    SlurmPartition {
        name: String,
        query_name: Option<String>,
    },
    PbsQueue {
        name: String,
        max_walltime: String,
    },
}

impl Queue {
    pub fn name(&self) -> &str {
        match self {
            Queue::SlurmQos { name, .. } => name,
            Queue::SlurmPartition { name, .. } => name,
            Queue::PbsQueue { name, .. } => name,
        }
    }

    fn query_name(&self) -> &str {
        match self {
            Queue::SlurmQos { name, query_name } | Queue::SlurmPartition { name, query_name } => {
                query_name.as_deref().unwrap_or(name)
            }
            Queue::PbsQueue { name, .. } => name,
        }
    }

    /// Live introspection of this queue's maximum walltime (§4.E). For
    /// SLURM this shells out every call (the original's live property); PBS
    /// returns the pre-declared literal.
    pub fn max_walltime(&self) -> Result<String> {
        match self {
            Queue::SlurmQos { .. } => {
                let cmd = format!(
                    "sacctmgr show qos {} format=MaxWall --noheader",
                    self.query_name()
                );
                let raw = run_cmd(
                    &cmd,
                    &RunCmdOptions::new().msg_err("Failed to query QOS max walltime"),
                )?;
                normalize_walltime(raw.trim()).map_err(Into::into)
            }
            Queue::SlurmPartition { .. } => {
                let cmd = format!("sinfo -h -o '%l' -p {}", self.query_name());
                let raw = run_cmd(
                    &cmd,
                    &RunCmdOptions::new().msg_err("Failed to query partition max walltime"),
                )?;
                normalize_walltime(raw.trim()).map_err(Into::into)
            }
            Queue::PbsQueue { max_walltime, .. } => Ok(max_walltime.clone()),
        }
    }
}

static WALLTIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)-)?(\d+):(\d{2})(?::(\d{2}))?$").unwrap()
});

/// Normalises `MM:SS`, `HH:MM:SS`, or `D-HH:MM:SS` into canonical
/// `HH:MM:SS` with hours computed as `24*D + H` (§4.E, §8 idempotence law).
pub fn normalize_walltime(raw: &str) -> std::result::Result<String, CStarError> {
    let raw = raw.trim();
    let caps = WALLTIME_RE.captures(raw).ok_or_else(|| {
        CStarError::Validation(format!("'{raw}' is not a valid walltime specification"))
    })?;

    let days: u64 = caps
        .get(1)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    let first: u64 = caps.get(2).unwrap().as_str().parse().unwrap_or(0);
    let second: u64 = caps.get(3).unwrap().as_str().parse().unwrap_or(0);
    let third: Option<u64> = caps.get(4).and_then(|m| m.as_str().parse().ok());

    // Without a seconds group and without a day prefix, the original
    // accepts `MM:SS`; everything else is `HH:MM[:SS]`.
    let (hours, minutes, seconds) = if third.is_some() {
        (24 * days + first, second, third.unwrap())
    } else if days > 0 {
        (24 * days + first, second, 0)
    } else {
        (0, first, second)
    };

    Ok(format!("{:02}:{:02}:{:02}", hours, minutes, seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mm_ss() {
        assert_eq!(normalize_walltime("45:30").unwrap(), "00:45:30");
    }

    #[test]
    fn normalizes_hh_mm_ss() {
        assert_eq!(normalize_walltime("12:00:00").unwrap(), "12:00:00");
    }

    #[test]
    fn normalizes_d_hh_mm_ss() {
        assert_eq!(normalize_walltime("2-10:30:00").unwrap(), "58:30:00");
    }

    #[test]
    fn normalization_is_idempotent() {
        for w in ["45:30", "12:00:00", "2-10:30:00", "5-10:30:00"] {
            let once = normalize_walltime(w).unwrap();
            let twice = normalize_walltime(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn normalization_survives_triple_digit_hours() {
        // 5 days + 10 hours = 130 hours; the canonical form's hour field can
        // exceed two digits, and re-parsing it must not fail (§8 idempotence
        // law: normalise(normalise(w)) == normalise(w)).
        let once = normalize_walltime("5-10:30:00").unwrap();
        assert_eq!(once, "130:30:00");
        let twice = normalize_walltime(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize_walltime("not-a-walltime").is_err());
    }
}
