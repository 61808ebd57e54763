//! The system-context registry and process-wide singleton (§4.D "Registry &
//! selection"), grounded in `original_source/cstar/system/manager.py`.

use super::environment::CStarEnvironment;
use super::name::{identify_host, SystemName};
use crate::error::Result;
use crate::scheduler::{PbsScheduler, Queue, Scheduler, SlurmScheduler};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// The full context for one host: its scheduler (absent on workstations)
/// and its loaded environment.
pub struct SystemContext {
    name: SystemName,
    scheduler: Option<Scheduler>,
    environment: OnceCell<CStarEnvironment>,
}

impl SystemContext {
    pub fn name(&self) -> SystemName {
        self.name
    }

    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Lazily constructed and cached on first access (§4.D), matching the
    /// original's `environment` property.
    pub fn environment(&self) -> Result<&CStarEnvironment> {
        self.environment.get_or_try_init(|| {
            let (mpi_exec_prefix, compiler) = defaults_for(self.name);
            CStarEnvironment::new(self.name.as_str(), mpi_exec_prefix, compiler)
        })
    }
}

fn defaults_for(name: SystemName) -> (&'static str, &'static str) {
    match name {
        SystemName::Expanse => ("srun --mpi=pmi2", "intel"),
        SystemName::Perlmutter => ("srun", "gnu"),
        SystemName::Derecho => ("mpirun", "intel"),
        SystemName::DarwinArm64 | SystemName::LinuxX86_64 => ("mpirun", "gnu"),
    }
}

/// Builds the registered scheduler for `name`, or `None` on systems with no
/// batch scheduler (workstations), exactly reproducing
/// `CStarSystemManager.scheduler`'s `match` arms.
fn scheduler_for(name: SystemName) -> Option<Scheduler> {
    match name {
        SystemName::Perlmutter => Some(Scheduler::Slurm(SlurmScheduler {
            queues: vec![
                Queue::SlurmQos {
                    name: "regular".to_string(),
                    query_name: Some("regular_1".to_string()),
                },
                Queue::SlurmQos {
                    name: "shared".to_string(),
                    query_name: None,
                },
                Queue::SlurmQos {
                    name: "debug".to_string(),
                    query_name: None,
                },
            ],
            primary_queue: "regular".to_string(),
            other_directives: BTreeMap::from([("-C".to_string(), "cpu".to_string())]),
            requires_task_distribution: false,
        })),
        SystemName::Derecho => Some(Scheduler::Pbs(PbsScheduler {
            queues: vec![
                Queue::PbsQueue {
                    name: "main".to_string(),
                    max_walltime: "12:00:00".to_string(),
                },
                Queue::PbsQueue {
                    name: "preempt".to_string(),
                    max_walltime: "24:00:00".to_string(),
                },
                Queue::PbsQueue {
                    name: "develop".to_string(),
                    max_walltime: "06:00:00".to_string(),
                },
            ],
            primary_queue: "main".to_string(),
            other_directives: BTreeMap::new(),
        })),
        SystemName::Expanse => Some(Scheduler::Slurm(SlurmScheduler {
            queues: vec![
                Queue::SlurmPartition {
                    name: "compute".to_string(),
                    query_name: None,
                },
                Queue::SlurmPartition {
                    name: "debug".to_string(),
                    query_name: None,
                },
            ],
            primary_queue: "compute".to_string(),
            other_directives: BTreeMap::new(),
            requires_task_distribution: true,
        })),
        SystemName::DarwinArm64 | SystemName::LinuxX86_64 => None,
    }
}

/// `get_system_context()` (§4.D "Registry & selection"): resolves the host
/// name and builds its context, failing on an unregistered host.
pub fn get_system_context() -> Result<SystemContext> {
    let host = identify_host()?;
    let name = SystemName::from_str(&host)?;
    Ok(SystemContext {
        name,
        scheduler: scheduler_for(name),
        environment: OnceCell::new(),
    })
}

/// The process-wide singleton (`cstar_sysmgr` in the original): built once,
/// on first access, and shared for the life of the process.
pub static CSTAR_SYSMGR: Lazy<Mutex<OnceCell<SystemContext>>> =
    Lazy::new(|| Mutex::new(OnceCell::new()));

/// Runs `f` against the cached singleton context, building it on first call.
pub fn with_system_context<T>(f: impl FnOnce(&SystemContext) -> Result<T>) -> Result<T> {
    let guard = CSTAR_SYSMGR.lock().unwrap_or_else(|poison| poison.into_inner());
    let context = guard.get_or_try_init(get_system_context)?;
    f(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perlmutter_scheduler_is_qos_based_and_not_task_distributed() {
        let scheduler = scheduler_for(SystemName::Perlmutter).unwrap();
        assert!(!scheduler.requires_task_distribution());
        assert_eq!(scheduler.primary_queue(), "regular");
    }

    #[test]
    fn derecho_scheduler_is_pbs_and_task_distributed() {
        let scheduler = scheduler_for(SystemName::Derecho).unwrap();
        assert!(scheduler.requires_task_distribution());
        assert!(matches!(scheduler, Scheduler::Pbs(_)));
    }

    #[test]
    fn workstation_systems_have_no_scheduler() {
        assert!(scheduler_for(SystemName::DarwinArm64).is_none());
        assert!(scheduler_for(SystemName::LinuxX86_64).is_none());
    }

    #[test]
    fn defaults_match_registry() {
        assert_eq!(defaults_for(SystemName::Expanse), ("srun --mpi=pmi2", "intel"));
        assert_eq!(defaults_for(SystemName::Perlmutter), ("srun", "gnu"));
    }
}
