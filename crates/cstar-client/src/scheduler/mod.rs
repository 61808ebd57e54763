pub mod job;
pub mod queue;

pub use job::{create_scheduler_job, Job, JobParams, JobStatus};
pub use queue::{normalize_walltime, Queue};

use crate::error::{ClientError, Result};
use cstar_core::{log_error, log_warn};
use cstar_exec::{run_cmd, RunCmdOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// A set of queues plus the system-wide introspected maxima used for node
/// planning (§3 "Scheduler", §4.E).
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    pub queues: Vec<Queue>,
    pub primary_queue: String,
    pub other_directives: BTreeMap<String, String>,
    pub requires_task_distribution: bool,
}

#[derive(Debug, Clone)]
pub struct PbsScheduler {
    pub queues: Vec<Queue>,
    pub primary_queue: String,
    pub other_directives: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum Scheduler {
    Slurm(SlurmScheduler),
    Pbs(PbsScheduler),
}

impl Scheduler {
    pub fn queues(&self) -> &[Queue] {
        match self {
            Scheduler::Slurm(s) => &s.queues,
            Scheduler::Pbs(s) => &s.queues,
        }
    }

    pub fn primary_queue(&self) -> &str {
        match self {
            Scheduler::Slurm(s) => &s.primary_queue,
            Scheduler::Pbs(s) => &s.primary_queue,
        }
    }

    pub fn other_directives(&self) -> &BTreeMap<String, String> {
        match self {
            Scheduler::Slurm(s) => &s.other_directives,
            Scheduler::Pbs(s) => &s.other_directives,
        }
    }

    /// PBS always requires explicit node*cpu task distribution; for SLURM
    /// it's site-dependent, carried as a per-instance flag (SPEC_FULL §11).
    pub fn requires_task_distribution(&self) -> bool {
        match self {
            Scheduler::Slurm(s) => s.requires_task_distribution,
            Scheduler::Pbs(_) => true,
        }
    }

    /// `get_queue(name)` (§4.E): linear search, fails if absent.
    pub fn get_queue(&self, name: &str) -> Result<&Queue> {
        self.queues()
            .iter()
            .find(|q| q.name() == name)
            .ok_or_else(|| {
                ClientError::Core(cstar_core::CStarError::NotFound(format!(
                    "No queue named '{name}' is registered with this scheduler"
                )))
            })
    }

    /// Advisory: system-wide max CPUs per node. Failure is logged and
    /// returns `None` rather than propagating (§4.E, §7 Advisory policy).
    pub fn global_max_cpus_per_node(&self) -> Option<u32> {
        match self {
            Scheduler::Slurm(_) => {
                let cmd = "scontrol show nodes | grep -o 'CPUTot=[0-9]*' | cut -d= -f2 | sort -n | tail -1";
                query_advisory_u32(cmd, "global max CPUs per node (SLURM)")
            }
            Scheduler::Pbs(_) => {
                let cmd = "pbsnodes -a | grep -o 'resources_available.ncpus = [0-9]*' | awk '{print $3}' | sort -n | tail -1";
                query_advisory_u32(cmd, "global max CPUs per node (PBS)")
            }
        }
    }

    /// Advisory: system-wide max memory per node, in GB.
    pub fn global_max_mem_per_node_gb(&self) -> Option<f64> {
        match self {
            Scheduler::Slurm(_) => {
                let cmd = "scontrol show nodes | grep -o 'RealMemory=[0-9]*' | cut -d= -f2 | sort -n | tail -1";
                query_advisory_u32(cmd, "global max memory per node (SLURM, MiB)")
                    .map(|mib| mib as f64 / 1024.0)
            }
            Scheduler::Pbs(_) => {
                let cmd = "pbsnodes -a | grep -o 'resources_available.mem = [0-9]*[kmg]b' | awk '{print $3}' | sort -h | tail -1";
                query_advisory_mem_gb(cmd)
            }
        }
    }
}

fn query_advisory_u32(cmd: &str, what: &str) -> Option<u32> {
    match run_cmd(cmd, &RunCmdOptions::new().raise_on_error(true)) {
        Ok(out) => out.trim().parse::<u32>().ok().or_else(|| {
            log_warn!("Could not parse {what} from output '{out}'");
            None
        }),
        Err(e) => {
            log_error!("Advisory query for {what} failed: {e}");
            None
        }
    }
}

static PBS_MEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(\d+)(kb|mb|gb)$").unwrap());

fn query_advisory_mem_gb(cmd: &str) -> Option<f64> {
    let out = match run_cmd(cmd, &RunCmdOptions::new().raise_on_error(true)) {
        Ok(out) => out,
        Err(e) => {
            log_error!("Advisory query for global max memory per node (PBS) failed: {e}");
            return None;
        }
    };
    let trimmed = out.trim();
    let caps = PBS_MEM_RE.captures(trimmed)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    Some(match unit.as_str() {
        "kb" => value / (1024.0 * 1024.0),
        "mb" => value / 1024.0,
        "gb" => value,
        _ => return None,
    })
}
