//! The scheduler job (§4.F), the central subsystem: construction-time
//! node/CPU planning and walltime policy, pure script emission, submission,
//! status polling, and cancellation for SLURM and PBS.

use super::queue::normalize_walltime;
use super::{Queue, Scheduler};
use crate::error::{ClientError, Result};
use cstar_core::error::CStarError;
use cstar_core::log_info;
use cstar_exec::{run_cmd, RunCmdOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Unsubmitted,
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
    Held,
    Ending,
    Unknown,
}

/// Caller-supplied construction parameters; everything besides `scheduler`,
/// `commands`, `account_key`, and `cpus` is optional and auto-filled (§4.F
/// "Construction" step 1).
#[derive(Debug, Clone)]
pub struct JobParams {
    pub scheduler: Arc<Scheduler>,
    pub commands: String,
    pub account_key: String,
    pub cpus: u32,
    pub nodes: Option<u32>,
    pub cpus_per_node: Option<u32>,
    pub script_path: Option<PathBuf>,
    pub run_path: Option<PathBuf>,
    pub job_name: Option<String>,
    pub output_file: Option<PathBuf>,
    pub queue_name: Option<String>,
    pub walltime: Option<String>,
    pub depends_on: Vec<String>,
}

impl JobParams {
    pub fn new(scheduler: Arc<Scheduler>, commands: impl Into<String>, account_key: impl Into<String>, cpus: u32) -> Self {
        JobParams {
            scheduler,
            commands: commands.into(),
            account_key: account_key.into(),
            cpus,
            nodes: None,
            cpus_per_node: None,
            script_path: None,
            run_path: None,
            job_name: None,
            output_file: None,
            queue_name: None,
            walltime: None,
            depends_on: Vec::new(),
        }
    }
}

/// A polymorphic batch job. The scheduler kind carried inside `scheduler`
/// is the closed sum type driving every kind-specific behaviour below
/// (script emission, submission parsing, status mapping, cancellation);
/// `Job` itself stays a single tagged-variant record per §9's design note.
#[derive(Debug, Clone)]
pub struct Job {
    pub scheduler: Arc<Scheduler>,
    pub commands: String,
    pub account_key: String,
    pub cpus: u32,
    pub nodes: Option<u32>,
    pub cpus_per_node: Option<u32>,
    pub script_path: PathBuf,
    pub run_path: PathBuf,
    pub job_name: String,
    pub output_file: PathBuf,
    pub queue: Queue,
    pub walltime: String,
    pub depends_on: Vec<String>,
    pub id: Option<String>,
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn default_job_name() -> String {
    format!("cstar_job_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// `create_scheduler_job` (§4.F "Factory"): builds and validates a [`Job`]
/// against the active scheduler's rules. Since this crate's `Scheduler` is
/// already a closed Slurm/Pbs sum type, the "inspects the active scheduler
/// and selects the correct concrete class" step collapses into ordinary
/// matching inside [`Job::new`] rather than a second dispatch layer.
pub fn create_scheduler_job(params: JobParams) -> Result<Job> {
    Job::new(params)
}

impl Job {
    pub fn new(params: JobParams) -> Result<Job> {
        let JobParams {
            scheduler,
            commands,
            account_key,
            cpus,
            nodes,
            cpus_per_node,
            script_path,
            run_path,
            job_name,
            output_file,
            queue_name,
            walltime,
            depends_on,
        } = params;

        let job_name = job_name.unwrap_or_else(default_job_name);
        let cwd = std::env::current_dir().map_err(CStarError::Io)?;
        let script_path = script_path.unwrap_or_else(|| cwd.join(format!("{job_name}.sh")));
        let run_path = run_path.unwrap_or_else(|| {
            script_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.clone())
        });
        let output_file = output_file.unwrap_or_else(|| run_path.join(format!("{job_name}.out")));
        let queue_name = queue_name.unwrap_or_else(|| scheduler.primary_queue().to_string());

        let queue = scheduler.get_queue(&queue_name)?.clone();
        let queue_max_walltime = queue.max_walltime()?;

        let walltime = match walltime {
            Some(w) => {
                let normalized = normalize_walltime(&w)?;
                if walltime_seconds(&normalized) > walltime_seconds(&queue_max_walltime) {
                    return Err(ClientError::Core(CStarError::Validation(format!(
                        "Requested walltime '{normalized}' exceeds queue '{queue_name}' maximum \
                         of '{queue_max_walltime}'"
                    ))));
                }
                normalized
            }
            None => queue_max_walltime,
        };

        let (nodes, cpus_per_node) = if scheduler.requires_task_distribution() {
            match (nodes, cpus_per_node) {
                (Some(n), None) => (Some(n), Some(ceil_div(cpus, n))),
                (None, Some(p)) => (Some(ceil_div(cpus, p)), Some(p)),
                (None, None) => {
                    let max = scheduler.global_max_cpus_per_node().ok_or_else(|| {
                        ClientError::Core(CStarError::Validation(
                            "Cannot auto-plan nodes: the scheduler could not introspect the \
                             global max CPUs per node. Supply `nodes` or `cpus_per_node` \
                             explicitly."
                                .to_string(),
                        ))
                    })?;
                    let n_nodes = ceil_div(cpus, max);
                    let per_node = ceil_div(cpus, n_nodes);
                    (Some(n_nodes), Some(per_node))
                }
                (Some(_), Some(_)) => {
                    return Err(ClientError::Core(CStarError::Validation(
                        "Specify at most one of `nodes` or `cpus_per_node`, not both.".to_string(),
                    )))
                }
            }
        } else {
            (None, None)
        };

        Ok(Job {
            scheduler,
            commands,
            account_key,
            cpus,
            nodes,
            cpus_per_node,
            script_path,
            run_path,
            job_name,
            output_file,
            queue,
            walltime,
            depends_on,
            id: None,
        })
    }

    /// Pure function of state (§4.F "Script emission").
    pub fn script(&self) -> String {
        match self.scheduler.as_ref() {
            Scheduler::Slurm(_) => self.slurm_script(),
            Scheduler::Pbs(_) => self.pbs_script(),
        }
    }

    fn slurm_script(&self) -> String {
        let mut lines = vec!["#!/bin/bash".to_string()];
        lines.push(format!("#SBATCH --job-name={}", self.job_name));
        lines.push(format!("#SBATCH --output={}", self.output_file.display()));
        match &self.queue {
            Queue::SlurmQos { name, .. } => lines.push(format!("#SBATCH --qos={name}")),
            Queue::SlurmPartition { name, .. } => {
                lines.push(format!("#SBATCH --partition={name}"))
            }
            Queue::PbsQueue { .. } => unreachable!("SLURM job cannot hold a PBS queue"),
        }
        if self.scheduler.requires_task_distribution() {
            lines.push(format!(
                "#SBATCH --nodes={} --ntasks-per-node={}",
                self.nodes.unwrap_or(1),
                self.cpus_per_node.unwrap_or(self.cpus)
            ));
        } else {
            lines.push(format!("#SBATCH --ntasks={}", self.cpus));
        }
        lines.push(format!("#SBATCH --account={}", self.account_key));
        lines.push("#SBATCH --export=ALL".to_string());
        lines.push("#SBATCH --mail-type=ALL".to_string());
        lines.push(format!("#SBATCH --time={}", self.walltime));
        for (key, value) in self.scheduler.other_directives() {
            lines.push(format!("#SBATCH {key} {value}"));
        }
        lines.push(String::new());
        lines.push("set -e".to_string());
        lines.push(self.commands.clone());
        lines.join("\n") + "\n"
    }

    fn pbs_script(&self) -> String {
        let mut lines = vec!["#!/bin/bash".to_string()];
        lines.push("#PBS -S /bin/bash".to_string());
        lines.push(format!("#PBS -N {}", self.job_name));
        lines.push(format!("#PBS -o {}", self.output_file.display()));
        lines.push(format!("#PBS -A {}", self.account_key));
        lines.push(format!(
            "#PBS -l select={}:ncpus={},walltime={}",
            self.nodes.unwrap_or(1),
            self.cpus_per_node.unwrap_or(self.cpus),
            self.walltime
        ));
        lines.push(format!("#PBS -q {}", self.queue.name()));
        lines.push("#PBS -j oe".to_string());
        lines.push("#PBS -k eod".to_string());
        lines.push("#PBS -V".to_string());
        if !self.depends_on.is_empty() {
            // Open Question resolution (SPEC_FULL §12.2): PBS supports
            // `-W depend=afterok:...` directly; don't reject depends_on.
            lines.push(format!(
                "#PBS -W depend=afterok:{}",
                self.depends_on.join(":")
            ));
        }
        for (key, value) in self.scheduler.other_directives() {
            lines.push(format!("#PBS {key} {value}"));
        }
        lines.push("cd ${PBS_O_WORKDIR}".to_string());
        lines.push(String::new());
        lines.push(self.commands.clone());
        lines.join("\n") + "\n"
    }

    fn persist_script(&self) -> Result<()> {
        if let Some(parent) = self.script_path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|source| CStarError::PathIo { path: parent.to_path_buf(), source })?;
        }
        fs_err::write(&self.script_path, self.script())
            .map_err(|source| CStarError::PathIo { path: self.script_path.clone(), source })?;
        Ok(())
    }

    /// `submit` (§4.F "Submission"). Assigns `self.id` on success.
    pub fn submit(&mut self) -> Result<String> {
        self.persist_script()?;
        match self.scheduler.as_ref() {
            Scheduler::Slurm(_) => self.submit_slurm(),
            Scheduler::Pbs(_) => self.submit_pbs(),
        }
    }

    fn submit_slurm(&mut self) -> Result<String> {
        let mut opts = RunCmdOptions::new()
            .cwd(&self.run_path)
            .env_clear(true)
            .msg_err("sbatch submission failed");
        for (key, value) in std::env::vars() {
            let keep = !key.starts_with("SLURM_") || key == "SLURM_CONF" || key == "SLURM_VERSION";
            if keep {
                opts = opts.env(key, value);
            }
        }

        let mut cmd = String::from("sbatch");
        if !self.depends_on.is_empty() {
            cmd.push_str(&format!(
                " --dependency=afterok:{} --kill-on-invalid-dep=yes",
                self.depends_on.join(":")
            ));
        }
        cmd.push(' ');
        cmd.push_str(&self.script_path.display().to_string());

        let stdout = run_cmd(&cmd, &opts)?;
        static SBATCH_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"Submitted batch job (\d+)").unwrap());
        let id = SBATCH_RE
            .captures(&stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                ClientError::Core(CStarError::Subprocess {
                    command: cmd.clone(),
                    code: Some(0),
                    stderr: format!("Could not parse a job id from sbatch output: '{stdout}'"),
                })
            })?;
        log_info!("Submitted SLURM job {id}");
        self.id = Some(id.clone());
        Ok(id)
    }

    fn submit_pbs(&mut self) -> Result<String> {
        let cmd = format!("qsub {}", self.script_path.display());
        let opts = RunCmdOptions::new()
            .cwd(&self.run_path)
            .msg_err("qsub submission failed");
        let stdout = run_cmd(&cmd, &opts)?;
        static QSUB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\S+$").unwrap());
        let id = QSUB_RE
            .captures(stdout.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                ClientError::Core(CStarError::Subprocess {
                    command: cmd.clone(),
                    code: Some(0),
                    stderr: format!("Could not parse a job id from qsub output: '{stdout}'"),
                })
            })?;
        log_info!("Submitted PBS job {id}");
        self.id = Some(id.clone());
        Ok(id)
    }

    /// `status` (§4.F "Status"). `UNSUBMITTED` if `id` is unset.
    pub fn status(&self) -> Result<JobStatus> {
        let Some(id) = &self.id else {
            return Ok(JobStatus::Unsubmitted);
        };
        match self.scheduler.as_ref() {
            Scheduler::Slurm(_) => self.status_slurm(id),
            Scheduler::Pbs(_) => self.status_pbs(id),
        }
    }

    fn status_slurm(&self, id: &str) -> Result<JobStatus> {
        let cmd = format!("sacct -j {id} --format=State%20 --noheader");
        let out = run_cmd(&cmd, &RunCmdOptions::new().msg_err("sacct query failed"))?;
        let first_token = out.split_whitespace().next().unwrap_or("").to_uppercase();
        Ok(if first_token.contains("PENDING") {
            JobStatus::Pending
        } else if first_token.contains("RUNNING") {
            JobStatus::Running
        } else if first_token.contains("COMPLETED") {
            JobStatus::Completed
        } else if first_token.contains("CANCELLED") {
            JobStatus::Cancelled
        } else if first_token.contains("FAILED") {
            JobStatus::Failed
        } else {
            JobStatus::Unknown
        })
    }

    fn status_pbs(&self, id: &str) -> Result<JobStatus> {
        let cmd = format!("qstat -x -f -F json {id}");
        let out = run_cmd(&cmd, &RunCmdOptions::new().msg_err("qstat query failed"))?;
        let parsed: serde_json::Value = serde_json::from_str(&out).map_err(|e| {
            ClientError::Core(CStarError::Subprocess {
                command: cmd.clone(),
                code: Some(0),
                stderr: format!("Malformed qstat JSON: {e}"),
            })
        })?;
        let jobs = parsed.get("Jobs").ok_or_else(|| {
            ClientError::Core(CStarError::NotFound(format!(
                "PBS job '{id}' not found in qstat output"
            )))
        })?;
        let job = jobs.as_object().and_then(|m| m.values().next()).ok_or_else(|| {
            ClientError::Core(CStarError::NotFound(format!(
                "PBS job '{id}' not found in qstat output"
            )))
        })?;
        let state = job
            .get("job_state")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(match state {
            "Q" => JobStatus::Pending,
            "R" => JobStatus::Running,
            "C" => JobStatus::Completed,
            "H" => JobStatus::Held,
            "E" => JobStatus::Ending,
            "F" => {
                let exit_status = job.get("Exit_status").and_then(|v| v.as_i64()).unwrap_or(-1);
                if exit_status == 0 {
                    JobStatus::Completed
                } else {
                    JobStatus::Failed
                }
            }
            _ => JobStatus::Unknown,
        })
    }

    /// `cancel` (§4.F "Cancellation"): a no-op with a log line outside the
    /// scheduler's cancellable states.
    pub fn cancel(&self) -> Result<()> {
        let Some(id) = &self.id else {
            log_info!("Job has not been submitted; nothing to cancel.");
            return Ok(());
        };
        let status = self.status()?;
        let cancellable = match self.scheduler.as_ref() {
            Scheduler::Slurm(_) => matches!(status, JobStatus::Running | JobStatus::Pending),
            Scheduler::Pbs(_) => {
                matches!(status, JobStatus::Running | JobStatus::Pending | JobStatus::Held)
            }
        };
        if !cancellable {
            log_info!("Job {id} is in state {status:?}; not cancelling.");
            return Ok(());
        }
        let cmd = match self.scheduler.as_ref() {
            Scheduler::Slurm(_) => format!("scancel {id}"),
            Scheduler::Pbs(_) => format!("qdel {id}"),
        };
        run_cmd(&cmd, &RunCmdOptions::new().msg_err("Failed to cancel job"))?;
        Ok(())
    }
}

fn walltime_seconds(hhmmss: &str) -> u64 {
    let parts: Vec<u64> = hhmmss
        .split(':')
        .map(|p| p.parse().unwrap_or(0))
        .collect();
    match parts.as_slice() {
        [h, m, s] => h * 3600 + m * 60 + s,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{PbsScheduler, SlurmScheduler};

    fn slurm_scheduler(requires_task_distribution: bool) -> Arc<Scheduler> {
        Arc::new(Scheduler::Slurm(SlurmScheduler {
            queues: vec![Queue::SlurmQos {
                name: "regular".to_string(),
                query_name: None,
            }],
            primary_queue: "regular".to_string(),
            other_directives: BTreeMap::new(),
            requires_task_distribution,
        }))
    }

    fn pbs_scheduler() -> Arc<Scheduler> {
        Arc::new(Scheduler::Pbs(PbsScheduler {
            queues: vec![Queue::PbsQueue {
                name: "main".to_string(),
                max_walltime: "12:00:00".to_string(),
            }],
            primary_queue: "main".to_string(),
            other_directives: BTreeMap::new(),
        }))
    }

    #[test]
    fn slurm_script_without_task_distribution_uses_ntasks() {
        // The queue's max_walltime shells out to `sacctmgr`; stub it by
        // supplying an explicit walltime under the test environment's PATH
        // so construction doesn't depend on a live SLURM install. When
        // `sacctmgr` is unavailable the call fails, so we only assert the
        // parts of Job::new that don't require it by testing with an
        // explicit walltime and a scheduler whose queue bypasses the shell:
        // PBS queues carry a literal, so exercise that path for determinism.
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 300);
        params.walltime = Some("01:00:00".to_string());
        let job = Job::new(params).unwrap();
        assert_eq!(job.nodes, Some(3));
        assert_eq!(job.cpus_per_node, Some(100));
        assert!(job.pbs_script().contains("#PBS -l select=3:ncpus=100,walltime=01:00:00"));
    }

    #[test]
    fn pbs_dependency_chain_emits_depend_directive() {
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 128);
        params.walltime = Some("01:00:00".to_string());
        params.nodes = Some(1);
        params.depends_on = vec!["111".to_string(), "222".to_string()];
        let job = Job::new(params).unwrap();
        assert!(job
            .pbs_script()
            .contains("#PBS -W depend=afterok:111:222"));
    }

    #[test]
    fn walltime_over_queue_max_is_rejected() {
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 128);
        params.walltime = Some("13:00:00".to_string());
        params.nodes = Some(1);
        let err = Job::new(params).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Core(CStarError::Validation(_))
        ));
    }

    #[test]
    fn walltime_equal_to_queue_max_is_accepted() {
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 128);
        params.walltime = Some("12:00:00".to_string());
        params.nodes = Some(1);
        let job = Job::new(params).unwrap();
        assert_eq!(job.walltime, "12:00:00");
    }

    #[test]
    fn unset_walltime_adopts_queue_max() {
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 128);
        params.nodes = Some(1);
        let job = Job::new(params).unwrap();
        assert_eq!(job.walltime, "12:00:00");
    }

    #[test]
    fn nodes_given_derives_cpus_per_node() {
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 100);
        params.nodes = Some(4);
        params.walltime = Some("01:00:00".to_string());
        let job = Job::new(params).unwrap();
        assert_eq!(job.cpus_per_node, Some(25));
    }

    #[test]
    fn cpus_per_node_given_derives_nodes() {
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 101);
        params.cpus_per_node = Some(25);
        params.walltime = Some("01:00:00".to_string());
        let job = Job::new(params).unwrap();
        assert_eq!(job.nodes, Some(5));
    }

    #[test]
    fn unsubmitted_job_has_unsubmitted_status() {
        let scheduler = pbs_scheduler();
        let mut params = JobParams::new(scheduler, "echo hi", "acct1", 128);
        params.nodes = Some(1);
        params.walltime = Some("01:00:00".to_string());
        let job = Job::new(params).unwrap();
        assert_eq!(job.status().unwrap(), JobStatus::Unsubmitted);
    }

    #[test]
    fn walltime_normalization_round_trips_through_seconds() {
        assert_eq!(walltime_seconds("01:00:00"), 3600);
        assert_eq!(walltime_seconds("12:00:00"), 43200);
    }

    #[test]
    fn slurm_without_task_distribution_emits_ntasks_only() {
        // SlurmQos::max_walltime() shells out to `sacctmgr`, which this test
        // environment doesn't have; exercise script emission directly on a
        // hand-built Job instead of going through Job::new's validation path.
        let scheduler = slurm_scheduler(false);
        let job = Job {
            queue: scheduler.queues()[0].clone(),
            scheduler: scheduler.clone(),
            commands: "srun ./roms".to_string(),
            account_key: "m0000".to_string(),
            cpus: 128,
            nodes: None,
            cpus_per_node: None,
            script_path: PathBuf::from("/tmp/job.sh"),
            run_path: PathBuf::from("/tmp"),
            job_name: "job".to_string(),
            output_file: PathBuf::from("/tmp/job.out"),
            walltime: "01:00:00".to_string(),
            depends_on: vec![],
            id: None,
        };
        let script = job.slurm_script();
        assert!(script.contains("#SBATCH --ntasks=128"));
        assert!(!script.contains("--ntasks-per-node"));
    }

    #[test]
    fn slurm_with_task_distribution_emits_nodes_and_ntasks_per_node() {
        let scheduler = slurm_scheduler(true);
        let job = Job {
            queue: scheduler.queues()[0].clone(),
            scheduler: scheduler.clone(),
            commands: "srun ./roms".to_string(),
            account_key: "m0000".to_string(),
            cpus: 128,
            nodes: Some(2),
            cpus_per_node: Some(64),
            script_path: PathBuf::from("/tmp/job.sh"),
            run_path: PathBuf::from("/tmp"),
            job_name: "job".to_string(),
            output_file: PathBuf::from("/tmp/job.out"),
            walltime: "01:00:00".to_string(),
            depends_on: vec![],
            id: None,
        };
        let script = job.slurm_script();
        assert!(script.contains("#SBATCH --nodes=2 --ntasks-per-node=64"));
        assert!(script.contains("#SBATCH --qos=regular"));
    }
}
