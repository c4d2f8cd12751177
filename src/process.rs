//! Handle for one launched pipeline module.
//!
//! The launched command is usually a wrapper script, so the handle also tracks the
//! descendant process that does the actual work; liveness is judged on the launched
//! process, resource usage is sampled from the worker.

use crate::error::Result;
use crate::module::{ModuleConfig, ModuleKind};
use crate::platform;
use crate::resource::ResourceSeries;
use chrono::Utc;
use psutil::process::Process as WorkerProcess;
use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Attempts made to find the worker among the launched process's descendants.
/// Wrapper scripts can take a moment to exec the real program.
const WORKER_DISCOVERY_ATTEMPTS: u32 = 5;
const WORKER_DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period between the group interrupt and the forced kill.
const STOP_GRACE: Duration = Duration::from_secs(10);
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ProcessHandle {
    kind: ModuleKind,
    real_app: String,
    pgid: i32,
    child: Option<Child>,
    worker: Option<WorkerProcess>,
    series: ResourceSeries,
}

impl ProcessHandle {
    /// Start a module in its work folder with stdout/stderr redirected to `log_path`,
    /// then try to locate its worker process.
    pub fn launch(config: &ModuleConfig, log_path: &Path) -> Result<Self> {
        let log_file = File::create(log_path)?;
        let log_err = log_file.try_clone()?;

        let mut command = Command::new(&config.app);
        command
            .args(&config.arguments)
            .current_dir(&config.work_folder)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_err));

        // Own process group so the whole module tree can be signalled at once, and
        // die with the supervisor on Linux.
        unsafe {
            command.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                #[cfg(target_os = "linux")]
                {
                    if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) != 0 {
                        return Err(io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }

        let child = command.spawn()?;
        let pid = child.id();
        let pgid = platform::process_group_of(pid);

        let mut handle = Self {
            kind: config.kind,
            real_app: config.real_app.clone(),
            pgid,
            child: Some(child),
            worker: None,
            series: ResourceSeries::default(),
        };
        handle.find_worker();
        Ok(handle)
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.worker.as_ref().map(WorkerProcess::pid)
    }

    /// Process group of the launched command; stays valid for signalling even after
    /// the handle is cleared.
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub fn series(&self) -> &ResourceSeries {
        &self.series
    }

    /// Whether the launched process is still running. When it is, resource sampling
    /// is enabled and a worker was found, one CPU/memory sample is appended.
    pub fn monitor(&mut self, sample_resources: bool) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        let alive = matches!(child.try_wait(), Ok(None));
        if alive && sample_resources {
            if let Some(worker) = self.worker.as_mut() {
                let t = Utc::now().timestamp_millis() as f64 / 1000.0;
                match (worker.cpu_percent(), worker.memory_info()) {
                    (Ok(cpu), Ok(memory)) => {
                        self.series.push(t, cpu, memory.rss() as f64 / 1024.0 / 1024.0);
                    }
                    _ => debug!("cannot sample resources of {}", self.kind),
                }
            }
        }
        alive
    }

    /// Stop the module. Interrupt the process group first and give it time to exit
    /// on its own; only when that fails is the whole tree killed. Safe to call any
    /// number of times, also when the process is already gone.
    pub fn stop(&mut self) {
        warn!("stop process {}", self.kind);
        let Some(mut child) = self.child.take() else {
            self.worker = None;
            return;
        };

        // already exited, try_wait also reaps it
        if !matches!(child.try_wait(), Ok(None)) {
            self.worker = None;
            return;
        }

        platform::interrupt_group(self.pgid);

        let deadline = Instant::now() + STOP_GRACE;
        let mut exited_normally = false;
        loop {
            if !matches!(child.try_wait(), Ok(None)) {
                exited_normally = true;
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        if !exited_normally {
            let pid = child.id();
            info!("{} PID = {} did not stop, killing the process tree", self.kind, pid);
            for descendant in platform::descendants(pid) {
                platform::kill_process(descendant.pid());
            }
            platform::kill_process(pid);
            let _ = child.wait();
        }

        self.worker = None;
    }

    fn find_worker(&mut self) {
        let Some(pid) = self.pid() else {
            return;
        };

        for _ in 0..WORKER_DISCOVERY_ATTEMPTS {
            if let Some(worker) = platform::find_descendant_by_name(pid, &self.real_app) {
                self.worker = Some(worker);
                return;
            }
            thread::sleep(WORKER_DISCOVERY_INTERVAL);
        }
        warn!(
            "cannot find the worker process of {} with name: {}",
            self.kind, self.real_app
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    fn shell_module(kind: ModuleKind, script: &str, work: &Path) -> ModuleConfig {
        ModuleConfig::new(
            kind,
            "sh",
            "sleep",
            vec!["-c".into(), script.into()],
            work,
        )
    }

    #[test]
    #[serial]
    fn launch_discovers_shell_worker() {
        let dir = tempdir().expect("temp dir");
        let config = shell_module(ModuleKind::Mapping, "sleep 10; exit 0", dir.path());
        let mut handle = ProcessHandle::launch(&config, &dir.path().join("Mapping.log")).expect("launch");

        assert!(handle.monitor(false));
        assert!(handle.worker_pid().is_some(), "sleep child should be discovered");
        handle.stop();
        assert!(!handle.monitor(false));
    }

    #[test]
    #[serial]
    fn stop_is_idempotent_after_natural_exit() {
        let dir = tempdir().expect("temp dir");
        let config = shell_module(ModuleKind::Player, "exit 0", dir.path());
        let mut handle = ProcessHandle::launch(&config, &dir.path().join("Player.log")).expect("launch");

        // wait for the shell to finish on its own
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.monitor(false) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(!handle.monitor(false));

        handle.stop();
        handle.stop();
        assert!(handle.pid().is_none());
        assert!(handle.worker_pid().is_none());
    }

    #[test]
    #[serial]
    fn monitor_reports_death() {
        let dir = tempdir().expect("temp dir");
        let config = shell_module(ModuleKind::Player, "sleep 0.2; exit 0", dir.path());
        let mut handle = ProcessHandle::launch(&config, &dir.path().join("Player.log")).expect("launch");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut alive = handle.monitor(false);
        while alive && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
            alive = handle.monitor(false);
        }
        assert!(!alive);
        handle.stop();
    }
}
