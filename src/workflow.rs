//! The dataset workflow supervisor.
//!
//! One sequential control loop: discover dataset folders, and for each one rewrite
//! the module configs, launch the pipeline processes in dependency order, poll their
//! liveness, salvage the map output and tear everything down before moving on.
//! Concurrency exists only at the OS process level; the supervisor itself never
//! spawns threads.

use crate::config::{FillbackConfigModifier, MappingConfigModifier, MappingToggles};
use crate::error::{Result, WorkflowError};
use crate::logging;
use crate::module::{ModuleKind, ModuleSet};
use crate::process::ProcessHandle;
use crate::resource::{self, ResourceRecord};
use crate::signal;
use chrono::Local;
use std::fs;
use std::io;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Liveness poll cadence.
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
/// Aggregate status is logged on every Nth tick to bound log volume.
const STATUS_LOG_EVERY: u32 = 20;
/// Time granted to the mapping module after the player finished a dataset.
const PLAYER_FINISH_GRACE: Duration = Duration::from_secs(3);
/// Extension of the map files produced by the mapping module.
const MAP_FILE_EXT: &str = "ndm";

/// Run-wide settings, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// Dataset folder, or a root holding dataset folders
    pub pack_root: PathBuf,
    /// Root for per-run log folders
    pub save_root: PathBuf,
    /// Playback speed handed to the player
    pub speed: f64,
    pub use_internal_odo3d: bool,
    pub use_maprec_line: bool,
    pub auto_trigger_start: bool,
    pub auto_trigger_save: bool,
    pub auto_trigger_save_timestamp: i64,
    /// Sample worker CPU/memory every monitor tick and keep a per-run table
    pub monitor_resource: bool,
}

enum TickOutcome {
    AllAlive,
    ModuleExited { player_finished: bool },
}

pub struct Workflow {
    options: WorkflowOptions,
    modules: ModuleSet,
    workflow_log_path: Option<PathBuf>,
    current_log_folder: Option<PathBuf>,
    latest_link: PathBuf,
    handles: Vec<ProcessHandle>,
    monitor_count: u32,
}

impl Workflow {
    pub fn new(options: WorkflowOptions, modules: ModuleSet) -> Self {
        let latest_link = options.save_root.join("latest");
        Self {
            options,
            modules,
            workflow_log_path: None,
            current_log_folder: None,
            latest_link,
            handles: Vec::new(),
            monitor_count: 0,
        }
    }

    /// Process every discovered dataset folder in order. Returns early when a stop
    /// is requested; per-dataset failures skip to the next dataset.
    pub fn run(&mut self) -> Result<()> {
        self.resolve_roots()?;
        self.init_session_log()?;

        let datasets = discover_pack_folders(&self.options.pack_root)?;
        info!("found {} pack folders", datasets.len());
        for (n, folder) in datasets.iter().enumerate() {
            info!("[{}/{}] {}", n + 1, datasets.len(), folder.display());
        }

        for (n, dataset) in datasets.iter().enumerate() {
            if signal::stop_requested() {
                break;
            }

            let title = format!(" [{}/{}] {} ", n + 1, datasets.len(), file_name_of(dataset));
            warn!("{title:=^80}");
            info!("pack folder: {} ...", dataset.display());

            self.make_log_folder(Some(dataset))?;
            self.monitor_count = 0;

            if !self.check_and_modify_configs(dataset)? {
                continue;
            }

            if let Err(err) = self.launch_modules() {
                error!("failed to launch modules: {err}");
                self.stop_modules();
                continue;
            }
            info!("{:=<80}", "");

            loop {
                if signal::stop_requested() {
                    warn!("stop workflow");
                    self.post_process()?;
                    break;
                }

                match self.monitor_tick() {
                    TickOutcome::AllAlive => {}
                    TickOutcome::ModuleExited { player_finished } => {
                        if player_finished {
                            // normal end of the dataset, let mapping flush its output
                            info!("wait 3s for the mapping module to finish");
                            thread::sleep(PLAYER_FINISH_GRACE);
                        }
                        self.post_process()?;
                        self.stop_modules();
                        break;
                    }
                }
            }

            if signal::stop_requested() {
                self.stop_modules();
                break;
            }
        }
        Ok(())
    }

    /// Ask the supervisor to stop. Also interrupts the running modules right away.
    pub fn request_stop(&self) {
        signal::request_stop();
    }

    /// Absolute roots keep the `latest` symlink target and the paths written into
    /// the player config valid regardless of the supervisor's own working directory.
    fn resolve_roots(&mut self) -> Result<()> {
        fs::create_dir_all(&self.options.save_root)?;
        self.options.save_root = fs::canonicalize(&self.options.save_root)?;
        self.latest_link = self.options.save_root.join("latest");
        self.options.pack_root = fs::canonicalize(&self.options.pack_root)?;
        Ok(())
    }

    fn init_session_log(&mut self) -> Result<()> {
        self.make_log_folder(None)?;
        let folder = self
            .current_log_folder
            .clone()
            .ok_or_else(|| WorkflowError::process("session log folder was not created"))?;
        let log_path = folder.join("workflow.log");
        logging::init_with_file(&log_path)?;
        self.workflow_log_path = Some(log_path);
        Ok(())
    }

    /// Create the log folder for one iteration, repoint the `latest` link at it and
    /// link the session's `workflow.log` into it.
    fn make_log_folder(&mut self, dataset: Option<&Path>) -> Result<()> {
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let name = match dataset {
            None => stamp.to_string(),
            Some(folder) => {
                let parent = folder
                    .parent()
                    .and_then(Path::file_name)
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{stamp}_{parent}_{}", file_name_of(folder))
            }
        };
        let folder = self.options.save_root.join(name);
        fs::create_dir_all(&folder)?;

        if fs::symlink_metadata(&self.latest_link).is_ok() {
            fs::remove_file(&self.latest_link)?;
        }
        unix_fs::symlink(&folder, &self.latest_link)?;
        info!("save module logs to \"{}\"", folder.display());

        if let Some(log_path) = self.workflow_log_path.as_ref() {
            let link = folder.join("workflow.log");
            if link != *log_path {
                unix_fs::symlink(log_path, &link)?;
            }
        }

        self.current_log_folder = Some(folder);
        Ok(())
    }

    /// Rewrite both module configs for this dataset. `Ok(false)` means the dataset
    /// is unusable and must be skipped.
    fn check_and_modify_configs(&self, dataset: &Path) -> Result<bool> {
        let fillback = FillbackConfigModifier::new(dataset, &self.modules.player.work_folder);
        if !fillback.apply(self.options.speed)? {
            return Ok(false);
        }

        let mapping = MappingConfigModifier::new(&self.modules.mapping.work_folder);
        mapping.apply(MappingToggles {
            use_internal_odo3d: self.options.use_internal_odo3d,
            use_maprec_line: self.options.use_maprec_line,
            auto_trigger_start: self.options.auto_trigger_start,
            auto_trigger_save: self.options.auto_trigger_save,
            auto_trigger_save_timestamp: self.options.auto_trigger_save_timestamp,
        })
    }

    /// Launch order is dependency order: consumers before the data producer, so the
    /// player never feeds modules that are not up yet.
    fn active_modules(&self) -> Vec<ModuleKind> {
        if self.options.auto_trigger_start {
            vec![ModuleKind::Mapping, ModuleKind::Player]
        } else {
            vec![ModuleKind::Loc, ModuleKind::Mapping, ModuleKind::Player]
        }
    }

    fn launch_modules(&mut self) -> Result<()> {
        for kind in self.active_modules() {
            let handle = self.launch_module(kind)?;
            signal::register_group(handle.pgid());
            self.handles.push(handle);
        }
        Ok(())
    }

    fn launch_module(&self, kind: ModuleKind) -> Result<ProcessHandle> {
        let config = self.modules.get(kind);
        let log_folder = self
            .current_log_folder
            .as_ref()
            .ok_or_else(|| WorkflowError::process("log folder was not prepared"))?;
        let log_path = log_folder.join(format!("{kind}.log"));

        info!("{:=^80}", format!(" {kind} "));
        info!("  command: {}", config.command_line());
        if kind != ModuleKind::Player {
            info!("  version: {}", self.obtain_version(kind));
        }
        info!("  work folder: {}", config.work_folder.display());
        info!("  log file: {}", log_path.display());

        let handle = ProcessHandle::launch(config, &log_path)?;
        info!("  PID: {:?}, worker PID: {:?}", handle.pid(), handle.worker_pid());
        Ok(handle)
    }

    /// First line of the module's `version` file for localization, the commit line
    /// for mapping. Missing files yield an empty string.
    fn obtain_version(&self, kind: ModuleKind) -> String {
        let version_file = self.modules.get(kind).work_folder.join("version");
        let Ok(content) = fs::read_to_string(&version_file) else {
            return String::new();
        };
        match kind {
            ModuleKind::Mapping => content
                .lines()
                .nth(1)
                .unwrap_or("")
                .replace("commit id: ", "")
                .trim()
                .to_string(),
            ModuleKind::Loc => content.lines().next().unwrap_or("").trim().to_string(),
            ModuleKind::Player => String::new(),
        }
    }

    /// Poll every handle once, most recently launched first. Sleeps for the monitor
    /// interval when everything is alive.
    fn monitor_tick(&mut self) -> TickOutcome {
        let mut status = String::new();
        let mut any_exited = false;
        let mut player_exited = false;

        for handle in self.handles.iter_mut().rev() {
            status.push_str(&format!("{}: ", handle.kind()));
            if handle.monitor(self.options.monitor_resource) {
                status.push_str("OK  ");
            } else {
                status.push_str("Error  ");
                any_exited = true;
                if handle.kind() == ModuleKind::Player {
                    player_exited = true;
                }
            }
        }

        if any_exited {
            warn!("{status}");
            TickOutcome::ModuleExited {
                player_finished: player_exited,
            }
        } else {
            if self.monitor_count % STATUS_LOG_EVERY == 0 {
                self.monitor_count = 0;
                info!("{status}");
            }
            self.monitor_count += 1;
            thread::sleep(MONITOR_INTERVAL);
            TickOutcome::AllAlive
        }
    }

    fn post_process(&self) -> Result<()> {
        let Some(log_folder) = self.current_log_folder.as_ref() else {
            return Ok(());
        };
        relocate_map_output(
            log_folder,
            &self.modules.mapping.work_folder,
            &self.modules.loc.work_folder,
        )?;
        list_map_files(log_folder);
        Ok(())
    }

    /// Stop every active module in reverse launch order (the data producer first),
    /// persist the resource samples and clear the handle list. Returns the stop
    /// order for logging and inspection.
    pub fn stop_modules(&mut self) -> Vec<ModuleKind> {
        info!("stop all modules");
        let mut order = Vec::new();
        for handle in self.handles.iter_mut().rev() {
            order.push(handle.kind());
            signal::unregister_group(handle.pgid());
            handle.stop();
        }

        if let Some(folder) = self.current_log_folder.clone() {
            if let Err(err) = self.save_monitor_resource(&folder) {
                error!("cannot save resource samples: {err}");
            }
        }

        self.handles.clear();
        info!("finish stopping all modules");
        order
    }

    fn save_monitor_resource(&self, folder: &Path) -> Result<()> {
        if !self.options.monitor_resource || self.handles.is_empty() {
            return Ok(());
        }
        let path = folder.join(resource::RESOURCE_FILE);
        info!("save resource samples to file: {}", path.display());
        let records: Vec<ResourceRecord> = self
            .handles
            .iter()
            .map(|h| ResourceRecord {
                module: h.kind(),
                series: h.series().clone(),
            })
            .collect();
        resource::save_records(&path, &records)
    }
}

/// Find every dataset folder under a root, in lexicographic path order.
///
/// A root that directly holds a `.pack` file is the single dataset; otherwise every
/// subfolder (at any depth) with a direct `.pack` file counts as one dataset.
pub fn discover_pack_folders(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if folder_has_pack(root)? {
        found.push(root.to_path_buf());
    } else {
        for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() && folder_has_pack(entry.path())? {
                found.push(entry.path().to_path_buf());
            }
        }
    }
    found.sort();
    Ok(found)
}

fn folder_has_pack(folder: &Path) -> Result<bool> {
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().map(|e| e == "pack").unwrap_or(false) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Move the map output of a finished iteration into its log folder.
///
/// A `failed` folder under the mapping output wins: it is moved in as `failed` and
/// its stale parent removed. Otherwise the first existing candidate map folder is
/// moved in as `map`.
pub fn relocate_map_output(log_folder: &Path, mapping_work: &Path, loc_work: &Path) -> Result<()> {
    let failed_src = mapping_work.join("map").join("failed");
    if failed_src.exists() {
        let dst = log_folder.join("failed");
        info!("move failed map: {} => {}", failed_src.display(), dst.display());
        move_path(&failed_src, &dst)?;
        if let Some(stale_parent) = failed_src.parent() {
            fs::remove_dir_all(stale_parent)?;
        }
        return Ok(());
    }

    let candidates = [
        mapping_work.join("..").join("map"),
        mapping_work.join("map"),
        loc_work.join("..").join("map"),
    ];
    for candidate in candidates {
        if candidate.exists() {
            let dst = log_folder.join("map");
            info!("move map: {} => {}", candidate.display(), dst.display());
            move_path(&candidate, &dst)?;
            break;
        }
    }
    Ok(())
}

/// Log every map file found under the run's log folder, flagging the ones that came
/// out of a `failed` path.
fn list_map_files(log_folder: &Path) {
    for entry in WalkDir::new(log_folder).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != MAP_FILE_EXT) {
            continue;
        }
        info!("map file: {}", path.display());
        if path.to_string_lossy().contains("failed") {
            error!("mapping failed");
        } else {
            warn!("mapping success");
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Rename, falling back to copy and delete when the destination is on another
/// filesystem.
fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_tree(src, dst)?;
            if src.is_dir() {
                fs::remove_dir_all(src)
            } else {
                fs::remove_file(src)
            }
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleConfig;
    use serial_test::serial;
    use tempfile::tempdir;

    fn test_workflow(work: &Path, auto_trigger_start: bool) -> Workflow {
        let options = WorkflowOptions {
            pack_root: work.join("packs"),
            save_root: work.join("log"),
            speed: 1.0,
            use_internal_odo3d: true,
            use_maprec_line: true,
            auto_trigger_start,
            auto_trigger_save: true,
            auto_trigger_save_timestamp: 0,
            monitor_resource: false,
        };
        let modules = ModuleSet::with_default_apps(
            work.join("player"),
            work.join("mapping"),
            work.join("loc"),
        );
        Workflow::new(options, modules)
    }

    fn shell_handle(kind: ModuleKind, script: &str, work: &Path) -> ProcessHandle {
        let config = ModuleConfig::new(
            kind,
            "sh",
            "sleep",
            vec!["-c".into(), script.into()],
            work,
        );
        ProcessHandle::launch(&config, &work.join(format!("{kind}.log"))).expect("launch")
    }

    #[test]
    fn active_set_depends_on_auto_trigger_start() {
        let dir = tempdir().expect("temp dir");
        let manual = test_workflow(dir.path(), false);
        assert_eq!(
            manual.active_modules(),
            vec![ModuleKind::Loc, ModuleKind::Mapping, ModuleKind::Player]
        );
        let auto = test_workflow(dir.path(), true);
        assert_eq!(auto.active_modules(), vec![ModuleKind::Mapping, ModuleKind::Player]);
    }

    #[test]
    #[serial]
    fn teardown_runs_in_reverse_launch_order() {
        let dir = tempdir().expect("temp dir");
        let mut workflow = test_workflow(dir.path(), false);
        for kind in [ModuleKind::Loc, ModuleKind::Mapping, ModuleKind::Player] {
            workflow.handles.push(shell_handle(kind, "sleep 30; exit 0", dir.path()));
        }

        let order = workflow.stop_modules();
        assert_eq!(order, vec![ModuleKind::Player, ModuleKind::Mapping, ModuleKind::Loc]);
        assert!(workflow.handles.is_empty());
    }

    #[test]
    #[serial]
    fn player_exit_is_classified_as_dataset_finished() {
        let dir = tempdir().expect("temp dir");
        let mut workflow = test_workflow(dir.path(), false);
        workflow.handles.push(shell_handle(ModuleKind::Loc, "sleep 30; exit 0", dir.path()));
        workflow.handles.push(shell_handle(ModuleKind::Mapping, "sleep 30; exit 0", dir.path()));
        workflow.handles.push(shell_handle(ModuleKind::Player, "sleep 1; exit 0", dir.path()));

        let mut player_finished = None;
        for _ in 0..15 {
            match workflow.monitor_tick() {
                TickOutcome::AllAlive => {}
                TickOutcome::ModuleExited { player_finished: p } => {
                    player_finished = Some(p);
                    break;
                }
            }
        }
        workflow.stop_modules();
        assert_eq!(player_finished, Some(true));
    }

    #[test]
    #[serial]
    fn mapping_exit_is_classified_as_error() {
        let dir = tempdir().expect("temp dir");
        let mut workflow = test_workflow(dir.path(), false);
        workflow.handles.push(shell_handle(ModuleKind::Loc, "sleep 30; exit 0", dir.path()));
        workflow.handles.push(shell_handle(ModuleKind::Mapping, "sleep 1; exit 0", dir.path()));
        workflow.handles.push(shell_handle(ModuleKind::Player, "sleep 30; exit 0", dir.path()));

        let mut player_finished = None;
        for _ in 0..15 {
            match workflow.monitor_tick() {
                TickOutcome::AllAlive => {}
                TickOutcome::ModuleExited { player_finished: p } => {
                    player_finished = Some(p);
                    break;
                }
            }
        }
        workflow.stop_modules();
        assert_eq!(player_finished, Some(false));
    }
}
