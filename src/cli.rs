//! Command line surface.

use crate::module::ModuleSet;
use crate::workflow::WorkflowOptions;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "mapflow", version, about = "Dataset replay workflow runner for the mapping/localization pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the workflow over every dataset under the pack folder
    Run(RunArgs),
    /// Load recorded resource samples from a log folder and render a chart
    Plot {
        /// Folder containing the recorded resource table
        folder: String,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pack folder or pack root folder
    #[arg(long, default_value = "./data")]
    pub pack_folder: String,

    /// Data/log saving root folder
    #[arg(long, default_value = "./log")]
    pub save_folder: String,

    /// Monitor process resource usage and keep a per-run sample table
    #[arg(long)]
    pub monitor: bool,

    /// Speed to fill back pack data
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Use an external 3D odometry source instead of the vehicle's internal one
    #[arg(long)]
    pub use_extra_odo3d: bool,

    /// Do not use the line feature from the map record
    #[arg(long)]
    pub no_use_maprec_line: bool,

    /// Auto trigger the start command of the map manager
    #[arg(long)]
    pub auto_trigger_start: bool,

    /// Do not auto trigger the save command of the map manager
    #[arg(long)]
    pub no_auto_trigger_save: bool,

    /// Auto trigger save timestamp [ms]
    #[arg(long, default_value_t = 0)]
    pub auto_save_timestamp: i64,

    /// Fill-back player app folder
    #[arg(long)]
    pub player_folder: String,

    /// Mapping app folder
    #[arg(long)]
    pub mapping_folder: String,

    /// Localization app folder
    #[arg(long)]
    pub loc_folder: String,
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl RunArgs {
    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            pack_root: expand(&self.pack_folder),
            save_root: expand(&self.save_folder),
            speed: self.speed,
            use_internal_odo3d: !self.use_extra_odo3d,
            use_maprec_line: !self.no_use_maprec_line,
            auto_trigger_start: self.auto_trigger_start,
            auto_trigger_save: !self.no_auto_trigger_save,
            auto_trigger_save_timestamp: self.auto_save_timestamp,
            monitor_resource: self.monitor,
        }
    }

    pub fn module_set(&self) -> ModuleSet {
        ModuleSet::with_default_apps(
            expand(&self.player_folder),
            expand(&self.mapping_folder),
            expand(&self.loc_folder),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negated_flags_invert_into_options() {
        let cli = Cli::parse_from([
            "mapflow",
            "run",
            "--player-folder",
            "/opt/player",
            "--mapping-folder",
            "/opt/mapping",
            "--loc-folder",
            "/opt/loc",
            "--use-extra-odo3d",
            "--no-auto-trigger-save",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };

        let options = args.workflow_options();
        assert!(!options.use_internal_odo3d);
        assert!(options.use_maprec_line);
        assert!(!options.auto_trigger_save);
        assert!(!options.auto_trigger_start);
        assert_eq!(options.speed, 1.0);
    }

    #[test]
    fn module_folders_are_required() {
        let result = Cli::try_parse_from(["mapflow", "run"]);
        assert!(result.is_err());
    }
}
