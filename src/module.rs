//! Module identities and launch configuration.
//!
//! The pipeline is made of three external programs: the pack fill-back player that
//! replays recorded sensor data, the mapping module and the localization module.
//! Each is started through a wrapper script, so the launch command and the name of
//! the process doing the actual work are tracked separately.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the three supervised pipeline modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Pack fill-back player feeding recorded data into the pipeline
    Player,
    Mapping,
    Loc,
}

impl ModuleKind {
    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Player => "Player",
            ModuleKind::Mapping => "Mapping",
            ModuleKind::Loc => "Loc",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Launch configuration for one module. Immutable once constructed.
///
/// `app` is the command used to start the module, usually a wrapper script that
/// prepares library paths and environment. `real_app` is the executable name of the
/// process that does the actual work and is what resource monitoring attaches to.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    pub kind: ModuleKind,
    pub app: String,
    pub real_app: String,
    pub arguments: Vec<String>,
    pub work_folder: PathBuf,
}

impl ModuleConfig {
    pub fn new(
        kind: ModuleKind,
        app: impl Into<String>,
        real_app: impl Into<String>,
        arguments: Vec<String>,
        work_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            app: app.into(),
            real_app: real_app.into(),
            arguments,
            work_folder: work_folder.into(),
        }
    }

    /// Full command line as logged, for display only.
    pub fn command_line(&self) -> String {
        if self.arguments.is_empty() {
            self.app.clone()
        } else {
            format!("{} {}", self.app, self.arguments.join(" "))
        }
    }
}

/// The fixed set of module configs for one run, built by the CLI layer and handed to
/// the supervisor. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct ModuleSet {
    pub player: ModuleConfig,
    pub mapping: ModuleConfig,
    pub loc: ModuleConfig,
}

impl ModuleSet {
    /// Build the module set with the stock wrapper scripts of the shipped pipeline.
    pub fn with_default_apps(
        player_folder: impl AsRef<Path>,
        mapping_folder: impl AsRef<Path>,
        loc_folder: impl AsRef<Path>,
    ) -> Self {
        Self {
            player: ModuleConfig::new(
                ModuleKind::Player,
                "./bolepack.sh",
                "bolepack",
                vec!["-fillback".into(), "./config/fglobal.json".into()],
                player_folder.as_ref(),
            ),
            mapping: ModuleConfig::new(
                ModuleKind::Mapping,
                "./ndm_envmodel_run.sh",
                "ndm_envmodel",
                Vec::new(),
                mapping_folder.as_ref(),
            ),
            loc: ModuleConfig::new(
                ModuleKind::Loc,
                "./run_localization_x86.sh",
                "navinet_parking",
                Vec::new(),
                loc_folder.as_ref(),
            ),
        }
    }

    pub fn get(&self, kind: ModuleKind) -> &ModuleConfig {
        match kind {
            ModuleKind::Player => &self.player,
            ModuleKind::Mapping => &self.mapping,
            ModuleKind::Loc => &self.loc,
        }
    }
}
