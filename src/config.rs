//! In-place rewriting of the external module config files.
//!
//! Both modifiers run between iterations, after the previous module processes are
//! fully torn down, so nothing else reads the files while they are rewritten.
//! Dataset-level problems (missing folder, missing config file, unmatched mandatory
//! channel) return `Ok(false)` so the supervisor can skip to the next dataset;
//! malformed files and write failures propagate as errors.

use crate::error::{Result, WorkflowError};
use crate::pack;
use serde_json::{json, Value as JsonValue};
use serde_yaml::Value as YamlValue;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{error, info};

/// Relative location of the player config inside its app folder.
const FILLBACK_CONFIG: &str = "config/fglobal.json";
/// Relative location of the mapping config inside its app folder.
const MAPPING_CONFIG: &str = "config/config_full_pack.yaml";

/// Rewrites the fill-back player config so the next run replays one dataset folder.
pub struct FillbackConfigModifier {
    pack_folder: PathBuf,
    app_folder: PathBuf,
}

impl FillbackConfigModifier {
    pub fn new(pack_folder: impl Into<PathBuf>, app_folder: impl Into<PathBuf>) -> Self {
        Self {
            pack_folder: pack_folder.into(),
            app_folder: app_folder.into(),
        }
    }

    /// Resolve the dataset's channels and rewrite the config. Returns `Ok(false)`
    /// when this dataset cannot be played and should be skipped.
    pub fn apply(&self, speed: f64) -> Result<bool> {
        if !self.pack_folder.exists() {
            error!("input pack folder does not exist: {}", self.pack_folder.display());
            return Ok(false);
        }

        let config_path = self.app_folder.join(FILLBACK_CONFIG);
        if !config_path.exists() {
            error!("cannot find fill-back config file: {}", config_path.display());
            return Ok(false);
        }
        info!("fill-back config file: {}", config_path.display());

        let Some(channels) = pack::resolve_channels(&self.pack_folder)? else {
            return Ok(false);
        };

        let mut data: JsonValue = serde_json::from_reader(BufReader::new(File::open(&config_path)?))?;
        let fillback = data
            .get_mut("Fillback")
            .and_then(JsonValue::as_object_mut)
            .ok_or_else(|| WorkflowError::config("missing Fillback object", &config_path))?;

        fillback.insert(
            "file_paths".to_string(),
            json!([self.pack_folder.to_string_lossy()]),
        );

        // replay once, no looping
        *fillback
            .get_mut("Loop")
            .and_then(|v| v.get_mut("is_open"))
            .ok_or_else(|| WorkflowError::config("missing Loop.is_open", &config_path))? = json!(0);

        info!("fill-back speed: {speed:.3}");
        *fillback
            .get_mut("controller")
            .and_then(|v| v.get_mut("machineclock"))
            .and_then(|v| v.get_mut("speed"))
            .ok_or_else(|| {
                WorkflowError::config("missing controller.machineclock.speed", &config_path)
            })? = json!(speed);

        let targets: Vec<JsonValue> = channels
            .iter()
            .filter_map(|c| c.target_options())
            .map(|t| serde_json::to_value(t))
            .collect::<std::result::Result<_, _>>()?;
        fillback.insert("target_options".to_string(), JsonValue::Array(targets));

        serde_json::to_writer_pretty(File::create(&config_path)?, &data)?;
        Ok(true)
    }
}

/// Flags written into the mapping config before launch. The mapping binary reads
/// them once at its own startup.
#[derive(Debug, Clone, Copy)]
pub struct MappingToggles {
    pub use_internal_odo3d: bool,
    pub use_maprec_line: bool,
    pub auto_trigger_start: bool,
    pub auto_trigger_save: bool,
    /// Save trigger timestamp [ms]
    pub auto_trigger_save_timestamp: i64,
}

/// Rewrites the mapping module config in place.
pub struct MappingConfigModifier {
    app_folder: PathBuf,
}

impl MappingConfigModifier {
    pub fn new(app_folder: impl Into<PathBuf>) -> Self {
        Self {
            app_folder: app_folder.into(),
        }
    }

    pub fn apply(&self, toggles: MappingToggles) -> Result<bool> {
        let config_path = self.app_folder.join(MAPPING_CONFIG);
        if !config_path.exists() {
            error!("cannot find mapping config file: {}", config_path.display());
            return Ok(false);
        }
        info!("mapping config file: {}", config_path.display());

        let mut data: YamlValue = serde_yaml::from_reader(BufReader::new(File::open(&config_path)?))?;
        let mapping = data
            .as_mapping_mut()
            .ok_or_else(|| WorkflowError::config("mapping config is not a YAML mapping", &config_path))?;

        info!("use internal 3D odo: {}", toggles.use_internal_odo3d);
        info!("use line from maprec: {}", toggles.use_maprec_line);
        info!("auto trigger start: {}", toggles.auto_trigger_start);
        info!("auto trigger save: {}", toggles.auto_trigger_save);
        info!("auto trigger save timestamp: {}", toggles.auto_trigger_save_timestamp);

        let mut set = |key: &str, value: YamlValue| {
            mapping.insert(YamlValue::String(key.to_string()), value);
        };
        set("use_internal_odo3d", YamlValue::Bool(toggles.use_internal_odo3d));
        set("enable_fusion_mapping", YamlValue::Bool(!toggles.use_maprec_line));
        set("use_maprec_line", YamlValue::Bool(toggles.use_maprec_line));
        set("auto_trigger_start", YamlValue::Bool(toggles.auto_trigger_start));
        set("auto_trigger_save", YamlValue::Bool(toggles.auto_trigger_save));
        set(
            "auto_trigger_save_timestamp",
            YamlValue::Number(toggles.auto_trigger_save_timestamp.into()),
        );
        // the target slot trigger always follows the save trigger
        set("auto_trigger_target_slot", YamlValue::Bool(toggles.auto_trigger_save));

        serde_yaml::to_writer(File::create(&config_path)?, &data)?;
        Ok(true)
    }
}
