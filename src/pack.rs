//! Pack channel model and fill-back target resolution.
//!
//! A dataset folder holds one `.pack` file per recorded sensor channel. Before the
//! player can replay a dataset, every logical channel kind has to be matched to a
//! concrete file so the player config can list its prefix and numeric channel id.

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Trailing channel id of a pack file name, e.g. `ODO#_2.pack` or `ODO#2.pack`.
static CHANNEL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.pack$").expect("channel id pattern"));

/// Logical kind of a recorded data channel.
///
/// The declaration order fixes each kind's ordinal, which in turn fixes the
/// participant id used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Adas,
    Imu,
    Gnss,
    WheelOdo,
    MapRecord,
    PerceptionRecord,
    Odo3d,
}

/// Payload framing of a channel, as spelled in the player config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Frame,
    Msgs,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Frame => f.write_str("frame"),
            MessageKind::Msgs => f.write_str("msgs"),
        }
    }
}

impl ChannelKind {
    fn ordinal(self) -> u32 {
        match self {
            ChannelKind::Adas => 1,
            ChannelKind::Imu => 2,
            ChannelKind::Gnss => 3,
            ChannelKind::WheelOdo => 4,
            ChannelKind::MapRecord => 5,
            ChannelKind::PerceptionRecord => 6,
            ChannelKind::Odo3d => 7,
        }
    }

    /// Communication participant id, derived from the ordinal.
    pub fn participant(self) -> u32 {
        self.ordinal() - 1
    }

    pub fn message_kind(self) -> MessageKind {
        match self {
            ChannelKind::Adas | ChannelKind::MapRecord | ChannelKind::PerceptionRecord => {
                MessageKind::Frame
            }
            _ => MessageKind::Msgs,
        }
    }

    /// Kinds a dataset may legitimately lack. Everything else aborts the dataset
    /// when no matching pack file is found.
    pub fn is_optional(self) -> bool {
        matches!(self, ChannelKind::Adas | ChannelKind::Odo3d)
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Adas => "ADAS",
            ChannelKind::Imu => "IMU",
            ChannelKind::Gnss => "GNSS",
            ChannelKind::WheelOdo => "ODO",
            ChannelKind::MapRecord => "MAPREC",
            ChannelKind::PerceptionRecord => "PERREC",
            ChannelKind::Odo3d => "ODO3D",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `target_options` entry of the player config, serialized verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOptions {
    pub prefix: String,
    pub participant: u32,
    pub channel: u32,
    pub domain_id: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub msgs: Vec<String>,
    pub mode: u32,
    pub ts_type: u32,
}

/// Fill-back settings for one channel kind.
///
/// `prefix` and `channel` start unresolved and are filled in by scanning a dataset
/// folder; the config is usable only once both are set.
#[derive(Debug, Clone)]
pub struct PackFillBackConfig {
    pub kind: ChannelKind,
    /// Candidate (prefix, suffix) pairs for the pack file name, tried in order
    candidates: Vec<(&'static str, &'static str)>,
    pub domain_id: i64,
    pub msgs: Vec<String>,
    /// 0: pub/sub, 1: req/rep
    pub mode: u32,
    /// 0: generation timestamp, 1: done timestamp
    pub ts_type: u32,
    pub prefix: Option<String>,
    pub channel: Option<u32>,
}

impl PackFillBackConfig {
    fn new(kind: ChannelKind, candidates: Vec<(&'static str, &'static str)>, domain_id: i64) -> Self {
        Self {
            kind,
            candidates,
            domain_id,
            msgs: Vec::new(),
            mode: 0,
            ts_type: 0,
            prefix: None,
            channel: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.prefix.is_some() && self.channel.is_some()
    }

    /// Scan the dataset folder's direct children for a pack file matching one of the
    /// candidate patterns. On the first match the prefix and the numeric channel id
    /// are recorded. Names are scanned in sorted order so resolution is stable.
    pub fn resolve(&mut self, dataset: &Path) -> Result<bool> {
        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(dataset)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        for (prefix, suffix) in &self.candidates {
            for name in &names {
                if !name.starts_with(prefix) || !name.ends_with(suffix) {
                    continue;
                }
                let Some(channel) = CHANNEL_ID
                    .captures(name)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                else {
                    continue;
                };
                self.prefix = Some((*prefix).to_string());
                self.channel = Some(channel);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Serializable `target_options` entry, available once resolved.
    pub fn target_options(&self) -> Option<TargetOptions> {
        Some(TargetOptions {
            prefix: self.prefix.clone()?,
            participant: self.kind.participant(),
            channel: self.channel?,
            domain_id: self.domain_id,
            kind: self.kind.message_kind(),
            msgs: self.msgs.clone(),
            mode: self.mode,
            ts_type: self.ts_type,
        })
    }
}

impl fmt::Display for PackFillBackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type: {:<8}, prefix: {:<8}, channel: {:<3}, participant: {:<3}",
            self.kind.name(),
            self.prefix.as_deref().unwrap_or("-"),
            self.channel.map_or_else(|| "-".to_string(), |c| c.to_string()),
            self.kind.participant(),
        )
    }
}

/// The channel kinds a dataset is scanned for, with their known file name patterns.
/// ADAS stays off the active list.
pub fn active_channel_set() -> Vec<PackFillBackConfig> {
    vec![
        PackFillBackConfig::new(
            ChannelKind::Imu,
            vec![("ASM330#", ".pack"), ("IMU", ".pack"), ("IMU#", ".pack")],
            0,
        ),
        PackFillBackConfig::new(
            ChannelKind::Gnss,
            vec![
                ("F9P#", ".pack"),
                ("UB482#", ".pack"),
                ("F9Kgnss#", ".pack"),
                ("gnss#", ".pack"),
            ],
            0,
        ),
        PackFillBackConfig::new(ChannelKind::WheelOdo, vec![("ODO#", ".pack")], 0),
        PackFillBackConfig::new(
            ChannelKind::MapRecord,
            vec![("MAPREC", "2.pack"), ("MAPREC", ".pack"), ("MAPRECBEV", ".pack")],
            -1,
        ),
        PackFillBackConfig::new(
            ChannelKind::PerceptionRecord,
            vec![("PERREC", "2.pack"), ("PERREC", ".pack"), ("PERRECBEVBR", ".pack")],
            -1,
        ),
        PackFillBackConfig::new(ChannelKind::Odo3d, vec![("ODO3D#", ".pack")], 0),
    ]
}

/// Resolve every active channel kind against a dataset folder.
///
/// Returns `Ok(None)` when a mandatory kind has no matching pack file; optional
/// kinds that fail to resolve are dropped from the returned list with a warning.
pub fn resolve_channels(dataset: &Path) -> Result<Option<Vec<PackFillBackConfig>>> {
    let mut resolved = Vec::new();
    for mut config in active_channel_set() {
        if config.resolve(dataset)? {
            info!("{config}");
            resolved.push(config);
        } else if config.kind.is_optional() {
            tracing::warn!("cannot find a suitable pack for {}", config.kind);
        } else {
            tracing::error!("cannot find a suitable pack for {}", config.kind);
            return Ok(None);
        }
    }
    Ok(Some(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_follows_ordinal() {
        assert_eq!(ChannelKind::Adas.participant(), 0);
        assert_eq!(ChannelKind::Imu.participant(), 1);
        assert_eq!(ChannelKind::Gnss.participant(), 2);
        assert_eq!(ChannelKind::WheelOdo.participant(), 3);
        assert_eq!(ChannelKind::MapRecord.participant(), 4);
        assert_eq!(ChannelKind::PerceptionRecord.participant(), 5);
        assert_eq!(ChannelKind::Odo3d.participant(), 6);
    }

    #[test]
    fn message_kind_table() {
        assert_eq!(ChannelKind::Adas.message_kind(), MessageKind::Frame);
        assert_eq!(ChannelKind::MapRecord.message_kind(), MessageKind::Frame);
        assert_eq!(ChannelKind::PerceptionRecord.message_kind(), MessageKind::Frame);
        assert_eq!(ChannelKind::Imu.message_kind(), MessageKind::Msgs);
        assert_eq!(ChannelKind::Gnss.message_kind(), MessageKind::Msgs);
        assert_eq!(ChannelKind::Odo3d.message_kind(), MessageKind::Msgs);
    }

    #[test]
    fn channel_id_pattern_accepts_both_name_styles() {
        assert!(CHANNEL_ID.captures("ODO#_2.pack").is_some());
        assert_eq!(&CHANNEL_ID.captures("ODO#_2.pack").unwrap()[1], "2");
        assert_eq!(&CHANNEL_ID.captures("ODO#2.pack").unwrap()[1], "2");
        assert_eq!(&CHANNEL_ID.captures("MAPREC_12.pack").unwrap()[1], "12");
        assert!(CHANNEL_ID.captures("ODO#.pack").is_none());
        assert!(CHANNEL_ID.captures("ODO#_2.pack.bak").is_none());
    }

    #[test]
    fn message_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MessageKind::Frame).unwrap(), "\"frame\"");
        assert_eq!(serde_json::to_string(&MessageKind::Msgs).unwrap(), "\"msgs\"");
    }
}
