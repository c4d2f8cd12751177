//! Recorded CPU/memory usage of the supervised modules.
//!
//! Samples are collected by the monitor loop and written as one binary table per run
//! so they can be charted later without rerunning anything.

use crate::error::Result;
use crate::module::ModuleKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// File name of the per-run sample table.
pub const RESOURCE_FILE: &str = "Resource.bin";

/// One point-in-time measurement of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Wall clock, seconds since the unix epoch
    pub t: f64,
    /// CPU usage since the previous sample [%]
    pub cpu: f32,
    /// Resident set size [MB]
    pub memory: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSeries {
    pub samples: Vec<ResourceSample>,
}

impl ResourceSeries {
    pub fn push(&mut self, t: f64, cpu: f32, memory: f64) {
        self.samples.push(ResourceSample { t, cpu, memory });
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Sample series of one module over one dataset run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub module: ModuleKind,
    pub series: ResourceSeries,
}

pub fn save_records(path: &Path, records: &[ResourceRecord]) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, records)?;
    Ok(())
}

pub fn load_records(path: &Path) -> Result<Vec<ResourceRecord>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_survives_disk_roundtrip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(RESOURCE_FILE);

        let mut series = ResourceSeries::default();
        series.push(1000.0, 12.5, 340.0);
        series.push(1001.0, 48.0, 351.5);
        let records = vec![
            ResourceRecord {
                module: ModuleKind::Mapping,
                series,
            },
            ResourceRecord {
                module: ModuleKind::Player,
                series: ResourceSeries::default(),
            },
        ];

        save_records(&path, &records).expect("save");
        let loaded = load_records(&path).expect("load");
        assert_eq!(records, loaded);
    }
}
