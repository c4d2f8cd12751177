//! Charts for recorded resource samples.
//!
//! Reads the per-run sample table written by the supervisor and renders a CPU and a
//! memory panel into one SVG next to it.

use crate::error::{Result, WorkflowError};
use crate::resource::{self, ResourceRecord, ResourceSample};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;
use tracing::{info, warn};

const CHART_SIZE: (u32, u32) = (1200, 800);

/// Load the resource table from a run's log folder and write `Resource.svg` beside
/// it. A missing table is only warned about.
pub fn load_and_plot(folder: &Path) -> Result<()> {
    let table = folder.join(resource::RESOURCE_FILE);
    if !table.exists() {
        warn!(
            "cannot find any resource table in folder \"{}\"",
            folder.display()
        );
        return Ok(());
    }

    info!("load resource data from file {}", table.display());
    let records = resource::load_records(&table)?;

    let output = folder.join("Resource.svg");
    let name = folder
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    render(&records, &output, &name)?;
    info!("resource chart: {}", output.display());
    Ok(())
}

fn render(records: &[ResourceRecord], output: &Path, name: &str) -> Result<()> {
    // plot against seconds since the earliest sample
    let t0 = records
        .iter()
        .filter_map(|r| r.series.samples.first())
        .map(|s| s.t)
        .fold(f64::INFINITY, f64::min);
    if !t0.is_finite() {
        warn!("no resource samples recorded, nothing to plot");
        return Ok(());
    }

    let t_max = records
        .iter()
        .filter_map(|r| r.series.samples.last())
        .map(|s| s.t - t0)
        .fold(1.0, f64::max);
    let cpu_max = records
        .iter()
        .flat_map(|r| &r.series.samples)
        .map(|s| s.cpu as f64)
        .fold(10.0, f64::max);
    let mem_max = records
        .iter()
        .flat_map(|r| &r.series.samples)
        .map(|s| s.memory)
        .fold(10.0, f64::max);

    let root = SVGBackend::new(output, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(to_chart_err)?;
    let (upper, lower) = root.split_vertically((CHART_SIZE.1 / 2) as i32);

    draw_panel(
        &upper,
        &format!("CPU - {name}"),
        "CPU Percent",
        t0,
        t_max,
        cpu_max * 1.1,
        records,
        |s| s.cpu as f64,
    )?;
    draw_panel(
        &lower,
        &format!("Memory - {name}"),
        "Memory [MB]",
        t0,
        t_max,
        mem_max * 1.1,
        records,
        |s| s.memory,
    )?;

    root.present().map_err(to_chart_err)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    y_desc: &str,
    t0: f64,
    t_max: f64,
    y_max: f64,
    records: &[ResourceRecord],
    value: impl Fn(&ResourceSample) -> f64,
) -> Result<()> {
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..t_max, 0.0..y_max)
        .map_err(to_chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Timestamp [s]")
        .y_desc(y_desc)
        .draw()
        .map_err(to_chart_err)?;

    for (idx, record) in records.iter().enumerate() {
        if record.series.is_empty() {
            continue;
        }
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(
                record.series.samples.iter().map(|s| (s.t - t0, value(s))),
                color,
            ))
            .map_err(to_chart_err)?
            .label(record.module.name())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(to_chart_err)?;
    Ok(())
}

fn to_chart_err<E: std::fmt::Display>(err: E) -> WorkflowError {
    WorkflowError::Chart(err.to_string())
}
