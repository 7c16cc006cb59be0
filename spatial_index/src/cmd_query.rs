/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use structopt::StructOpt;

use spatial_core::geometry::{GeometryKind, Rect};
use spatial_core::master_table::load_master_table;
use spatial_core::query::{cardinality, clipped_area, execute_query};
use spatial_core::rtree_index::build_partition_rtree;

const TASK_HEADER: &[&str] = &[
    "pathDatasets",
    "nameDataset",
    "pathSummaries",
    "nameSummary",
    "pathIndexes",
    "pathRangeQueries",
    "nameRangeQueries",
];

const OUTPUT_HEADER: &[&str] = &[
    "datasetName",
    "numQuery",
    "queryArea",
    "minX",
    "minY",
    "maxX",
    "maxY",
    "areaint",
    "cardinality",
    "mbrTests",
    "averageExecutionTime",
    "numberParallelThreads",
    "totalExecutionTime",
];

/// Results are buffered per dataset and flushed once this many queries have
/// accumulated, to bound memory on large range-query batches.
const BUFFER_SIZE: usize = 250;

#[derive(StructOpt)]
pub struct QueryArgs {
    #[structopt(
        long,
        parse(from_os_str),
        help = "Semicolon-separated CSV listing the range-query jobs to run"
    )]
    pub tasks: PathBuf,
    #[structopt(
        long,
        parse(from_os_str),
        default_value = "rangeQueriesResult",
        help = "Directory results are written to"
    )]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct QueryTask {
    #[serde(rename = "pathDatasets")]
    path_datasets: String,
    #[serde(rename = "nameDataset")]
    name_dataset: String,
    #[serde(rename = "pathSummaries")]
    path_summaries: String,
    #[serde(rename = "nameSummary")]
    name_summary: String,
    #[serde(rename = "pathIndexes")]
    path_indexes: String,
    #[serde(rename = "pathRangeQueries")]
    path_range_queries: String,
    #[serde(rename = "nameRangeQueries")]
    name_range_queries: String,
}

struct DatasetSummary {
    envelope: Rect,
    total_geometries: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct RangeQueryRow {
    #[serde(rename = "datasetName")]
    dataset_name: String,
    #[serde(rename = "numQuery")]
    num_query: i64,
    #[serde(rename = "minX")]
    min_x: f64,
    #[serde(rename = "minY")]
    min_y: f64,
    #[serde(rename = "maxX")]
    max_x: f64,
    #[serde(rename = "maxY")]
    max_y: f64,
}

/// Runs every row of the range-query task CSV sequentially: each row
/// describes one dataset's worth of queries, which internally still fans
/// out across candidate partitions via [`execute_query`].
pub fn run_query(args: &QueryArgs) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(&args.tasks)
        .with_context(|| format!("opening query task list {}", args.tasks.display()))?;

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if TASK_HEADER.iter().any(|h| !headers.iter().any(|f| f == h)) {
        bail!(
            "query task list {} header mismatch: expected {:?}, found {:?}",
            args.tasks.display(),
            TASK_HEADER,
            headers
        );
    }

    let tasks: Vec<QueryTask> = reader
        .deserialize()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("reading query task list {}", args.tasks.display()))?;

    std::fs::create_dir_all(&args.output_dir)?;

    for task in &tasks {
        if let Err(err) = run_one(task, &args.output_dir) {
            log::warn!("skipping dataset {}: {}", task.name_dataset, err);
        }
    }

    Ok(())
}

fn run_one(task: &QueryTask, output_dir: &Path) -> Result<()> {
    let dataset_name = strip_geometry_ext(&task.name_dataset);

    let summary_path = Path::new(&task.path_summaries).join(&task.name_summary);
    let summary = load_dataset_summary(&summary_path, dataset_name)?;

    let dataset_last = Path::new(&task.path_datasets)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(&task.path_datasets);
    let output_path = output_dir.join(format!("rqR_{}.csv", dataset_last));
    purge_dataset_rows(&output_path, dataset_name)?;

    let range_queries_path = Path::new(&task.path_range_queries).join(&task.name_range_queries);
    let queries = load_range_queries(&range_queries_path, dataset_name)?;

    let partitions = load_master_table(
        &Path::new(&task.path_indexes).join("master_table.csv"),
        Path::new(&task.path_indexes),
    )?;
    let partition_rtree = build_partition_rtree(&partitions);

    log::info!(
        "running {} range queries for dataset '{}'",
        queries.len(),
        dataset_name
    );

    let mut buffer: Vec<[String; 13]> = Vec::with_capacity(BUFFER_SIZE);
    for rq in &queries {
        let query_rect = Rect::new(rq.min_x, rq.min_y, rq.max_x, rq.max_y);
        let outcome = execute_query(&query_rect, &partitions, &partition_rtree);
        let query_area = query_rect.area();
        let area_int = clipped_area(&query_rect, &summary.envelope);
        let card = cardinality(outcome.matches, summary.total_geometries);

        buffer.push([
            dataset_name.to_string(),
            rq.num_query.to_string(),
            query_area.to_string(),
            rq.min_x.to_string(),
            rq.min_y.to_string(),
            rq.max_x.to_string(),
            rq.max_y.to_string(),
            area_int.to_string(),
            card.to_string(),
            outcome.mbr_tests.to_string(),
            outcome.avg_thread_time_ms.to_string(),
            outcome.parallel_threads.to_string(),
            outcome.total_time_ms.to_string(),
        ]);

        if buffer.len() >= BUFFER_SIZE {
            flush_buffer(&output_path, &mut buffer)?;
        }
    }

    if !buffer.is_empty() {
        flush_buffer(&output_path, &mut buffer)?;
    }

    Ok(())
}

fn strip_geometry_ext(name: &str) -> &str {
    name.strip_suffix(".csv")
        .or_else(|| name.strip_suffix(".wkt"))
        .unwrap_or(name)
}

fn load_dataset_summary(path: &Path, dataset_name: &str) -> Result<DatasetSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("opening summary file {}", path.display()))?;

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    let col = |name: &str| headers.iter().position(|h| h == name);

    let name_idx = col("datasetName").context("summary missing 'datasetName' column")?;
    let geom_idx = col("geometry").context("summary missing 'geometry' column")?;
    let x1_idx = col("x1").context("summary missing 'x1' column")?;
    let y1_idx = col("y1").context("summary missing 'y1' column")?;
    let x2_idx = col("x2").context("summary missing 'x2' column")?;
    let y2_idx = col("y2").context("summary missing 'y2' column")?;
    let count_idx = col("num_features").context("summary missing 'num_features' column")?;

    for record in reader.records() {
        let record = record?;
        if record.get(name_idx) != Some(dataset_name) {
            continue;
        }
        // Validate the geometry column even though the kind itself is read
        // per-partition from the master table, not from the summary.
        let _: GeometryKind = record
            .get(geom_idx)
            .unwrap_or_default()
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        return Ok(DatasetSummary {
            envelope: Rect::new(
                record.get(x1_idx).unwrap_or("0").parse()?,
                record.get(y1_idx).unwrap_or("0").parse()?,
                record.get(x2_idx).unwrap_or("0").parse()?,
                record.get(y2_idx).unwrap_or("0").parse()?,
            ),
            total_geometries: record.get(count_idx).unwrap_or("0").parse()?,
        });
    }

    bail!(
        "dataset '{}' not found in summary file {}",
        dataset_name,
        path.display()
    )
}

fn load_range_queries(path: &Path, dataset_name: &str) -> Result<Vec<RangeQueryRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("opening range queries file {}", path.display()))?;

    let rows: std::result::Result<Vec<RangeQueryRow>, _> = reader.deserialize().collect();
    let rows = rows.with_context(|| format!("reading range queries file {}", path.display()))?;
    Ok(rows
        .into_iter()
        .filter(|r| r.dataset_name == dataset_name)
        .collect())
}

/// Drops any existing rows for `dataset_name` from the output file, so a
/// rerun replaces that dataset's results instead of appending duplicates.
/// Creates the file with just the header if it does not exist yet.
fn purge_dataset_rows(path: &Path, dataset_name: &str) -> Result<()> {
    let existing: Vec<csv::StringRecord> = if path.exists() {
        let mut reader = csv::ReaderBuilder::new().delimiter(b';').from_path(path)?;
        let headers = reader.headers()?.clone();
        let name_idx = headers.iter().position(|h| h == "datasetName");
        reader
            .records()
            .filter_map(|r| r.ok())
            .filter(|r| match name_idx {
                Some(idx) => r.get(idx) != Some(dataset_name),
                None => true,
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
    writer.write_record(OUTPUT_HEADER)?;
    for record in existing {
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn flush_buffer(path: &Path, buffer: &mut Vec<[String; 13]>) -> Result<()> {
    let file = OpenOptions::new().append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(file);
    for row in buffer.iter() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    buffer.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_known_extensions() {
        assert_eq!(strip_geometry_ext("points.csv"), "points");
        assert_eq!(strip_geometry_ext("shapes.wkt"), "shapes");
        assert_eq!(strip_geometry_ext("noext"), "noext");
    }

    #[test]
    fn purge_then_recreate_keeps_other_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rqR_batch.csv");
        std::fs::write(
            &path,
            "datasetName;numQuery;queryArea;minX;minY;maxX;maxY;areaint;cardinality;mbrTests;averageExecutionTime;numberParallelThreads;totalExecutionTime\nother;1;1;0;0;1;1;1;0.5;10;1;1;1\n",
        )
        .unwrap();

        purge_dataset_rows(&path, "points").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("other"));
    }
}
