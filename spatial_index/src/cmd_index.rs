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
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Deserialize;
use structopt::StructOpt;

use spatial_core::dataset::load_dataset;
use spatial_core::master_table::write_master_table;
use spatial_core::partition::{calculate_partition_params, min_leaf_area, PartitionMode};
use spatial_core::quadtree::{build_quadtree, DEFAULT_FLUSH_THRESHOLD};

const HEADER: &[&str] = &[
    "pathDatasets",
    "nameDataset",
    "pathIndexes",
    "typePartition",
    "num",
];

#[derive(StructOpt)]
pub struct IndexArgs {
    #[structopt(
        long,
        parse(from_os_str),
        help = "Semicolon-separated CSV listing the indexing jobs to run"
    )]
    pub tasks: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexTask {
    #[serde(rename = "pathDatasets")]
    path_datasets: String,
    #[serde(rename = "nameDataset")]
    name_dataset: String,
    #[serde(rename = "pathIndexes")]
    path_indexes: String,
    #[serde(rename = "typePartition")]
    type_partition: String,
    num: i64,
}

/// Runs every row of the indexing task CSV, distributing datasets across a
/// worker pool sized to leave one core free for the rest of the system. A
/// header mismatch aborts the whole batch; a bad row only skips its
/// dataset.
pub fn run_index(args: &IndexArgs) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(&args.tasks)
        .with_context(|| format!("opening indexing task list {}", args.tasks.display()))?;

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if HEADER.iter().any(|h| !headers.iter().any(|f| f == h)) {
        bail!(
            "indexing task list {} header mismatch: expected {:?}, found {:?}",
            args.tasks.display(),
            HEADER,
            headers
        );
    }

    let tasks: Vec<IndexTask> = reader
        .deserialize()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("reading indexing task list {}", args.tasks.display()))?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(num_cpus::get().saturating_sub(1).max(1))
        .build()
        .context("building indexing worker pool")?;

    pool.install(|| {
        tasks.par_iter().for_each(|task| {
            if let Err(err) = run_one(task) {
                log::warn!("skipping dataset {}: {}", task.name_dataset, err);
            }
        });
    });

    Ok(())
}

fn run_one(task: &IndexTask) -> Result<()> {
    let dataset_path = Path::new(&task.path_datasets).join(&task.name_dataset);
    let dataset = load_dataset(&dataset_path)?;

    if dataset.is_empty() {
        bail!("dataset {} contains no valid geometries", task.name_dataset);
    }

    let mode: PartitionMode = task.type_partition.parse()?;
    let params =
        calculate_partition_params(mode, task.num, &dataset_path, dataset.len() as u64)?;
    let area = min_leaf_area(dataset.envelope.area(), params.n_partitions);

    let out_dir = Path::new(&task.path_indexes).join(format!(
        "{}_spatialIndex",
        stem_name(&task.name_dataset)
    ));

    let output = build_quadtree(
        &dataset,
        params.n_geometries,
        area,
        &out_dir,
        DEFAULT_FLUSH_THRESHOLD,
    )?;
    write_master_table(&output.rows, &out_dir.join("master_table.csv"))?;

    log::info!(
        "indexed {} ({} geometries) into {} partitions at {}",
        task.name_dataset,
        dataset.len(),
        output.rows.len(),
        out_dir.display()
    );

    Ok(())
}

fn stem_name(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_name_drops_extension() {
        assert_eq!(stem_name("points.csv"), "points");
        assert_eq!(stem_name("shapes.wkt"), "shapes");
    }
}
