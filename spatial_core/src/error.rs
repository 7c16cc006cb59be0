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
use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for the indexer and query engine. Recovery (skip a row,
/// skip a dataset, abort the batch) is decided by the caller based on the
/// variant, not by this type.
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("CSV header mismatch in {path}: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("unsupported dataset format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("invalid partition parameter: {0}")]
    InvalidPartitionParam(String),

    #[error("master table at {path} is missing required columns: {missing:?}")]
    MasterSchemaError {
        path: PathBuf,
        missing: Vec<String>,
    },

    #[error("failed to load partition {path}: {source}")]
    PartitionLoadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SpatialError>;
