// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Columnar persistence of a completed `analyze_trace` run, keyed by a hash
//! of `(trace_paths, view_types, time_granularity)`. A zero-byte
//! `_checkpoint_metadata` file marks a checkpoint set complete so a partial
//! write (crash mid-flush) is never mistaken for a usable cache entry.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};

use super::metrics::HighLevelMetrics;
use crate::error::AnalyzerError;

const SENTINEL_FILE: &str = "_checkpoint_metadata";

/// The stable identity of one cached run, used as the checkpoint's file stem.
pub fn checkpoint_key(trace_paths: &[PathBuf], view_types: &[String], time_granularity: f64) -> String {
    let mut hasher = DefaultHasher::new();
    for p in trace_paths {
        p.to_string_lossy().hash(&mut hasher);
    }
    for v in view_types {
        v.hash(&mut hasher);
    }
    time_granularity.to_bits().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn data_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.parquet"))
}

fn sentinel_path(dir: &Path) -> PathBuf {
    dir.join(SENTINEL_FILE)
}

/// True iff a complete (sentinel present) checkpoint exists for `key`.
pub fn exists(dir: &Path, key: &str) -> bool {
    sentinel_path(dir).exists() && data_path(dir, key).exists()
}

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("group_key", DataType::Utf8, false),
        Field::new("group_values_json", DataType::Utf8, false),
        Field::new("time_sum", DataType::Float64, false),
        Field::new("count_sum", DataType::UInt64, false),
        Field::new("size_sum", DataType::Float64, false),
        Field::new("bin_sums_json", DataType::Utf8, false),
        Field::new("unique_sets_json", DataType::Utf8, false),
    ])
}

/// Writes `groups` to `dir/key.parquet`, then drops the sentinel file last
/// so a reader never observes a data file without its completion marker.
pub fn write(dir: &Path, key: &str, groups: &[HighLevelMetrics]) -> Result<(), AnalyzerError> {
    std::fs::create_dir_all(dir)?;

    let group_keys: Vec<String> = groups
        .iter()
        .map(|g| {
            g.group_values
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("\u{1f}")
        })
        .collect();
    let group_values_json: Vec<String> = groups
        .iter()
        .map(|g| serde_json::to_string(&g.group_values).unwrap_or_default())
        .collect();
    let time_sum: Vec<f64> = groups.iter().map(|g| g.time_sum).collect();
    let count_sum: Vec<u64> = groups.iter().map(|g| g.count_sum).collect();
    let size_sum: Vec<f64> = groups.iter().map(|g| g.size_sum).collect();
    let bin_sums_json: Vec<String> = groups
        .iter()
        .map(|g| {
            let as_map: std::collections::BTreeMap<&str, u64> =
                g.bin_sums.iter().map(|(&k, &v)| (k, v)).collect();
            serde_json::to_string(&as_map).unwrap_or_default()
        })
        .collect();
    let unique_sets_json: Vec<String> = groups
        .iter()
        .map(|g| {
            let as_map: std::collections::BTreeMap<&String, Vec<&String>> = g
                .unique_sets
                .iter()
                .map(|(k, v)| (k, v.iter().collect()))
                .collect();
            serde_json::to_string(&as_map).unwrap_or_default()
        })
        .collect();

    let schema = Arc::new(schema());
    let batch = arrow_array::RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(group_keys)) as ArrayRef,
            Arc::new(StringArray::from(group_values_json)) as ArrayRef,
            Arc::new(Float64Array::from(time_sum)) as ArrayRef,
            Arc::new(UInt64Array::from(count_sum)) as ArrayRef,
            Arc::new(Float64Array::from(size_sum)) as ArrayRef,
            Arc::new(StringArray::from(bin_sums_json)) as ArrayRef,
            Arc::new(StringArray::from(unique_sets_json)) as ArrayRef,
        ],
    )
    .map_err(|e| AnalyzerError::Checkpoint(e.to_string()))?;

    let file = std::fs::File::create(data_path(dir, key))?;
    let mut writer =
        ArrowWriter::try_new(file, schema, None).map_err(|e| AnalyzerError::Checkpoint(e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| AnalyzerError::Checkpoint(e.to_string()))?;
    writer.close().map_err(|e| AnalyzerError::Checkpoint(e.to_string()))?;

    std::fs::write(sentinel_path(dir), [])?;
    Ok(())
}

/// Loads a previously written checkpoint. Caller must check [`exists`] first.
pub fn read(dir: &Path, key: &str) -> Result<Vec<HighLevelMetrics>, AnalyzerError> {
    let file = std::fs::File::open(data_path(dir, key))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| AnalyzerError::Checkpoint(e.to_string()))?
        .build()
        .map_err(|e| AnalyzerError::Checkpoint(e.to_string()))?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| AnalyzerError::Checkpoint(e.to_string()))?;
        let group_values_json = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnalyzerError::Checkpoint("column type mismatch".into()))?;
        let time_sum = batch
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| AnalyzerError::Checkpoint("column type mismatch".into()))?;
        let count_sum = batch
            .column(3)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| AnalyzerError::Checkpoint("column type mismatch".into()))?;
        let size_sum = batch
            .column(4)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| AnalyzerError::Checkpoint("column type mismatch".into()))?;
        let bin_sums_json = batch
            .column(5)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnalyzerError::Checkpoint("column type mismatch".into()))?;
        let unique_sets_json = batch
            .column(6)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnalyzerError::Checkpoint("column type mismatch".into()))?;

        for i in 0..batch.num_rows() {
            let group_values: std::collections::BTreeMap<String, String> =
                serde_json::from_str(group_values_json.value(i)).unwrap_or_default();
            let bin_sums_str: std::collections::BTreeMap<String, u64> =
                serde_json::from_str(bin_sums_json.value(i)).unwrap_or_default();
            let bin_sums = bin_sums_str
                .into_iter()
                .filter_map(|(k, v)| {
                    super::constants::SIZE_BIN_NAMES
                        .iter()
                        .find(|&&name| name == k)
                        .map(|&name| (name, v))
                })
                .collect();
            let unique_sets_str: std::collections::BTreeMap<String, Vec<String>> =
                serde_json::from_str(unique_sets_json.value(i)).unwrap_or_default();
            let unique_sets = unique_sets_str
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect();

            out.push(HighLevelMetrics {
                time_sum: time_sum.value(i),
                count_sum: count_sum.value(i),
                size_sum: size_sum.value(i),
                bin_sums,
                unique_sets,
                group_values,
            });
        }
    }
    Ok(out)
}
