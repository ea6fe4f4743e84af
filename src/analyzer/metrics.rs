// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The canonical `HighLevelMetrics` aggregate and the grouping-key helper
//! used to fold [`crate::analyzer::record::TraceRecord`]s into it.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::record::TraceRecord;

/// The aggregate over one group of `TraceRecord`s sharing a grouping key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HighLevelMetrics {
    pub time_sum: f64,
    pub count_sum: u64,
    pub size_sum: f64,
    pub bin_sums: HashMap<&'static str, u64>,
    pub unique_sets: HashMap<String, HashSet<String>>,
    pub group_values: BTreeMap<String, String>,
}

/// Cardinality fields whose observed values are tracked as approximate
/// unique sets rather than summed.
pub const CARDINALITY_FIELDS: &[&str] = &["proc_name", "file_name"];

/// Builds the grouping key: the requested view-type values (in declared
/// order) followed by `cat`, `io_cat`, `acc_pat`, `func_name`, `time_range`.
pub fn grouping_key(record: &TraceRecord, view_types: &[String]) -> String {
    let mut parts: Vec<String> = view_types
        .iter()
        .map(|v| record.view_fields.get(v).cloned().unwrap_or_default())
        .collect();
    parts.push(record.cat.clone());
    parts.push(record.io_cat.to_string());
    parts.push(record.acc_pat.to_string());
    parts.push(record.func_name.clone());
    parts.push(record.time_range.to_string());
    parts.join("\u{1f}")
}

/// Folds `record` into `groups[key]`, creating the group on first sight.
pub fn fold_into(
    groups: &mut HashMap<String, HighLevelMetrics>,
    key: String,
    record: &TraceRecord,
    view_types: &[String],
) {
    let entry = groups.entry(key).or_insert_with(|| {
        let mut group_values = BTreeMap::new();
        for v in view_types {
            group_values.insert(v.clone(), record.view_fields.get(v).cloned().unwrap_or_default());
        }
        group_values.insert("cat".into(), record.cat.clone());
        group_values.insert("io_cat".into(), record.io_cat.to_string());
        group_values.insert("acc_pat".into(), record.acc_pat.to_string());
        group_values.insert("func_name".into(), record.func_name.clone());
        group_values.insert("time_range".into(), record.time_range.to_string());
        HighLevelMetrics {
            group_values,
            ..Default::default()
        }
    });
    entry.time_sum += record.time;
    entry.count_sum += record.count;
    entry.size_sum += record.size;
    for (&bin, &hit) in &record.bin_fields {
        *entry.bin_sums.entry(bin).or_insert(0) += hit;
    }
    for field in CARDINALITY_FIELDS {
        if let Some(value) = record.view_fields.get(*field) {
            entry
                .unique_sets
                .entry((*field).to_string())
                .or_default()
                .insert(value.clone());
        }
    }
}

/// Merges `other`'s groups into `groups`, summing overlapping keys.
pub fn merge_groups(groups: &mut HashMap<String, HighLevelMetrics>, other: &HashMap<String, HighLevelMetrics>) {
    for (key, incoming) in other {
        match groups.get_mut(key) {
            Some(existing) => {
                existing.time_sum += incoming.time_sum;
                existing.count_sum += incoming.count_sum;
                existing.size_sum += incoming.size_sum;
                for (&bin, &count) in &incoming.bin_sums {
                    *existing.bin_sums.entry(bin).or_insert(0) += count;
                }
                for (field, values) in &incoming.unique_sets {
                    existing
                        .unique_sets
                        .entry(field.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
            }
            None => {
                groups.insert(key.clone(), incoming.clone());
            }
        }
    }
}
