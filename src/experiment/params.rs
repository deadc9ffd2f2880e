//! Per-kind parameter schemas and signatures
//!
//! Each experiment kind declares a typed parameter schema with a fixed field
//! order. The [`ParamSignature`](ExperimentParams::signature) is derived
//! from that declared order, so two runs with the same parameters always
//! produce the same key — map iteration order never comes into it.

use serde::{Deserialize, Serialize};

/// Parameters for the block-oriented kinds (write, read, download,
/// download-read-stream, drive-get).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BlockParams {
    /// Number of blocks appended, read or downloaded
    pub nr_blocks: u64,
    /// Size of each block in bytes
    pub block_byte_size: u64,
}

/// Parameters for the drive-write kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileParams {
    /// Number of files written
    pub nr_files: u64,
    /// Size of each file in bytes
    pub file_byte_size: u64,
}

/// Parameters for the bee-write kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntryParams {
    /// Number of entries written
    pub nr_entries: u64,
    /// Size of each entry value in bytes
    pub entry_byte_size: u64,
}

/// A parametrisation of one experiment, tagged by schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentParams {
    /// Block-oriented schema
    Blocks(BlockParams),
    /// File-oriented schema
    Files(FileParams),
    /// Entry-oriented schema
    Entries(EntryParams),
}

impl ExperimentParams {
    /// The parameter fields as `(key, value)` pairs in declared order.
    /// Keys use the camelCase wire names.
    #[must_use]
    pub const fn fields(&self) -> [(&'static str, u64); 2] {
        match self {
            Self::Blocks(p) => [("nrBlocks", p.nr_blocks), ("blockByteSize", p.block_byte_size)],
            Self::Files(p) => [("nrFiles", p.nr_files), ("fileByteSize", p.file_byte_size)],
            Self::Entries(p) => [
                ("nrEntries", p.nr_entries),
                ("entryByteSize", p.entry_byte_size),
            ],
        }
    }

    /// Deterministic signature string, `k1=v1_k2=v2` in declared field
    /// order. Disambiguates parametrisations that share an experiment name.
    #[must_use]
    pub fn signature(&self) -> String {
        let fields = self.fields();
        let mut out = String::new();
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                out.push('_');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(&value.to_string());
        }
        out
    }

    /// Human-readable form for log lines, `k1: v1, k2: v2`.
    #[must_use]
    pub fn info(&self) -> String {
        self.fields()
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The parameters as an ordered JSON map, as persisted in result
    /// records.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        for (key, value) in self.fields() {
            map.insert(key.to_string(), serde_json::Value::from(value));
        }
        map
    }
}

/// Convert a camelCase parameter key to the exporter's snake_case label
/// naming convention (`nrBlocks` → `nr_blocks`).
#[must_use]
pub fn metric_label(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 2);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
