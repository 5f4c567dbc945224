use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{MatchRecord, RawMatch};

#[derive(Debug, Default)]
pub struct ParsedShard {
    pub records: Vec<MatchRecord>,
    pub rejected: usize,
}

#[derive(Debug, Default)]
pub struct LoadedShards {
    pub records: Vec<MatchRecord>,
    pub files_read: usize,
    pub files_skipped: usize,
    pub records_rejected: usize,
}

/// Reads every `*.json` shard in `dir`, in file-name order. A shard that
/// cannot be read or parsed is skipped; the rest still load.
pub fn load_shard_dir(dir: &Path) -> LoadedShards {
    let mut out = LoadedShards::default();
    let paths = match shard_paths(dir) {
        Ok(paths) => paths,
        Err(err) => {
            warn!("shard dir {} unreadable: {err:#}", dir.display());
            return out;
        }
    };

    for path in paths {
        match load_shard_file(&path) {
            Ok(parsed) => {
                out.files_read += 1;
                out.records_rejected += parsed.rejected;
                out.records.extend(parsed.records);
            }
            Err(err) => {
                out.files_skipped += 1;
                warn!("skipping shard {}: {err:#}", path.display());
            }
        }
    }
    out
}

pub fn load_shard_file(path: &Path) -> Result<ParsedShard> {
    let raw = fs::read_to_string(path).context("read shard")?;
    let parsed = parse_shard_json(&raw)?;
    if parsed.rejected > 0 {
        warn!(
            "{}: {} record(s) rejected",
            path.display(),
            parsed.rejected
        );
    }
    Ok(parsed)
}

/// Parses one shard body. Malformed JSON is an error; any top-level shape
/// other than an array is treated as an empty shard.
pub fn parse_shard_json(raw: &str) -> Result<ParsedShard> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(ParsedShard::default());
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid shard json")?;
    let Value::Array(items) = root else {
        debug!("shard top level is not an array; treating as empty");
        return Ok(ParsedShard::default());
    };

    let mut parsed = ParsedShard::default();
    for item in items {
        let record = serde_json::from_value::<RawMatch>(item)
            .map_err(anyhow::Error::from)
            .and_then(MatchRecord::from_raw);
        match record {
            Ok(record) => parsed.records.push(record),
            Err(err) => {
                debug!("rejected record: {err:#}");
                parsed.rejected += 1;
            }
        }
    }
    Ok(parsed)
}

fn shard_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::parse_shard_json;

    #[test]
    fn object_shards_are_empty() {
        let raw = r#"{"status":"Enter TV Channels","date":"2025-10-11","matches":[]}"#;
        let parsed = parse_shard_json(raw).expect("object is not an error");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.rejected, 0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_shard_json("[{\"fixture\": ").is_err());
    }

    #[test]
    fn bad_records_are_counted_not_fatal() {
        let raw = r#"[
            {"match_id": 1, "fixture": "A vs B", "kickoff": 1760000000},
            {"match_id": 2, "kickoff": 1760000000},
            "not a record"
        ]"#;
        let parsed = parse_shard_json(raw).expect("array parses");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.rejected, 2);
    }
}
