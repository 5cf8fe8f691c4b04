//! JSON snapshot files.
//!
//! Both persisted documents are flat JSON objects keyed by canonical UUID
//! strings:
//!
//! ```json
//! // playtime-data.json
//! { "<subject-id>": { "<partition-id>": 5000 } }
//!
//! // display-preferences.json
//! { "<subject-id>": true }
//! ```
//!
//! # Tolerant Decoding
//!
//! Entries are decoded one at a time. A malformed key or value drops that
//! entry only; the rest of the document still loads.
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a crash mid-write leaves the previous snapshot intact.

use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Write};
use std::path::Path;

use fs_err as fs;
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PlaytimeError, Result};
use crate::ids::{PartitionId, SubjectId};

/// Closed playtime per partition, per subject.
pub type PlaytimeSnapshot = HashMap<SubjectId, HashMap<PartitionId, u64>>;

/// Reads a snapshot file as a JSON object.
///
/// A missing or blank file is `Ok(None)`; unreadable files and documents
/// that are not a JSON object are errors.
pub fn read_object(path: &Path) -> Result<Option<Map<String, Value>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(PlaytimeError::io("Failed to read snapshot", err)),
    };

    if content.trim().is_empty() {
        debug!(path = %path.display(), "Snapshot file is empty");
        return Ok(None);
    }

    let value: Value = serde_json::from_str(&content)
        .map_err(|err| PlaytimeError::json(format!("Failed to parse {}", path.display()), err))?;

    match value {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        _ => Err(PlaytimeError::Json {
            context: format!("{} is not a JSON object", path.display()),
            source: serde::de::Error::custom("expected object at top level"),
        }),
    }
}

/// Serializes `value` and atomically replaces `path` with it.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|err| PlaytimeError::json("Failed to serialize snapshot", err))?;

    let parent_dir = path.parent().ok_or_else(|| {
        PlaytimeError::io(
            format!("{} has no parent directory", path.display()),
            std::io::Error::from(ErrorKind::InvalidInput),
        )
    })?;
    fs::create_dir_all(parent_dir)
        .map_err(|err| PlaytimeError::io("Failed to create data directory", err))?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|err| PlaytimeError::io("Failed to create temp snapshot", err))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|err| PlaytimeError::io("Failed to write temp snapshot", err))?;
    temp_file
        .flush()
        .map_err(|err| PlaytimeError::io("Failed to flush temp snapshot", err))?;
    temp_file
        .persist(path)
        .map_err(|err| PlaytimeError::io("Failed to replace snapshot", err.error))?;

    Ok(())
}

/// Decodes the playtime document. Returns the decoded data and how many
/// entries were skipped.
pub fn decode_playtime(object: Map<String, Value>) -> (PlaytimeSnapshot, usize) {
    let mut snapshot = PlaytimeSnapshot::new();
    let mut skipped = 0;

    for (subject_key, partitions) in object {
        let Ok(subject) = subject_key.parse::<SubjectId>() else {
            skipped += 1;
            continue;
        };
        let Value::Object(partitions) = partitions else {
            skipped += 1;
            continue;
        };

        let totals = snapshot.entry(subject).or_default();
        for (partition_key, millis) in partitions {
            match (partition_key.parse::<PartitionId>(), millis.as_u64()) {
                (Ok(partition), Some(millis)) => {
                    let entry = totals.entry(partition).or_insert(0);
                    *entry = entry.saturating_add(millis);
                }
                _ => skipped += 1,
            }
        }
    }

    (snapshot, skipped)
}

/// Encodes closed playtime with sorted keys so repeated saves diff cleanly.
pub fn encode_playtime<'a, I>(entries: I) -> BTreeMap<String, BTreeMap<String, u64>>
where
    I: IntoIterator<Item = (SubjectId, &'a HashMap<PartitionId, u64>)>,
{
    entries
        .into_iter()
        .map(|(subject, totals)| {
            let partitions = totals
                .iter()
                .map(|(partition, millis)| (partition.to_string(), *millis))
                .collect();
            (subject.to_string(), partitions)
        })
        .collect()
}

/// Decodes the display-preference document. Returns the decoded flags and
/// how many entries were skipped.
pub fn decode_preferences(object: Map<String, Value>) -> (HashMap<SubjectId, bool>, usize) {
    let mut flags = HashMap::new();
    let mut skipped = 0;

    for (subject_key, flag) in object {
        match (subject_key.parse::<SubjectId>(), flag.as_bool()) {
            (Ok(subject), Some(flag)) => {
                flags.insert(subject, flag);
            }
            _ => skipped += 1,
        }
    }

    (flags, skipped)
}
