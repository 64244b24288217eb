use std::path::Path;
use serde::Serialize;
use serde_json::Value;
use crate::errors::MergeError;

const INDENT: &[u8] = b"    ";

/// Pretty prints the merged events with four space indentation.
///
/// Object keys come out sorted at every depth because `serde_json::Map` is
/// backed by a `BTreeMap` unless `preserve_order` is enabled. Numbers keep
/// their original text through `arbitrary_precision`.
pub fn to_pretty_sorted_json(events: &[Value]) -> Result<Vec<u8>, MergeError> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    events.serialize(&mut serializer)
        .map_err(|source| MergeError::Serialize { source })?;
    Ok(buffer)
}

/// Creates or truncates `path` and writes the whole document at once.
pub fn write_output(path: impl AsRef<Path>, document: &[u8]) -> Result<(), MergeError> {
    let path = path.as_ref();
    std::fs::write(path, document)
        .map_err(|source| MergeError::Write { path: path.to_path_buf(), source })
}
