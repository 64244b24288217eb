use std::path::{Path, PathBuf};
use serde_json::Value;
use crate::discovery::{find_trace_files, order_trace_files, FileOrder};
use crate::errors::MergeError;
use crate::output::{to_pretty_sorted_json, write_output};
use crate::pattern::TracePattern;

pub const DEFAULT_OUTPUT: &str = "data.txt";
pub const MAX_FILES: usize = 64;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub output: PathBuf,
    pub directory: PathBuf,
    pub pattern: TracePattern,
    pub max_files: usize,
    pub order: FileOrder
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            output: PathBuf::from(DEFAULT_OUTPUT),
            directory: PathBuf::from("."),
            pattern: TracePattern::default(),
            max_files: MAX_FILES,
            order: FileOrder::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceSummary {
    pub path: PathBuf,
    pub events: usize
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedTrace {
    pub events: Vec<Value>,
    pub sources: Vec<SourceSummary>,
    pub skipped: usize
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    #[serde(rename = "files-merged")] pub files_merged: usize,
    #[serde(rename = "files-skipped")] pub files_skipped: usize,
    #[serde(rename = "total-events")] pub total_events: usize,
    pub sources: Vec<SourceSummary>
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object"
    }
}

/// Reads a trace file and returns the events of its top level array.
pub fn load_trace_file(path: impl AsRef<Path>) -> Result<Vec<Value>, MergeError> {
    let path = path.as_ref();
    let content = std::fs::read(path)
        .map_err(|source| MergeError::Read { path: path.to_path_buf(), source })?;
    let document: Value = serde_json::from_slice(content.as_slice())
        .map_err(|source| MergeError::Parse { path: path.to_path_buf(), source })?;
    match document {
        Value::Array(events) => Ok(events),
        other => Err(MergeError::InvalidTraceFormat {
            path: path.to_path_buf(),
            found: json_kind(&other)
        })
    }
}

/// Concatenates the arrays of at most `max_files` trace files, in the given order.
pub fn merge_trace_files(files: Vec<PathBuf>, max_files: usize) -> Result<MergedTrace, MergeError> {
    let skipped = files.len().saturating_sub(max_files);
    if skipped > 0 {
        log::warn!(
            "Found {} trace files but at most {} are merged; skipping {}",
            files.len(), max_files, skipped
        );
    }
    let mut events = Vec::new();
    let mut sources = Vec::new();
    for path in files.into_iter().take(max_files) {
        let loaded = load_trace_file(&path)?;
        log::debug!("Loaded {} events from {}", loaded.len(), path.display());
        sources.push(SourceSummary { path, events: loaded.len() });
        events.extend(loaded);
    }
    Ok(MergedTrace { events, sources, skipped })
}

/// Merges all trace files selected by `options` into a single output file.
///
/// Nothing is written unless every accepted file was loaded and the merged
/// document was serialized.
pub fn merge(options: &MergeOptions) -> Result<MergeReport, MergeError> {
    let files = find_trace_files(&options.directory, &options.pattern)?;
    log::debug!(
        "Discovered {} files matching {} in {}",
        files.len(), options.pattern, options.directory.display()
    );
    let files = order_trace_files(files, options.order);
    let merged = merge_trace_files(files, options.max_files)?;
    let document = to_pretty_sorted_json(&merged.events)?;
    write_output(&options.output, document.as_slice())?;
    Ok(MergeReport {
        output: options.output.clone(),
        files_merged: merged.sources.len(),
        files_skipped: merged.skipped,
        total_events: merged.events.len(),
        sources: merged.sources
    })
}
