use std::path::{Path, PathBuf};
use itertools::Itertools;
use crate::errors::MergeError;
use crate::pattern::TracePattern;

/// Order in which discovered trace files are merged.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum FileOrder {
    /// Whatever order the directory listing returns.
    #[default]
    Listing,
    /// Sorted by file name.
    Name
}

/// Lists the entries of `directory` whose file name matches `pattern`.
///
/// The listing is not recursive and no sorting is applied. Entries are not
/// checked for being regular files; a matching directory fails later when it
/// is read.
pub fn find_trace_files(directory: impl AsRef<Path>,
                        pattern: &TracePattern) -> Result<Vec<PathBuf>, MergeError> {
    let directory = directory.as_ref();
    let discovery_error = |source| MergeError::Discovery {
        directory: directory.to_path_buf(),
        source
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory).map_err(discovery_error)? {
        let entry = entry.map_err(discovery_error)?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            log::warn!("Skipping entry with non UTF-8 name: {}", entry.path().display());
            continue;
        };
        if pattern.matches(name) {
            log::trace!("Found trace file {}", entry.path().display());
            files.push(entry.path());
        }
    }
    Ok(files)
}

pub fn order_trace_files(files: Vec<PathBuf>, order: FileOrder) -> Vec<PathBuf> {
    match order {
        FileOrder::Listing => files,
        FileOrder::Name => files.into_iter()
            .sorted_by(|lhs, rhs| lhs.file_name().cmp(&rhs.file_name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "[]").unwrap();
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files.iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn only_matching_entries_are_returned() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "trace1.trace");
        touch(dir.path(), "trace_2.trace");
        touch(dir.path(), "data.txt");
        touch(dir.path(), "other.trace");
        let found = find_trace_files(dir.path(), &TracePattern::default()).unwrap();
        let mut found = names(&found);
        found.sort();
        assert_eq!(found, vec!["trace1.trace", "trace_2.trace"]);
    }

    #[test]
    fn listing_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "trace1.trace");
        let found = find_trace_files(dir.path(), &TracePattern::default()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn matching_directories_are_included() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("traceX.trace")).unwrap();
        let found = find_trace_files(dir.path(), &TracePattern::default()).unwrap();
        assert_eq!(names(&found), vec!["traceX.trace"]);
    }

    #[test]
    fn missing_directory_is_a_discovery_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let result = find_trace_files(&missing, &TracePattern::default());
        assert!(matches!(result, Err(MergeError::Discovery { .. })));
    }

    #[test]
    fn name_order_sorts_by_file_name() {
        let files = vec![
            PathBuf::from("b/trace2.trace"),
            PathBuf::from("a/trace3.trace"),
            PathBuf::from("c/trace1.trace"),
        ];
        let ordered = order_trace_files(files.clone(), FileOrder::Name);
        assert_eq!(names(&ordered), vec!["trace1.trace", "trace2.trace", "trace3.trace"]);
        assert_eq!(order_trace_files(files.clone(), FileOrder::Listing), files);
    }
}
