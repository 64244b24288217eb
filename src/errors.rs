use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Could not list trace files in {}", directory.display())]
    Discovery {
        directory: PathBuf,
        #[source] source: std::io::Error
    },

    #[error("Could not read trace file {}", path.display())]
    Read {
        path: PathBuf,
        #[source] source: std::io::Error
    },

    #[error("Trace file {} is not valid JSON", path.display())]
    Parse {
        path: PathBuf,
        #[source] source: serde_json::Error
    },

    #[error("Trace file {} must contain a JSON array, found {found}", path.display())]
    InvalidTraceFormat {
        path: PathBuf,
        found: &'static str
    },

    #[error("Could not serialize merged trace")]
    Serialize {
        #[source] source: serde_json::Error
    },

    #[error("Could not write merged trace to {}", path.display())]
    Write {
        path: PathBuf,
        #[source] source: std::io::Error
    },

    #[error("Invalid trace file pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Could not write trace file {}", path.display())]
    Io {
        path: PathBuf,
        #[source] source: std::io::Error
    },

    #[error("Could not serialize trace event")]
    Serialize {
        #[source] source: serde_json::Error
    },
}

impl MergeError {
    /// Process exit status reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MergeError::InvalidPattern { .. } => 2,
            MergeError::Discovery { .. }
            | MergeError::Read { .. }
            | MergeError::Write { .. } => 3,
            MergeError::Parse { .. } => 4,
            MergeError::InvalidTraceFormat { .. } => 5,
            MergeError::Serialize { .. } => 6,
        }
    }
}
