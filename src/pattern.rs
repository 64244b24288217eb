use std::sync::LazyLock;
use crate::errors::MergeError;

pub const DEFAULT_PATTERN: &str = "trace*.trace";

static DEFAULT_REGEX: LazyLock<regex::Regex> = LazyLock::new(
    || regex::Regex::new(r"(?s)^trace.*\.trace$").expect("Invalid Regex")
);

/// Shell-style file name pattern used to select trace files.
///
/// `*` matches any run of characters, `?` matches a single character and
/// everything else is literal. The whole file name has to match.
#[derive(Debug, Clone)]
pub struct TracePattern {
    glob: String,
    regex: regex::Regex
}

impl TracePattern {
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl Default for TracePattern {
    fn default() -> Self {
        TracePattern {
            glob: DEFAULT_PATTERN.to_string(),
            regex: DEFAULT_REGEX.clone()
        }
    }
}

impl std::str::FromStr for TracePattern {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, MergeError> {
        let invalid = |reason| MergeError::InvalidPattern {
            pattern: s.to_string(),
            reason
        };
        if s.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if s.contains('/') || s.contains(std::path::MAIN_SEPARATOR) {
            return Err(invalid("pattern must not contain a path separator"));
        }
        let mut expr = String::from("(?s)^");
        for c in s.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                _ => expr.push_str(regex::escape(&c.to_string()).as_str())
            }
        }
        expr.push('$');
        let regex = regex::Regex::new(expr.as_str())
            .map_err(|_| invalid("pattern could not be compiled"))?;
        Ok(TracePattern { glob: s.to_string(), regex })
    }
}

impl std::fmt::Display for TracePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.glob)
    }
}
