pub mod discovery;
pub mod errors;
pub mod merge;
pub mod output;
pub mod pattern;
pub mod tracer;

pub use crate::discovery::FileOrder;
pub use crate::errors::{MergeError, TraceError};
pub use crate::merge::{merge, MergeOptions, MergeReport};
pub use crate::pattern::TracePattern;
pub use crate::tracer::{Event, Phase, TraceWriter, Tracer};
