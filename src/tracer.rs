//! Writer side of the trace files consumed by the merger.
//!
//! Every process writes one `trace_<pid>.trace` file holding a JSON array of
//! events in the Chrome trace event format. The closing bracket is written
//! when the writer is finished or dropped.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use serde_json::Value;
use crate::errors::TraceError;

pub const DEFAULT_CATEGORY: &str = "DEFAULT";
const COUNTER_CATEGORY: &str = "category";
const FLOW_CATEGORY: &str = "foo";
const FLOW_NAME: &str = "flow_event";

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Small process-unique number identifying the calling thread.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

fn timestamp_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    #[serde(rename = "B")] Begin,
    #[serde(rename = "E")] End,
    #[serde(rename = "i")] Instant,
    #[serde(rename = "C")] Counter,
    #[serde(rename = "M")] Metadata,
    #[serde(rename = "s")] FlowStart,
    #[serde(rename = "f")] FlowEnd,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    pub name: String,
    pub ph: Phase,
    pub pid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<BTreeMap<String, Value>>,
}

impl Event {
    pub fn new(name: &str, category: &str, phase: Phase, pid: i64) -> Self {
        Event {
            cat: Some(category.to_string()),
            name: name.to_string(),
            ph: phase,
            pid,
            tid: None,
            ts: None,
            id: None,
            bp: None,
            args: Some(BTreeMap::new()),
        }
    }

    fn flow(phase: Phase, id: i64, pid: i64) -> Self {
        Event {
            args: None,
            id: Some(id),
            ..Event::new(FLOW_NAME, FLOW_CATEGORY, phase, pid)
        }
    }
}

struct WriterState {
    file: std::fs::File,
    is_first: bool,
    finished: bool
}

/// Appends events to a single trace file. Safe to share between threads.
pub struct TraceWriter {
    path: PathBuf,
    state: Mutex<WriterState>
}

impl TraceWriter {
    /// Creates (or truncates) `path` and writes the opening bracket.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref().to_path_buf();
        let io_error = |source| TraceError::Io { path: path.clone(), source };
        let mut file = std::fs::File::create(&path).map_err(io_error)?;
        file.write_all(b"[").map_err(io_error)?;
        Ok(TraceWriter {
            path,
            state: Mutex::new(WriterState { file, is_first: true, finished: false })
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Stamps the event with the calling thread (unless already set) and the
    /// current time, then appends it.
    pub fn log(&self, mut event: Event) -> Result<(), TraceError> {
        if event.tid.is_none() {
            event.tid = Some(current_thread_id());
        }
        event.ts = Some(timestamp_micros());
        self.write_event(&event)
    }

    /// Names the calling thread in trace viewers.
    pub fn set_thread_name(&self, name: &str, pid: i64) -> Result<(), TraceError> {
        let event = Event {
            cat: None,
            tid: Some(current_thread_id()),
            args: Some(BTreeMap::from([("name".to_string(), Value::from(name))])),
            ..Event::new("thread_name", DEFAULT_CATEGORY, Phase::Metadata, pid)
        };
        self.write_event(&event)
    }

    pub fn begin_flow_event(&self, id: i64, pid: i64) -> Result<(), TraceError> {
        self.log(Event::flow(Phase::FlowStart, id, pid))
    }

    pub fn end_flow_event(&self, id: i64, pid: i64) -> Result<(), TraceError> {
        let event = Event {
            bp: Some("e".to_string()),
            ..Event::flow(Phase::FlowEnd, id, pid)
        };
        self.log(event)
    }

    /// Writes the closing bracket. Events logged afterwards are rejected.
    pub fn finish(&self) -> Result<(), TraceError> {
        let mut state = self.state.lock();
        self.close(&mut state)
    }

    fn close(&self, state: &mut WriterState) -> Result<(), TraceError> {
        if state.finished {
            return Ok(());
        }
        state.finished = true;
        state.file.write_all(b"\n]")
            .and_then(|_| state.file.flush())
            .map_err(|source| self.io_error(source))
    }

    fn write_event(&self, event: &Event) -> Result<(), TraceError> {
        let encoded = serde_json::to_vec(event)
            .map_err(|source| TraceError::Serialize { source })?;
        let mut state = self.state.lock();
        if state.finished {
            return Err(self.io_error(std::io::Error::new(
                std::io::ErrorKind::Other,
                "trace file is already closed"
            )));
        }
        let separator: &[u8] = if state.is_first { b"\n" } else { b",\n" };
        state.is_first = false;
        state.file.write_all(separator)
            .and_then(|_| state.file.write_all(encoded.as_slice()))
            .and_then(|_| state.file.flush())
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> TraceError {
        TraceError::Io { path: self.path.clone(), source }
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.finished {
            return;
        }
        state.finished = true;
        if let Err(e) = state.file.write_all(b"\n]").and_then(|_| state.file.flush()) {
            log::warn!("Could not close trace file {}: {}", self.path.display(), e);
        }
    }
}

/// Per-process tracer writing `trace_<pid>.trace`.
pub struct Tracer {
    pid: i64,
    writer: TraceWriter
}

impl Tracer {
    pub fn file_name(pid: i64) -> String {
        format!("trace_{}.trace", pid)
    }

    /// Starts a trace file for process `pid` inside `directory`.
    pub fn create(directory: impl AsRef<Path>, pid: i64) -> Result<Self, TraceError> {
        let writer = TraceWriter::create(directory.as_ref().join(Tracer::file_name(pid)))?;
        Ok(Tracer { pid, writer })
    }

    pub fn writer(&self) -> &TraceWriter {
        &self.writer
    }

    pub fn log(&self, event: Event) -> Result<(), TraceError> {
        self.writer.log(event)
    }

    pub fn simple_event(&self, name: &str, category: &str) -> Result<(), TraceError> {
        self.log(Event::new(name, category, Phase::Instant, self.pid))
    }

    pub fn begin(&self, name: &str, category: &str) -> Result<(), TraceError> {
        self.log(Event::new(name, category, Phase::Begin, self.pid))
    }

    pub fn end(&self, name: &str, category: &str) -> Result<(), TraceError> {
        self.log(Event::new(name, category, Phase::End, self.pid))
    }

    pub fn counter(&self, name: &str, value: i64) -> Result<(), TraceError> {
        self.counters(name, &BTreeMap::from([(name.to_string(), value)]))
    }

    pub fn counters(&self, name: &str, values: &BTreeMap<String, i64>) -> Result<(), TraceError> {
        let event = Event {
            args: Some(values.iter()
                .map(|(key, value)| (key.clone(), Value::from(*value)))
                .collect()),
            ..Event::new(name, COUNTER_CATEGORY, Phase::Counter, self.pid)
        };
        self.log(event)
    }

    pub fn set_thread_name(&self, name: &str) -> Result<(), TraceError> {
        self.writer.set_thread_name(name, self.pid)
    }

    pub fn begin_flow_event(&self, id: i64) -> Result<(), TraceError> {
        self.writer.begin_flow_event(id, self.pid)
    }

    pub fn end_flow_event(&self, id: i64) -> Result<(), TraceError> {
        self.writer.end_flow_event(id, self.pid)
    }

    /// Emits a begin event now and the matching end event when the span drops.
    pub fn span<'a>(&'a self, name: &str, category: &str) -> Result<Span<'a>, TraceError> {
        self.begin(name, category)?;
        Ok(Span { tracer: self, name: name.to_string(), category: category.to_string() })
    }

    pub fn finish(self) -> Result<(), TraceError> {
        self.writer.finish()
    }
}

pub struct Span<'a> {
    tracer: &'a Tracer,
    name: String,
    category: String
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tracer.end(self.name.as_str(), self.category.as_str()) {
            log::warn!("Could not end span {}: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_events(path: &Path) -> Vec<Event> {
        let content = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(content.as_str()).unwrap()
    }

    #[test]
    fn empty_trace_is_an_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), 0).unwrap();
        let path = tracer.writer().path().to_path_buf();
        tracer.finish().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[\n]");
        assert!(read_events(&path).is_empty());
    }

    #[test]
    fn drop_writes_the_closing_bracket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Tracer::file_name(3));
        {
            let tracer = Tracer::create(dir.path(), 3).unwrap();
            tracer.simple_event("tick", DEFAULT_CATEGORY).unwrap();
        }
        let events = read_events(&path);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ph, Phase::Instant);
        assert_eq!(events[0].pid, 3);
        assert_eq!(events[0].cat.as_deref(), Some(DEFAULT_CATEGORY));
        assert_eq!(events[0].args, Some(BTreeMap::new()));
    }

    #[test]
    fn events_carry_phase_thread_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), 1).unwrap();
        let path = tracer.writer().path().to_path_buf();
        tracer.begin("The whole thing", DEFAULT_CATEGORY).unwrap();
        tracer.counter("cats", 2).unwrap();
        tracer.end("The whole thing", DEFAULT_CATEGORY).unwrap();
        tracer.finish().unwrap();
        let events = read_events(&path);
        let phases: Vec<Phase> = events.iter().map(|e| e.ph).collect();
        assert_eq!(phases, vec![Phase::Begin, Phase::Counter, Phase::End]);
        assert!(events.iter().all(|e| e.tid == Some(current_thread_id())));
        assert!(events.iter().all(|e| e.ts.is_some()));
        assert!(events[0].ts <= events[2].ts);
        assert_eq!(events[1].cat.as_deref(), Some(COUNTER_CATEGORY));
        assert_eq!(events[1].args.as_ref().unwrap()["cats"], Value::from(2));
    }

    #[test]
    fn counters_record_every_value() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), 0).unwrap();
        let path = tracer.writer().path().to_path_buf();
        let pokemon = BTreeMap::from([
            ("fire".to_string(), 1),
            ("water".to_string(), 3),
        ]);
        tracer.counters("pokemon", &pokemon).unwrap();
        tracer.finish().unwrap();
        let args = read_events(&path).remove(0).args.unwrap();
        assert_eq!(args["fire"], Value::from(1));
        assert_eq!(args["water"], Value::from(3));
    }

    #[test]
    fn metadata_and_flow_events_have_their_own_shape() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), 2).unwrap();
        let path = tracer.writer().path().to_path_buf();
        tracer.set_thread_name("main").unwrap();
        tracer.begin_flow_event(7).unwrap();
        tracer.end_flow_event(7).unwrap();
        tracer.finish().unwrap();
        let events = read_events(&path);

        assert_eq!(events[0].ph, Phase::Metadata);
        assert_eq!(events[0].name, "thread_name");
        assert_eq!(events[0].cat, None);
        assert_eq!(events[0].ts, None);
        assert_eq!(events[0].args.as_ref().unwrap()["name"], Value::from("main"));

        assert_eq!(events[1].ph, Phase::FlowStart);
        assert_eq!(events[1].id, Some(7));
        assert_eq!(events[1].name, FLOW_NAME);
        assert_eq!(events[1].args, None);

        assert_eq!(events[2].ph, Phase::FlowEnd);
        assert_eq!(events[2].bp.as_deref(), Some("e"));
    }

    #[test]
    fn span_ends_when_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = Tracer::create(dir.path(), 0).unwrap();
        let path = tracer.writer().path().to_path_buf();
        {
            let _span = tracer.span("A timed event", DEFAULT_CATEGORY).unwrap();
            tracer.counter("dogs", 3).unwrap();
        }
        tracer.finish().unwrap();
        let phases: Vec<Phase> = read_events(&path).iter().map(|e| e.ph).collect();
        assert_eq!(phases, vec![Phase::Begin, Phase::Counter, Phase::End]);
    }

    #[test]
    fn logging_after_finish_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::create(dir.path().join("trace.trace")).unwrap();
        writer.finish().unwrap();
        let event = Event::new("late", DEFAULT_CATEGORY, Phase::Instant, 0);
        assert!(matches!(writer.log(event), Err(TraceError::Io { .. })));
    }

    #[test]
    fn writer_is_shared_between_threads() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::create(dir.path().join("trace.trace")).unwrap();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        let event = Event::new("work", DEFAULT_CATEGORY, Phase::Instant, 0);
                        writer.log(event).unwrap();
                    }
                });
            }
        });
        writer.finish().unwrap();
        let events = read_events(writer.path());
        assert_eq!(events.len(), 100);
        let mut threads: Vec<u64> = events.iter().filter_map(|e| e.tid).collect();
        threads.sort();
        threads.dedup();
        assert_eq!(threads.len(), 4);
    }
}
