/*!
 * Logging and tracing initialization
 *
 * Every tracing event that passes the filter reaches three places: stdout, a
 * size-rotated log file and a bounded in-memory history for the operator
 * surface. The last two are the [`LogSink`].
 */

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDateTime};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use warden_core_resilience::ring_buffer::DEFAULT_CAPACITY;
use warden_core_resilience::RingBuffer;

use crate::error::{Result, WardenError};

pub const LOG_FILE_NAME: &str = "uplink-warden.log";

/// Rotate once the active file would exceed this size
pub const MAX_LOG_BYTES: u64 = 5_000_000;

/// Rotated files kept next to the active one (`.1` newest)
pub const LOG_BACKUPS: usize = 3;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DEFAULT_FILTER: &str = "uplink_warden=info,warden_sentinel=info,warden_core_resilience=info";
const VERBOSE_FILTER: &str =
    "uplink_warden=debug,warden_sentinel=debug,warden_core_resilience=debug";

/// One line of log history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub level: Level,
    pub message: String,
}

impl LogRecord {
    pub fn now(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().naive_local(),
            level,
            message: message.into(),
        }
    }

    /// `YYYY-MM-DD HH:MM:SS [LEVEL] message`
    pub fn to_line(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.message
        )
    }

    /// Inverse of [`LogRecord::to_line`]; `None` for anything else
    pub fn parse_line(line: &str) -> Option<Self> {
        let stamp = line.get(..19)?;
        let rest = line.get(19..)?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        let rest = rest.strip_prefix(" [")?;
        let (level, message) = rest.split_once("] ")?;
        Some(Self {
            timestamp,
            level: parse_level(level)?,
            message: message.to_string(),
        })
    }
}

fn parse_level(text: &str) -> Option<Level> {
    match text {
        "WARNING" => Some(Level::WARN),
        "CRITICAL" => Some(Level::ERROR),
        other => other.parse().ok(),
    }
}

/// Append-only file with size-based rotation
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    size: u64,
}

impl RotatingFile {
    /// Open `path` for appending, creating parent directories
    ///
    /// # Arguments
    ///
    /// * `path` - the live log file
    /// * `max_bytes` - size at which the file rolls over
    /// * `backups` - rotated copies kept as `.1` to `.N`; the oldest is dropped
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            backups,
            file,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one line, rotating first if it would overflow the active file
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.size > 0 && self.size + len > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.size += len;
        Ok(())
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups > 0 {
            // .2 -> .3, .1 -> .2, active -> .1; the oldest is overwritten
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

/// Last `limit` parseable records of a log file, oldest first
pub fn read_tail(path: &Path, limit: usize) -> io::Result<Vec<LogRecord>> {
    let contents = fs::read_to_string(path)?;
    let mut records: Vec<LogRecord> = contents
        .lines()
        .rev()
        .filter_map(LogRecord::parse_line)
        .take(limit)
        .collect();
    records.reverse();
    Ok(records)
}

struct SinkInner {
    history: Mutex<RingBuffer<LogRecord>>,
    file: Mutex<Option<RotatingFile>>,
}

/// Bounded history plus durable rotating file
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

impl LogSink {
    /// History only, no file
    pub fn in_memory() -> Self {
        Self::from_parts(None, Vec::new())
    }

    /// History plus `dir/uplink-warden.log`, pre-loaded from the file's tail.
    ///
    /// If the file cannot be opened the sink falls back to history only.
    pub fn with_dir(dir: &Path) -> Self {
        let path = dir.join(LOG_FILE_NAME);
        let preload = read_tail(&path, DEFAULT_CAPACITY).unwrap_or_default();

        match RotatingFile::open(&path, MAX_LOG_BYTES, LOG_BACKUPS) {
            Ok(file) => Self::from_parts(Some(file), preload),
            Err(e) => {
                eprintln!(
                    "uplink-warden: cannot open log file {}: {}; file logging disabled",
                    path.display(),
                    e
                );
                Self::from_parts(None, preload)
            }
        }
    }

    fn from_parts(file: Option<RotatingFile>, preload: Vec<LogRecord>) -> Self {
        let mut history = RingBuffer::new(DEFAULT_CAPACITY);
        history.extend(preload);
        Self {
            inner: Arc::new(SinkInner {
                history: Mutex::new(history),
                file: Mutex::new(file),
            }),
        }
    }

    /// Record a message in the history and the file
    pub fn append(&self, level: Level, message: impl Into<String>) {
        self.push(LogRecord::now(level, message));
    }

    fn push(&self, record: LogRecord) {
        {
            let mut file = lock(&self.inner.file);
            if let Some(active) = file.as_mut() {
                if let Err(e) = active.write_line(&record.to_line()) {
                    eprintln!(
                        "uplink-warden: writing {} failed: {}; file logging disabled",
                        active.path().display(),
                        e
                    );
                    *file = None;
                }
            }
        }
        lock(&self.inner.history).push(record);
    }

    /// At most `n` most recent records, oldest first
    pub fn recent(&self, n: usize) -> Vec<LogRecord> {
        lock(&self.inner.history).recent(n)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.history).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_file(&self) -> bool {
        lock(&self.inner.file).is_some()
    }

    /// Tracing layer feeding this sink
    pub fn layer(&self) -> LogSinkLayer {
        LogSinkLayer { sink: self.clone() }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("records", &self.len())
            .field("file", &self.has_file())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `tracing_subscriber` layer that copies events into a [`LogSink`]
pub struct LogSinkLayer {
    sink: LogSink,
}

impl<S> Layer<S> for LogSinkLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.sink
            .append(*event.metadata().level(), visitor.finish());
    }
}

/// Renders `message` followed by any other fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Initialize stdout logging plus the LogSink.
///
/// `RUST_LOG` wins over `verbose`. With `log_dir` unset only the in-memory
/// history is kept.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Result<LogSink> {
    let default_filter = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| WardenError::Config(format!("Failed to create log filter: {}", e)))?;

    let sink = match log_dir {
        Some(dir) => LogSink::with_dir(dir),
        None => LogSink::in_memory(),
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sink.layer())
        .try_init()
        .map_err(|e| WardenError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_line_format_round_trip() {
        let record = LogRecord {
            timestamp: NaiveDateTime::parse_from_str("2024-03-01 12:30:05", TIMESTAMP_FORMAT)
                .unwrap(),
            level: Level::WARN,
            message: "Internet connectivity lost. Fail count: 2".into(),
        };

        let line = record.to_line();
        assert_eq!(
            line,
            "2024-03-01 12:30:05 [WARN] Internet connectivity lost. Fail count: 2"
        );
        assert_eq!(LogRecord::parse_line(&line), Some(record));
    }

    #[test]
    fn test_parse_foreign_levels_and_garbage() {
        let parsed = LogRecord::parse_line("2024-03-01 12:30:05 [WARNING] old style").unwrap();
        assert_eq!(parsed.level, Level::WARN);

        assert!(LogRecord::parse_line("not a log line").is_none());
        assert!(LogRecord::parse_line("").is_none());
        assert!(LogRecord::parse_line("2024-03-01 12:30:05 INFO missing brackets").is_none());
    }

    #[test]
    fn test_ring_keeps_last_200() {
        let sink = LogSink::in_memory();
        for i in 0..(DEFAULT_CAPACITY + 37) {
            sink.append(Level::INFO, format!("message {}", i));
        }

        let recent = sink.recent(usize::MAX);
        assert_eq!(recent.len(), DEFAULT_CAPACITY);
        assert_eq!(recent[0].message, "message 37");
        assert_eq!(
            recent.last().unwrap().message,
            format!("message {}", DEFAULT_CAPACITY + 36)
        );
        assert_eq!(sink.recent(3).len(), 3);
        assert_eq!(sink.recent(3)[2].message, recent.last().unwrap().message);
    }

    #[test]
    fn test_rotation_keeps_three_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.log");
        let mut file = RotatingFile::open(&path, 100, 3).unwrap();

        let line = "x".repeat(59);
        for _ in 0..6 {
            file.write_line(&line).unwrap();
        }

        // 60 bytes per line, 100 byte limit: one line per file.
        assert_eq!(fs::read_to_string(&path).unwrap().len(), 60);
        for index in 1..=3 {
            assert!(dir.path().join(format!("test.log.{}", index)).exists());
        }
        assert!(!dir.path().join("test.log.4").exists());
    }

    #[test]
    fn test_sink_writes_file_and_preloads_on_restart() {
        let dir = TempDir::new().unwrap();

        let sink = LogSink::with_dir(dir.path());
        assert!(sink.has_file());
        sink.append(Level::INFO, "first");
        sink.append(Level::ERROR, "second");
        drop(sink);

        let contents = fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert!(contents.contains("[INFO] first"));
        assert!(contents.contains("[ERROR] second"));

        let restarted = LogSink::with_dir(dir.path());
        let messages: Vec<_> = restarted
            .recent(10)
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_layer_captures_events() {
        let sink = LogSink::in_memory();
        let subscriber = tracing_subscriber::registry().with(sink.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Reboot attempt {} of {}", 1, 10);
            tracing::warn!(attempt = 2, "relay failed");
        });

        let records = sink.recent(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "Reboot attempt 1 of 10");
        assert_eq!(records[0].level, Level::INFO);
        assert_eq!(records[1].message, "relay failed attempt=2");
    }
}
