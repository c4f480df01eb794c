//! Append-only timing event stream, one per process.
//!
//! Each line reads `<timestamp> - <TAG> [extras...]` and is consumed offline by
//! the trace reconstructor. Write failures are reported through `log` and never
//! interrupt the protocol.

use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;

use crate::types::event::{FIELD_SEPARATOR, TIMESTAMP_FORMAT};
use crate::types::EventTag;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone, Default)]
pub struct EventLog {
    sink: Option<Sink>,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl EventLog {
    /// An event log that drops everything.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Truncates `path` and writes events to it.
    pub fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_writer(file))
    }

    /// Keeps events in memory; the returned buffer exposes the written lines.
    pub fn memory() -> (Self, MemoryLog) {
        let buffer = MemoryLog::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Arc::new(Mutex::new(Box::new(writer)))),
        }
    }

    pub fn mark(&self, tag: EventTag) {
        self.record(tag, &[]);
    }

    pub fn record(&self, tag: EventTag, extras: &[&dyn fmt::Display]) {
        let Some(sink) = &self.sink else {
            return;
        };

        let mut line = format!(
            "{}{}{}",
            Local::now().format(TIMESTAMP_FORMAT),
            FIELD_SEPARATOR,
            tag.as_str()
        );
        for extra in extras {
            let _ = write!(line, " {}", extra);
        }
        line.push('\n');

        let mut writer = lock(sink);
        if let Err(e) = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
        {
            log::warn!("Failed to append {} event: {}", tag, e);
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory event sink, mainly for tests.
#[derive(Clone, Default)]
pub struct MemoryLog {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLog {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buffer)).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Tags of every recorded line, in order.
    pub fn tags(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|line| line.split(FIELD_SEPARATOR).nth(1))
            .filter_map(|rest| rest.split_whitespace().next())
            .map(str::to_string)
            .collect()
    }
}

impl Write for MemoryLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
