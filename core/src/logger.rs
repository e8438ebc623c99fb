//! Global logging system for the Piton SD core
//!
//! Fixed-size ring of formatted log entries. No heap allocation, safe to
//! call before any allocator exists and from any context that may take a
//! spinlock. The oldest entry is overwritten once the ring is full.
//!
//! # Usage
//!
//! ```ignore
//! use piton_core::{log_info, logger::LogSource};
//!
//! log_info!(LogSource::Gpt, "backup lba: {:#x}", header.backup_lba);
//!
//! piton_core::logger::for_each(|entry| {
//!     // forward entry.message() to a console
//! });
//! ```

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};

use spin::Mutex;

/// Maximum message length in bytes
pub const LOG_MSG_LEN: usize = 96;

/// Number of entries kept in the ring
pub const LOG_RING_SIZE: usize = 64;

/// Severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    const fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// Subsystem that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogSource {
    /// Window mapping and the probe/full transition
    Map = 0,
    /// GPT header parsing and validation
    Gpt = 1,
    /// Transfer engine and scatter-gather coordinator
    Transfer = 2,
    /// Block-layer adapter
    Block = 3,
    /// MMC host adapter
    Mmc = 4,
}

impl LogSource {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Map => "MAP",
            Self::Gpt => "GPT",
            Self::Transfer => "XFER",
            Self::Block => "BLK",
            Self::Mmc => "MMC",
        }
    }
}

/// Single log entry in the ring
#[derive(Clone, Copy)]
pub struct LogEntry {
    /// Monotonic sequence number (wraps)
    pub seq: u32,
    pub level: LogLevel,
    pub source: LogSource,
    msg: [u8; LOG_MSG_LEN],
    len: u8,
}

impl LogEntry {
    const EMPTY: Self = Self {
        seq: 0,
        level: LogLevel::Debug,
        source: LogSource::Map,
        msg: [0; LOG_MSG_LEN],
        len: 0,
    };

    /// Message text, truncated to `LOG_MSG_LEN` bytes on a char boundary
    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.msg[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.source.name(),
            self.level.name(),
            self.message()
        )
    }
}

/// Writes into a fixed buffer, dropping whatever does not fit.
struct MsgWriter<'a> {
    buf: &'a mut [u8; LOG_MSG_LEN],
    len: usize,
}

impl Write for MsgWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            let width = c.len_utf8();
            if self.len + width > LOG_MSG_LEN {
                break;
            }
            c.encode_utf8(&mut self.buf[self.len..self.len + width]);
            self.len += width;
        }
        Ok(())
    }
}

/// Circular entry storage.
///
/// The global logger wraps one of these in a spinlock; tests and callers
/// that want a private log can own one directly.
pub struct LogRing {
    entries: [LogEntry; LOG_RING_SIZE],
    /// Next slot to write
    head: usize,
    /// Total entries ever pushed
    total: u32,
}

impl LogRing {
    pub const fn new() -> Self {
        Self {
            entries: [LogEntry::EMPTY; LOG_RING_SIZE],
            head: 0,
            total: 0,
        }
    }

    pub fn push(&mut self, level: LogLevel, source: LogSource, args: fmt::Arguments<'_>) {
        let mut entry = LogEntry {
            seq: self.total,
            level,
            source,
            ..LogEntry::EMPTY
        };

        let mut writer = MsgWriter {
            buf: &mut entry.msg,
            len: 0,
        };
        let _ = writer.write_fmt(args);
        entry.len = writer.len as u8;

        self.entries[self.head] = entry;
        self.head = (self.head + 1) % LOG_RING_SIZE;
        self.total = self.total.wrapping_add(1);
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        (self.total as usize).min(LOG_RING_SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Total entries pushed since creation, including overwritten ones
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Iterate held entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        let len = self.len();
        let start = (self.head + LOG_RING_SIZE - len) % LOG_RING_SIZE;
        (0..len).map(move |i| &self.entries[(start + i) % LOG_RING_SIZE])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.total = 0;
    }
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing::new());
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Entries above this level are discarded
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: LogLevel) -> bool {
    level <= max_level()
}

pub fn log(level: LogLevel, source: LogSource, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    LOG_RING.lock().push(level, source, args);
}

/// Visit held entries, oldest first.
///
/// The ring stays locked while `f` runs; `f` must not log.
pub fn for_each<F: FnMut(&LogEntry)>(mut f: F) {
    let ring = LOG_RING.lock();
    for entry in ring.iter() {
        f(entry);
    }
}

pub fn log_count() -> usize {
    LOG_RING.lock().len()
}

pub fn clear() {
    LOG_RING.lock().clear();
}

#[macro_export]
macro_rules! log_error {
    ($src:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Error, $src, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($src:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Warn, $src, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($src:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Info, $src, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($src:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Debug, $src, format_args!($($arg)*))
    };
}
