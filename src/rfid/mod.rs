pub mod cursor;
pub mod watcher;

pub use cursor::{AppendOnlyLog, FileLog, LogCursor, LogSnapshot, MemoryLog};
pub use watcher::{RfidWatcher, TagOutcome, WatcherHandle, WatcherStats};
