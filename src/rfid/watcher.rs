use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::cursor::{AppendOnlyLog, LogCursor, LogSnapshot};
use crate::config::{MAX_POLL_INTERVAL, MIN_POLL_INTERVAL};
use crate::error::RaceError;
use crate::race::FinishRecorder;
use crate::registry::RunnerRegistry;
use crate::results::{FinishRecord, FinishSource};

/// A log shared with whoever appends to it (tests, an in-process reader bridge)
impl<L: AppendOnlyLog> AppendOnlyLog for Arc<Mutex<L>> {
    fn snapshot(&mut self) -> io::Result<Option<LogSnapshot>> {
        self.lock()
            .map_err(|_| io::Error::other("scan log lock poisoned"))?
            .snapshot()
    }

    fn read_range(&mut self, offset: u64, end: u64) -> io::Result<Vec<u8>> {
        self.lock()
            .map_err(|_| io::Error::other("scan log lock poisoned"))?
            .read_range(offset, end)
    }
}

/// What happened to one scanned tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagOutcome {
    Recorded(FinishRecord),
    /// Tag belongs to a bib that already finished; the mat read it again
    Repeat { tag: String, bib: u32 },
    /// No runner carries this tag; nothing recorded
    Unknown(String),
    /// Recorder refused the finish (race not running, storage failure)
    Rejected { tag: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub polls: u64,
    pub tags: u64,
    pub recorded: u64,
    pub repeats: u64,
    pub unknown: u64,
    pub rejected: u64,
    pub read_errors: u64,
}

impl WatcherStats {
    fn tally(&mut self, outcomes: &[TagOutcome]) {
        self.polls += 1;
        for outcome in outcomes {
            self.tags += 1;
            match outcome {
                TagOutcome::Recorded(_) => self.recorded += 1,
                TagOutcome::Repeat { .. } => self.repeats += 1,
                TagOutcome::Unknown(_) => self.unknown += 1,
                TagOutcome::Rejected { .. } => self.rejected += 1,
            }
        }
    }
}

/// Tails the RFID scan log and forwards resolved tags to the recorder.
pub struct RfidWatcher<L> {
    log: L,
    cursor: LogCursor,
    registry: Arc<RunnerRegistry>,
    recorder: Arc<FinishRecorder>,
}

impl<L: AppendOnlyLog + 'static> RfidWatcher<L> {
    /// Watcher that reads the log from its first byte
    pub fn new(log: L, registry: Arc<RunnerRegistry>, recorder: Arc<FinishRecorder>) -> Self {
        Self {
            log,
            cursor: LogCursor::new(),
            registry,
            recorder,
        }
    }

    /// Watcher that ignores scans already in the log (pre-race reads, earlier heats)
    pub fn starting_at_end(
        mut log: L,
        registry: Arc<RunnerRegistry>,
        recorder: Arc<FinishRecorder>,
    ) -> io::Result<Self> {
        let cursor = LogCursor::at_end(&mut log)?;
        debug!(offset = cursor.offset(), "scan log cursor positioned at end");
        Ok(Self {
            log,
            cursor,
            registry,
            recorder,
        })
    }

    /// One check of the log: read new complete lines and handle each tag.
    /// The recorder lock is only taken per tag, never across the log read.
    pub fn poll_once(&mut self) -> io::Result<Vec<TagOutcome>> {
        let tags = self.cursor.poll(&mut self.log)?;
        Ok(tags.into_iter().map(|tag| self.handle_tag(tag)).collect())
    }

    fn handle_tag(&self, tag: String) -> TagOutcome {
        let Some(bib) = self.registry.resolve_tag(&tag) else {
            let err = RaceError::UnknownTag(tag.clone());
            warn!(tag = %tag, "{}; no finish recorded", err);
            return TagOutcome::Unknown(tag);
        };

        match self.recorder.record_first(bib, FinishSource::Rfid) {
            Ok(Some(record)) => TagOutcome::Recorded(record),
            Ok(None) => {
                debug!(tag = %tag, bib, "repeat read ignored");
                TagOutcome::Repeat { tag, bib }
            }
            Err(err) => {
                warn!(tag = %tag, bib, "RFID finish rejected: {}", err);
                TagOutcome::Rejected {
                    tag,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Run in the background, polling every `interval` (clamped to the
    /// supported bounds) until the returned handle is stopped or dropped.
    pub fn spawn(self, interval: Duration) -> WatcherHandle {
        let interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut watcher = self;
            let mut stats = WatcherStats::default();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "RFID watcher started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {
                        // A poll that has begun always finishes before cancellation is seen.
                        let joined = tokio::task::spawn_blocking(move || {
                            let result = watcher.poll_once();
                            (watcher, result)
                        })
                        .await;

                        let (returned, result) = match joined {
                            Ok(pair) => pair,
                            Err(e) => {
                                error!("RFID watcher poll panicked: {}", e);
                                break;
                            }
                        };
                        watcher = returned;

                        match result {
                            Ok(outcomes) => stats.tally(&outcomes),
                            Err(e) => {
                                stats.read_errors += 1;
                                warn!("RFID scan log read failed: {}", e);
                            }
                        }
                    }
                }
            }

            info!(
                recorded = stats.recorded,
                unknown = stats.unknown,
                repeats = stats.repeats,
                "RFID watcher stopped"
            );
            stats
        });

        WatcherHandle {
            cancel: cancel_tx,
            task: Some(task),
            stats: None,
        }
    }
}

/// Control handle for a running watcher
pub struct WatcherHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<WatcherStats>>,
    stats: Option<WatcherStats>,
}

impl WatcherHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel and wait for the task to exit. Safe to call more than once;
    /// later calls return the same final stats.
    pub async fn stop(&mut self) -> WatcherStats {
        let _ = self.cancel.send(true);
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(stats) => self.stats = Some(stats),
                Err(e) => error!("RFID watcher task failed: {}", e),
            }
        }
        self.stats.clone().unwrap_or_default()
    }
}
