use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::commands::{Command, CommandOutput, RfidSummary};
use crate::clock::RaceStatus;
use crate::config::Config;
use crate::error::{RaceError, RaceResult};
use crate::race::{
    heat_dir, latest_heat_number, load_runners, load_session, next_heat_number, results_path,
    save_runners, save_session, try_lock_heat, FinishRecorder, HeatId, HeatLock, ManualInput,
    ManualOutcome, RaceSession,
};
use crate::registry::{import_csv, ColumnAliases, Runner, RunnerRegistry};
use crate::results::{FinishRecord, FinishSource, ResultsStore, UNASSIGNED_BIB};
use crate::rfid::{FileLog, RfidWatcher, WatcherHandle, WatcherStats};
use crate::scoring::{
    individual_standings, team_standings, IndividualStanding, ScoringConfig, TeamStanding,
};

/// State of one opened heat
struct Heat {
    id: HeatId,
    dir: PathBuf,
    session: RaceSession,
    registry: Arc<RunnerRegistry>,
    recorder: Arc<FinishRecorder>,
    /// Held for as long as the heat is open for writing
    _lock: Option<HeatLock>,
}

impl Heat {
    /// Open or create the heat directory, replaying whatever it already holds.
    ///
    /// Fails with `InvalidState` when another process has the heat open.
    fn open(data_dir: &Path, id: HeatId) -> RaceResult<Self> {
        let dir = heat_dir(data_dir, &id);
        std::fs::create_dir_all(&dir)?;
        let lock = try_lock_heat(&dir)?.ok_or_else(|| {
            RaceError::invalid_state(format!(
                "heat {} is open in another race-timer process",
                id
            ))
        })?;

        let session = match load_session(&dir)? {
            Some(session) => session,
            None => {
                let session = RaceSession::new(id);
                save_session(&dir, &session)?;
                session
            }
        };
        let registry = load_runners(&dir)?.unwrap_or_default();
        let store = ResultsStore::open(&results_path(&dir), id.number)?;

        debug!(
            heat = %id,
            status = %session.status,
            runners = registry.len(),
            finishes = store.len(),
            "heat opened"
        );

        Ok(Self {
            id,
            dir,
            session,
            registry: Arc::new(registry),
            recorder: Arc::new(FinishRecorder::new(store)),
            _lock: Some(lock),
        })
    }

    /// Load what the heat holds on disk without taking its lock or writing
    fn load(data_dir: &Path, id: HeatId) -> RaceResult<Self> {
        let dir = heat_dir(data_dir, &id);
        let session = load_session(&dir)?.unwrap_or_else(|| RaceSession::new(id));
        let registry = load_runners(&dir)?.unwrap_or_default();
        let store = ResultsStore::load(&results_path(&dir), id.number)?;

        debug!(heat = %id, status = %session.status, "heat loaded read-only");

        Ok(Self {
            id,
            dir,
            session,
            registry: Arc::new(registry),
            recorder: Arc::new(FinishRecorder::new(store)),
            _lock: None,
        })
    }
}

/// The race session object every front-end drives.
///
/// Owns the current heat: its persisted session, runner registry, recorder
/// and (while running with a scan log configured) the RFID watcher.
pub struct RaceEngine {
    data_dir: PathBuf,
    heat: Heat,
    manual: ManualInput,
    scoring: ScoringConfig,
    aliases: ColumnAliases,
    scan_log: Option<PathBuf>,
    poll_interval: Duration,
    watcher: Option<WatcherHandle>,
    /// Watcher totals from a stop whose session save failed
    unsaved_stop_stats: Option<WatcherStats>,
    read_only: bool,
}

impl RaceEngine {
    /// Open `heat`, or today's most recent heat (creating heat 1 if there is none).
    ///
    /// The heat stays locked against other processes until the engine is
    /// dropped or changes heat. A heat persisted as running was interrupted;
    /// its clock is resumed from the recorded wall-clock start and the RFID
    /// watcher restarted.
    pub async fn open(config: &Config, heat: Option<HeatId>) -> RaceResult<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let id = Self::resolve_heat(&data_dir, heat)?;
        let heat = Heat::open(&data_dir, id)?;
        let mut engine = Self::with_heat(config, data_dir, heat, false);
        engine.resume_if_interrupted()?;
        Ok(engine)
    }

    /// Open a heat for viewing while another process may be timing it.
    ///
    /// Nothing is locked, created or resumed, and every command that would
    /// change the heat fails with `InvalidState`.
    pub async fn open_read_only(config: &Config, heat: Option<HeatId>) -> RaceResult<Self> {
        let data_dir = config.data_dir();
        let id = Self::resolve_heat(&data_dir, heat)?;
        let heat = Heat::load(&data_dir, id)?;
        Ok(Self::with_heat(config, data_dir, heat, true))
    }

    fn resolve_heat(data_dir: &Path, heat: Option<HeatId>) -> RaceResult<HeatId> {
        match heat {
            Some(id) => Ok(id),
            None => {
                let today = HeatId::today(1).date;
                Ok(HeatId::new(today, latest_heat_number(data_dir, today)?.unwrap_or(1)))
            }
        }
    }

    fn with_heat(config: &Config, data_dir: PathBuf, heat: Heat, read_only: bool) -> Self {
        Self {
            data_dir,
            heat,
            manual: ManualInput::new(config.manual.stop_token()),
            scoring: config.scoring.clone().unwrap_or_default(),
            aliases: ColumnAliases::with_overrides(config.import.aliases.as_ref()),
            scan_log: config.rfid.scan_log.clone(),
            poll_interval: config.rfid.poll_interval(),
            watcher: None,
            unsaved_stop_stats: None,
            read_only,
        }
    }

    fn ensure_writable(&self) -> RaceResult<()> {
        if self.read_only {
            return Err(RaceError::invalid_state(format!(
                "heat {} was opened read-only",
                self.heat.id
            )));
        }
        Ok(())
    }

    fn resume_if_interrupted(&mut self) -> RaceResult<()> {
        if self.heat.session.status != RaceStatus::Running {
            return Ok(());
        }
        let elapsed = self.heat.session.wall_elapsed().unwrap_or_default();
        warn!(
            heat = %self.heat.id,
            elapsed = %humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
            "heat was interrupted while running, resuming clock from its wall-clock start"
        );
        self.heat.recorder.resume(elapsed)?;
        if self.scan_log.is_some() {
            warn!("RFID scans made while the timer was down are not recovered");
        }
        self.start_watcher()
    }

    pub fn heat(&self) -> HeatId {
        self.heat.id
    }

    pub fn heat_dir(&self) -> &Path {
        &self.heat.dir
    }

    pub fn status(&self) -> RaceStatus {
        self.heat.session.status
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.heat.registry
    }

    pub fn stop_token(&self) -> &str {
        self.manual.stop_token()
    }

    /// Run one command through the engine
    pub async fn execute(&mut self, command: Command) -> RaceResult<CommandOutput> {
        match command {
            Command::StartRace => self.start_race(),
            Command::Record(token) => self.record_token(&token).await,
            Command::Stop => self.stop_race().await,
            Command::IndividualStandings => Ok(CommandOutput::Individual {
                standings: self.individual_standings(),
            }),
            Command::TeamStandings => Ok(CommandOutput::Teams {
                standings: self.team_standings(),
            }),
            Command::ChangeHeat(number) => self.change_heat(number),
            Command::Correct { sequence, bib } => {
                let previous_bib = self.correct(sequence, bib)?;
                Ok(CommandOutput::Corrected {
                    sequence,
                    previous_bib,
                    bib,
                })
            }
            Command::ImportRunners(path) => self.import_runners(&path),
            Command::ListRunners => Ok(CommandOutput::Runners {
                runners: self.runners(),
            }),
        }
    }

    /// Start the clock and, with a scan log configured, the RFID watcher
    pub fn start_race(&mut self) -> RaceResult<CommandOutput> {
        self.ensure_writable()?;
        match self.heat.session.status {
            RaceStatus::NotStarted => {}
            RaceStatus::Running => {
                return Err(RaceError::invalid_state(format!(
                    "heat {} is already running",
                    self.heat.id
                )))
            }
            RaceStatus::Stopped => {
                return Err(RaceError::invalid_state(format!(
                    "heat {} has finished; change to a new heat to race again",
                    self.heat.id
                )))
            }
        }

        self.heat.recorder.start()?;
        let mut session = self.heat.session.clone();
        session.mark_started();
        if let Err(e) = save_session(&self.heat.dir, &session) {
            // Not durable, so not started.
            let _ = self.heat.recorder.stop();
            return Err(e.into());
        }
        self.heat.session = session;
        info!(heat = %self.heat.id, "race started");

        if let Err(e) = self.start_watcher() {
            warn!("RFID watcher not started, manual entry only: {}", e);
        }
        Ok(CommandOutput::Started {
            heat: self.heat.id.to_string(),
            rfid: self.watcher.is_some(),
        })
    }

    fn start_watcher(&mut self) -> RaceResult<()> {
        let Some(ref path) = self.scan_log else {
            return Ok(());
        };
        let watcher = RfidWatcher::starting_at_end(
            FileLog::new(path),
            Arc::clone(&self.heat.registry),
            Arc::clone(&self.heat.recorder),
        )?;
        info!(scan_log = %path.display(), "watching RFID scan log");
        self.watcher = Some(watcher.spawn(self.poll_interval));
        Ok(())
    }

    async fn stop_watcher(&mut self) -> Option<WatcherStats> {
        match self.watcher.take() {
            Some(mut handle) => Some(handle.stop().await),
            None => None,
        }
    }

    /// Handle a manual token: record a finish, or stop on the stop token
    pub async fn record_token(&mut self, token: &str) -> RaceResult<CommandOutput> {
        self.ensure_writable()?;
        match self.manual.submit(token, &self.heat.recorder)? {
            ManualOutcome::StopRequested => self.stop_race().await,
            ManualOutcome::Recorded(record) => {
                self.warn_if_unregistered(record.bib, record.sequence);
                Ok(CommandOutput::Recorded { record })
            }
        }
    }

    /// Record a finish directly, bypassing token parsing
    pub fn record(&self, bib: Option<u32>) -> RaceResult<FinishRecord> {
        self.ensure_writable()?;
        let record = self.heat.recorder.record(bib, FinishSource::Manual)?;
        self.warn_if_unregistered(record.bib, record.sequence);
        Ok(record)
    }

    fn warn_if_unregistered(&self, bib: u32, sequence: u64) {
        if bib != UNASSIGNED_BIB && self.heat.registry.get(bib).is_none() {
            warn!(bib, sequence, "bib is not in the runner registry");
        }
    }

    /// Stop the clock; no finish is accepted afterwards. The watcher is
    /// stopped after the clock, so any scan it is still handling is rejected.
    ///
    /// The session is only marked stopped once that is saved; if saving fails
    /// the heat still reads as running and the stop can be retried.
    pub async fn stop_race(&mut self) -> RaceResult<CommandOutput> {
        self.ensure_writable()?;
        if self.heat.session.status != RaceStatus::Running {
            return Err(RaceError::invalid_state(format!(
                "cannot stop: heat {} is {}",
                self.heat.id, self.heat.session.status
            )));
        }
        // already stopped by an earlier attempt whose save failed
        if self.heat.recorder.status() == RaceStatus::Running {
            self.heat.recorder.stop()?;
        }
        let stats = match self.stop_watcher().await {
            Some(stats) => Some(stats),
            None => self.unsaved_stop_stats.take(),
        };

        let mut session = self.heat.session.clone();
        session.mark_stopped();
        if let Err(e) = save_session(&self.heat.dir, &session) {
            self.unsaved_stop_stats = stats;
            return Err(e.into());
        }
        self.heat.session = session;

        let finishes = self.heat.recorder.finish_count();
        info!(heat = %self.heat.id, finishes, "race stopped");
        Ok(CommandOutput::Stopped {
            heat: self.heat.id.to_string(),
            finishes,
            rfid: stats.map(RfidSummary::from),
        })
    }

    pub fn individual_standings(&self) -> Vec<IndividualStanding> {
        individual_standings(&self.heat.recorder.snapshot(), &self.heat.registry)
    }

    pub fn team_standings(&self) -> Vec<TeamStanding> {
        team_standings(&self.individual_standings(), &self.scoring)
    }

    /// Reassign the bib of finish `sequence`; returns the bib it had before
    pub fn correct(&self, sequence: u64, bib: u32) -> RaceResult<u32> {
        self.ensure_writable()?;
        let previous = self.heat.recorder.correct(sequence, bib)?;
        self.warn_if_unregistered(bib, sequence);
        Ok(previous)
    }

    /// Switch to another heat of today. The current runners are carried over
    /// when the target heat has none of its own.
    pub fn change_heat(&mut self, number: Option<u32>) -> RaceResult<CommandOutput> {
        self.ensure_writable()?;
        if self.heat.session.status == RaceStatus::Running {
            return Err(RaceError::invalid_state(format!(
                "stop heat {} before changing heat",
                self.heat.id
            )));
        }

        let today = HeatId::today(1).date;
        let number = match number {
            Some(0) => return Err(RaceError::validation("heat numbers start at 1")),
            Some(n) => n,
            None => next_heat_number(&self.data_dir, today)?,
        };

        let id = HeatId::new(today, number);
        if id == self.heat.id {
            return Ok(self.heat_changed());
        }

        let mut heat = Heat::open(&self.data_dir, id)?;
        if heat.registry.is_empty() && !self.heat.registry.is_empty() {
            save_runners(&heat.dir, &self.heat.registry)?;
            heat.registry = Arc::clone(&self.heat.registry);
        }
        self.heat = heat;
        self.resume_if_interrupted()?;

        info!(heat = %self.heat.id, "changed heat");
        Ok(self.heat_changed())
    }

    fn heat_changed(&self) -> CommandOutput {
        CommandOutput::HeatChanged {
            heat: self.heat.id.to_string(),
            runners: self.heat.registry.len(),
            finishes: self.heat.recorder.finish_count(),
        }
    }

    /// Replace the heat's runners with the contents of a CSV file
    pub fn import_runners(&mut self, path: &Path) -> RaceResult<CommandOutput> {
        self.ensure_writable()?;
        if self.heat.session.status == RaceStatus::Running {
            return Err(RaceError::invalid_state(
                "runners cannot be imported while the race is running",
            ));
        }

        let mut registry = RunnerRegistry::new();
        let report = import_csv(path, &self.aliases, &mut registry).map_err(|e| {
            // header problems stay validation errors
            match e.downcast::<RaceError>() {
                Ok(err) => err,
                Err(e) => RaceError::Storage(e),
            }
        })?;
        save_runners(&self.heat.dir, &registry)?;
        self.heat.registry = Arc::new(registry);

        Ok(CommandOutput::Imported {
            loaded: report.loaded,
            skipped: report.warnings.iter().map(|w| w.to_string()).collect(),
        })
    }

    /// Runners ordered by team, then bib
    pub fn runners(&self) -> Vec<Runner> {
        self.heat
            .registry
            .runners_by_team()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Stop background work without ending the race. A heat left running is
    /// resumed the next time it is opened.
    pub async fn shutdown(&mut self) {
        if let Some(stats) = self.stop_watcher().await {
            debug!(recorded = stats.recorded, "RFID watcher shut down");
        }
        if self.heat.session.status == RaceStatus::Running {
            info!(heat = %self.heat.id, "leaving race running; it resumes when reopened");
        }
    }
}
