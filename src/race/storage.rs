use anyhow::{Context, Result};
use atomic_write_file::AtomicWriteFile;
use chrono::NaiveDate;
use fs4::fs_std::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::session::{HeatId, RaceSession};
use crate::registry::RunnerRegistry;

const SESSION_FILE: &str = "session.json";
const RUNNERS_FILE: &str = "runners.json";
const RESULTS_FILE: &str = "results.jsonl";
const LOCK_FILE: &str = "heat.lock";

/// Directory holding everything persisted for one heat
pub fn heat_dir(data_dir: &Path, heat: &HeatId) -> PathBuf {
    data_dir.join(heat.to_string())
}

pub fn results_path(dir: &Path) -> PathBuf {
    dir.join(RESULTS_FILE)
}

/// Exclusive hold on a heat directory; released when dropped or when the
/// process exits
#[derive(Debug)]
pub struct HeatLock {
    _file: File,
}

/// Take the heat's lock without waiting. `None` if another handle holds it.
pub fn try_lock_heat(dir: &Path) -> Result<Option<HeatLock>> {
    let path = dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Failed to open heat lock at {}", path.display()))?;
    let acquired = file
        .try_lock_exclusive()
        .with_context(|| format!("Failed to lock {}", path.display()))?;
    Ok(acquired.then_some(HeatLock { _file: file }))
}

/// Heat numbers already present for `date`, ascending
fn existing_heat_numbers(data_dir: &Path, date: NaiveDate) -> Result<Vec<u32>> {
    let pattern = data_dir.join(format!("{}-*", date.format("%Y%m%d")));
    let pattern = pattern
        .to_str()
        .with_context(|| format!("Data directory is not valid UTF-8: {}", data_dir.display()))?;

    let mut numbers: Vec<u32> = glob::glob(pattern)
        .context("Invalid heat directory pattern")?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.parse::<HeatId>().ok())
        })
        .filter(|heat| heat.date == date)
        .map(|heat| heat.number)
        .collect();
    numbers.sort_unstable();
    Ok(numbers)
}

/// Highest heat number used on `date`, if any
pub fn latest_heat_number(data_dir: &Path, date: NaiveDate) -> Result<Option<u32>> {
    Ok(existing_heat_numbers(data_dir, date)?.last().copied())
}

/// Next free heat number for `date`, starting at 1
pub fn next_heat_number(data_dir: &Path, date: NaiveDate) -> Result<u32> {
    Ok(latest_heat_number(data_dir, date)?.map_or(1, |n| n + 1))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create heat directory at {}", parent.display()))?;
    }

    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("Failed to open atomic write file at {}", path.display()))?;
    serde_json::to_writer_pretty(&mut file, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    file.commit()
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}

/// Load the persisted session of a heat; `None` if the heat was never created
pub fn load_session(dir: &Path) -> Result<Option<RaceSession>> {
    let path = dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(&path)
        .with_context(|| format!("Failed to open session file at {}", path.display()))?;
    let session: RaceSession =
        serde_json::from_reader(file).context("Failed to load race session")?;

    if session.version != 1 {
        anyhow::bail!("Unsupported race session version: {}", session.version);
    }

    Ok(Some(session))
}

/// Save the session atomically so a crash never leaves a half-written status
pub fn save_session(dir: &Path, session: &RaceSession) -> Result<()> {
    write_json_atomic(&dir.join(SESSION_FILE), session)
}

/// Load the runner snapshot of a heat; `None` if no runners were ever saved
pub fn load_runners(dir: &Path) -> Result<Option<RunnerRegistry>> {
    let path = dir.join(RUNNERS_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(&path)
        .with_context(|| format!("Failed to open runner file at {}", path.display()))?;
    let registry: RunnerRegistry =
        serde_json::from_reader(file).context("Failed to load runners")?;
    Ok(Some(registry))
}

pub fn save_runners(dir: &Path, registry: &RunnerRegistry) -> Result<()> {
    write_json_atomic(&dir.join(RUNNERS_FILE), registry)
}
