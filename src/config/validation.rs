use std::time::Duration;

use super::schema::Config;
use crate::registry::CanonicalField;

/// Lower bound keeps the watcher from spinning on the scan log
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Upper bound keeps recorded RFID timestamps close to the true crossing
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Validate configuration at startup.
/// Returns all validation errors at once (not just the first).
pub fn validate_config(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if let Some(ref token) = config.manual.stop_token {
        let token = token.trim();
        if token.is_empty() {
            errors.push("manual.stop_token: must not be empty".to_string());
        } else if token.chars().all(|c| c.is_ascii_digit()) {
            errors.push(format!(
                "manual.stop_token: '{}' is numeric and would shadow a bib",
                token
            ));
        }
    }

    if let Some(ref interval) = config.rfid.poll_interval {
        match humantime::parse_duration(interval.trim()) {
            Ok(d) if d < MIN_POLL_INTERVAL || d > MAX_POLL_INTERVAL => errors.push(format!(
                "rfid.poll_interval: '{}' must be between {} and {}",
                interval,
                humantime::format_duration(MIN_POLL_INTERVAL),
                humantime::format_duration(MAX_POLL_INTERVAL)
            )),
            Ok(_) => {}
            Err(e) => errors.push(format!(
                "rfid.poll_interval: invalid duration '{}' - {}",
                interval, e
            )),
        }
    }

    if let Some(ref scoring) = config.scoring {
        if scoring.scorers == Some(0) {
            errors.push("scoring.scorers: must be at least 1".to_string());
        }
    }

    if let Some(ref aliases) = config.import.aliases {
        let mut keys: Vec<&String> = aliases.keys().collect();
        keys.sort();
        for key in keys {
            if CanonicalField::parse(key).is_none() {
                errors.push(format!(
                    "import.aliases.{}: unknown field (expected bib, name, team or rfid)",
                    key
                ));
            } else if aliases[key].iter().any(|a| a.trim().is_empty()) {
                errors.push(format!("import.aliases.{}: empty header spelling", key));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
