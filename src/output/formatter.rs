use owo_colors::OwoColorize;
use std::io::IsTerminal;
use terminal_size::{terminal_size, Width};

use crate::registry::RunnerRegistry;
use crate::results::FinishRecord;
use crate::scoring::{IndividualStanding, TeamScore, TeamStanding};

/// Label for a finisher the registry cannot name
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Format elapsed milliseconds as `MM:SS.mmm`, or `H:MM:SS.mmm` from one hour on
pub fn format_elapsed(ms: u64) -> String {
    let millis = ms % 1000;
    let total_seconds = ms / 1000;
    let seconds = total_seconds % 60;
    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, total_minutes % 60, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", total_minutes, seconds, millis)
    }
}

/// Check if stdout is a TTY (for auto-detecting color support)
pub fn should_use_colors() -> bool {
    std::io::stdout().is_terminal()
}

/// Get terminal width, defaulting to None for pipes (unlimited)
fn get_terminal_width() -> Option<usize> {
    terminal_size().map(|(Width(w), _)| w as usize)
}

/// Truncate text to fit available width, accounting for Unicode
fn truncate(text: &str, max_width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_width {
        text.to_string()
    } else if max_width > 3 {
        format!("{}...", chars[..max_width - 3].iter().collect::<String>())
    } else {
        chars[..max_width].iter().collect()
    }
}

fn bib_label(bib: u32) -> String {
    if bib == 0 {
        "-".to_string()
    } else {
        bib.to_string()
    }
}

fn name_and_team(standing: &IndividualStanding) -> (String, String) {
    match standing.runner {
        Some(ref runner) => (runner.name.clone(), runner.team.clone()),
        None => (UNKNOWN_LABEL.to_string(), UNKNOWN_LABEL.to_string()),
    }
}

/// One line acknowledging a just-recorded finish
pub fn format_finish(record: &FinishRecord, registry: &RunnerRegistry, use_colors: bool) -> String {
    let who = match registry.get(record.bib) {
        Some(runner) if record.bib != 0 => format!("{} ({})", runner.name, runner.team),
        _ => UNKNOWN_LABEL.to_string(),
    };
    let line = format!(
        "#{:<4} {:>5}  {}  {}  [{}]",
        record.sequence,
        bib_label(record.bib),
        format_elapsed(record.elapsed_ms),
        who,
        record.source
    );
    if use_colors && record.is_unassigned() {
        line.yellow().to_string()
    } else {
        line
    }
}

/// Individual results table with columns: Place, Bib, Name, Team, Time.
/// Names are truncated to fit the terminal; pipes get full names.
pub fn format_individual_table(standings: &[IndividualStanding], use_colors: bool) -> String {
    if standings.is_empty() {
        return "No finishes recorded.".to_string();
    }

    let rows: Vec<(String, String)> = standings.iter().map(name_and_team).collect();
    let team_width = rows.iter().map(|(_, t)| t.chars().count()).max().unwrap_or(4).max(4);
    let mut name_width = rows.iter().map(|(n, _)| n.chars().count()).max().unwrap_or(4).max(4);

    // place 5 + bib 6 + time 12 + separators
    let fixed_width = 5 + 6 + 12 + team_width + 8;
    if let Some(width) = get_terminal_width() {
        if width > fixed_width + 10 {
            name_width = name_width.min(width - fixed_width);
        } else {
            name_width = name_width.min(20);
        }
    }

    let header = format!(
        "{:>5} {:>5}  {:<nw$}  {:<tw$}  {:>12}",
        "Place",
        "Bib",
        "Name",
        "Team",
        "Time",
        nw = name_width,
        tw = team_width
    );
    let mut lines = vec![if use_colors {
        header.bold().to_string()
    } else {
        header
    }];

    for (standing, (name, team)) in standings.iter().zip(rows) {
        let place = format!("{:>4}.", standing.rank);
        let name = truncate(&name, name_width);
        let time = format_elapsed(standing.elapsed_ms);
        let line = format!(
            "{} {:>5}  {:<nw$}  {:<tw$}  {:>12}",
            place,
            bib_label(standing.bib),
            name,
            team,
            time,
            nw = name_width,
            tw = team_width
        );
        if use_colors && standing.runner.is_none() {
            lines.push(line.yellow().to_string());
        } else {
            lines.push(line);
        }
    }

    lines.join("\n")
}

fn format_member(standing: &IndividualStanding) -> String {
    let (name, _) = name_and_team(standing);
    format!(
        "      {:>4}.  {:>5}  {}  {}",
        standing.rank,
        bib_label(standing.bib),
        format_elapsed(standing.elapsed_ms),
        name
    )
}

/// Team results: one block per team with its scorers and displacers
pub fn format_team_results(teams: &[TeamStanding], use_colors: bool) -> String {
    if teams.is_empty() {
        return "No team results.".to_string();
    }

    let blocks: Vec<String> = teams
        .iter()
        .map(|team| {
            let place = team
                .place
                .map_or_else(|| "  -".to_string(), |p| format!("{:>2}.", p));
            let score = match team.score {
                TeamScore::Scored(score) => format!("{} pts", score),
                TeamScore::Unscored => format!("unscored ({} finishers)", team.finishers),
            };

            let mut lines = vec![if use_colors {
                format!("{} {}  {}", place.dimmed(), team.team.bold(), score.cyan())
            } else {
                format!("{} {}  {}", place, team.team, score)
            }];
            lines.extend(team.scorers.iter().map(format_member));
            if !team.displacers.is_empty() {
                lines.push("    displacers:".to_string());
                lines.extend(team.displacers.iter().map(format_member));
            }
            lines.join("\n")
        })
        .collect();

    blocks.join("\n\n")
}

/// All runners grouped under their team, teams and bibs ascending
pub fn format_runner_list(registry: &RunnerRegistry, use_colors: bool) -> String {
    if registry.is_empty() {
        return "No runners loaded.".to_string();
    }

    let mut lines = Vec::new();
    let mut current_team: Option<&str> = None;
    for runner in registry.runners_by_team() {
        if current_team != Some(runner.team.as_str()) {
            if current_team.is_some() {
                lines.push(String::new());
            }
            lines.push(if use_colors {
                runner.team.bold().to_string()
            } else {
                runner.team.clone()
            });
            current_team = Some(runner.team.as_str());
        }
        let tag = runner.rfid.as_deref().unwrap_or("");
        lines.push(format!("  {:>5}  {}  {}", runner.bib, runner.name, tag).trim_end().to_string());
    }
    lines.join("\n")
}

/// Individual results as tab-separated values for scripting
/// Columns: place, bib, name, team, elapsed_ms, time (no headers, no colors)
pub fn format_individual_tsv(standings: &[IndividualStanding]) -> String {
    standings
        .iter()
        .map(|standing| {
            let (name, team) = name_and_team(standing);
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                standing.rank,
                standing.bib,
                name,
                team,
                standing.elapsed_ms,
                format_elapsed(standing.elapsed_ms)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Runner, RunnerRow};
    use crate::results::FinishSource;
    use crate::scoring::{individual_standings, team_standings, ScoringConfig};

    fn registry() -> RunnerRegistry {
        let mut registry = RunnerRegistry::new();
        registry.load(vec![
            RunnerRow {
                line: 2,
                bib: "101".to_string(),
                name: "Ada Lovelace".to_string(),
                team: "Harriers".to_string(),
                rfid: Some("E2001".to_string()),
            },
            RunnerRow {
                line: 3,
                bib: "201".to_string(),
                name: "Grace Hopper".to_string(),
                team: "Striders".to_string(),
                rfid: None,
            },
        ]);
        registry
    }

    fn record(sequence: u64, bib: u32, elapsed_ms: u64) -> FinishRecord {
        FinishRecord {
            sequence,
            bib,
            elapsed_ms,
            heat: 1,
            source: FinishSource::Manual,
        }
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00.000");
        assert_eq!(format_elapsed(965_000), "16:05.000");
        assert_eq!(format_elapsed(61_007), "01:01.007");
        assert_eq!(format_elapsed(3_599_999), "59:59.999");
        assert_eq!(format_elapsed(3_600_000), "1:00:00.000");
        assert_eq!(format_elapsed(3_723_045), "1:02:03.045");
    }

    #[test]
    fn test_individual_table_labels_unknown() {
        let records = vec![record(1, 101, 960_000), record(2, 0, 965_000)];
        let standings = individual_standings(&records, &registry());
        let table = format_individual_table(&standings, false);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Place"));
        assert!(lines[1].contains("Ada Lovelace"));
        assert!(lines[1].contains("16:00.000"));
        assert!(lines[2].contains(UNKNOWN_LABEL));
        assert!(lines[2].contains("16:05.000"));
    }

    #[test]
    fn test_individual_table_empty() {
        assert_eq!(format_individual_table(&[], false), "No finishes recorded.");
    }

    #[test]
    fn test_team_results_unscored() {
        let records = vec![record(1, 101, 1000), record(2, 201, 2000)];
        let standings = individual_standings(&records, &registry());
        let teams = team_standings(&standings, &ScoringConfig::default());
        let output = format_team_results(&teams, false);
        assert!(output.contains("Harriers  unscored (1 finishers)"));
        assert!(output.contains("Striders"));
        assert!(!output.contains("displacers"));
    }

    #[test]
    fn test_runner_list_grouped() {
        let mut registry = registry();
        registry
            .insert(Runner {
                bib: 102,
                name: "Alan Turing".to_string(),
                team: "Harriers".to_string(),
                rfid: None,
            })
            .unwrap();
        let output = format_runner_list(&registry, false);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "Harriers");
        assert!(lines[1].contains("101") && lines[1].contains("E2001"));
        assert!(lines[2].contains("102"));
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Striders");
    }

    #[test]
    fn test_format_finish_line() {
        let registry = registry();
        let line = format_finish(&record(3, 101, 965_000), &registry, false);
        assert!(line.starts_with("#3"));
        assert!(line.contains("16:05.000"));
        assert!(line.contains("Ada Lovelace (Harriers)"));

        let missed = format_finish(&record(4, 0, 970_000), &registry, false);
        assert!(missed.contains(UNKNOWN_LABEL));
    }

    #[test]
    fn test_individual_tsv() {
        let standings = individual_standings(&[record(1, 201, 5000)], &registry());
        assert_eq!(
            format_individual_tsv(&standings),
            "1\t201\tGrace Hopper\tStriders\t5000\t00:05.000"
        );
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate("This is a very long name", 15), "This is a ve...");
        assert_eq!(truncate("Short", 20), "Short");
    }
}
