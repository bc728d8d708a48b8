use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::config::{ScoringConfig, TieBreak};
use super::individual::IndividualStanding;

/// Team total, or `Unscored` when the team has too few finishers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamScore {
    Scored(usize),
    Unscored,
}

impl TeamScore {
    pub fn value(&self) -> Option<usize> {
        match self {
            TeamScore::Scored(score) => Some(*score),
            TeamScore::Unscored => None,
        }
    }
}

impl fmt::Display for TeamScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamScore::Scored(score) => write!(f, "{}", score),
            TeamScore::Unscored => f.write_str("unscored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamStanding {
    /// Team place; `None` for unscored teams
    pub place: Option<usize>,
    pub team: String,
    pub score: TeamScore,
    /// Finishers summed into the score. For an unscored team, everyone who finished.
    pub scorers: Vec<IndividualStanding>,
    pub displacers: Vec<IndividualStanding>,
    /// Distinct finishers counted for the team
    pub finishers: usize,
}

struct Candidate<'a> {
    team: &'a str,
    members: Vec<&'a IndividualStanding>,
}

impl Candidate<'_> {
    /// Rank of the first finisher after the scorers, if there is one
    fn sixth_rank(&self, scorers: usize) -> usize {
        self.members.get(scorers).map_or(usize::MAX, |s| s.rank)
    }

    fn into_standing(self, config: &ScoringConfig) -> TeamStanding {
        let scorers = config.scorers();
        let finishers = self.members.len();

        let (score, scoring, displacers) = if finishers >= scorers {
            let scoring: Vec<IndividualStanding> =
                self.members[..scorers].iter().map(|s| (*s).clone()).collect();
            let displacers = self.members[scorers..]
                .iter()
                .take(config.displacers())
                .map(|s| (*s).clone())
                .collect();
            let total = scoring.iter().map(|s| s.rank).sum();
            (TeamScore::Scored(total), scoring, displacers)
        } else {
            let everyone = self.members.iter().map(|s| (*s).clone()).collect();
            (TeamScore::Unscored, everyone, Vec::new())
        };

        TeamStanding {
            place: None,
            team: self.team.to_string(),
            score,
            scorers: scoring,
            displacers,
            finishers,
        }
    }
}

/// Cross-country team standings.
///
/// Only resolvable finishers count, each bib once (its best place). A team
/// with at least `scorers` finishers scores the sum of their overall ranks;
/// lower wins. Scored teams come first, ordered by score and then by the
/// configured tie-break; unscored teams follow in name order.
pub fn team_standings(
    standings: &[IndividualStanding],
    config: &ScoringConfig,
) -> Vec<TeamStanding> {
    let mut ordered: Vec<&IndividualStanding> = standings.iter().collect();
    ordered.sort_by_key(|s| s.rank);

    let mut seen = HashSet::new();
    let mut by_team: BTreeMap<&str, Vec<&IndividualStanding>> = BTreeMap::new();
    for standing in ordered {
        let Some(team) = standing.team() else {
            continue;
        };
        if !standing.is_resolvable() || !seen.insert(standing.bib) {
            continue;
        }
        by_team.entry(team).or_default().push(standing);
    }

    let scorers = config.scorers();
    let tie_break = config.tie_break();

    let (mut scored, unscored): (Vec<Candidate>, Vec<Candidate>) = by_team
        .into_iter()
        .map(|(team, members)| Candidate { team, members })
        .partition(|c| c.members.len() >= scorers);

    let score_of = |c: &Candidate| c.members[..scorers].iter().map(|s| s.rank).sum::<usize>();

    // BTreeMap iteration already gives name order; sorts below are stable.
    match tie_break {
        TieBreak::SixthRunner => {
            scored.sort_by_key(|c| (score_of(c), c.sixth_rank(scorers)));
        }
        TieBreak::Shared | TieBreak::TeamName => scored.sort_by_key(score_of),
    }

    let mut result = Vec::with_capacity(scored.len() + unscored.len());
    let mut previous: Option<(usize, usize, usize)> = None;
    for (idx, candidate) in scored.into_iter().enumerate() {
        let score = score_of(&candidate);
        let sixth = candidate.sixth_rank(scorers);
        let place = match (tie_break, previous) {
            (TieBreak::Shared, Some((prev_place, prev_score, _))) if prev_score == score => {
                prev_place
            }
            (TieBreak::SixthRunner, Some((prev_place, prev_score, prev_sixth)))
                if prev_score == score && prev_sixth == sixth =>
            {
                prev_place
            }
            _ => idx + 1,
        };
        previous = Some((place, score, sixth));

        let mut standing = candidate.into_standing(config);
        standing.place = Some(place);
        result.push(standing);
    }
    result.extend(unscored.into_iter().map(|c| c.into_standing(config)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RunnerRegistry, RunnerRow};
    use crate::results::{FinishRecord, FinishSource};
    use crate::scoring::individual_standings;

    fn registry(teams: &[(&str, std::ops::RangeInclusive<u32>)]) -> RunnerRegistry {
        let mut registry = RunnerRegistry::new();
        for (team, bibs) in teams {
            registry.load(bibs.clone().map(|bib| RunnerRow {
                line: bib as usize,
                bib: bib.to_string(),
                name: format!("Runner {}", bib),
                team: team.to_string(),
                rfid: None,
            }));
        }
        registry
    }

    /// Records in arrival order with explicit times
    fn records(bibs_and_times: &[(u32, u64)]) -> Vec<FinishRecord> {
        bibs_and_times
            .iter()
            .enumerate()
            .map(|(idx, &(bib, elapsed_ms))| FinishRecord {
                sequence: idx as u64 + 1,
                bib,
                elapsed_ms,
                heat: 1,
                source: FinishSource::Manual,
            })
            .collect()
    }

    /// Records whose times follow arrival order, one second apart
    fn in_order(bibs: &[u32]) -> Vec<FinishRecord> {
        let timed: Vec<(u32, u64)> = bibs
            .iter()
            .enumerate()
            .map(|(idx, &bib)| (bib, 1000 * (idx as u64 + 1)))
            .collect();
        records(&timed)
    }

    fn mm_ss(minutes: u64, seconds: u64) -> u64 {
        (minutes * 60 + seconds) * 1000
    }

    #[test]
    fn test_five_runner_team_scored_by_time() {
        let registry = registry(&[("X", 101..=105)]);
        let records = records(&[
            (103, mm_ss(16, 0)),
            (101, mm_ss(16, 5)),
            (104, mm_ss(16, 10)),
            (102, mm_ss(16, 15)),
            (105, mm_ss(16, 20)),
        ]);
        let individual = individual_standings(&records, &registry);
        let ranks: Vec<(u32, usize)> = individual.iter().map(|s| (s.bib, s.rank)).collect();
        assert_eq!(ranks, vec![(103, 1), (101, 2), (104, 3), (102, 4), (105, 5)]);

        let teams = team_standings(&individual, &ScoringConfig::default());
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].team, "X");
        assert_eq!(teams[0].score, TeamScore::Scored(15));
        assert_eq!(teams[0].place, Some(1));
        assert!(teams[0].displacers.is_empty());
    }

    #[test]
    fn test_time_order_differs_from_arrival_order() {
        let registry = registry(&[("X", 101..=105)]);
        // 105 keyed first but crossed last
        let records = records(&[
            (105, 5000),
            (101, 1000),
            (102, 2000),
            (103, 3000),
            (104, 4000),
        ]);
        let individual = individual_standings(&records, &registry);
        assert_eq!(individual[4].bib, 105);
        let teams = team_standings(&individual, &ScoringConfig::default());
        assert_eq!(teams[0].scorers.last().map(|s| s.bib), Some(105));
    }

    #[test]
    fn test_four_finishers_unscored() {
        let registry = registry(&[("X", 101..=105)]);
        let individual = individual_standings(&in_order(&[101, 102, 103, 104]), &registry);
        let teams = team_standings(&individual, &ScoringConfig::default());
        assert_eq!(teams[0].score, TeamScore::Unscored);
        assert_eq!(teams[0].place, None);
        assert_eq!(teams[0].finishers, 4);
        assert!(teams[0].displacers.is_empty());
    }

    #[test]
    fn test_displacers_and_ranks_include_other_teams() {
        let registry = registry(&[("X", 101..=108), ("Y", 201..=205)]);
        let individual = individual_standings(
            &in_order(&[101, 201, 102, 103, 202, 104, 105, 203, 106, 204, 107, 205, 108]),
            &registry,
        );
        let teams = team_standings(&individual, &ScoringConfig::default());

        let x = teams.iter().find(|t| t.team == "X").unwrap();
        // 101=1, 102=3, 103=4, 104=6, 105=7
        assert_eq!(x.score, TeamScore::Scored(21));
        let displacers: Vec<u32> = x.displacers.iter().map(|s| s.bib).collect();
        assert_eq!(displacers, vec![106, 107]);
        assert_eq!(x.finishers, 8);

        let y = teams.iter().find(|t| t.team == "Y").unwrap();
        // 201=2, 202=5, 203=8, 204=10, 205=12
        assert_eq!(y.score, TeamScore::Scored(37));
        assert_eq!(teams[0].team, "X");
    }

    #[test]
    fn test_unassigned_and_unknown_excluded() {
        let registry = registry(&[("X", 101..=105)]);
        let individual =
            individual_standings(&in_order(&[0, 101, 102, 999, 103, 104]), &registry);
        let teams = team_standings(&individual, &ScoringConfig::default());
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].score, TeamScore::Unscored);
        assert_eq!(teams[0].finishers, 4);
    }

    #[test]
    fn test_duplicate_bib_counts_once() {
        let registry = registry(&[("X", 101..=105)]);
        let individual =
            individual_standings(&in_order(&[101, 101, 102, 103, 104]), &registry);
        let teams = team_standings(&individual, &ScoringConfig::default());
        assert_eq!(teams[0].finishers, 4);
        assert_eq!(teams[0].score, TeamScore::Unscored);
    }

    #[test]
    fn test_lower_score_wins() {
        let registry = registry(&[("Beta", 201..=206), ("Alpha", 101..=105)]);
        // Beta ranks 1,4,5,8,10 = 28; Alpha ranks 2,3,6,7,9 = 27
        let order = [201, 101, 102, 202, 203, 103, 104, 204, 105, 205, 206];
        let individual = individual_standings(&in_order(&order), &registry);
        let teams = team_standings(&individual, &ScoringConfig::default());
        assert_eq!(teams[0].team, "Alpha");
        assert_eq!(teams[0].score, TeamScore::Scored(27));
        assert_eq!(teams[1].team, "Beta");
        assert_eq!(teams[1].score, TeamScore::Scored(28));
        assert_eq!(teams[1].place, Some(2));
    }

    /// Two teams on 30 points; Beta has a sixth runner, Alpha does not
    fn equal_score_teams() -> Vec<IndividualStanding> {
        let registry = registry(&[("Beta", 201..=206), ("Alpha", 101..=105)]);
        // Beta ranks 1,4,5,9,11 with a sixth at 12; Alpha ranks 2,3,7,8,10
        let order = [201, 101, 102, 202, 203, 0, 103, 104, 204, 105, 205, 206];
        individual_standings(&in_order(&order), &registry)
    }

    #[test]
    fn test_tie_break_sixth_runner() {
        let teams = team_standings(&equal_score_teams(), &ScoringConfig::default());
        assert_eq!(teams[0].score, TeamScore::Scored(30));
        assert_eq!(teams[1].score, TeamScore::Scored(30));
        assert_eq!(teams[0].team, "Beta");
        assert_eq!(teams[0].place, Some(1));
        assert_eq!(teams[1].team, "Alpha");
        assert_eq!(teams[1].place, Some(2));
    }

    #[test]
    fn test_tie_break_shared() {
        let config = ScoringConfig {
            tie_break: Some(TieBreak::Shared),
            ..ScoringConfig::default()
        };
        let teams = team_standings(&equal_score_teams(), &config);
        assert_eq!(teams[0].team, "Alpha");
        assert_eq!(teams[0].place, Some(1));
        assert_eq!(teams[1].team, "Beta");
        assert_eq!(teams[1].place, Some(1));
    }

    #[test]
    fn test_tie_break_team_name() {
        let config = ScoringConfig {
            tie_break: Some(TieBreak::TeamName),
            ..ScoringConfig::default()
        };
        let teams = team_standings(&equal_score_teams(), &config);
        assert_eq!(teams[0].team, "Alpha");
        assert_eq!(teams[0].place, Some(1));
        assert_eq!(teams[1].team, "Beta");
        assert_eq!(teams[1].place, Some(2));
    }

    #[test]
    fn test_unscored_listed_after_scored_by_name() {
        let registry = registry(&[("Zeta", 301..=305), ("Gamma", 201..=202), ("Alpha", 101..=101)]);
        let individual = individual_standings(
            &in_order(&[101, 201, 301, 302, 202, 303, 304, 305]),
            &registry,
        );
        let teams = team_standings(&individual, &ScoringConfig::default());
        let names: Vec<&str> = teams.iter().map(|t| t.team.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Gamma"]);
        assert!(teams[1].place.is_none());
    }

    #[test]
    fn test_configured_scorer_count() {
        let registry = registry(&[("X", 101..=104)]);
        let individual = individual_standings(&in_order(&[101, 102, 103, 104]), &registry);
        let config = ScoringConfig {
            scorers: Some(3),
            displacers: Some(1),
            ..ScoringConfig::default()
        };
        let teams = team_standings(&individual, &config);
        assert_eq!(teams[0].score, TeamScore::Scored(6));
        assert_eq!(teams[0].displacers.len(), 1);
    }

    #[test]
    fn test_idempotent() {
        let individual = equal_score_teams();
        let config = ScoringConfig::default();
        assert_eq!(
            team_standings(&individual, &config),
            team_standings(&individual, &config)
        );
    }
}
