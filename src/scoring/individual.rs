use serde::Serialize;

use crate::registry::{Runner, RunnerRegistry};
use crate::results::{FinishRecord, FinishSource, UNASSIGNED_BIB};

/// One finisher's overall place
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndividualStanding {
    pub rank: usize,
    pub sequence: u64,
    pub bib: u32,
    /// `None` for bib 0 and for bibs the registry does not know
    pub runner: Option<Runner>,
    pub elapsed_ms: u64,
    pub source: FinishSource,
}

impl IndividualStanding {
    pub fn team(&self) -> Option<&str> {
        self.runner.as_ref().map(|r| r.team.as_str())
    }

    /// Counts toward a team: a real bib that the registry resolves
    pub fn is_resolvable(&self) -> bool {
        self.bib != UNASSIGNED_BIB && self.runner.is_some()
    }
}

/// Rank every finish by elapsed time.
///
/// Sequence order is arrival order, not time order, so records are re-sorted
/// by `elapsed_ms`, with the sequence number breaking millisecond collisions.
/// Unassigned and unknown bibs take a place like anyone else.
pub fn individual_standings(
    records: &[FinishRecord],
    registry: &RunnerRegistry,
) -> Vec<IndividualStanding> {
    let mut ordered: Vec<&FinishRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.elapsed_ms, r.sequence));

    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, record)| IndividualStanding {
            rank: idx + 1,
            sequence: record.sequence,
            bib: record.bib,
            runner: match record.bib {
                UNASSIGNED_BIB => None,
                bib => registry.get(bib).cloned(),
            },
            elapsed_ms: record.elapsed_ms,
            source: record.source,
        })
        .collect()
}
