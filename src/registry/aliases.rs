use std::collections::HashMap;

use crate::error::{RaceError, RaceResult};

/// Fixed record shape every import is resolved into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Bib,
    Name,
    Team,
    Rfid,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 4] = [
        CanonicalField::Bib,
        CanonicalField::Name,
        CanonicalField::Team,
        CanonicalField::Rfid,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bib" => Some(CanonicalField::Bib),
            "name" => Some(CanonicalField::Name),
            "team" => Some(CanonicalField::Team),
            "rfid" => Some(CanonicalField::Rfid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Bib => "bib",
            CanonicalField::Name => "name",
            CanonicalField::Team => "team",
            CanonicalField::Rfid => "rfid",
        }
    }

    fn required(&self) -> bool {
        !matches!(self, CanonicalField::Rfid)
    }
}

/// Header spelling -> canonical field table, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct ColumnAliases {
    table: HashMap<CanonicalField, Vec<String>>,
}

/// Column index of each canonical field in one particular CSV file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub bib: usize,
    pub name: usize,
    pub team: usize,
    pub rfid: Option<usize>,
}

fn normalize(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Default for ColumnAliases {
    fn default() -> Self {
        let mut table = HashMap::new();
        let builtin: [(CanonicalField, &[&str]); 4] = [
            (CanonicalField::Bib, &["bib", "bib number", "bib #", "bib no", "number"]),
            (
                CanonicalField::Name,
                &["name", "full name", "runner", "runner name", "athlete"],
            ),
            (CanonicalField::Team, &["team", "team name", "school", "club"]),
            (CanonicalField::Rfid, &["rfid", "rfid tag", "tag", "chip", "chip id"]),
        ];
        for (field, spellings) in builtin {
            table.insert(field, spellings.iter().map(|s| normalize(s)).collect());
        }
        Self { table }
    }
}

impl ColumnAliases {
    /// Built-in table plus configured spellings (keys already validated at startup;
    /// unknown keys are ignored here).
    pub fn with_overrides(overrides: Option<&HashMap<String, Vec<String>>>) -> Self {
        let mut aliases = Self::default();
        if let Some(overrides) = overrides {
            for (key, spellings) in overrides {
                if let Some(field) = CanonicalField::parse(key) {
                    let entry = aliases.table.entry(field).or_default();
                    for spelling in spellings {
                        let spelling = normalize(spelling);
                        if !spelling.is_empty() && !entry.contains(&spelling) {
                            entry.push(spelling);
                        }
                    }
                }
            }
        }
        aliases
    }

    pub fn field_for(&self, header: &str) -> Option<CanonicalField> {
        let header = normalize(header);
        CanonicalField::ALL
            .into_iter()
            .find(|field| self.table.get(field).is_some_and(|s| s.contains(&header)))
    }

    /// Resolve a header row into column positions. The first matching column
    /// wins when a file repeats a field.
    pub fn resolve<'a, I>(&self, headers: I) -> RaceResult<ColumnMap>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found: HashMap<CanonicalField, usize> = HashMap::new();
        for (idx, header) in headers.into_iter().enumerate() {
            if let Some(field) = self.field_for(header) {
                found.entry(field).or_insert(idx);
            }
        }

        let missing: Vec<&str> = CanonicalField::ALL
            .iter()
            .filter(|f| f.required() && !found.contains_key(f))
            .map(|f| f.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(RaceError::validation(format!(
                "CSV header is missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(ColumnMap {
            bib: found[&CanonicalField::Bib],
            name: found[&CanonicalField::Name],
            team: found[&CanonicalField::Team],
            rfid: found.get(&CanonicalField::Rfid).copied(),
        })
    }
}
