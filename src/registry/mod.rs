pub mod aliases;
pub mod import;
pub mod runners;
pub mod types;

pub use aliases::{CanonicalField, ColumnAliases};
pub use import::{import_csv, read_csv_rows};
pub use runners::{ImportReport, RunnerRegistry};
pub use types::{Runner, RunnerRow};
