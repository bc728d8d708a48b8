pub mod store;
pub mod types;

pub use store::ResultsStore;
pub use types::{FinishRecord, FinishSource, UNASSIGNED_BIB};
