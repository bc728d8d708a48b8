pub mod manual;
pub mod recorder;
pub mod session;
pub mod storage;

pub use manual::{ManualInput, ManualOutcome, ManualToken};
pub use recorder::FinishRecorder;
pub use session::{HeatId, RaceSession};
pub use storage::{
    heat_dir, latest_heat_number, load_runners, load_session, next_heat_number, results_path,
    save_runners, save_session, try_lock_heat, HeatLock,
};
