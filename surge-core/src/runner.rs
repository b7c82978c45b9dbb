mod options;
mod progress;
mod report;
mod run;
mod signal;
mod vu;

pub use options::{RunOptions, SaturationPolicy};
pub use progress::{ProgressFn, ProgressUpdate};
pub use report::RunReport;
pub use run::run;
pub use signal::{StopHandle, StopReason};
pub use vu::STOPPED_BEFORE_RESPONSE;
