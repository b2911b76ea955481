pub mod cancel;
pub mod executor;
pub mod extract;
pub mod inflight;
mod process;
pub mod reporter;
pub mod types;

pub use cancel::BatchCancel;
pub use executor::TestExecutor;
pub use reporter::TestReporter;
pub use types::{BatchCancelled, ExecutionError, ResultMap, TestResult, TestStatus};
