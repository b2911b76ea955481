pub mod model;
pub mod printer;
pub mod recorder;
pub mod storage;

pub use model::{HistoryEntry, RunSummary};
pub use printer::list_history;
pub use recorder::record_run;
pub use storage::HistoryStorage;
