pub mod analyzer;
pub mod config;
pub mod error;
pub mod history;
pub mod logger;
pub mod report;
pub mod runner;
pub mod scanner;

// Re-export commonly used types
pub use config::{ConfigLoader, RadarConfig};
pub use error::{RadarError, Result};
pub use report::Report;
pub use runner::{BatchCancel, TestExecutor, TestResult, TestStatus};
pub use scanner::{Scanner, TestCase};
