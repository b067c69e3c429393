//! Standalone runs and operator-facing output.
mod progress;
mod runner;
mod summary;


pub use runner::{TaskResult, run_standalone};
pub use summary::{print_results, summary_lines};
