pub mod classifier;
pub mod constraints;
pub mod dialog;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod pipeline;
pub mod postprocessor;
pub mod progress;
pub mod report;

#[cfg(any(test, feature = "mock-gateways"))]
pub mod mock;

pub use dialog::DialogController;
pub use postprocessor::post_process;
pub use progress::StageTracker;
pub use report::{PipelineReport, StageMetrics};
