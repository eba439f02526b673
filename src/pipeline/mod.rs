// Fetch → normalize → persist

pub mod archive;
pub mod normalize;
pub mod orchestrator;

pub use normalize::ReportNormalizer;
pub use orchestrator::{Pipeline, RecordOutcome, RunSummary};
