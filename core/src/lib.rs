pub mod batcher;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod decode;
pub mod error;
pub mod experiment;
pub mod metrics;
pub mod model;
pub mod report;
pub mod rng;
pub mod session;
pub mod visualization;

pub use batcher::{Batch, MnistData, Partition, PartitionKind, ShuffledCursor};
pub use cache::{load_or_fetch, DatasetCache, Fetcher, HttpFetcher, Resource};
pub use config::{load_or_init, RunConfig};
pub use dataset::{DatasetShape, RawDataset};
pub use error::DatasetError;
pub use experiment::RunArgs;
pub use metrics::{EpochMetrics, EvaluationMetrics, TrainingHistory};
pub use model::{Classifier, FitOptions};
pub use report::{report_misclassifications, ArtifactNamer, ReportOptions, ReportSummary};
pub use rng::seeded_rng;
pub use session::{PredictionOutcome, Session};
pub use visualization::{encode_luma_png, render_terminal_preview};
