// Normalization and aggregation pipeline for dengue case-notification
// exports (SINAN-style `;`-separated files).
//
// raw bytes → [`loader`] → [`normalize`] / [`classify`] → [`dataset::Dataset`]
// → [`filter::FilteredView`] → [`reports`].
pub mod classify;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod loader;
pub mod logging;
pub mod normalize;
pub mod output;
pub mod reports;
pub mod types;
pub mod util;

pub use config::PipelineConfig;
pub use dataset::{Dataset, DatasetCache};
pub use error::{PipelineError, Result};
pub use filter::{apply, FilterSelection, FilteredView};
pub use loader::{load_dataset, load_or_empty, LoadReport};
pub use types::{CaseStatus, NotificationRecord};
