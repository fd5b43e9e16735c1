//! Dataset ingestion: file loading, merging, and the product reference table.

pub mod loader;
pub mod merge;
pub mod weights;

pub use loader::{load_all, load_records, resolve_dataset_path};
pub use merge::{merge_datasets, DatasetId, MergedTimeline, SourceEvent};
pub use weights::ProductWeightTable;
