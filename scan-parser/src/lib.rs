pub mod decoder;
pub mod metadata;
pub mod storage;

pub use decoder::{load_image, DecodeError};
pub use metadata::{extract_metadata, MetadataError, PairMetadata};
pub use storage::{CropRect, PairListing, PairSource, ScanStore, ScanSummary, StorageError};
