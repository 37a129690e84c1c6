mod index;
mod integrity;
mod manifest;
mod name;
mod storage;
mod upload;
mod version;

pub use index::VersionIndex;
pub use integrity::compute_integrity;
pub use manifest::extract_manifest;
pub use name::{PackageName, normalize_scope};
pub use storage::ArchiveStore;
pub use upload::{UploadPipeline, UploadReceipt, UploadRequest};
pub use version::{VersionTriple, validate_version};
