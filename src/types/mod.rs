mod models;

pub use models::{PackageIndex, PackageMetadata, RateWindow, VersionSummary};
