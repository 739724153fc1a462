// Model asset provisioning
//
// Assets move through four stages, each detectable on disk so an interrupted
// run resumes where it stopped:
// - download: stream the catalog URL to <id>/download/
// - verify:   SHA-256 against the catalog digest
// - extract:  unpack into <id>/extract/, then drop the archive
// - install:  move mapped members into setup/, then drop the staging dir

pub mod catalog;
pub mod extract;
pub mod fetch;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod verify;

pub use catalog::{AssetCatalog, ModelDescriptor};
pub use fetch::{Fetcher, HttpFetcher};
pub use paths::StagePaths;
pub use pipeline::{AssetPipeline, AssetStatus};
pub use progress::{DownloadProgress, ProgressSink};
pub use verify::Verifier;
