pub mod extractor;
pub mod fetcher;
pub mod game_launcher;
pub mod permissions;
pub mod pipeline;

pub use extractor::ArchiveExtractor;
pub use fetcher::{cancel_pair, CancelHandle, CancelToken, Fetcher, ProgressSink};
pub use game_launcher::GameLauncher;
pub use permissions::ensure_executable;
pub use pipeline::InstallPipeline;
