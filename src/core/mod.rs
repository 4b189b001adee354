pub mod blackhole;
pub mod download;
pub mod engine;
pub mod progress;
pub mod task;
pub mod torrent;

pub use blackhole::BlackholeSync;
pub use download::{DownloadFilter, DownloadSync};
pub use engine::SyncEngine;
pub use progress::{estimate, pending_progress, PendingDownload, Progress};
pub use task::{SyncContext, SyncReport, SyncTask, TaskKind};
pub use torrent::{decode_torrent, BencodeValue, TorrentMeta};

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
pub(crate) use testing::{test_config, FaultyTransport};
