pub mod error;
pub mod infohash;
pub mod metadata;

pub use error::TorrentError;
pub use infohash::{calculate_info_hash, sha1_digest};
pub use metadata::{Torrent, TorrentInfo};
