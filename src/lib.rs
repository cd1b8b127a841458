// lib.rs - Library interface for the BitTorrent client

pub mod bencode;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_io;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod peer_pool;
pub mod piece;
pub mod progress;
pub mod session;
pub mod torrent;
pub mod tracker;
pub mod utils;

// Re-export commonly used types
pub use bencode::{decode_bencode, encode_bvalue, BValue, BencodeError};
pub use config::{Config, ConfigError};
pub use error::PeerError;
pub use message::Message;
pub use peer::{has_piece, PeerConnection, PieceState};
pub use session::{DownloadError, DownloadSession};
pub use torrent::{Torrent, TorrentError, TorrentInfo};
pub use tracker::{fetch_peers, TrackerError, TrackerResponse};
