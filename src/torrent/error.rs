use thiserror::Error;

use crate::bencode::BencodeError;

#[derive(Debug, Error)]
pub enum TorrentError {
	#[error("I/O error while reading torrent: {0}")]
	Io(#[from] std::io::Error),

	#[error("Bencode error: {0}")]
	Bencode(#[from] BencodeError),

	#[error("Invalid torrent field '{field}': {reason}")]
	Schema { field: &'static str, reason: String },
}

impl TorrentError {
	pub(crate) fn schema(field: &'static str, reason: impl Into<String>) -> Self {
		TorrentError::Schema { field, reason: reason.into() }
	}
}
