use std::net::SocketAddrV4;

use thiserror::Error;

/// Errors raised while talking to a single peer.
#[derive(Debug, Error)]
pub enum PeerError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Failed to connect to peer {addr}: {source}")]
	Connect { addr: SocketAddrV4, source: std::io::Error },

	#[error("Handshake failed: {0}")]
	Handshake(String),

	#[error("Handshake failed: info hash mismatch (peer sent {0})")]
	InfoHashMismatch(String),

	#[error("Protocol error: {0}")]
	Protocol(String),

	#[error("Unexpected message while waiting for a block: {0}")]
	UnexpectedMessage(String),

	#[error("Peer does not have piece {0}")]
	PeerLacksPiece(u32),

	#[error("Piece {0} is out of range for this torrent")]
	InvalidPiece(u32),

	#[error("Peer choked us")]
	PeerChoked,

	#[error("Timed out during {0}")]
	Timeout(&'static str),

	#[error("Cancelled")]
	Cancelled,
}

impl PeerError {
	/// Failures that another peer may not repeat.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			PeerError::PeerLacksPiece(_) | PeerError::PeerChoked | PeerError::Timeout(_)
		)
	}
}
