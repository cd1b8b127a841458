// session.rs
use std::net::SocketAddrV4;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::PeerError;
use crate::file_io::{write_piece, write_pieces_in_order};
use crate::peer::PeerConnection;
use crate::peer_pool::PeerPool;
use crate::progress::ProgressTracker;
use crate::torrent::Torrent;

#[derive(Debug, Error)]
pub enum DownloadError {
	#[error("No peers available")]
	NoPeers,

	#[error("Piece index {index} is out of range (torrent has {count} pieces)")]
	PieceIndexOutOfRange { index: u32, count: usize },

	#[error("Piece {index} from peer {addr} failed SHA-1 verification")]
	HashMismatch { index: u32, addr: SocketAddrV4 },

	#[error("Piece {index} from peer {addr}: {source}")]
	Peer {
		index: u32,
		addr: SocketAddrV4,
		#[source]
		source: PeerError,
	},

	#[error("Failed to write output: {0}")]
	Io(#[from] std::io::Error),

	#[error("Piece task failed: {0}")]
	Task(#[from] tokio::task::JoinError),

	#[error("Download cancelled")]
	Cancelled,
}

impl DownloadError {
	/// Failures worth another attempt with a different peer.
	pub fn is_retryable(&self) -> bool {
		match self {
			DownloadError::HashMismatch { .. } => true,
			DownloadError::Peer { source, .. } => source.is_retryable(),
			_ => false,
		}
	}
}

/// Downloads pieces of one torrent. Cloning is cheap and clones share the
/// cancellation token.
#[derive(Debug, Clone)]
pub struct DownloadSession {
	torrent: Arc<Torrent>,
	peer_id: [u8; 20],
	connect_timeout: Duration,
	request_timeout: Duration,
	max_peers: usize,
	max_retries: u32,
	cancel: CancellationToken,
}

impl DownloadSession {
	pub fn new(torrent: Torrent, peer_id: [u8; 20], config: &Config) -> Self {
		Self {
			torrent: Arc::new(torrent),
			peer_id,
			connect_timeout: config.connect_timeout(),
			request_timeout: config.request_timeout(),
			max_peers: config.max_peers,
			max_retries: config.max_retries,
			cancel: CancellationToken::new(),
		}
	}

	pub fn torrent(&self) -> &Torrent {
		&self.torrent
	}

	/// Token that stops every in-flight piece task when cancelled.
	pub fn cancel_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	fn check_index(&self, index: u32) -> Result<(), DownloadError> {
		let count = self.torrent.piece_count();
		if (index as usize) < count {
			Ok(())
		} else {
			Err(DownloadError::PieceIndexOutOfRange { index, count })
		}
	}

	/// Downloads piece `index` from the first peer and writes it to `output`.
	/// Any failure is returned as is.
	pub async fn download_piece(
		&self,
		peers: &[SocketAddrV4],
		index: u32,
		output: &Path,
	) -> Result<(), DownloadError> {
		self.check_index(index)?;
		let addr = *peers.first().ok_or(DownloadError::NoPeers)?;

		let data = self.fetch_piece(addr, index).await?;
		write_piece(output, &data).await?;
		info!("Piece {} downloaded to {}", index, output.display());
		Ok(())
	}

	/// Downloads every piece concurrently and writes the file to `output` in
	/// piece order. The first fatal piece failure cancels the rest.
	pub async fn download_torrent(
		&self,
		peers: &[SocketAddrV4],
		output: &Path,
		progress: &ProgressTracker,
	) -> Result<(), DownloadError> {
		if peers.is_empty() {
			return Err(DownloadError::NoPeers);
		}
		let count = self.torrent.piece_count();
		let pool = PeerPool::new(peers.iter().copied().take(self.max_peers));
		info!("Downloading {} pieces using {} peers", count, pool.capacity());

		let mut tasks = JoinSet::new();
		for index in 0..count as u32 {
			let session = self.clone();
			let pool = Arc::clone(&pool);
			tasks.spawn(async move { (index, session.fetch_with_retry(&pool, index).await) });
		}

		let mut pieces: Vec<Option<Vec<u8>>> = vec![None; count];
		while let Some(joined) = tasks.join_next().await {
			let outcome = joined.map_err(DownloadError::from).and_then(|(index, result)| {
				result.map(|data| (index, data))
			});
			match outcome {
				Ok((index, data)) => {
					progress.increment(index);
					pieces[index as usize] = Some(data);
				}
				Err(err) => {
					warn!("Aborting download: {}", err);
					self.cancel.cancel();
					return Err(err);
				}
			}
		}
		progress.finish();

		let pieces: Vec<Vec<u8>> = pieces
			.into_iter()
			.collect::<Option<_>>()
			.ok_or(DownloadError::Cancelled)?;
		let written = write_pieces_in_order(output, &pieces).await?;
		info!("Downloaded {} bytes to {}", written, output.display());
		Ok(())
	}

	/// Leases a peer per attempt; retryable failures move on to the next
	/// pooled peer until `max_retries` extra attempts are spent.
	async fn fetch_with_retry(&self, pool: &Arc<PeerPool>, index: u32) -> Result<Vec<u8>, DownloadError> {
		let mut attempt = 0;
		loop {
			let lease = pool.acquire(&self.cancel).await.ok_or(DownloadError::Cancelled)?;
			let result = self.fetch_piece(lease.addr(), index).await;
			drop(lease);

			match result {
				Err(err) if err.is_retryable() && attempt < self.max_retries => {
					attempt += 1;
					warn!("Piece {}: {} (retry {}/{})", index, err, attempt, self.max_retries);
				}
				other => return other,
			}
		}
	}

	/// One attempt: dial, handshake, run the wire protocol, verify the hash.
	async fn fetch_piece(&self, addr: SocketAddrV4, index: u32) -> Result<Vec<u8>, DownloadError> {
		let peer_err = |source| DownloadError::Peer { index, addr, source };

		let mut conn = PeerConnection::connect(
			addr,
			&self.torrent.info_hash,
			&self.peer_id,
			self.connect_timeout,
			self.request_timeout,
			self.cancel.clone(),
		)
		.await
		.map_err(peer_err)?;
		debug!("Peer {} id {} serving piece {}", addr, hex::encode(conn.remote_peer_id()), index);

		let result = conn.download_piece(&self.torrent, index).await;
		conn.close().await;
		let buffer = result.map_err(peer_err)?;

		let expected = self
			.torrent
			.piece_hash(index)
			.ok_or(DownloadError::PieceIndexOutOfRange { index, count: self.torrent.piece_count() })?;
		if !buffer.verify(expected) {
			return Err(DownloadError::HashMismatch { index, addr });
		}
		Ok(buffer.into_bytes())
	}
}
