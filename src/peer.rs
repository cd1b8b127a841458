use std::future::Future;
use std::net::SocketAddrV4;
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::PeerError;
use crate::handshake;
use crate::message::{read_message, send_message, Message};
use crate::piece::{block_requests, BlockRequest, PieceBuffer};
use crate::torrent::Torrent;

/// Progress of a single-piece download over one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceState {
	AwaitBitfieldOrHave,
	AwaitUnchoke,
	RequestingBlocks,
	Done,
}

/// Returns whether the bitfield advertises `index`. Bit 0 is the high bit
/// of the first byte.
pub fn has_piece(bitfield: &[u8], index: u32) -> bool {
	let byte_index = (index / 8) as usize;
	let bit_index = 7 - (index % 8);
	bitfield
		.get(byte_index)
		.map_or(false, |byte| byte & (1 << bit_index) != 0)
}

/// Runs `fut` under the per-operation deadline, giving up early when
/// `cancel` fires.
pub(crate) async fn guarded<T, F>(
	cancel: &CancellationToken,
	deadline: Duration,
	what: &'static str,
	fut: F,
) -> Result<T, PeerError>
where
	F: Future<Output = Result<T, PeerError>>,
{
	tokio::select! {
		_ = cancel.cancelled() => Err(PeerError::Cancelled),
		res = tokio::time::timeout(deadline, fut) => res.map_err(|_| PeerError::Timeout(what))?,
	}
}

/// A handshaken connection to one peer.
pub struct PeerConnection<S> {
	stream: S,
	label: String,
	remote_peer_id: [u8; 20],
	request_timeout: Duration,
	cancel: CancellationToken,
}

impl PeerConnection<TcpStream> {
	/// Dials `addr` and performs the handshake.
	pub async fn connect(
		addr: SocketAddrV4,
		info_hash: &[u8; 20],
		peer_id: &[u8; 20],
		connect_timeout: Duration,
		request_timeout: Duration,
		cancel: CancellationToken,
	) -> Result<Self, PeerError> {
		let stream = guarded(&cancel, connect_timeout, "connect", async {
			TcpStream::connect(addr)
				.await
				.map_err(|source| PeerError::Connect { addr, source })
		})
		.await?;
		debug!("Connected to {}", addr);

		Self::handshake(stream, addr.to_string(), info_hash, peer_id, request_timeout, cancel).await
	}
}

impl<S> PeerConnection<S>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	/// Performs the handshake over an already-open stream.
	pub async fn handshake(
		mut stream: S,
		label: String,
		info_hash: &[u8; 20],
		peer_id: &[u8; 20],
		request_timeout: Duration,
		cancel: CancellationToken,
	) -> Result<Self, PeerError> {
		let remote_peer_id = guarded(
			&cancel,
			request_timeout,
			"handshake",
			handshake::handshake(&mut stream, info_hash, peer_id),
		)
		.await?;

		Ok(Self { stream, label, remote_peer_id, request_timeout, cancel })
	}

	pub fn remote_peer_id(&self) -> &[u8; 20] {
		&self.remote_peer_id
	}

	async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
		guarded(&self.cancel, self.request_timeout, "write", send_message(&mut self.stream, message)).await
	}

	async fn read(&mut self) -> Result<Message, PeerError> {
		guarded(&self.cancel, self.request_timeout, "read", read_message(&mut self.stream)).await
	}

	/// Downloads piece `index` over this connection and returns its bytes.
	///
	/// Blocks are requested one at a time, each `piece` reply consumed before
	/// the next request goes out. The SHA-1 is not checked here.
	pub async fn download_piece(&mut self, torrent: &Torrent, index: u32) -> Result<PieceBuffer, PeerError> {
		let piece_len = torrent
			.piece_size(index)
			.and_then(|len| u32::try_from(len).ok())
			.ok_or(PeerError::InvalidPiece(index))?;
		let mut buffer = PieceBuffer::new(index, piece_len as usize);

		self.send(&Message::Interested).await?;

		let mut state = PieceState::AwaitBitfieldOrHave;
		loop {
			state = match state {
				PieceState::AwaitBitfieldOrHave | PieceState::AwaitUnchoke => {
					self.await_unchoke(state, index).await?
				}
				PieceState::RequestingBlocks => {
					self.request_blocks(&mut buffer, piece_len).await?;
					PieceState::Done
				}
				PieceState::Done => break,
			};
		}

		debug!("Peer {} delivered piece {} ({} bytes)", self.label, index, buffer.filled());
		Ok(buffer)
	}

	/// Consumes one message in the pre-unchoke phase and returns the next state.
	async fn await_unchoke(&mut self, state: PieceState, index: u32) -> Result<PieceState, PeerError> {
		let message = self.read().await?;
		let next = match message {
			Message::KeepAlive => state,
			Message::Bitfield(bits) => {
				if !has_piece(&bits, index) {
					return Err(PeerError::PeerLacksPiece(index));
				}
				PieceState::AwaitUnchoke
			}
			Message::Have(have) => {
				trace!("Peer {} has piece {}", self.label, have);
				state
			}
			Message::Unchoke => PieceState::RequestingBlocks,
			Message::Choke => return Err(PeerError::PeerChoked),
			Message::Piece { .. } => {
				return Err(PeerError::Protocol("piece message received before unchoke".to_string()))
			}
			other @ (Message::Interested
			| Message::NotInterested
			| Message::Request { .. }
			| Message::Cancel { .. }) => {
				debug!("Peer {} sent {:?} while we wait for unchoke, ignoring", self.label, other.id());
				state
			}
		};
		Ok(next)
	}

	async fn request_blocks(&mut self, buffer: &mut PieceBuffer, piece_len: u32) -> Result<(), PeerError> {
		for request in block_requests(buffer.index(), piece_len) {
			self.send(&Message::Request {
				index: request.index,
				begin: request.begin,
				length: request.length,
			})
			.await?;

			let block = self.read_block(&request).await?;
			buffer.append_block(&block);
			trace!(
				"Received block: piece={}, offset={}, current_size={}/{}",
				request.index,
				request.begin,
				buffer.filled(),
				piece_len
			);
		}
		Ok(())
	}

	/// Reads until the `piece` reply for `request` arrives, skipping keep-alives.
	async fn read_block(&mut self, request: &BlockRequest) -> Result<Vec<u8>, PeerError> {
		loop {
			match self.read().await? {
				Message::KeepAlive => continue,
				Message::Piece { index, begin, block } => {
					if index != request.index
						|| begin != request.begin
						|| block.len() != request.length as usize
					{
						return Err(PeerError::Protocol(format!(
							"piece reply index={} begin={} len={} does not match request index={} begin={} len={}",
							index,
							begin,
							block.len(),
							request.index,
							request.begin,
							request.length
						)));
					}
					return Ok(block);
				}
				other => return Err(PeerError::UnexpectedMessage(format!("{:?}", other.id()))),
			}
		}
	}

	/// Shuts the connection down.
	pub async fn close(mut self) {
		let _ = self.stream.shutdown().await;
	}
}
