use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::PeerError;

/// Constants for the BitTorrent protocol handshake.
pub const BT_PROTOCOL_STR: &str = "BitTorrent protocol";
pub const BT_PROTOCOL_LEN: u8 = 19;
pub const HANDSHAKE_LEN: usize = 68; // 1 + 19 + 8 + 20 + 20

/// Builds the fixed 68-byte handshake with all reserved bits cleared.
pub fn build_handshake(info_hash: &[u8; 20], peer_id: &[u8; 20]) -> [u8; HANDSHAKE_LEN] {
	let mut handshake = [0u8; HANDSHAKE_LEN];
	handshake[0] = BT_PROTOCOL_LEN;
	handshake[1..20].copy_from_slice(BT_PROTOCOL_STR.as_bytes());
	// bytes 20..28 are reserved and stay zero
	handshake[28..48].copy_from_slice(info_hash);
	handshake[48..68].copy_from_slice(peer_id);
	handshake
}

/// Sends the BitTorrent handshake.
pub async fn send_handshake<S>(
	stream: &mut S,
	info_hash: &[u8; 20],
	peer_id: &[u8; 20],
) -> Result<(), PeerError>
where
	S: AsyncWrite + Unpin,
{
	stream.write_all(&build_handshake(info_hash, peer_id)).await?;
	stream.flush().await?;
	Ok(())
}

/// Receives and validates the BitTorrent handshake. On success, returns the remote peer id.
pub async fn receive_handshake<S>(
	stream: &mut S,
	expected_info_hash: &[u8; 20],
) -> Result<[u8; 20], PeerError>
where
	S: AsyncRead + Unpin,
{
	let mut buf = [0u8; HANDSHAKE_LEN];
	stream.read_exact(&mut buf).await?;

	if buf[0] != BT_PROTOCOL_LEN {
		return Err(PeerError::Handshake(format!(
			"invalid protocol string length: expected {}, got {}",
			BT_PROTOCOL_LEN, buf[0]
		)));
	}
	if &buf[1..20] != BT_PROTOCOL_STR.as_bytes() {
		return Err(PeerError::Handshake(format!(
			"invalid protocol string: {:?}",
			String::from_utf8_lossy(&buf[1..20])
		)));
	}
	if &buf[28..48] != expected_info_hash {
		return Err(PeerError::InfoHashMismatch(hex::encode(&buf[28..48])));
	}

	let mut peer_id = [0u8; 20];
	peer_id.copy_from_slice(&buf[48..68]);
	Ok(peer_id)
}

/// Writes our handshake, then reads and validates the peer's.
///
/// The stream is shut down if the exchange fails; on success it stays open
/// for the message loop.
pub async fn handshake<S>(
	stream: &mut S,
	info_hash: &[u8; 20],
	peer_id: &[u8; 20],
) -> Result<[u8; 20], PeerError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	match exchange(stream, info_hash, peer_id).await {
		Ok(remote_id) => {
			debug!("Handshake complete, remote peer id {}", hex::encode(remote_id));
			Ok(remote_id)
		}
		Err(e) => {
			let _ = stream.shutdown().await;
			Err(e)
		}
	}
}

async fn exchange<S>(stream: &mut S, info_hash: &[u8; 20], peer_id: &[u8; 20]) -> Result<[u8; 20], PeerError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	send_handshake(stream, info_hash, peer_id).await?;
	receive_handshake(stream, info_hash).await
}

/// Performs a standalone handshake and closes the connection either way.
pub async fn handshake_once<S>(mut stream: S, info_hash: &[u8; 20], peer_id: &[u8; 20]) -> Result<[u8; 20], PeerError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let remote_id = handshake(&mut stream, info_hash, peer_id).await?;
	let _ = stream.shutdown().await;
	Ok(remote_id)
}
