use bytes::{BufMut, BytesMut};
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::PeerError;

/// Largest frame we accept: a 1 MiB bitfield or block plus headers.
pub const MAX_MESSAGE_LEN: u32 = (1 << 20) + 13;

/// The wire message ids we support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
	Choke = 0,
	Unchoke = 1,
	Interested = 2,
	NotInterested = 3,
	Have = 4,
	Bitfield = 5,
	Request = 6,
	Piece = 7,
	Cancel = 8,
}

impl TryFrom<u8> for MessageId {
	type Error = PeerError;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(MessageId::Choke),
			1 => Ok(MessageId::Unchoke),
			2 => Ok(MessageId::Interested),
			3 => Ok(MessageId::NotInterested),
			4 => Ok(MessageId::Have),
			5 => Ok(MessageId::Bitfield),
			6 => Ok(MessageId::Request),
			7 => Ok(MessageId::Piece),
			8 => Ok(MessageId::Cancel),
			_ => Err(PeerError::Protocol(format!("unknown message id {}", value))),
		}
	}
}

/// One length-prefixed peer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
	/// Zero-length frame with no id byte.
	KeepAlive,
	Choke,
	Unchoke,
	Interested,
	NotInterested,
	Have(u32),
	Bitfield(Vec<u8>),
	Request { index: u32, begin: u32, length: u32 },
	Piece { index: u32, begin: u32, block: Vec<u8> },
	Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
	pub fn id(&self) -> Option<MessageId> {
		match self {
			Message::KeepAlive => None,
			Message::Choke => Some(MessageId::Choke),
			Message::Unchoke => Some(MessageId::Unchoke),
			Message::Interested => Some(MessageId::Interested),
			Message::NotInterested => Some(MessageId::NotInterested),
			Message::Have(_) => Some(MessageId::Have),
			Message::Bitfield(_) => Some(MessageId::Bitfield),
			Message::Request { .. } => Some(MessageId::Request),
			Message::Piece { .. } => Some(MessageId::Piece),
			Message::Cancel { .. } => Some(MessageId::Cancel),
		}
	}

	/// Serializes the message as `<u32 length><u8 id><payload>`.
	pub fn encode(&self) -> BytesMut {
		let mut payload = BytesMut::new();
		match self {
			Message::Have(index) => payload.put_u32(*index),
			Message::Bitfield(bits) => payload.put_slice(bits),
			Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
				payload.put_u32(*index);
				payload.put_u32(*begin);
				payload.put_u32(*length);
			}
			Message::Piece { index, begin, block } => {
				payload.put_u32(*index);
				payload.put_u32(*begin);
				payload.put_slice(block);
			}
			_ => {}
		}

		let mut buf = BytesMut::with_capacity(5 + payload.len());
		match self.id() {
			None => buf.put_u32(0),
			Some(id) => {
				buf.put_u32(1 + payload.len() as u32);
				buf.put_u8(id as u8);
				buf.extend_from_slice(&payload);
			}
		}
		buf
	}

	/// Parses the body of a frame (id byte already split off).
	pub fn decode(id: u8, payload: &[u8]) -> Result<Message, PeerError> {
		let message = match MessageId::try_from(id)? {
			MessageId::Choke => Message::Choke,
			MessageId::Unchoke => Message::Unchoke,
			MessageId::Interested => Message::Interested,
			MessageId::NotInterested => Message::NotInterested,
			MessageId::Have => {
				let [index] = read_u32s::<1>(payload, "have")?;
				Message::Have(index)
			}
			MessageId::Bitfield => Message::Bitfield(payload.to_vec()),
			MessageId::Request => {
				let [index, begin, length] = read_u32s::<3>(payload, "request")?;
				Message::Request { index, begin, length }
			}
			MessageId::Cancel => {
				let [index, begin, length] = read_u32s::<3>(payload, "cancel")?;
				Message::Cancel { index, begin, length }
			}
			MessageId::Piece => {
				if payload.len() < 8 {
					return Err(PeerError::Protocol(format!(
						"piece message payload too short: {} bytes",
						payload.len()
					)));
				}
				let [index, begin] = read_u32s::<2>(&payload[..8], "piece")?;
				Message::Piece { index, begin, block: payload[8..].to_vec() }
			}
		};
		Ok(message)
	}
}

/// Reads exactly `N` big-endian u32 fields from a fixed-size payload.
fn read_u32s<const N: usize>(payload: &[u8], kind: &str) -> Result<[u32; N], PeerError> {
	if payload.len() != N * 4 {
		return Err(PeerError::Protocol(format!(
			"{} message payload must be {} bytes, got {}",
			kind,
			N * 4,
			payload.len()
		)));
	}
	let mut out = [0u32; N];
	for (slot, chunk) in out.iter_mut().zip(payload.chunks_exact(4)) {
		*slot = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
	}
	Ok(out)
}

/// Sends a non-handshake message.
pub async fn send_message<S>(stream: &mut S, message: &Message) -> Result<(), PeerError>
where
	S: AsyncWrite + Unpin,
{
	trace!("-> {:?}", message.id());
	stream.write_all(&message.encode()).await?;
	stream.flush().await?;
	Ok(())
}

/// Reads one frame from the stream and converts it into our `Message` enum.
pub async fn read_message<S>(stream: &mut S) -> Result<Message, PeerError>
where
	S: AsyncRead + Unpin,
{
	let mut len_buf = [0u8; 4];
	stream.read_exact(&mut len_buf).await?;
	let length = u32::from_be_bytes(len_buf);

	if length == 0 {
		trace!("<- keep-alive");
		return Ok(Message::KeepAlive);
	}
	if length > MAX_MESSAGE_LEN {
		return Err(PeerError::Protocol(format!("message length {} exceeds limit", length)));
	}

	let mut msg_buf = vec![0u8; length as usize];
	stream.read_exact(&mut msg_buf).await?;

	// The first byte is the message id.
	let message = Message::decode(msg_buf[0], &msg_buf[1..])?;
	trace!("<- {:?} ({} bytes)", message.id(), length);
	Ok(message)
}
