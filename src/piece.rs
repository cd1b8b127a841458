// piece.rs
use crate::torrent::sha1_digest;

/// Size of one block request.
pub const BLOCK_SIZE: u32 = 1 << 14; // 16 KiB

/// One `request` worth of a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
	pub index: u32,
	pub begin: u32,
	pub length: u32,
}

/// Splits a piece of `piece_len` bytes into sequential blocks of at most
/// `BLOCK_SIZE`, in increasing offset order.
pub fn block_requests(index: u32, piece_len: u32) -> impl Iterator<Item = BlockRequest> {
	let count = piece_len.div_ceil(BLOCK_SIZE);
	(0..count).map(move |n| {
		let begin = n * BLOCK_SIZE;
		BlockRequest { index, begin, length: BLOCK_SIZE.min(piece_len - begin) }
	})
}

/// Pre-sized buffer for one piece, filled block by block in offset order.
#[derive(Debug)]
pub struct PieceBuffer {
	index: u32,
	expected_len: usize,
	data: Vec<u8>,
}

impl PieceBuffer {
	pub fn new(index: u32, expected_len: usize) -> Self {
		Self { index, expected_len, data: Vec::with_capacity(expected_len) }
	}

	pub fn index(&self) -> u32 {
		self.index
	}

	/// Offset the next block must start at.
	pub fn filled(&self) -> usize {
		self.data.len()
	}

	pub fn append_block(&mut self, block: &[u8]) {
		self.data.extend_from_slice(block);
	}

	pub fn is_complete(&self) -> bool {
		self.data.len() == self.expected_len
	}

	/// Checks the SHA-1 of the buffered bytes against `expected`.
	pub fn verify(&self, expected: &[u8; 20]) -> bool {
		&sha1_digest(&self.data) == expected
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.data
	}
}
