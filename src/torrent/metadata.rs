use std::{collections::BTreeMap, path::Path};

use log::debug;

use super::error::TorrentError;
use crate::bencode::{decode_bencode, BValue};
use crate::torrent::calculate_info_hash;

/// Represents a single-file .torrent, including the announce URL and the associated info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
	pub announce: String,    // The tracker URL
	pub info: TorrentInfo,   // Torrent metadata
	pub info_hash: [u8; 20], // SHA-1 of the canonical `info` encoding
}

/// Contains detailed metadata about the torrent's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
	pub name: String,          // Name of the file
	pub length: u64,           // Total size of the file
	pub piece_length: u64,     // Nominal size of each piece
	pub pieces: Vec<[u8; 20]>, // SHA-1 hashes are 20 bytes each
}

impl Torrent {
	/// Reads a .torrent file from disk and parses its contents.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TorrentError> {
		let buf = std::fs::read(path.as_ref())?;
		debug!("Read {} bytes from {}", buf.len(), path.as_ref().display());
		Self::from_bytes(&buf)
	}

	/// Parses the raw bytes of a .torrent file.
	pub fn from_bytes(buf: &[u8]) -> Result<Self, TorrentError> {
		let (consumed, bvalue) = decode_bencode(buf)?;
		if consumed != buf.len() {
			debug!("Ignoring {} trailing bytes after torrent dictionary", buf.len() - consumed);
		}
		Self::from_bvalue(&bvalue)
	}

	/// Creates a `Torrent` from a `BValue` (the result of a bencode parse).
	pub fn from_bvalue(value: &BValue) -> Result<Self, TorrentError> {
		let root_dict = value.as_dict().ok_or_else(|| {
			TorrentError::schema("<root>", format!("expected dictionary, got {}", value.kind()))
		})?;

		let announce = get_string(root_dict, "announce")?;

		let info_value = root_dict
			.get(b"info".as_slice())
			.ok_or_else(|| TorrentError::schema("info", "missing"))?;
		let info_dict = info_value.as_dict().ok_or_else(|| {
			TorrentError::schema("info", format!("expected dictionary, got {}", info_value.kind()))
		})?;

		let info = TorrentInfo::from_dict(info_dict)?;
		let info_hash = calculate_info_hash(info_value);

		Ok(Torrent { announce, info, info_hash })
	}

	pub fn info_hash_hex(&self) -> String {
		hex::encode(self.info_hash)
	}

	pub fn piece_count(&self) -> usize {
		self.info.pieces.len()
	}

	/// Actual byte length of piece `index`; the last piece may be short.
	pub fn piece_size(&self, index: u32) -> Option<u64> {
		if index as usize >= self.piece_count() {
			return None;
		}
		let start = u64::from(index) * self.info.piece_length;
		let remaining = self.info.length.checked_sub(start)?;
		Some(remaining.min(self.info.piece_length))
	}

	pub fn piece_hash(&self, index: u32) -> Option<&[u8; 20]> {
		self.info.pieces.get(index as usize)
	}
}

impl TorrentInfo {
	pub fn from_dict(info_dict: &BTreeMap<Vec<u8>, BValue>) -> Result<Self, TorrentError> {
		let name = get_string(info_dict, "name")?;

		let length = get_integer(info_dict, "length")?;
		let length = u64::try_from(length)
			.map_err(|_| TorrentError::schema("length", format!("negative value {}", length)))?;

		let piece_length = get_integer(info_dict, "piece length")?;
		let piece_length = u64::try_from(piece_length)
			.ok()
			.filter(|&l| l > 0)
			.ok_or_else(|| {
				TorrentError::schema("piece length", format!("must be positive, got {}", piece_length))
			})?;

		let pieces_bytes = lookup_bytestring(info_dict, "pieces")?;
		if pieces_bytes.len() % 20 != 0 {
			return Err(TorrentError::schema(
				"pieces",
				format!("length {} is not a multiple of 20", pieces_bytes.len()),
			));
		}

		// Chunk the pieces bytes into 20-byte hashes.
		let pieces: Vec<[u8; 20]> = pieces_bytes
			.chunks_exact(20)
			.map(|chunk| {
				let mut hash = [0u8; 20];
				hash.copy_from_slice(chunk);
				hash
			})
			.collect();

		let expected = length.div_ceil(piece_length);
		if pieces.len() as u64 != expected {
			return Err(TorrentError::schema(
				"pieces",
				format!(
					"{} hashes for a {}-byte file with {}-byte pieces (expected {})",
					pieces.len(),
					length,
					piece_length,
					expected
				),
			));
		}

		Ok(TorrentInfo { name, length, piece_length, pieces })
	}
}

/// Looks up a key in the dictionary and returns a byte slice if the value is a ByteString.
pub fn lookup_bytestring<'a>(
	dict: &'a BTreeMap<Vec<u8>, BValue>,
	key: &'static str,
) -> Result<&'a [u8], TorrentError> {
	let val = dict
		.get(key.as_bytes())
		.ok_or_else(|| TorrentError::schema(key, "missing"))?;

	val.as_bytes().ok_or_else(|| {
		TorrentError::schema(key, format!("expected byte string, got {}", val.kind()))
	})
}

/// Gets a ByteString from the dictionary and converts it into a UTF-8 String.
pub fn get_string(dict: &BTreeMap<Vec<u8>, BValue>, key: &'static str) -> Result<String, TorrentError> {
	let bytes = lookup_bytestring(dict, key)?;
	String::from_utf8(bytes.to_vec()).map_err(|_| TorrentError::schema(key, "not valid UTF-8"))
}

/// Retrieves an integer value from the dictionary.
pub fn get_integer(dict: &BTreeMap<Vec<u8>, BValue>, key: &'static str) -> Result<i64, TorrentError> {
	let val = dict
		.get(key.as_bytes())
		.ok_or_else(|| TorrentError::schema(key, "missing"))?;

	val.as_integer().ok_or_else(|| {
		TorrentError::schema(key, format!("expected integer, got {}", val.kind()))
	})
}
