// infohash.rs
use sha1::{Digest, Sha1};

use crate::bencode::{encode_bvalue, BValue};

/// SHA-1 over the canonical re-encoding of the `info` dictionary.
///
/// The digest is taken over `encode_bvalue(info)`, not the bytes read from
/// disk, so keys the parser does not model (e.g. `private`) still count.
pub fn calculate_info_hash(info: &BValue) -> [u8; 20] {
	let encoded = encode_bvalue(info);
	sha1_digest(&encoded)
}

pub fn sha1_digest(data: &[u8]) -> [u8; 20] {
	let mut hasher = Sha1::new();
	hasher.update(data);
	let result = hasher.finalize();

	let mut hash_bytes = [0u8; 20];
	hash_bytes.copy_from_slice(&result);
	hash_bytes
}
