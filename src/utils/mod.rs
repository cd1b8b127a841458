mod url_encode;

pub use url_encode::url_encode_bytes;

use rand::{distributions::Alphanumeric, Rng};

/// Builds a 20-byte peer id: `prefix` (truncated to 20 bytes) followed by
/// random alphanumeric bytes.
pub fn generate_peer_id(prefix: &str) -> [u8; 20] {
	let mut rng = rand::thread_rng();
	let mut peer_id = [0u8; 20];
	let prefix = &prefix.as_bytes()[..prefix.len().min(20)];
	peer_id[..prefix.len()].copy_from_slice(prefix);
	for byte in &mut peer_id[prefix.len()..] {
		*byte = rng.sample(Alphanumeric);
	}
	peer_id
}
