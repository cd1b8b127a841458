use std::net::{Ipv4Addr, SocketAddrV4};

use log::{debug, warn};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::bencode::{decode_bencode, BValue, BencodeError};
use crate::torrent::Torrent;
use crate::utils::url_encode_bytes;

#[derive(Debug, Error)]
pub enum TrackerError {
	#[error("Tracker request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("Tracker responded with HTTP status {0}")]
	Status(u16),

	#[error("Tracker failure: {0}")]
	Failure(String),

	#[error("Tracker response bencode error: {0}")]
	Bencode(#[from] BencodeError),

	#[error("Malformed tracker response: {0}")]
	Malformed(String),

	#[error("Failed to build announce URL: {0}")]
	Url(#[from] serde_urlencoded::ser::Error),
}

/// Decoded announce response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerResponse {
	pub interval: Option<u64>,
	pub complete: Option<u64>,
	pub incomplete: Option<u64>,
	pub peers: Vec<SocketAddrV4>,
}

/// ASCII query parameters; `info_hash` and `peer_id` are raw bytes and are
/// percent-encoded separately.
#[derive(Serialize)]
struct AnnounceParams {
	port: u16,
	uploaded: u64,
	downloaded: u64,
	left: u64,
	compact: u8,
}

/// Builds the GET URL for announcing `torrent` to its tracker.
pub fn announce_url(torrent: &Torrent, peer_id: &[u8; 20], port: u16) -> Result<String, TrackerError> {
	let params = serde_urlencoded::to_string(AnnounceParams {
		port,
		uploaded: 0,
		downloaded: 0,
		left: torrent.info.length,
		compact: 1,
	})?;
	let separator = if torrent.announce.contains('?') { '&' } else { '?' };

	Ok(format!(
		"{announce}{separator}info_hash={info_hash}&peer_id={peer_id}&{params}",
		announce = torrent.announce,
		info_hash = url_encode_bytes(&torrent.info_hash),
		peer_id = url_encode_bytes(peer_id),
	))
}

/// Announces to the tracker and returns the peers it knows about.
pub async fn fetch_peers(
	client: &Client,
	torrent: &Torrent,
	peer_id: &[u8; 20],
	port: u16,
) -> Result<TrackerResponse, TrackerError> {
	let url = announce_url(torrent, peer_id, port)?;
	debug!("Announcing to {}", url);

	let response = client.get(&url).send().await?;
	let status = response.status();
	if !status.is_success() {
		return Err(TrackerError::Status(status.as_u16()));
	}
	let body = response.bytes().await?;

	let parsed = parse_tracker_response(&body)?;
	debug!("Tracker returned {} peers", parsed.peers.len());
	Ok(parsed)
}

/// Parses a bencoded announce response body.
pub fn parse_tracker_response(body: &[u8]) -> Result<TrackerResponse, TrackerError> {
	let (_len, bvalue) = decode_bencode(body)?;
	let dict = bvalue.as_dict().ok_or_else(|| {
		TrackerError::Malformed(format!("expected dictionary, got {}", bvalue.kind()))
	})?;

	if let Some(reason) = dict.get(b"failure reason".as_slice()).and_then(BValue::as_bytes) {
		return Err(TrackerError::Failure(String::from_utf8_lossy(reason).into_owned()));
	}
	if let Some(message) = dict.get(b"warning message".as_slice()).and_then(BValue::as_bytes) {
		warn!("Tracker warning: {}", String::from_utf8_lossy(message));
	}

	let peers_val = dict
		.get(b"peers".as_slice())
		.ok_or_else(|| TrackerError::Malformed("missing 'peers' key".to_string()))?;
	let peers_bytes = peers_val.as_bytes().ok_or_else(|| {
		TrackerError::Malformed(format!("'peers' must be a compact byte string, got {}", peers_val.kind()))
	})?;

	let count = |key: &str| {
		dict.get(key.as_bytes())
			.and_then(BValue::as_integer)
			.and_then(|n| u64::try_from(n).ok())
	};

	Ok(TrackerResponse {
		interval: count("interval"),
		complete: count("complete"),
		incomplete: count("incomplete"),
		peers: decode_compact_peers(peers_bytes)?,
	})
}

/// Decodes the compact peer list: 4 bytes IPv4 + 2 bytes big-endian port each.
pub fn decode_compact_peers(bytes: &[u8]) -> Result<Vec<SocketAddrV4>, TrackerError> {
	if bytes.len() % 6 != 0 {
		return Err(TrackerError::Malformed(format!(
			"compact peers length {} is not a multiple of 6",
			bytes.len()
		)));
	}

	Ok(bytes
		.chunks_exact(6)
		.map(|chunk| {
			let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
			let port = u16::from_be_bytes([chunk[4], chunk[5]]);
			SocketAddrV4::new(ip, port)
		})
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bencode::encode_bvalue;
	use std::collections::BTreeMap;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpListener;

	const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/sample.torrent");
	const PEER_ID: &[u8; 20] = b"99999999999999999999";

	fn response_body(peers: &[u8]) -> Vec<u8> {
		let mut map = BTreeMap::new();
		map.insert(b"interval".to_vec(), BValue::Integer(60));
		map.insert(b"peers".to_vec(), BValue::ByteString(peers.to_vec()));
		encode_bvalue(&BValue::Dict(map))
	}

	/// Serves one HTTP response and hands back the request line it saw.
	async fn fake_tracker(status: &'static str, body: Vec<u8>) -> (String, tokio::task::JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let handle = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut request = Vec::new();
			let mut buf = [0u8; 1024];
			while !request.windows(4).any(|w| w == b"\r\n\r\n") {
				let n = socket.read(&mut buf).await.unwrap();
				if n == 0 {
					break;
				}
				request.extend_from_slice(&buf[..n]);
			}
			let head = format!(
				"HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
				status,
				body.len()
			);
			socket.write_all(head.as_bytes()).await.unwrap();
			socket.write_all(&body).await.unwrap();
			socket.shutdown().await.unwrap();
			let text = String::from_utf8_lossy(&request).into_owned();
			text.lines().next().unwrap_or_default().to_string()
		});
		(format!("http://{}/announce", addr), handle)
	}

	fn sample_with_announce(announce: String) -> Torrent {
		let mut torrent = Torrent::from_file(SAMPLE).unwrap();
		torrent.announce = announce;
		torrent
	}

	#[test]
	fn test_decode_compact_peer() {
		let peers = decode_compact_peers(&[165, 232, 41, 73, 201, 84]).unwrap();
		assert_eq!(peers.len(), 1);
		assert_eq!(peers[0].to_string(), "165.232.41.73:51540");
	}

	#[test]
	fn test_decode_compact_peers_bad_length() {
		assert!(matches!(decode_compact_peers(&[1, 2, 3, 4, 5]), Err(TrackerError::Malformed(_))));
	}

	#[test]
	fn test_parse_tracker_response() {
		let body = response_body(&[165, 232, 41, 73, 201, 84, 127, 0, 0, 1, 0x1A, 0xE1]);
		let response = parse_tracker_response(&body).unwrap();
		assert_eq!(response.interval, Some(60));
		assert_eq!(response.complete, None);
		assert_eq!(
			response.peers,
			vec![
				SocketAddrV4::new(Ipv4Addr::new(165, 232, 41, 73), 51540),
				SocketAddrV4::new(Ipv4Addr::LOCALHOST, 6881),
			]
		);
	}

	#[test]
	fn test_parse_failure_reason() {
		let err = parse_tracker_response(b"d14:failure reason7:go awaye").unwrap_err();
		assert!(matches!(err, TrackerError::Failure(reason) if reason == "go away"));
	}

	#[test]
	fn test_parse_rejects_peer_list_form() {
		let err = parse_tracker_response(b"d5:peerslee").unwrap_err();
		assert!(matches!(err, TrackerError::Malformed(_)));
	}

	#[test]
	fn test_parse_rejects_non_dict_and_garbage() {
		assert!(matches!(parse_tracker_response(b"le"), Err(TrackerError::Malformed(_))));
		assert!(matches!(parse_tracker_response(b"<html>"), Err(TrackerError::Bencode(_))));
		assert!(matches!(parse_tracker_response(b"d8:intervali5ee"), Err(TrackerError::Malformed(_))));
	}

	#[test]
	fn test_parse_rejects_deeply_nested_body() {
		let mut body = vec![b'l'; 200_000];
		body.extend(std::iter::repeat(b'e').take(200_000));
		let err = parse_tracker_response(&body).unwrap_err();
		assert!(matches!(err, TrackerError::Bencode(BencodeError::NestingTooDeep(_))));
	}

	#[test]
	fn test_announce_url() {
		let torrent = Torrent::from_file(SAMPLE).unwrap();
		assert_eq!(
			announce_url(&torrent, PEER_ID, 6881).unwrap(),
			"http://bittorrent-test-tracker.codecrafters.io/announce?\
			 info_hash=%D6%9F%91%E6%B2%AELT%24h%D1%07%3Aq%D4%EA%13%87%9A%7F\
			 &peer_id=99999999999999999999&port=6881&uploaded=0&downloaded=0&left=92063&compact=1"
		);
	}

	#[test]
	fn test_announce_url_with_existing_query() {
		let torrent = sample_with_announce("http://t.test/announce?key=abc".to_string());
		let url = announce_url(&torrent, PEER_ID, 6881).unwrap();
		assert!(url.starts_with("http://t.test/announce?key=abc&info_hash="));
	}

	#[tokio::test]
	async fn test_fetch_peers() {
		let (url, server) = fake_tracker("200 OK", response_body(&[165, 232, 41, 73, 201, 84])).await;
		let torrent = sample_with_announce(url);

		let response = fetch_peers(&Client::new(), &torrent, PEER_ID, 6881).await.unwrap();
		assert_eq!(response.peers[0].to_string(), "165.232.41.73:51540");

		let request_line = server.await.unwrap();
		assert!(request_line.starts_with("GET /announce?info_hash=%D6%9F%91%E6%B2%AELT%24h"));
		assert!(request_line.contains("&left=92063&compact=1 HTTP/1.1"));
	}

	#[tokio::test]
	async fn test_fetch_peers_http_error() {
		let (url, server) = fake_tracker("500 Internal Server Error", Vec::new()).await;
		let torrent = sample_with_announce(url);

		let err = fetch_peers(&Client::new(), &torrent, PEER_ID, 6881).await.unwrap_err();
		assert!(matches!(err, TrackerError::Status(500)));
		server.await.unwrap();
	}
}
