// src/engine.rs
use std::net::SocketAddrV4;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::bencode::{bvalue_to_json, decode_bencode};
use crate::cli::Command;
use crate::config::Config;
use crate::error::PeerError;
use crate::handshake;
use crate::progress::ProgressTracker;
use crate::session::DownloadSession;
use crate::torrent::Torrent;
use crate::tracker;
use crate::utils;

/// Runs one CLI command and returns what should be printed on stdout.
pub async fn use_command(command: Command, config: &Config) -> Result<String> {
	let peer_id = utils::generate_peer_id(&config.peer_id_prefix);
	debug!("Using peer id {}", String::from_utf8_lossy(&peer_id));

	match command {
		Command::Decode { value } => decode(&value),
		Command::Info { torrent } => info(&load_torrent(&torrent)?),
		Command::Peers { torrent } => {
			let torrent = load_torrent(&torrent)?;
			let peers = fetch_peers(&torrent, &peer_id, config).await?;
			Ok(peers.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))
		}
		Command::Handshake { torrent, peer } => {
			let torrent = load_torrent(&torrent)?;
			let remote_id = handshake_peer(&torrent, peer, &peer_id, config)
				.await
				.with_context(|| format!("Handshake with {} failed", peer))?;
			Ok(format!("Peer ID: {}", hex::encode(remote_id)))
		}
		Command::DownloadPiece { output, torrent, index } => {
			let torrent = load_torrent(&torrent)?;
			let peers = fetch_peers(&torrent, &peer_id, config).await?;
			let session = DownloadSession::new(torrent, peer_id, config);
			session.download_piece(&peers, index, &output).await?;
			Ok(format!("Piece {} downloaded to {}.", index, output.display()))
		}
		Command::Download { output, torrent: path } => {
			let torrent = load_torrent(&path)?;
			let peers = fetch_peers(&torrent, &peer_id, config).await?;
			let progress = ProgressTracker::new(torrent.piece_count());
			let session = DownloadSession::new(torrent, peer_id, config);

			let cancel = session.cancel_token();
			tokio::spawn(async move {
				if tokio::signal::ctrl_c().await.is_ok() {
					warn!("Interrupted, cancelling download");
					cancel.cancel();
				}
			});

			let result = session.download_torrent(&peers, &output, &progress).await;
			if result.is_err() {
				progress.finish();
			}
			result?;
			Ok(format!("Downloaded {} to {}.", path.display(), output.display()))
		}
	}
}

fn load_torrent(path: &Path) -> Result<Torrent> {
	Torrent::from_file(path).with_context(|| format!("Failed to read torrent {}", path.display()))
}

fn decode(value: &str) -> Result<String> {
	let (_consumed, value) = decode_bencode(value.as_bytes())?;
	Ok(serde_json::to_string(&bvalue_to_json(&value))?)
}

fn info(torrent: &Torrent) -> Result<String> {
	let mut lines = vec![
		format!("Tracker URL: {}", torrent.announce),
		format!("Length: {}", torrent.info.length),
		format!("Info Hash: {}", torrent.info_hash_hex()),
		format!("Piece Length: {}", torrent.info.piece_length),
		"Piece Hashes:".to_string(),
	];
	lines.extend(torrent.info.pieces.iter().map(hex::encode));
	Ok(lines.join("\n"))
}

async fn fetch_peers(torrent: &Torrent, peer_id: &[u8; 20], config: &Config) -> Result<Vec<SocketAddrV4>> {
	let client = Client::builder()
		.timeout(config.tracker_timeout())
		.build()
		.context("Failed to build HTTP client")?;
	let response = tracker::fetch_peers(&client, torrent, peer_id, config.listen_port)
		.await
		.with_context(|| format!("Announce to {} failed", torrent.announce))?;
	Ok(response.peers)
}

async fn handshake_peer(
	torrent: &Torrent,
	addr: SocketAddrV4,
	peer_id: &[u8; 20],
	config: &Config,
) -> Result<[u8; 20], PeerError> {
	let stream = timeout(config.connect_timeout(), TcpStream::connect(addr))
		.await
		.map_err(|_| PeerError::Timeout("connect"))?
		.map_err(|source| PeerError::Connect { addr, source })?;

	timeout(config.request_timeout(), handshake::handshake_once(stream, &torrent.info_hash, peer_id))
		.await
		.map_err(|_| PeerError::Timeout("handshake"))?
}
