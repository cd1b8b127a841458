use std::net::SocketAddrV4;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "rusbit", version, about = "A minimal BitTorrent client")]
pub struct Cli {
	/// Config file (defaults to ./rusbit.toml when present)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Log debug output to stderr
	#[arg(short, long, global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Decode a bencoded value and print it as JSON
	Decode { value: String },

	/// Print the metadata of a .torrent file
	Info { torrent: PathBuf },

	/// Ask the tracker for peers
	Peers { torrent: PathBuf },

	/// Handshake with one peer and print its peer id
	Handshake { torrent: PathBuf, peer: SocketAddrV4 },

	/// Download a single piece
	#[command(name = "download_piece")]
	DownloadPiece {
		#[arg(short, long)]
		output: PathBuf,
		torrent: PathBuf,
		index: u32,
	},

	/// Download the whole file
	Download {
		#[arg(short, long)]
		output: PathBuf,
		torrent: PathBuf,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_download_piece() {
		let cli = Cli::try_parse_from([
			"rusbit",
			"download_piece",
			"-o",
			"/tmp/piece-0",
			"sample.torrent",
			"0",
		])
		.unwrap();
		match cli.command {
			Command::DownloadPiece { output, torrent, index } => {
				assert_eq!(output, PathBuf::from("/tmp/piece-0"));
				assert_eq!(torrent, PathBuf::from("sample.torrent"));
				assert_eq!(index, 0);
			}
			other => panic!("unexpected command {:?}", other),
		}
	}

	#[test]
	fn test_parse_handshake_peer() {
		let cli = Cli::try_parse_from(["rusbit", "-v", "handshake", "sample.torrent", "127.0.0.1:6881"]).unwrap();
		assert!(cli.verbose);
		assert!(matches!(
			cli.command,
			Command::Handshake { peer, .. } if peer.to_string() == "127.0.0.1:6881"
		));
	}

	#[test]
	fn test_rejects_bad_peer_address() {
		assert!(Cli::try_parse_from(["rusbit", "handshake", "sample.torrent", "not-an-address"]).is_err());
	}

	#[test]
	fn test_download_requires_output() {
		assert!(Cli::try_parse_from(["rusbit", "download", "sample.torrent"]).is_err());
	}
}
