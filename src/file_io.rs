// src/file_io.rs
use std::io::Error;
use std::path::Path;

use log::debug;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Writes one piece's bytes as the whole content of `output_path`.
pub async fn write_piece(output_path: &Path, piece_data: &[u8]) -> Result<(), Error> {
	let mut file = File::create(output_path).await?;
	file.write_all(piece_data).await?;
	file.flush().await?;

	debug!("Wrote {} bytes to {}", piece_data.len(), output_path.display());
	Ok(())
}

/// Writes `pieces` back to back, in slice order, truncating any existing file.
pub async fn write_pieces_in_order<B: AsRef<[u8]>>(output_path: &Path, pieces: &[B]) -> Result<u64, Error> {
	let file = File::create(output_path).await?;
	let mut writer = BufWriter::new(file);

	let mut offset = 0u64;
	for (index, piece) in pieces.iter().enumerate() {
		let piece = piece.as_ref();
		writer.write_all(piece).await?;
		debug!("Piece {} written to file at offset {}", index, offset);
		offset += piece.len() as u64;
	}
	writer.flush().await?;

	Ok(offset)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[tokio::test]
	async fn test_write_piece_replaces_contents() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("piece.bin");
		tokio::fs::write(&path, b"old contents that are longer").await.unwrap();

		write_piece(&path, b"new").await.unwrap();
		assert_eq!(tokio::fs::read(&path).await.unwrap(), b"new");
	}

	#[tokio::test]
	async fn test_write_pieces_in_order() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("out.bin");
		let pieces = vec![b"aaaa".to_vec(), b"bbbb".to_vec(), b"cc".to_vec()];

		let written = write_pieces_in_order(&path, &pieces).await.unwrap();
		assert_eq!(written, 10);
		assert_eq!(tokio::fs::read(&path).await.unwrap(), b"aaaabbbbcc");
	}

	#[tokio::test]
	async fn test_write_into_missing_directory_fails() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("missing").join("out.bin");
		assert!(write_piece(&path, b"x").await.is_err());
	}
}
