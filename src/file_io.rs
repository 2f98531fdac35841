use std::path::Path;

use log::{debug, info};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::error::ClientError;
use crate::torrent::{sha1_digest, TorrentInfo};
use crate::work_queue::{PieceWork, WorkQueue};

/// Opens the output for the whole run (read/write, created if absent) and
/// extends it to the full payload length so pieces can land at any offset.
pub async fn open_output<P: AsRef<Path>>(path: P, length: u64) -> Result<File, ClientError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .await
        .map_err(ClientError::FileIo)?;
    file.set_len(length).await.map_err(ClientError::FileIo)?;
    Ok(file)
}

/// Writes one verified piece at its offset and flushes, so an interrupted
/// run keeps every piece completed so far.
pub async fn write_piece_at(
    file: &mut File,
    piece_data: &[u8],
    offset: u64,
) -> Result<(), ClientError> {
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(ClientError::FileIo)?;
    file.write_all(piece_data).await.map_err(ClientError::FileIo)?;
    file.flush().await.map_err(ClientError::FileIo)?;
    debug!("wrote {} bytes at offset {offset}", piece_data.len());
    Ok(())
}

/// Verifies what an existing output file already holds and enqueues only the
/// pieces that are missing or corrupt. Returns how many pieces verified.
///
/// The scan only reads; a piece whose bytes cannot be read in full counts as
/// missing.
pub async fn scan_existing<P: AsRef<Path>>(
    path: P,
    info: &TorrentInfo,
    queue: &WorkQueue,
) -> Result<u32, ClientError> {
    let path = path.as_ref();
    if !path.exists() {
        info!("no existing output, downloading all {} pieces", info.piece_count());
        for index in 0..info.piece_count() {
            queue.push(PieceWork::new(index)).await;
        }
        return Ok(0);
    }

    let mut file = File::open(path).await.map_err(ClientError::FileIo)?;
    let mut verified = 0u32;

    for index in 0..info.piece_count() {
        let piece_len = info.piece_len(index) as usize;
        let mut buffer = vec![0u8; piece_len];

        file.seek(SeekFrom::Start(info.piece_offset(index)))
            .await
            .map_err(ClientError::FileIo)?;
        match file.read_exact(&mut buffer).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                queue.push(PieceWork::new(index)).await;
                continue;
            }
            Err(e) => return Err(ClientError::FileIo(e)),
        }

        if &sha1_digest(&buffer) == info.piece_hash(index) {
            verified += 1;
        } else {
            queue.push(PieceWork::new(index)).await;
        }
    }

    info!(
        "resume scan: {verified}/{} pieces already present",
        info.piece_count()
    );
    Ok(verified)
}
