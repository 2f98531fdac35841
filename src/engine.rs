use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use reqwest::Client;
use tokio::net::TcpStream;

use crate::bencode::{bvalue_to_json, decode_bencode};
use crate::config::Config;
use crate::downloader;
use crate::error::ClientError;
use crate::file_io;
use crate::peer::PeerSession;
use crate::progress::ProgressTracker;
use crate::torrent::{Torrent, TorrentInfo};
use crate::tracker;
use crate::utils;
use crate::work_queue::{PieceWork, WorkQueue};

/// Dispatches one CLI invocation. The peer id is generated here, once, and
/// used for every tracker and peer exchange of the process.
#[tokio::main]
pub async fn run(args: Vec<String>) -> Result<(), ClientError> {
    let program = args.first().map(String::as_str).unwrap_or("bitfetch");
    if args.len() < 2 {
        return Err(ClientError::Usage(format!(
            "no command given; run '{program} help' for usage"
        )));
    }

    let config = Config::load()?;
    let peer_id = utils::generate_peer_id(&config.peer_id_prefix);

    match args[1].as_str() {
        "decode" => {
            if args.len() < 3 {
                return Err(usage(program, "decode <encoded_value>"));
            }
            let (_consumed, value) = decode_bencode(args[2].as_bytes())?;
            println!("{}", bvalue_to_json(&value));
        }
        "info" => {
            if args.len() < 3 {
                return Err(usage(program, "info <torrent_file>"));
            }
            let torrent = Torrent::from_file(&args[2])?;
            println!("Tracker URL: {}", torrent.announce);
            println!("Length: {}", torrent.info.length);
            println!("Info Hash: {}", hex::encode(torrent.info_hash));
            println!("Name: {}", torrent.info.name);
            println!("Piece Length: {}", torrent.info.piece_length);
            println!("Pieces:");
            for piece_hash in &torrent.info.pieces {
                println!("{}", hex::encode(piece_hash));
            }
        }
        "peers" => {
            if args.len() < 3 {
                return Err(usage(program, "peers <torrent_file>"));
            }
            let torrent = Torrent::from_file(&args[2])?;
            let peers = fetch_peers(&torrent, &peer_id, &config).await?;
            for addr in peers {
                println!("{addr}");
            }
        }
        "handshake" => {
            if args.len() < 4 {
                return Err(usage(program, "handshake <torrent_file> <peer_ip:port>"));
            }
            let torrent = Torrent::from_file(&args[2])?;
            let addr: SocketAddrV4 = args[3]
                .parse()
                .map_err(|_| ClientError::Usage(format!("invalid peer address '{}'", args[3])))?;
            let session = PeerSession::connect(
                addr,
                &torrent.info_hash,
                &peer_id,
                Duration::from_secs(config.connect_timeout),
                Duration::from_secs(config.read_timeout),
            )
            .await?;
            println!("Peer ID: {}", hex::encode(session.remote_peer_id));
        }
        "download_piece" => {
            if args.len() < 6 || args[2] != "-o" {
                return Err(usage(
                    program,
                    "download_piece -o <output_path> <torrent_file> <piece_index>",
                ));
            }
            let torrent = Torrent::from_file(&args[4])?;
            let index: u32 = args[5]
                .parse()
                .map_err(|_| ClientError::Usage(format!("invalid piece index '{}'", args[5])))?;
            if index >= torrent.info.piece_count() {
                return Err(ClientError::Usage(format!(
                    "piece index {index} out of range, torrent has {} pieces",
                    torrent.info.piece_count()
                )));
            }

            let peers = fetch_peers(&torrent, &peer_id, &config).await?;
            let mut session =
                establish_session(&peers, &torrent.info_hash, &peer_id, &config).await?;
            let piece = downloader::download_piece(&mut session, &torrent.info, index).await?;
            tokio::fs::write(&args[3], &piece)
                .await
                .map_err(ClientError::FileIo)?;
            println!("Piece {index} downloaded to {}.", args[3]);
        }
        "download" => {
            if args.len() < 5 || args[2] != "-o" {
                return Err(usage(program, "download -o <output_path|default> <torrent_file>"));
            }
            let torrent = Torrent::from_file(&args[4])?;
            let output_path = resolve_output_path(&args[3], &config, &torrent.info);
            download_all(&torrent, &output_path, &peer_id, &config).await?;
        }
        "help" => print_usage(program),
        other => {
            print_usage(program);
            return Err(ClientError::Usage(format!("unknown command '{other}'")));
        }
    }

    Ok(())
}

/// The full download: pre-allocate, resume scan, one prepared session,
/// serial drain of the work queue with bounded per-piece retries.
async fn download_all(
    torrent: &Torrent,
    output_path: &Path,
    peer_id: &[u8; 20],
    config: &Config,
) -> Result<(), ClientError> {
    let info = &torrent.info;
    info!(
        "downloading '{}' ({} bytes, {} pieces) to {}",
        info.name,
        info.length,
        info.piece_count(),
        output_path.display()
    );

    let mut file = file_io::open_output(output_path, info.length).await?;

    let queue = WorkQueue::new();
    let verified = file_io::scan_existing(output_path, info, &queue).await?;
    if queue.is_empty().await {
        println!("File is already complete and valid. Nothing to download.");
        return Ok(());
    }

    let peers = fetch_peers(torrent, peer_id, config).await?;
    let progress = ProgressTracker::new(info.piece_count() as usize, verified as usize);

    let mut session = establish_session(&peers, &torrent.info_hash, peer_id, config).await?;
    while let Some(work) = queue.try_pop().await {
        match downloader::download_piece(&mut session, info, work.index).await {
            Ok(piece) => {
                file_io::write_piece_at(&mut file, &piece, info.piece_offset(work.index)).await?;
                progress.increment();
            }
            Err(e) if e.is_retryable() => {
                let attempts = work.retries + 1;
                if attempts >= config.max_retries {
                    warn!("piece {} failed on attempt {attempts}, giving up", work.index);
                    return Err(e);
                }
                warn!(
                    "piece {} failed (attempt {attempts}/{}): {e}",
                    work.index, config.max_retries
                );
                queue
                    .push(PieceWork {
                        index: work.index,
                        retries: attempts,
                    })
                    .await;
                // the failed session is unusable; start over with the peer list
                session = establish_session(&peers, &torrent.info_hash, peer_id, config).await?;
            }
            Err(e) => return Err(e),
        }
    }

    println!("Download completed successfully!");
    Ok(())
}

async fn fetch_peers(
    torrent: &Torrent,
    peer_id: &[u8; 20],
    config: &Config,
) -> Result<Vec<SocketAddrV4>, ClientError> {
    let client = Client::new();
    let peers = tracker::announce(
        &client,
        &torrent.announce,
        &torrent.info_hash,
        peer_id,
        config.listen_port,
        torrent.info.length,
    )
    .await?;
    if peers.is_empty() {
        return Err(ClientError::TrackerFailure(
            "tracker returned no peers".to_string(),
        ));
    }
    info!("tracker returned {} peer(s)", peers.len());
    Ok(peers)
}

/// Tries each tracker-returned peer in order until one accepts the
/// handshake and reaches the unchoked state.
async fn establish_session(
    peers: &[SocketAddrV4],
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    config: &Config,
) -> Result<PeerSession<TcpStream>, ClientError> {
    for addr in peers {
        let connected = PeerSession::connect(
            *addr,
            info_hash,
            peer_id,
            Duration::from_secs(config.connect_timeout),
            Duration::from_secs(config.read_timeout),
        )
        .await;
        match connected {
            Ok(mut session) => match session.prepare().await {
                Ok(()) => {
                    info!("session established with {addr}");
                    return Ok(session);
                }
                Err(e) => warn!("peer {addr} failed session setup: {e}"),
            },
            Err(e) => warn!("could not connect to {addr}: {e}"),
        }
    }
    Err(ClientError::HandshakeFailed(
        "no usable peer in tracker response".to_string(),
    ))
}

/// `default` resolves to the torrent's own name inside the configured
/// download directory.
fn resolve_output_path(out: &str, config: &Config, info: &TorrentInfo) -> PathBuf {
    if out == "default" {
        Path::new(&config.download_directory).join(&info.name)
    } else {
        PathBuf::from(out)
    }
}

fn usage(program: &str, synopsis: &str) -> ClientError {
    ClientError::Usage(format!("usage: {program} {synopsis}"))
}

fn print_usage(program: &str) {
    println!("Usage: {program} command [arguments...]");
    println!("Commands:");
    println!("  decode <encoded_value>                    Decode a bencoded value");
    println!("  info <torrent_file>                       Show info about a torrent file");
    println!("  peers <torrent_file>                      Show peers from a torrent file");
    println!("  handshake <torrent_file> <peer_ip:port>   Handshake with a peer");
    println!("  download_piece -o <output_path> <torrent_file> <piece_index>");
    println!("  download -o <output_path|default> <torrent_file>");
    println!("  help                                      Show this help message");
}
