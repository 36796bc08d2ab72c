use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::notify::{AdminNotifier, EventKind};
use crate::protocol::error::ProtocolError;
use crate::protocol::frame::{self, DecodeOutcome, FileMetadata};
use crate::protocol::Action;
use crate::registry::{ClientRegistry, DownloadRequest};
use crate::utils::buffer::ChunkBuffer;

/// Shared dependencies handed to every connection task.
pub struct SessionContext {
    pub storage_root: PathBuf,
    pub chunk_buffer_size: usize,
    pub file_write_timeout: Duration,
    pub socket_write_timeout: Duration,
    pub log_silent_drops: bool,
    pub registry: Arc<ClientRegistry>,
    pub notifier: AdminNotifier,
}

impl SessionContext {
    pub fn new(
        config: &ServerConfig,
        registry: Arc<ClientRegistry>,
        notifier: AdminNotifier,
    ) -> Self {
        Self {
            storage_root: config.storage_root.clone(),
            chunk_buffer_size: config.chunk_buffer_size,
            file_write_timeout: Duration::from_secs(config.file_write_timeout_secs),
            socket_write_timeout: Duration::from_secs(config.socket_write_timeout_secs),
            log_silent_drops: config.log_silent_drops,
            registry,
            notifier,
        }
    }
}

/// Single pass over one accepted connection: read the action selector,
/// then run the matching transfer session to completion. All failures
/// terminate here; the accept loop never sees them.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let mut buffer = ChunkBuffer::new(ctx.chunk_buffer_size);

    let n = stream.read(buffer.spare()).await?;
    if n == 0 {
        debug!("{} closed before sending an action", peer);
        return Ok(());
    }
    buffer.advance(n);

    match frame::decode_action(&mut buffer)? {
        Action::Receive => {
            debug!("{} opened an upload connection", peer);
            run_receive(&mut stream, &mut buffer, &ctx).await
        }
        Action::Send => {
            let Some(request) = ctx.registry.dequeue(peer.ip()) else {
                if ctx.log_silent_drops {
                    warn!("{} opened a send connection with no pending request", peer);
                }
                return Ok(());
            };
            debug!("{} collecting download {:?}", peer, request.server_path);
            buffer.clear();
            run_send(&mut stream, &mut buffer, request, &ctx).await
        }
    }
}

/// Upload: client streams a file into the storage root.
struct ReceiveSession {
    file_name: String,
    declared_size: u64,
    position: u64,
    file: File,
}

async fn run_receive(
    stream: &mut TcpStream,
    buffer: &mut ChunkBuffer,
    ctx: &SessionContext,
) -> anyhow::Result<()> {
    let metadata = read_metadata(stream, buffer).await?;
    let file_name = base_name(Path::new(&metadata.file_name))?;

    fs::create_dir_all(&ctx.storage_root).await?;
    let path = ctx.storage_root.join(&file_name);
    let file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            ctx.notifier.notify(
                EventKind::UploadFail,
                format!("{}: destination already exists", file_name),
            );
            bail!("upload of {} refused: destination already exists", file_name);
        }
        Err(e) => {
            ctx.notifier
                .notify(EventKind::UploadFail, format!("{}: {}", file_name, e));
            return Err(e).context(format!("opening {}", path.display()));
        }
    };

    info!(
        "receiving {} ({} bytes) into {:?}",
        file_name, metadata.file_size, ctx.storage_root
    );
    let mut session = ReceiveSession {
        file_name,
        declared_size: metadata.file_size,
        position: 0,
        file,
    };

    match session.stream_to_disk(stream, buffer, ctx).await {
        Ok(()) => {
            info!("upload complete: {}", session.file_name);
            ctx.notifier.notify(
                EventKind::UploadOk,
                format!("{} uploaded ({} bytes)", session.file_name, session.declared_size),
            );
            Ok(())
        }
        Err(e) => {
            ctx.notifier
                .notify(EventKind::UploadFail, format!("{}: {}", session.file_name, e));
            Err(e)
        }
    }
}

impl ReceiveSession {
    /// Drain buffered payload to disk, then keep reading from the socket
    /// until the declared size is reached. `position` counts bytes durably
    /// written and is the single source of truth for completion.
    async fn stream_to_disk(
        &mut self,
        stream: &mut TcpStream,
        buffer: &mut ChunkBuffer,
        ctx: &SessionContext,
    ) -> anyhow::Result<()> {
        loop {
            while !buffer.is_empty() {
                let remaining = (self.declared_size - self.position) as usize;
                if remaining == 0 {
                    return Err(ProtocolError::Overshoot {
                        declared: self.declared_size,
                        received: self.declared_size + buffer.len() as u64,
                    }
                    .into());
                }
                let want = remaining.min(buffer.len());
                let written = timeout(
                    ctx.file_write_timeout,
                    self.file.write(&buffer.filled()[..want]),
                )
                .await
                .map_err(|_| {
                    anyhow::anyhow!("disk write timed out after {:?}", ctx.file_write_timeout)
                })??;
                // a short write still advances by the real count
                self.position += written as u64;
                buffer.consume(written);
                debug!(
                    "{}: {} of {} bytes on disk",
                    self.file_name, self.position, self.declared_size
                );
            }

            if self.position == self.declared_size {
                self.file.flush().await?;
                return Ok(());
            }

            let n = stream.read(buffer.spare()).await?;
            if n == 0 {
                bail!(
                    "peer closed the connection at {} of {} bytes",
                    self.position,
                    self.declared_size
                );
            }
            buffer.advance(n);
        }
    }
}

/// Download: server streams a stored file to the requesting client.
struct SendSession {
    file_name: String,
    file_size: u64,
    position: u64,
    file: File,
}

async fn run_send(
    stream: &mut TcpStream,
    buffer: &mut ChunkBuffer,
    request: DownloadRequest,
    ctx: &SessionContext,
) -> anyhow::Result<()> {
    let path = &request.server_path;
    let file_meta = match fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if ctx.log_silent_drops {
                warn!("requested download {:?} does not exist", path);
            }
            return Ok(());
        }
        Err(e) => return Err(e).context(format!("inspecting {}", path.display())),
    };
    if file_meta.is_dir() {
        if ctx.log_silent_drops {
            warn!("requested download {:?} is a directory", path);
        }
        return Ok(());
    }

    let file_name = base_name(path)?;
    let file_size = file_meta.len();
    let metadata_frame = match frame::encode_metadata(&file_name, file_size) {
        Ok(bytes) => bytes,
        Err(e) => {
            ctx.notifier
                .notify(EventKind::DownloadFail, format!("{}: {}", file_name, e));
            return Err(e.into());
        }
    };
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            ctx.notifier
                .notify(EventKind::DownloadFail, format!("{}: {}", file_name, e));
            return Err(e).context(format!("opening {}", path.display()));
        }
    };

    info!("sending {} ({} bytes)", file_name, file_size);
    let mut session = SendSession {
        file_name,
        file_size,
        position: 0,
        file,
    };

    match session.stream_to_socket(stream, buffer, &metadata_frame, ctx).await {
        Ok(()) => {
            info!("download complete: {}", session.file_name);
            ctx.notifier.notify(
                EventKind::DownloadOk,
                format!("{} sent ({} bytes)", session.file_name, session.file_size),
            );
            let _ = stream.shutdown().await;
            Ok(())
        }
        Err(e) => {
            ctx.notifier
                .notify(EventKind::DownloadFail, format!("{}: {}", session.file_name, e));
            Err(e)
        }
    }
}

impl SendSession {
    /// Announce the file with one metadata frame, then pump chunks from
    /// disk to the socket until the offset reaches the file size.
    async fn stream_to_socket(
        &mut self,
        stream: &mut TcpStream,
        buffer: &mut ChunkBuffer,
        metadata_frame: &[u8],
        ctx: &SessionContext,
    ) -> anyhow::Result<()> {
        // metadata must be fully on the wire before any payload
        timeout(ctx.socket_write_timeout, stream.write_all(metadata_frame))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "metadata write timed out after {:?}",
                    ctx.socket_write_timeout
                )
            })??;

        loop {
            if self.position == self.file_size {
                stream.flush().await?;
                return Ok(());
            }

            let n = self.file.read(buffer.spare()).await?;
            if n == 0 {
                bail!(
                    "source file ended at {} of {} bytes",
                    self.position,
                    self.file_size
                );
            }
            buffer.advance(n);
            self.position += n as u64;
            if self.position > self.file_size {
                // the file grew underneath us
                return Err(ProtocolError::Overshoot {
                    declared: self.file_size,
                    received: self.position,
                }
                .into());
            }

            timeout(ctx.socket_write_timeout, stream.write_all(buffer.filled()))
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "socket write timed out after {:?}",
                        ctx.socket_write_timeout
                    )
                })??;
            debug!(
                "{}: {} of {} bytes sent",
                self.file_name, self.position, self.file_size
            );
            buffer.consume(buffer.len());
        }
    }
}

/// Keep accumulating socket bytes into the same buffer until one metadata
/// frame decodes. A full buffer with no end marker in sight is a protocol
/// error, not a reason to grow.
async fn read_metadata(
    stream: &mut TcpStream,
    buffer: &mut ChunkBuffer,
) -> anyhow::Result<FileMetadata> {
    loop {
        match frame::decode_metadata(buffer)? {
            DecodeOutcome::Complete(metadata) => return Ok(metadata),
            DecodeOutcome::Incomplete => {
                if buffer.is_full() {
                    return Err(ProtocolError::MissingEndMarker.into());
                }
                let n = stream.read(buffer.spare()).await?;
                if n == 0 {
                    bail!("connection closed before metadata was complete");
                }
                buffer.advance(n);
            }
        }
    }
}

/// Only the base name of a client-supplied path is ever used; uploads
/// cannot escape the storage root.
fn base_name(path: &Path) -> anyhow::Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("no usable file name in {:?}", path))?;
    Ok(name.to_string())
}
