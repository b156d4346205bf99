// crates/server/src/server.rs
//! Socket accept loop. One task per connection; each connection carries
//! exactly one request line and one response line.

use crate::handlers;
use crate::Daemon;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub async fn serve(daemon: Arc<Daemon>, listener: UnixListener, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("accept loop stopping");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let daemon = daemon.clone();
                        tokio::spawn(async move {
                            handle_connection(&daemon, stream).await;
                        });
                    }
                    Err(e) => {
                        debug!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(daemon: &Daemon, stream: UnixStream) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    match reader.read_line(&mut line).await {
        Ok(0) => return,
        Ok(_) => {}
        Err(e) => {
            trace!(error = %e, "connection read failed");
            return;
        }
    }

    let response = handlers::handle_line(daemon, line.trim_end()).await;
    let mut out = response.to_line();
    out.push('\n');
    // The client may have gone away; nothing useful to do about it.
    let _ = write_half.write_all(out.as_bytes()).await;
    let _ = write_half.shutdown().await;
}
