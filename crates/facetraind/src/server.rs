//! WebSocket front end: one session per connection.
//!
//! Each connection gets a reader (this task), a writer task and a dedicated
//! session thread. Text frames flow reader → session thread → writer through
//! bounded channels, so a session handles its messages strictly in order and
//! a slow model never stalls the async runtime.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::Instrument;

use facetrain_core::{Session, UnknownPool};
use facetrain_vision::PngRenderer;

use crate::engine::EngineHandle;

/// Everything a new connection needs.
#[derive(Clone)]
pub struct ServerContext {
    pub engine: EngineHandle,
    pub pool: Arc<UnknownPool>,
    pub queue: usize,
}

/// Accept connections forever.
pub async fn serve(listener: TcpListener, ctx: ServerContext) -> anyhow::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                let pause = accept_backoff(&e);
                tracing::warn!(error = %e, pause_ms = pause.as_millis() as u64, "accept failed");
                tokio::time::sleep(pause).await;
                continue;
            }
        };
        let span = tracing::info_span!("session", id = %uuid::Uuid::new_v4(), %peer);
        let ctx = ctx.clone();
        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, peer, ctx).await {
                    tracing::warn!(error = %e, "connection ended with error");
                }
            }
            .instrument(span),
        );
    }
}

/// How long to wait before accepting again after `err`. A peer that vanished
/// mid-handshake costs nothing; resource exhaustion (e.g. EMFILE) gets a pause
/// so the loop does not spin.
fn accept_backoff(err: &std::io::Error) -> Duration {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted => Duration::ZERO,
        _ => Duration::from_millis(100),
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: ServerContext) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    tracing::info!(%peer, "client connected");
    let (mut write, mut read) = ws.split();

    let (in_tx, in_rx) = mpsc::channel::<String>(ctx.queue);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(ctx.queue);

    let span = tracing::Span::current();
    let (engine, pool) = (ctx.engine, ctx.pool);
    std::thread::Builder::new()
        .name("facetrain-session".into())
        .spawn(move || {
            let _guard = span.enter();
            let session = Session::new(pool, engine, PngRenderer);
            run_session(session, in_rx, out_tx);
        })?;

    let writer = tokio::spawn(
        async move {
            while let Some(json) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    tracing::warn!(error = %e, "write failed");
                    break;
                }
            }
            let _ = write.close().await;
        }
        .in_current_span(),
    );

    while let Some(result) = read.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if in_tx.send(text.as_str().to_owned()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "read failed");
                break;
            }
        }
    }

    // Closing the inbound queue ends the session thread, which closes the
    // outbound queue and lets the writer finish.
    drop(in_tx);
    writer.await?;
    tracing::info!(%peer, "client disconnected");
    Ok(())
}

/// Session thread body: handle messages until the reader goes away.
fn run_session(
    mut session: Session<EngineHandle, PngRenderer>,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
) {
    tracing::debug!("session thread started");
    while let Some(text) = inbound.blocking_recv() {
        for msg in session.handle_text(&text) {
            let json = match msg.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode reply");
                    continue;
                }
            };
            if outbound.blocking_send(json).is_err() {
                return;
            }
        }
    }
    tracing::debug!(cached = session.cache().len(), "session thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{start, tests::StubVision};

    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = ServerContext {
            engine: start(StubVision).unwrap(),
            pool: Arc::new(UnknownPool::empty(2)),
            queue: 4,
        };
        tokio::spawn(serve(listener, ctx));
        addr
    }

    async fn next_text<S>(read: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match read.next().await.unwrap().unwrap() {
                Message::Text(text) => return text.as_str().to_owned(),
                _ => continue,
            }
        }
    }

    #[test]
    fn test_accept_backoff() {
        use std::io::{Error, ErrorKind};
        assert_eq!(accept_backoff(&Error::from(ErrorKind::ConnectionAborted)), Duration::ZERO);
        // EMFILE
        assert_eq!(accept_backoff(&Error::from_raw_os_error(24)), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_failed_handshake_does_not_stop_server() {
        let addr = spawn_server().await;
        // Plain TCP client that closes before the WebSocket upgrade.
        drop(tokio::net::TcpStream::connect(addr).await.unwrap());

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        let (mut write, mut read) = ws.split();
        write.send(Message::Text(r#"{"type":"NULL"}"#.to_owned().into())).await.unwrap();
        assert_eq!(next_text(&mut read).await, r#"{"type":"NULL"}"#);
    }

    #[tokio::test]
    async fn test_keepalive_round_trip() {
        let addr = spawn_server().await;
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        let (mut write, mut read) = ws.split();

        write.send(Message::Text(r#"{"type":"NULL"}"#.to_owned().into())).await.unwrap();
        assert_eq!(next_text(&mut read).await, r#"{"type":"NULL"}"#);
    }

    #[tokio::test]
    async fn test_messages_are_handled_in_order() {
        let addr = spawn_server().await;
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        let (mut write, mut read) = ws.split();

        // Unknown types produce no reply; the frame is still acknowledged.
        for raw in [
            r#"{"type":"BOGUS"}"#,
            r#"{"type":"FRAME","frame":"not a data url"}"#,
            r#"{"type":"NULL"}"#,
        ] {
            write.send(Message::Text(raw.to_owned().into())).await.unwrap();
        }
        assert_eq!(next_text(&mut read).await, r#"{"type":"PROCESSED"}"#);
        assert_eq!(next_text(&mut read).await, r#"{"type":"NULL"}"#);
    }
}
