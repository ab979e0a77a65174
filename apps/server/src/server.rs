//! WebSocket front door.
//!
//! Each text frame is one request handed to the [`Dispatcher`]. Replies for a
//! connection go through an mpsc channel to that connection's writer task, so
//! answers are sent in completion order, not request order.

use std::future::Future;
use std::net::SocketAddr;

use color_eyre::eyre::{Result, eyre};
use deepqa_core::Dispatcher;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{Instrument, debug, info, info_span, warn};

/// Replies buffered per connection before the writer applies backpressure.
const REPLY_BUFFER: usize = 64;

/// Accept connections until `shutdown` resolves.
pub(crate) async fn serve(
    listener: TcpListener,
    dispatcher: Dispatcher,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| eyre!("listener has no local address: {e}"))?;
    info!(%addr, "listening for websocket connections");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = dispatcher.clone();
                        let span = info_span!("connection", %peer);
                        tokio::spawn(handle_connection(stream, peer, dispatcher).instrument(span));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, dispatcher: Dispatcher) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    info!("client connected");

    let (mut write, mut read) = ws.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(json) = reply_rx.recv().await {
            if let Err(e) = write.send(Message::Text(json)).await {
                debug!(error = %e, "send failed, dropping remaining replies");
                break;
            }
        }
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                dispatcher.dispatch(&text, reply_tx.clone());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // Binary, Ping/Pong frames handled by tungstenite.
            Err(e) => {
                debug!(error = %e, "read error");
                break;
            }
        }
    }

    drop(reply_tx);
    writer.abort();
    info!("client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use deepqa_core::{PipelinePool, Stages};
    use deepqa_shared::{PipelineSettings, ServerConfig};
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn answers_ask_frames_over_websocket() {
        let pool = PipelinePool::build(1, Arc::new(Stages::default()), &PipelineSettings::default())
            .unwrap();
        let config = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            pool_size: 1,
            acquire_timeout: Duration::from_secs(1),
            max_pending: 8,
        };
        let dispatcher = Dispatcher::new(Arc::new(pool), &config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, dispatcher, std::future::pending()));

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(Message::Text("hello".into())).await.unwrap();
        ws.send(Message::Text("ask:When was the Magna Carta signed?".into()))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("reply in time")
            .unwrap()
            .unwrap();
        assert_eq!(reply, Message::Text("[]".into()));

        server.abort();
    }
}
