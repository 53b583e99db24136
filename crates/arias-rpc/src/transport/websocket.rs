use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::{FrameSink, FrameSource};
use crate::error::{RpcError, RpcResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a websocket connection.
pub struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

/// Read half of a websocket connection.
pub struct WebSocketSource {
    inner: SplitStream<WsStream>,
}

/// Dial `url` and split the resulting websocket into frame halves.
///
/// # Errors
///
/// Returns [`RpcError::Transport`] when the handshake fails.
pub async fn connect(url: &str) -> RpcResult<(WebSocketSink, WebSocketSource)> {
    let (stream, response) = connect_async(url)
        .await
        .map_err(|err| RpcError::transport("websocket.connect", err))?;
    debug!(url, status = %response.status(), "websocket handshake complete");
    let (sink, source) = stream.split();
    Ok((WebSocketSink { inner: sink }, WebSocketSource { inner: source }))
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: String) -> RpcResult<()> {
        self.inner
            .send(Message::Text(frame))
            .await
            .map_err(|err| match err {
                WsError::ConnectionClosed | WsError::AlreadyClosed => RpcError::ConnectionClosed,
                other => RpcError::transport("websocket.send", other),
            })
    }

    async fn close(&mut self) -> RpcResult<()> {
        match self.inner.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(RpcError::transport("websocket.close", err)),
        }
    }
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn next_frame(&mut self) -> Option<RpcResult<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes)
                            .map_err(|err| RpcError::transport("websocket.decode", err)),
                    );
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by peer");
                    return None;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(err) => return Some(Err(RpcError::transport("websocket.read", err))),
            }
        }
    }
}
