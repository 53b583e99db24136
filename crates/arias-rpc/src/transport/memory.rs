//! Paired in-process frame channels.
//!
//! The client end implements [`FrameSink`]/[`FrameSource`]; the peer end plays
//! the remote side and can sever the link to simulate a dropped connection.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{FrameSink, FrameSource};
use crate::error::{RpcError, RpcResult};

/// Client write half.
pub struct MemorySink {
    outbound: mpsc::UnboundedSender<String>,
    link: CancellationToken,
}

/// Client read half.
pub struct MemorySource {
    inbound: mpsc::UnboundedReceiver<String>,
    link: CancellationToken,
}

/// Remote end of an in-memory link.
pub struct MemoryPeer {
    /// Pushes frames toward the client.
    pub sender: PeerSender,
    /// Frames written by the client.
    pub receiver: PeerReceiver,
}

/// Cloneable handle that writes frames to the client.
#[derive(Clone)]
pub struct PeerSender {
    inbound: mpsc::UnboundedSender<String>,
    link: CancellationToken,
}

/// Receives frames the client wrote.
pub struct PeerReceiver {
    outbound: mpsc::UnboundedReceiver<String>,
}

/// Build a connected client/peer pair.
#[must_use]
pub fn pair() -> (MemorySink, MemorySource, MemoryPeer) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let link = CancellationToken::new();
    (
        MemorySink {
            outbound: outbound_tx,
            link: link.clone(),
        },
        MemorySource {
            inbound: inbound_rx,
            link: link.clone(),
        },
        MemoryPeer {
            sender: PeerSender {
                inbound: inbound_tx,
                link,
            },
            receiver: PeerReceiver {
                outbound: outbound_rx,
            },
        },
    )
}

impl PeerSender {
    /// Push a frame to the client. Returns `false` once the link is down.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        !self.link.is_cancelled() && self.inbound.send(frame.into()).is_ok()
    }

    /// Sever the link in both directions.
    pub fn disconnect(&self) {
        self.link.cancel();
    }

    /// Whether the link has been severed by either side.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.link.is_cancelled()
    }
}

impl PeerReceiver {
    /// Next frame written by the client, `None` after the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: String) -> RpcResult<()> {
        if self.link.is_cancelled() {
            return Err(RpcError::ConnectionClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| RpcError::ConnectionClosed)
    }

    async fn close(&mut self) -> RpcResult<()> {
        self.link.cancel();
        Ok(())
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<RpcResult<String>> {
        tokio::select! {
            biased;
            () = self.link.cancelled() => None,
            frame = self.inbound.recv() => frame.map(Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways_until_disconnect() -> anyhow::Result<()> {
        let (mut sink, mut source, mut peer) = pair();
        sink.send_frame("ping".to_string()).await?;
        assert_eq!(peer.receiver.recv().await.as_deref(), Some("ping"));

        assert!(peer.sender.send("pong"));
        assert_eq!(source.next_frame().await.transpose()?.as_deref(), Some("pong"));

        peer.sender.disconnect();
        assert!(source.next_frame().await.is_none());
        assert!(matches!(
            sink.send_frame("late".to_string()).await,
            Err(RpcError::ConnectionClosed)
        ));
        assert!(!peer.sender.send("late"));
        Ok(())
    }

    #[tokio::test]
    async fn closing_sink_ends_both_directions() -> anyhow::Result<()> {
        let (mut sink, mut source, peer) = pair();
        sink.close().await?;
        drop(sink);
        assert!(peer.sender.is_disconnected());
        assert!(source.next_frame().await.is_none());
        let mut receiver = peer.receiver;
        assert!(receiver.recv().await.is_none());
        Ok(())
    }
}
