//! Producer task that streams an upload source, optionally through gzip.
//!
//! # Design
//! - The producer owns the source and the encoder; the consumer only sees a
//!   stream of chunks, so the full object is never buffered.
//! - Gzip runs on a blocking thread fed by the async reader over a bounded
//!   channel; the reader sends an explicit end marker, and an encoder that
//!   sees the channel close without it stops without writing a trailer.
//! - End of stream is every sender being dropped once the producer returns,
//!   which happens exactly once.
//! - A producer failure is pushed into the stream before it ends so the
//!   consumer cannot mistake it for a clean EOF; a consumer that stops reading
//!   makes the producer fail with `BrokenPipe`.

use std::io::{self, Write};
use std::mem;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

use crate::error::{StorageError, StorageResult};
use crate::service::ByteSource;

const CHUNK_SIZE: usize = 64 * 1024;
const PIPE_DEPTH: usize = 4;

type ChunkSender = mpsc::Sender<io::Result<Bytes>>;

/// Byte counts observed by the producer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PipeSummary {
    pub(crate) read: u64,
    pub(crate) written: u64,
}

/// Consumer half plus the producer's completion handle.
pub(crate) struct Pipe {
    pub(crate) stream: ReceiverStream<io::Result<Bytes>>,
    pub(crate) producer: Producer,
}

/// Completion handle of the producer task.
pub(crate) struct Producer(JoinHandle<io::Result<PipeSummary>>);

impl Producer {
    /// Wait for the producer and surface its failure, if any.
    pub(crate) async fn join(self) -> StorageResult<PipeSummary> {
        self.0
            .await
            .map_err(|err| StorageError::io("pipe.join", None, io::Error::other(err)))?
            .map_err(|source| StorageError::io("pipe.produce", None, source))
    }
}

/// Start streaming `source` on a background task.
pub(crate) fn spawn(source: Box<dyn ByteSource>, compress: bool) -> Pipe {
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    let producer = tokio::spawn(async move {
        let result = if compress {
            produce_gzip(source, tx.clone()).await
        } else {
            produce(source, &tx).await
        };
        match &result {
            Ok(summary) => {
                trace!(read = summary.read, written = summary.written, "upload stream drained");
            }
            Err(err) => {
                let _ = tx
                    .send(Err(io::Error::new(err.kind(), err.to_string())))
                    .await;
            }
        }
        result
    });
    Pipe {
        stream: ReceiverStream::new(rx),
        producer: Producer(producer),
    }
}

async fn produce(mut source: Box<dyn ByteSource>, tx: &ChunkSender) -> io::Result<PipeSummary> {
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut summary = PipeSummary::default();
    loop {
        let read = source.read(&mut buffer).await?;
        if read == 0 {
            return Ok(summary);
        }
        summary.read += read as u64;
        tx.send(Ok(Bytes::copy_from_slice(&buffer[..read])))
            .await
            .map_err(|_| consumer_gone())?;
        summary.written += read as u64;
    }
}

async fn produce_gzip(mut source: Box<dyn ByteSource>, tx: ChunkSender) -> io::Result<PipeSummary> {
    let (raw_tx, raw_rx) = mpsc::channel(PIPE_DEPTH);
    let encoder = tokio::task::spawn_blocking(move || encode(raw_rx, &tx));

    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut read_total = 0_u64;
    let read_result = loop {
        match source.read(&mut buffer).await {
            Ok(0) => break Ok(()),
            Ok(read) => {
                read_total += read as u64;
                let chunk = Bytes::copy_from_slice(&buffer[..read]);
                // A closed channel means the encoder failed; its error wins.
                if raw_tx.send(Some(chunk)).await.is_err() {
                    break Ok(());
                }
            }
            Err(err) => break Err(err),
        }
    };
    if read_result.is_ok() {
        let _ = raw_tx.send(None).await;
    }
    drop(raw_tx);

    let encoded = encoder.await.map_err(io::Error::other)?;
    read_result?;
    Ok(PipeSummary {
        read: read_total,
        written: encoded?,
    })
}

/// Compress raw chunks until the end marker, forwarding output as it forms.
fn encode(mut raw: mpsc::Receiver<Option<Bytes>>, tx: &ChunkSender) -> io::Result<u64> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    let mut written = 0;
    loop {
        match raw.blocking_recv() {
            Some(Some(chunk)) => {
                encoder.write_all(&chunk)?;
                written += forward_blocking(tx, mem::take(encoder.get_mut()))?;
            }
            Some(None) => break,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "upload source ended without end marker",
                ));
            }
        }
    }
    written += forward_blocking(tx, encoder.finish()?)?;
    Ok(written)
}

fn forward_blocking(tx: &ChunkSender, chunk: Vec<u8>) -> io::Result<u64> {
    if chunk.is_empty() {
        return Ok(0);
    }
    let len = chunk.len() as u64;
    tx.blocking_send(Ok(Bytes::from(chunk)))
        .map_err(|_| consumer_gone())?;
    Ok(len)
}

fn consumer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "upload consumer went away")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::{Cursor, Read, SeekFrom};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
    use tokio_stream::StreamExt;

    async fn drain(stream: &mut ReceiverStream<io::Result<Bytes>>) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn compressed_stream_decodes_to_source() -> anyhow::Result<()> {
        let body: Vec<u8> = (0..200_000_u32).flat_map(u32::to_le_bytes).collect();
        let Pipe {
            mut stream,
            producer,
        } = spawn(Box::new(Cursor::new(body.clone())), true);

        let compressed = drain(&mut stream).await?;
        let summary = producer.join().await?;
        assert_eq!(summary.read, body.len() as u64);
        assert_eq!(summary.written, compressed.len() as u64);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut decoded)?;
        assert_eq!(decoded, body);
        Ok(())
    }

    #[tokio::test]
    async fn uncompressed_stream_passes_bytes_through() -> anyhow::Result<()> {
        let Pipe {
            mut stream,
            producer,
        } = spawn(Box::new(Cursor::new(b"raw".to_vec())), false);
        assert_eq!(drain(&mut stream).await?, b"raw");
        assert_eq!(producer.join().await?.written, 3);
        Ok(())
    }

    struct FailingSource {
        served: bool,
    }

    impl AsyncRead for FailingSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.served {
                return Poll::Ready(Err(io::Error::other("disk vanished")));
            }
            self.served = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncSeek for FailingSource {
        fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
            Ok(())
        }

        fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
            Poll::Ready(Ok(0))
        }
    }

    #[tokio::test]
    async fn read_failure_reaches_both_sides() {
        let Pipe {
            mut stream,
            producer,
        } = spawn(Box::new(FailingSource { served: false }), true);
        let consumed = drain(&mut stream).await;
        assert!(consumed.is_err_and(|err| err.to_string() == "disk vanished"));
        assert!(matches!(
            producer.join().await,
            Err(StorageError::Io {
                operation: "pipe.produce",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn dropped_consumer_fails_producer() {
        let body = vec![7_u8; CHUNK_SIZE * (PIPE_DEPTH + 4)];
        let Pipe { stream, producer } = spawn(Box::new(Cursor::new(body)), false);
        drop(stream);
        assert!(producer.join().await.is_err());
    }

    #[tokio::test]
    async fn dropped_consumer_stops_the_encoder() {
        let body = vec![7_u8; CHUNK_SIZE * (PIPE_DEPTH + 4)];
        let Pipe { stream, producer } = spawn(Box::new(Cursor::new(body)), true);
        drop(stream);
        assert!(matches!(
            producer.join().await,
            Err(StorageError::Io {
                operation: "pipe.produce",
                ..
            })
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn compression_runs_on_a_single_threaded_runtime() -> anyhow::Result<()> {
        let body = vec![3_u8; CHUNK_SIZE * 8];
        let Pipe {
            mut stream,
            producer,
        } = spawn(Box::new(Cursor::new(body.clone())), true);
        let compressed = drain(&mut stream).await?;
        assert_eq!(producer.join().await?.read, body.len() as u64);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut decoded)?;
        assert_eq!(decoded, body);
        Ok(())
    }
}
