use super::parse::parse_datagram;
use super::streaming::decode::{DecodedMessage, StreamingDecoder};
use super::{Incoming, MAX_MSG_SIZE};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use sip_types::msg::SipMessage;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;

enum Writer {
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
    Datagram {
        socket: Arc<UdpSocket>,
        target: Option<SocketAddr>,
    },
}

struct Inner {
    addr: SocketAddr,
    streamed: bool,
    transport: &'static str,
    writer: tokio::sync::Mutex<Option<Writer>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// A single socket with its reader and dispatcher tasks.
///
/// The reader pulls bytes off the socket and hands them to the dispatcher,
/// which decodes messages and publishes them on the transport's sink
/// channel. Read errors end both tasks silently, the peer is gone.
///
/// Cloning is cheap and shares the underlying socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Spawn the tasks for a stream socket connected to `remote`.
    ///
    /// Messages are framed by `Content-Length`.
    pub fn spawn_stream<S>(
        stream: S,
        remote: SocketAddr,
        sink: mpsc::Sender<Incoming>,
        transport: &'static str,
    ) -> Connection
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let (chunk_tx, chunk_rx) = mpsc::channel(8);

        let reader = tokio::spawn(stream_reader(read, remote, chunk_tx));
        tokio::spawn(dispatcher(true, chunk_rx, sink, transport));

        Connection {
            inner: Arc::new(Inner {
                addr: remote,
                streamed: true,
                transport,
                writer: tokio::sync::Mutex::new(Some(Writer::Stream(Box::new(write)))),
                reader: parking_lot::Mutex::new(Some(reader)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the tasks for a datagram socket.
    ///
    /// Every received datagram is decoded as one complete message. `addr`
    /// is the address this connection is tracked under (the local address
    /// for listener sockets), `target` the fixed peer sends go to, if any.
    pub fn spawn_datagram(
        socket: Arc<UdpSocket>,
        addr: SocketAddr,
        target: Option<SocketAddr>,
        sink: mpsc::Sender<Incoming>,
        transport: &'static str,
    ) -> Connection {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);

        let reader = tokio::spawn(datagram_reader(socket.clone(), chunk_tx));
        tokio::spawn(dispatcher(false, chunk_rx, sink, transport));

        Connection {
            inner: Arc::new(Inner {
                addr,
                streamed: false,
                transport,
                writer: tokio::sync::Mutex::new(Some(Writer::Datagram { socket, target })),
                reader: parking_lot::Mutex::new(Some(reader)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The address this connection is associated with
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn is_streamed(&self) -> bool {
        self.inner.streamed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Serialize `msg` and write it with a single write call
    pub async fn send(&self, msg: &SipMessage) -> Result<()> {
        let buf = msg.to_bytes();

        let mut writer = self.inner.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::ConnectionClosed)?;

        let written = match writer {
            Writer::Stream(stream) => {
                let written = stream.write(&buf).await?;
                stream.flush().await?;
                written
            }
            Writer::Datagram { socket, target } => {
                let Some(target) = target else {
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "datagram connection has no fixed peer",
                    )
                    .into());
                };

                socket.send_to(&buf, *target).await?
            }
        };

        if written < buf.len() {
            return Err(Error::ShortWrite {
                written,
                len: buf.len(),
            });
        }

        Ok(())
    }

    /// Close the socket. Idempotent, concurrent callers at most close once.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::trace!(
            "closing {} connection {}",
            self.inner.transport,
            self.inner.addr
        );

        if let Some(reader) = self.inner.reader.lock().take() {
            reader.abort();
        }

        if let Some(writer) = self.inner.writer.lock().await.take() {
            if let Writer::Stream(mut stream) = writer {
                let _ = stream.shutdown().await;
            }
        }
    }
}

/// Pointer identity, two handles are equal if they share the socket
impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.inner.transport)
            .field("addr", &self.inner.addr)
            .field("streamed", &self.inner.streamed)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn stream_reader<S>(
    mut read: ReadHalf<S>,
    remote: SocketAddr,
    chunks: mpsc::Sender<(Bytes, SocketAddr)>,
) where
    S: AsyncRead + AsyncWrite,
{
    let mut buf = vec![0u8; MAX_MSG_SIZE];

    loop {
        match read.read(&mut buf).await {
            // eof, peer closed the connection
            Ok(0) => return,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);

                if chunks.send((chunk, remote)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                log::debug!("read error on connection to {remote}, dropping it: {e}");
                return;
            }
        }
    }
}

async fn datagram_reader(socket: Arc<UdpSocket>, chunks: mpsc::Sender<(Bytes, SocketAddr)>) {
    let mut buf = vec![0u8; MAX_MSG_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, source)) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);

                if chunks.send((chunk, source)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                log::debug!("recv error on datagram socket: {e}");
                return;
            }
        }
    }
}

async fn dispatcher(
    streamed: bool,
    mut chunks: mpsc::Receiver<(Bytes, SocketAddr)>,
    sink: mpsc::Sender<Incoming>,
    transport: &'static str,
) {
    let mut decoder = StreamingDecoder::default();
    let mut buffer = BytesMut::new();

    while let Some((chunk, source)) = chunks.recv().await {
        if streamed {
            buffer.extend_from_slice(&chunk);

            loop {
                match decoder.decode(&mut buffer) {
                    Ok(Some(decoded)) => {
                        if deliver(decoded, source, &sink, transport).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!(
                            "failed to decode message on {transport} connection to {source}, \
                             restarting decoder: {e}"
                        );

                        // restart the decoder in place, the socket stays up
                        decoder = StreamingDecoder::default();
                        buffer.clear();
                        break;
                    }
                }
            }
        } else {
            match parse_datagram(chunk) {
                Ok(Some(decoded)) => {
                    if deliver(decoded, source, &sink, transport).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => log::debug!("discarding malformed datagram from {source}: {e}"),
            }
        }
    }
}

async fn deliver(
    decoded: DecodedMessage,
    source: SocketAddr,
    sink: &mpsc::Sender<Incoming>,
    transport: &'static str,
) -> Result<(), SendError<Incoming>> {
    sink.send(Incoming {
        message: decoded.message,
        source,
        buffer: decoded.buffer,
        transport,
        timestamp: SystemTime::now(),
    })
    .await
}
