//! Generic connection oriented transport.
//!
//! [`Streamed`] implements the [`Transport`] contract for any stream
//! socket type; TCP and TLS only provide the connector and listener
//! plumbing.

use super::conn_table::{ConnTable, SOCKET_EXPIRY};
use super::connection::Connection;
use super::notifier::Notifier;
use super::{Incoming, Transport};
use crate::{Error, Result};
use parking_lot::Mutex;
use sip_types::msg::SipMessage;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) mod decode;

/// Capacity of the sink channel connections publish decoded messages on
const SINK_QUEUE_SIZE: usize = 128;

/// A byte stream socket usable as a SIP transport
pub trait StreamSocket: AsyncRead + AsyncWrite + Send + 'static {
    /// Name of the transport this socket belongs to (e.g. TCP, TLS ...)
    const NAME: &'static str;

    /// Whether the socket provides a secure connection
    const SECURE: bool;
}

/// Dials new stream connections
#[async_trait::async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    type Stream: StreamSocket;

    async fn connect(&self, target: SocketAddr) -> io::Result<Self::Stream>;
}

/// Binds listeners accepting stream connections
#[async_trait::async_trait]
pub trait StreamListenerBuilder: StreamConnector {
    type Listener: StreamListener<Stream = Self::Stream>;

    /// Bind `addr`, returning the listener and the actually bound address
    async fn bind(&self, addr: SocketAddr) -> io::Result<(Self::Listener, SocketAddr)>;
}

#[async_trait::async_trait]
pub trait StreamListener: Send + 'static {
    type Stream: StreamSocket;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

/// Connection oriented transport over any [`StreamListenerBuilder`].
///
/// Keeps one [`Connection`] per peer inside a [`ConnTable`]; idle
/// connections are closed after the configured expiry. Cloning returns a
/// handle to the same transport.
pub struct Streamed<C: StreamListenerBuilder> {
    inner: Arc<Inner<C>>,
}

impl<C: StreamListenerBuilder> Clone for Streamed<C> {
    fn clone(&self) -> Self {
        Streamed {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<C> {
    connector: C,
    conn_table: ConnTable,
    notifier: Arc<Notifier>,
    sink: mpsc::Sender<Incoming>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<C: StreamListenerBuilder> Streamed<C> {
    /// Create the transport with the default [`SOCKET_EXPIRY`]
    pub fn new(connector: C) -> Self {
        Self::with_expiry(connector, SOCKET_EXPIRY)
    }

    /// Create the transport with a custom idle connection expiry
    pub fn with_expiry(connector: C, expiry: Duration) -> Self {
        let (sink, sink_rx) = mpsc::channel(SINK_QUEUE_SIZE);
        let notifier = Arc::new(Notifier::new());

        let pump = tokio::spawn(pump_task(sink_rx, notifier.clone()));

        Streamed {
            inner: Arc::new(Inner {
                connector,
                conn_table: ConnTable::spawn(expiry),
                notifier,
                sink,
                tasks: Mutex::new(vec![pump]),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Fetch the live connection to `target` or dial a new one.
    ///
    /// Every call refreshes the idle deadline, including sends over an
    /// existing connection.
    #[tracing::instrument(name = "get_connection", level = "trace", skip(self))]
    async fn get_connection(&self, remote: SocketAddr) -> Result<Connection> {
        let conn = match self.inner.conn_table.get_conn(remote).await {
            Some(conn) => conn,
            None => {
                log::debug!("connecting new {} connection to {remote}", C::Stream::NAME);

                let stream = self.inner.connector.connect(remote).await?;

                Connection::spawn_stream(stream, remote, self.inner.sink.clone(), C::Stream::NAME)
            }
        };

        self.inner.conn_table.notify(remote, conn.clone()).await;

        Ok(conn)
    }
}

#[async_trait::async_trait]
impl<C: StreamListenerBuilder> Transport for Streamed<C> {
    fn name(&self) -> &'static str {
        C::Stream::NAME
    }

    fn secure(&self) -> bool {
        C::Stream::SECURE
    }

    fn is_streamed(&self) -> bool {
        true
    }

    fn subscribe(&self) -> mpsc::Receiver<Incoming> {
        self.inner.notifier.subscribe()
    }

    async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        if self.inner.stopped.load(Ordering::Relaxed) {
            return Err(Error::Stopped);
        }

        let (listener, bound) = self.inner.connector.bind(addr).await?;

        log::info!("bound {} to {bound}", C::Stream::NAME);

        let task = tokio::spawn(accept_loop(self.inner.clone(), listener));
        self.inner.tasks.lock().push(task);

        Ok(bound)
    }

    async fn send(&self, target: SocketAddr, msg: &SipMessage) -> Result<()> {
        if self.inner.stopped.load(Ordering::Relaxed) {
            return Err(Error::Stopped);
        }

        let conn = self.get_connection(target).await?;

        conn.send(msg).await
    }

    async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::Relaxed) {
            return;
        }

        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }

        self.inner.conn_table.stop().await;
    }
}

impl<C: StreamListenerBuilder> fmt::Debug for Streamed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streamed")
            .field("transport", &C::Stream::NAME)
            .field("stopped", &self.inner.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<C: StreamListenerBuilder> fmt::Display for Streamed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(C::Stream::NAME)
    }
}

async fn pump_task(mut sink: mpsc::Receiver<Incoming>, notifier: Arc<Notifier>) {
    while let Some(incoming) = sink.recv().await {
        notifier.notify_all(&incoming);
    }
}

async fn accept_loop<C: StreamListenerBuilder>(inner: Arc<Inner<C>>, mut listener: C::Listener) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                log::debug!("accepted {} connection from {remote}", C::Stream::NAME);

                let conn =
                    Connection::spawn_stream(stream, remote, inner.sink.clone(), C::Stream::NAME);

                inner.conn_table.notify(remote, conn).await;
            }
            Err(e) => {
                if inner.stopped.load(Ordering::Relaxed) {
                    return;
                }

                log::warn!("{} accept error: {e}", C::Stream::NAME);
            }
        }
    }
}
