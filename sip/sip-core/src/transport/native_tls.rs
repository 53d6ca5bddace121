use super::streaming::{
    StreamConnector, StreamListener, StreamListenerBuilder, StreamSocket, Streamed,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_native_tls::{TlsAcceptor, TlsConnector, TlsStream};

/// TLS transport
pub type Tls = Streamed<TlsContext>;

/// Connector and optional acceptor backing the TLS transport.
///
/// Without an acceptor the transport can only dial outgoing connections,
/// [`listen`](super::Transport::listen) will fail.
pub struct TlsContext {
    connector: TlsConnector,
    acceptor: Option<Arc<TlsAcceptor>>,
}

impl TlsContext {
    pub fn new(connector: TlsConnector, acceptor: Option<TlsAcceptor>) -> Self {
        TlsContext {
            connector,
            acceptor: acceptor.map(Arc::new),
        }
    }
}

impl StreamSocket for TlsStream<TcpStream> {
    const NAME: &'static str = "TLS";
    const SECURE: bool = true;
}

#[async_trait::async_trait]
impl StreamConnector for TlsContext {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self, target: SocketAddr) -> io::Result<Self::Stream> {
        // Best effort domain for SNI and certificate checks: with only a
        // socket address to go by, the peer's ip is used. Connectors doing
        // hostname verification must be configured accordingly.
        let domain = target.ip().to_string();

        let stream = TcpStream::connect(target).await?;

        self.connector
            .connect(&domain, stream)
            .await
            .map_err(io::Error::other)
    }
}

#[async_trait::async_trait]
impl StreamListenerBuilder for TlsContext {
    type Listener = TlsListener;

    async fn bind(&self, addr: SocketAddr) -> io::Result<(TlsListener, SocketAddr)> {
        let Some(acceptor) = self.acceptor.clone() else {
            return Err(io::Error::other("listening requires a tls acceptor"));
        };

        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;

        Ok((TlsListener { acceptor, listener }, bound))
    }
}

pub struct TlsListener {
    acceptor: Arc<TlsAcceptor>,
    listener: TcpListener,
}

#[async_trait::async_trait]
impl StreamListener for TlsListener {
    type Stream = TlsStream<TcpStream>;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)> {
        let (stream, remote) = self.listener.accept().await?;

        let stream = self
            .acceptor
            .accept(stream)
            .await
            .map_err(io::Error::other)?;

        Ok((stream, remote))
    }
}
