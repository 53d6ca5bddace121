use super::streaming::{
    StreamConnector, StreamListener, StreamListenerBuilder, StreamSocket, Streamed,
};
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// TCP transport
///
/// ```no_run
/// # use skein_sip_core::transport::Transport;
/// # use skein_sip_core::transport::streaming::Streamed;
/// # use skein_sip_core::transport::tcp::{Tcp, TcpConnector};
/// # async fn example() -> skein_sip_core::Result<()> {
/// let tcp: Tcp = Streamed::new(TcpConnector);
/// tcp.listen("0.0.0.0:5060".parse().unwrap()).await?;
/// # Ok(())
/// # }
/// ```
pub type Tcp = Streamed<TcpConnector>;

#[derive(Debug, Default)]
pub struct TcpConnector;

impl StreamSocket for TcpStream {
    const NAME: &'static str = "TCP";
    const SECURE: bool = false;
}

#[async_trait::async_trait]
impl StreamConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, target: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(target).await
    }
}

#[async_trait::async_trait]
impl StreamListenerBuilder for TcpConnector {
    type Listener = TcpListener;

    async fn bind(&self, addr: SocketAddr) -> io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;

        Ok((listener, bound))
    }
}

#[async_trait::async_trait]
impl StreamListener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}
