use super::connection::Connection;
use super::notifier::Notifier;
use super::{Incoming, Transport};
use crate::{Error, Result};
use parking_lot::Mutex;
use sip_types::msg::SipMessage;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const UDP: &str = "UDP";

/// Capacity of the sink channel listener sockets publish messages on
const SINK_QUEUE_SIZE: usize = 128;

/// Datagram transport.
///
/// Listener sockets receive from any peer; sends go out over a transient
/// socket which is dropped again immediately, there is no connection
/// state to keep alive. Cloning returns a handle to the same transport.
#[derive(Clone)]
pub struct Udp {
    inner: Arc<Inner>,
}

struct Inner {
    notifier: Arc<Notifier>,
    sink: mpsc::Sender<Incoming>,
    listeners: Mutex<Vec<Connection>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Udp {
    pub fn new() -> Self {
        let (sink, sink_rx) = mpsc::channel(SINK_QUEUE_SIZE);
        let notifier = Arc::new(Notifier::new());

        let pump = tokio::spawn(pump_task(sink_rx, notifier.clone()));

        Udp {
            inner: Arc::new(Inner {
                notifier,
                sink,
                listeners: Mutex::new(Vec::new()),
                pump: Mutex::new(Some(pump)),
                stopped: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for Udp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for Udp {
    fn name(&self) -> &'static str {
        UDP
    }

    fn secure(&self) -> bool {
        false
    }

    fn is_streamed(&self) -> bool {
        false
    }

    fn subscribe(&self) -> mpsc::Receiver<Incoming> {
        self.inner.notifier.subscribe()
    }

    async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        if self.inner.stopped.load(Ordering::Relaxed) {
            return Err(Error::Stopped);
        }

        let socket = UdpSocket::bind(addr).await?;
        let bound = socket.local_addr()?;

        log::info!("bound UDP to {bound}");

        let conn = Connection::spawn_datagram(
            Arc::new(socket),
            bound,
            None,
            self.inner.sink.clone(),
            UDP,
        );

        self.inner.listeners.lock().push(conn);

        Ok(bound)
    }

    async fn send(&self, target: SocketAddr, msg: &SipMessage) -> Result<()> {
        if self.inner.stopped.load(Ordering::Relaxed) {
            return Err(Error::Stopped);
        }

        // transient socket of the matching address family
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into(),
            SocketAddr::V6(_) => (IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0).into(),
        };

        let socket = UdpSocket::bind(local).await?;

        let buf = msg.to_bytes();
        let written = socket.send_to(&buf, target).await?;

        if written < buf.len() {
            return Err(Error::ShortWrite {
                written,
                len: buf.len(),
            });
        }

        Ok(())
    }

    async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::Relaxed) {
            return;
        }

        let listeners = std::mem::take(&mut *self.inner.listeners.lock());

        for conn in listeners {
            conn.close().await;
        }

        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
    }
}

impl fmt::Debug for Udp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Udp")
            .field("stopped", &self.inner.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Udp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(UDP)
    }
}

async fn pump_task(mut sink: mpsc::Receiver<Incoming>, notifier: Arc<Notifier>) {
    while let Some(incoming) = sink.recv().await {
        notifier.notify_all(&incoming);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use sip_types::msg::{Headers, SipMessage};

    fn message() -> SipMessage {
        let mut headers = Headers::new();
        headers.push("Max-Forwards", "70");

        SipMessage::new(
            "OPTIONS sip:alice@example.org SIP/2.0",
            headers,
            Bytes::new(),
        )
    }

    #[tokio::test]
    async fn end_to_end() {
        let receiver = Udp::new();
        let mut rx = receiver.subscribe();

        let bound = receiver
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let sender = Udp::new();
        sender.send(bound, &message()).await.unwrap();

        let incoming = rx.recv().await.unwrap();

        assert_eq!(incoming.message, message());
        assert_eq!(incoming.transport, "UDP");
        assert!(incoming.source.ip().is_loopback());
        assert!(!receiver.is_streamed());

        sender.stop().await;
        receiver.stop().await;
    }

    #[tokio::test]
    async fn multiple_listeners() {
        let transport = Udp::new();
        let mut rx = transport.subscribe();

        let a = transport
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = transport
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        assert_ne!(a, b);

        let sender = Udp::new();
        sender.send(a, &message()).await.unwrap();
        sender.send(b, &message()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().message, message());
        assert_eq!(rx.recv().await.unwrap().message, message());

        sender.stop().await;
        transport.stop().await;
    }

    #[tokio::test]
    async fn stopped_transport_is_inert() {
        let transport = Udp::new();
        transport.stop().await;

        assert!(matches!(
            transport.listen("127.0.0.1:0".parse().unwrap()).await,
            Err(Error::Stopped)
        ));
        assert!(matches!(
            transport
                .send("127.0.0.1:5060".parse().unwrap(), &message())
                .await,
            Err(Error::Stopped)
        ));
    }
}
