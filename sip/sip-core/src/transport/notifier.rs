use super::Incoming;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Capacity of subscriber channels handed out by [`Notifier::subscribe`]
pub const SUBSCRIBE_QUEUE_SIZE: usize = 1000;

/// Fan-out of incoming messages to any number of subscriber channels.
///
/// Subscribers whose receiving half has been dropped are removed on the
/// next delivery. Delivery order towards a single subscriber matches the
/// order of [`notify_all`](Notifier::notify_all) calls.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<mpsc::Sender<Incoming>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Incoming> {
        let (tx, rx) = mpsc::channel(SUBSCRIBE_QUEUE_SIZE);

        self.subscribers.lock().push(tx);

        rx
    }

    /// Deliver `incoming` to every subscriber, pruning closed ones
    pub fn notify_all(&self, incoming: &Incoming) {
        self.subscribers
            .lock()
            .retain(|tx| match tx.try_send(incoming.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::warn!("subscriber queue is full, dropping message");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use sip_types::msg::{Headers, SipMessage};
    use std::time::SystemTime;

    fn incoming(line: &'static str) -> Incoming {
        Incoming {
            message: SipMessage::new(line, Headers::new(), Bytes::new()),
            source: "127.0.0.1:5060".parse().unwrap(),
            buffer: Bytes::new(),
            transport: "UDP",
            timestamp: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let notifier = Notifier::new();

        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.notify_all(&incoming("OPTIONS sip:example.org SIP/2.0"));

        assert_eq!(
            a.recv().await.unwrap().message.line,
            "OPTIONS sip:example.org SIP/2.0"
        );
        assert_eq!(
            b.recv().await.unwrap().message.line,
            "OPTIONS sip:example.org SIP/2.0"
        );
    }

    #[tokio::test]
    async fn prunes_closed_subscribers() {
        let notifier = Notifier::new();

        let a = notifier.subscribe();
        let mut b = notifier.subscribe();

        drop(a);

        notifier.notify_all(&incoming("first"));
        assert_eq!(notifier.subscribers.lock().len(), 1);

        notifier.notify_all(&incoming("second"));

        assert_eq!(b.recv().await.unwrap().message.line, "first");
        assert_eq!(b.recv().await.unwrap().message.line, "second");
    }

    #[tokio::test]
    async fn preserves_per_subscriber_order() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        for line in ["one", "two", "three"] {
            notifier.notify_all(&incoming(line));
        }

        assert_eq!(rx.recv().await.unwrap().message.line, "one");
        assert_eq!(rx.recv().await.unwrap().message.line, "two");
        assert_eq!(rx.recv().await.unwrap().message.line, "three");
    }
}
