//! Connection lifetime management for stream based transports.
//!
//! A single manager task owns the address → connection map, all access
//! goes through its inboxes. Every tracked connection has a watcher task
//! armed with the idle deadline; when it fires the watcher reports back
//! and the manager decides whether the expiry is still valid or was
//! overtaken by a refresh. Deadlines are only ever written by the manager,
//! which rules out the close-after-refresh race.

use super::connection::Connection;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// How long an idle connection is kept alive.
///
/// RFC 3261 recommends keeping stream connections open for at least one
/// hour after the last message was sent over them.
pub const SOCKET_EXPIRY: Duration = Duration::from_secs(60 * 60);

struct Update {
    addr: SocketAddr,
    conn: Connection,
}

struct Lookup {
    addr: SocketAddr,
    reply: oneshot::Sender<Option<Connection>>,
}

/// Handle to the manager task owning the per-peer connection map.
///
/// After [`stop`](ConnTable::stop) returns every tracked connection is
/// closed, [`notify`](ConnTable::notify) is a no-op and
/// [`get_conn`](ConnTable::get_conn) returns `None`.
#[derive(Debug)]
pub struct ConnTable {
    updates: mpsc::Sender<Update>,
    lookups: mpsc::Sender<Lookup>,
    stop: mpsc::Sender<oneshot::Sender<()>>,
}

impl ConnTable {
    /// Spawn the manager task. Idle connections are closed after `expiry`.
    pub fn spawn(expiry: Duration) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(32);
        let (lookups_tx, lookups_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        let manager = Manager {
            conns: HashMap::new(),
            expiry,
            expired_tx,
        };

        tokio::spawn(manager.run(updates_rx, lookups_rx, expired_rx, stop_rx));

        ConnTable {
            updates: updates_tx,
            lookups: lookups_tx,
            stop: stop_tx,
        }
    }

    /// Track `conn` under `addr`, refreshing the idle deadline.
    ///
    /// A connection already tracked under `addr` is replaced and, if it is
    /// a different one, closed. No-op on a stopped table.
    pub async fn notify(&self, addr: SocketAddr, conn: Connection) {
        let _ = self.updates.send(Update { addr, conn }).await;
    }

    /// The connection currently tracked under `addr`
    pub async fn get_conn(&self, addr: SocketAddr) -> Option<Connection> {
        let (reply, rx) = oneshot::channel();

        self.lookups.send(Lookup { addr, reply }).await.ok()?;

        rx.await.ok().flatten()
    }

    /// Stop the manager, closing every tracked connection.
    ///
    /// Returns once all watcher tasks have exited.
    pub async fn stop(&self) {
        let (ack, done) = oneshot::channel();

        if self.stop.send(ack).await.is_ok() {
            let _ = done.await;
        }
    }
}

struct Watcher {
    conn: Connection,
    deadline: Instant,
    reset: mpsc::Sender<Instant>,
    task: JoinHandle<()>,
}

struct Manager {
    conns: HashMap<SocketAddr, Watcher>,
    expiry: Duration,
    expired_tx: mpsc::UnboundedSender<SocketAddr>,
}

impl Manager {
    async fn run(
        mut self,
        mut updates: mpsc::Receiver<Update>,
        mut lookups: mpsc::Receiver<Lookup>,
        mut expired: mpsc::UnboundedReceiver<SocketAddr>,
        mut stop: mpsc::Receiver<oneshot::Sender<()>>,
    ) {
        loop {
            // biased so queued updates are applied before lookups: a
            // completed notify is always visible to a later get_conn, and
            // a refresh racing an expiry wins
            tokio::select! {
                biased;

                update = updates.recv() => match update {
                    Some(update) => self.handle_update(update).await,
                    None => break,
                },
                Some(addr) = expired.recv() => self.handle_expired(addr).await,
                lookup = lookups.recv() => match lookup {
                    Some(Lookup { addr, reply }) => {
                        let _ = reply.send(self.conns.get(&addr).map(|w| w.conn.clone()));
                    }
                    None => break,
                },
                ack = stop.recv() => {
                    self.teardown(&mut expired).await;

                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }

                    return;
                }
            }
        }

        // every table handle is gone, close what is left
        self.teardown(&mut expired).await;
    }

    async fn handle_update(&mut self, Update { addr, conn }: Update) {
        let deadline = Instant::now() + self.expiry;

        match self.conns.entry(addr) {
            Entry::Occupied(mut entry) => {
                let watcher = entry.get_mut();

                if watcher.conn != conn {
                    watcher.conn.close().await;
                }

                watcher.conn = conn;
                watcher.deadline = deadline;

                // the watcher re-arms its timer with the new deadline
                let _ = watcher.reset.send(deadline).await;
            }
            Entry::Vacant(entry) => {
                log::trace!("watching connection to {addr}");

                let (reset_tx, reset_rx) = mpsc::channel(1);
                let task = tokio::spawn(watcher_task(
                    addr,
                    deadline,
                    reset_rx,
                    self.expired_tx.clone(),
                ));

                entry.insert(Watcher {
                    conn,
                    deadline,
                    reset: reset_tx,
                    task,
                });
            }
        }
    }

    async fn handle_expired(&mut self, addr: SocketAddr) {
        let Some(watcher) = self.conns.get(&addr) else {
            return;
        };

        // a notify raced the expiry and moved the deadline, the watcher
        // already has the corresponding reset queued
        if watcher.deadline > Instant::now() {
            log::trace!("discarding spurious expiry for {addr}");
            return;
        }

        log::debug!("closing idle connection to {addr}");

        if let Some(watcher) = self.conns.remove(&addr) {
            let Watcher {
                conn, reset, task, ..
            } = watcher;

            conn.close().await;

            // closing the reset inbox stops the watcher
            drop(reset);
            let _ = task.await;
        }
    }

    async fn teardown(&mut self, expired: &mut mpsc::UnboundedReceiver<SocketAddr>) {
        // unblock watchers which are announcing an expiry right now
        expired.close();

        for (
            _,
            Watcher {
                conn, reset, task, ..
            },
        ) in self.conns.drain()
        {
            conn.close().await;

            drop(reset);
            let _ = task.await;
        }
    }
}

async fn watcher_task(
    addr: SocketAddr,
    deadline: Instant,
    mut reset: mpsc::Receiver<Instant>,
    expired: mpsc::UnboundedSender<SocketAddr>,
) {
    let sleep = time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => {
                if expired.send(addr).is_err() {
                    return;
                }

                // the manager either honors the expiry by dropping this
                // watcher or a refresh raced it, in which case the reset
                // is already queued
                match reset.recv().await {
                    Some(deadline) => sleep.as_mut().reset(deadline),
                    None => return,
                }
            }
            update = reset.recv() => match update {
                Some(deadline) => sleep.as_mut().reset(deadline),
                None => return,
            },
        }
    }
}
