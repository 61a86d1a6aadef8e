//! Long-lived, self-reconnecting subscription to job updates.
//!
//! A [`Subscription`] drains an [`UpdateSource`] on a background task and hands
//! every update to an observer callback. When the source closes or refuses to
//! connect, the task waits a fixed backoff and tries again. Every successful
//! (re)connection, and every detected gap, is signalled with
//! [`SubscriptionEvent::Resync`]: the observer cannot assume the stream was
//! gapless and must re-fetch full state.
//!
//! Sources that carry an authorisation watch (the session) cut delivery off
//! the moment it changes; the task then falls back to reconnecting, which the
//! source refuses until a new session exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broadcast::job_updates::{JobUpdate, UpdateSource};

/// What an observer receives.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Update(JobUpdate),
    /// Events may have been missed; reload full state.
    Resync,
}

/// Handle to a running subscription. Dropping it stops the background task.
pub struct Subscription {
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Starts a subscription. Must be called from within a tokio runtime.
    ///
    /// The first connection attempt happens before this returns, so updates
    /// published afterwards are not missed when it succeeds.
    pub fn spawn<F>(source: Arc<dyn UpdateSource>, reconnect_backoff: Duration, observer: F) -> Self
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        let connected = Arc::new(AtomicBool::new(false));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let authorization = source.authorization();

        let first = match source.connect() {
            Ok(rx) => {
                connected.store(true, Ordering::Release);
                Some(rx)
            }
            Err(e) => {
                log::warn!("Update subscription could not connect: {}", e);
                None
            }
        };

        let handle = tokio::spawn(run_subscription(
            source,
            first,
            reconnect_backoff,
            Arc::clone(&connected),
            shutdown_rx,
            authorization,
            observer,
        ));

        Self {
            connected,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Connectivity flag for the "reconnecting" banner.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Stops the subscription and waits for the background task to exit.
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::error!("Update subscription task failed: {}", e);
            }
        }
        self.connected.store(false, Ordering::Release);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Why a connected stream stopped being drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Shutdown,
    Closed,
    /// The source withdrew its authorisation (the session ended or changed).
    Revoked,
}

async fn run_subscription<F>(
    source: Arc<dyn UpdateSource>,
    mut pending: Option<broadcast::Receiver<JobUpdate>>,
    backoff: Duration,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    mut authorization: Option<watch::Receiver<bool>>,
    mut observer: F,
) where
    F: FnMut(SubscriptionEvent) + Send + 'static,
{
    loop {
        if *shutdown.borrow() {
            break;
        }

        let receiver = match pending.take() {
            Some(rx) => Some(rx),
            None => match source.connect() {
                Ok(rx) => Some(rx),
                Err(e) => {
                    log::warn!("Update subscription reconnect failed: {}", e);
                    None
                }
            },
        };

        // A receiver obtained under a session that has since ended is dropped
        // unread.
        let receiver = match receiver {
            Some(rx) if is_authorized(&mut authorization) => Some(rx),
            Some(_) => {
                log::info!("Session ended before the update stream was read");
                None
            }
            None => None,
        };

        if let Some(mut rx) = receiver {
            connected.store(true, Ordering::Release);
            log::debug!("Update subscription connected");
            observer(SubscriptionEvent::Resync);

            let end = drain(&mut rx, &mut shutdown, &mut authorization, &mut observer).await;
            drop(rx);
            connected.store(false, Ordering::Release);
            match end {
                StreamEnd::Shutdown => return,
                StreamEnd::Closed => log::warn!(
                    "Update stream closed, reconnecting in {}ms",
                    backoff.as_millis()
                ),
                StreamEnd::Revoked => log::info!(
                    "Session changed, update stream dropped; reconnecting in {}ms",
                    backoff.as_millis()
                ),
            }
        } else {
            connected.store(false, Ordering::Release);
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    connected.store(false, Ordering::Release);
    log::debug!("Update subscription stopped");
}

/// Marks the current authorisation state as seen and returns it. Sources
/// without authorisation are always authorised.
fn is_authorized(authorization: &mut Option<watch::Receiver<bool>>) -> bool {
    match authorization {
        Some(rx) => *rx.borrow_and_update(),
        None => true,
    }
}

/// Resolves on the next authorisation change; never resolves for sources
/// without one or once the sender is gone.
async fn authorization_changed(authorization: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = authorization {
        if rx.changed().await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Forwards updates until the stream closes, the authorisation changes or
/// shutdown is requested.
///
/// Shutdown and authorisation are polled before the stream, so updates still
/// buffered when the session ends are never forwarded.
async fn drain<F>(
    rx: &mut broadcast::Receiver<JobUpdate>,
    shutdown: &mut watch::Receiver<bool>,
    authorization: &mut Option<watch::Receiver<bool>>,
    observer: &mut F,
) -> StreamEnd
where
    F: FnMut(SubscriptionEvent),
{
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return StreamEnd::Shutdown;
                }
            }
            _ = authorization_changed(authorization) => return StreamEnd::Revoked,
            received = rx.recv() => match received {
                Ok(update) => observer(SubscriptionEvent::Update(update)),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Update subscription lagged, {} updates dropped", skipped);
                    observer(SubscriptionEvent::Resync);
                }
                Err(RecvError::Closed) => return StreamEnd::Closed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::UpdateChannel;
    use crate::error::ApiError;
    use crate::ids::TenantId;
    use crate::job::{Job, JobConfig};
    use chrono::Utc;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn update() -> JobUpdate {
        let job = Job::new(TenantId::new(), 10, None, JobConfig::default(), Utc::now()).unwrap();
        JobUpdate::from_job(&job)
    }

    /// Hands out receivers of channels it keeps, so tests can close them.
    struct ClosableSource {
        senders: Mutex<Vec<broadcast::Sender<JobUpdate>>>,
        refuse: AtomicBool,
    }

    impl ClosableSource {
        fn new() -> Self {
            Self {
                senders: Mutex::new(Vec::new()),
                refuse: AtomicBool::new(false),
            }
        }

        fn drop_connections(&self) {
            self.senders.lock().unwrap().clear();
        }

        fn connections(&self) -> usize {
            self.senders.lock().unwrap().len()
        }

        fn send(&self, update: JobUpdate) {
            for sender in self.senders.lock().unwrap().iter() {
                let _ = sender.send(update.clone());
            }
        }
    }

    impl UpdateSource for ClosableSource {
        fn connect(&self) -> Result<broadcast::Receiver<JobUpdate>, ApiError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(ApiError::Transport("refused".to_string()));
            }
            let (tx, rx) = broadcast::channel(8);
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn test_delivers_updates_after_resync() {
        let channel = UpdateChannel::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = Subscription::spawn(
            Arc::new(channel.clone()),
            Duration::from_millis(10),
            move |event| {
                let _ = tx.send(event);
            },
        );
        assert!(sub.is_connected());

        let sent = update();
        channel.publish(sent.clone());

        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Resync);
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Update(sent));

        sub.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_stream_closes() {
        let source = Arc::new(ClosableSource::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = Subscription::spawn(
            Arc::clone(&source) as Arc<dyn UpdateSource>,
            Duration::from_secs(3),
            move |event| {
                let _ = tx.send(event);
            },
        );
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Resync);

        source.drop_connections();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sub.is_connected());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Resync);
        assert!(sub.is_connected());
        assert_eq!(source.connections(), 1);

        let sent = update();
        source.send(sent.clone());
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Update(sent));

        sub.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_when_source_refuses() {
        let source = Arc::new(ClosableSource::new());
        source.refuse.store(true, Ordering::SeqCst);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = Subscription::spawn(
            Arc::clone(&source) as Arc<dyn UpdateSource>,
            Duration::from_secs(3),
            move |event| {
                let _ = tx.send(event);
            },
        );
        assert!(!sub.is_connected());

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(rx.try_recv().is_err());

        source.refuse.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Resync);
        assert!(sub.is_connected());

        sub.close().await;
    }

    #[tokio::test]
    async fn test_lag_triggers_resync() {
        let channel = UpdateChannel::new(2);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        // Publish before the task gets to run so the receiver overflows.
        let sub = Subscription::spawn(
            Arc::new(channel.clone()),
            Duration::from_millis(10),
            move |event| sink.lock().unwrap().push(event),
        );
        for _ in 0..5 {
            channel.publish(update());
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        sub.close().await;

        let events = events.lock().unwrap();
        let resyncs = events
            .iter()
            .filter(|e| matches!(e, SubscriptionEvent::Resync))
            .count();
        assert_eq!(resyncs, 2, "initial resync plus one for the gap");
        let updates = events.len() - resyncs;
        assert_eq!(updates, 2);
    }

    /// A channel whose delivery is authorised by a flag the test flips.
    struct AuthorizedSource {
        channel: UpdateChannel,
        authorized: watch::Sender<bool>,
    }

    impl UpdateSource for AuthorizedSource {
        fn connect(&self) -> Result<broadcast::Receiver<JobUpdate>, ApiError> {
            if !*self.authorized.borrow() {
                return Err(ApiError::Unauthorized);
            }
            Ok(self.channel.subscribe())
        }

        fn authorization(&self) -> Option<watch::Receiver<bool>> {
            Some(self.authorized.subscribe())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoked_authorization_stops_delivery() {
        let (authorized, _) = watch::channel(true);
        let source = Arc::new(AuthorizedSource {
            channel: UpdateChannel::new(16),
            authorized,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = Subscription::spawn(
            Arc::clone(&source) as Arc<dyn UpdateSource>,
            Duration::from_secs(3),
            move |event| {
                let _ = tx.send(event);
            },
        );
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Resync);

        // Revoke and publish without yielding: the buffered update is dropped.
        source.authorized.send_replace(false);
        source.channel.publish(update());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(!sub.is_connected());
        assert_eq!(source.channel.receiver_count(), 0);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(rx.try_recv().is_err());

        source.authorized.send_replace(true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Resync);
        assert!(sub.is_connected());

        let sent = update();
        source.channel.publish(sent.clone());
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Update(sent));

        sub.close().await;
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let channel = UpdateChannel::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = Subscription::spawn(
            Arc::new(channel.clone()),
            Duration::from_millis(10),
            move |event| {
                let _ = tx.send(event);
            },
        );
        assert_eq!(rx.recv().await.unwrap(), SubscriptionEvent::Resync);

        sub.close().await;
        assert_eq!(channel.receiver_count(), 0);
        channel.publish(update());
        // Observer (and its sender) were dropped with the task.
        assert!(rx.recv().await.is_none());
    }
}
