//! Per-job subscriptions with isolated, revocable delivery.
//!
//! Every listener owns a delivery gate. `publish` holds the gate for reading
//! while the callback runs; revocation flips the listener's flag and then
//! takes the gate for writing, so once `Subscription::unsubscribe` (or drop)
//! returns no further callback can start and none is still running. A
//! listener that revokes itself from inside its own callback skips the wait.
//!
//! The hub does not order concurrent `publish` calls for the same job; the
//! engine queues each job's events and publishes them one at a time, with no
//! lock held, so callbacks may call back into the engine.

use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::sync::broadcast;

use super::job_event::{JobEvent, JobEventBroadcaster};

type Callback = Box<dyn Fn(&JobEvent) + Send + Sync>;

thread_local! {
    static DELIVERING: Cell<Option<u64>> = const { Cell::new(None) };
}

struct Listener {
    id: u64,
    callback: Callback,
    revoked: AtomicBool,
    gate: RwLock<()>,
}

impl Listener {
    /// Runs the callback unless revoked. Returns whether it ran.
    fn deliver(&self, event: &JobEvent) -> bool {
        let _gate = self.gate.read().unwrap_or_else(|p| p.into_inner());
        if self.revoked.load(Ordering::Acquire) {
            return false;
        }

        let previous = DELIVERING.with(|d| d.replace(Some(self.id)));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(event)));
        DELIVERING.with(|d| d.set(previous));

        if let Err(payload) = outcome {
            log::warn!(
                "Listener {} for job {} panicked during {} delivery: {}",
                self.id,
                event.job_id(),
                event.kind,
                panic_message(payload.as_ref())
            );
        }
        true
    }

    fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
        let in_own_callback = DELIVERING.with(|d| d.get() == Some(self.id));
        if !in_own_callback {
            // Waits for an in-flight delivery.
            drop(self.gate.write().unwrap_or_else(|p| p.into_inner()));
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct HubInner {
    listeners: RwLock<ListenerMap>,
    next_id: AtomicU64,
    feed: JobEventBroadcaster,
}

type ListenerMap = HashMap<String, Vec<Arc<Listener>>>;

fn recover_poisoned<T>(err: PoisonError<T>) -> T {
    log::warn!("Notification hub lock was poisoned, recovering");
    err.into_inner()
}

impl HubInner {
    fn read_listeners(&self) -> RwLockReadGuard<'_, ListenerMap> {
        self.listeners.read().unwrap_or_else(recover_poisoned)
    }

    fn write_listeners(&self) -> RwLockWriteGuard<'_, ListenerMap> {
        self.listeners.write().unwrap_or_else(recover_poisoned)
    }

    fn remove_listener(&self, job_id: &str, listener: &Arc<Listener>) {
        {
            let mut listeners = self.write_listeners();
            if let Some(set) = listeners.get_mut(job_id) {
                set.retain(|l| l.id != listener.id);
                if set.is_empty() {
                    listeners.remove(job_id);
                }
            }
        }
        listener.revoke();
    }
}

/// Fans job events out to per-job listeners and the engine-wide feed.
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    /// Creates a hub whose engine-wide feed buffers `feed_capacity` events.
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                feed: JobEventBroadcaster::new(feed_capacity),
            }),
        }
    }

    /// Registers `callback` for every subsequent event of `job_id`.
    pub fn subscribe<F>(&self, job_id: &str, callback: F) -> Subscription
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        let listener = Arc::new(Listener {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            callback: Box::new(callback),
            revoked: AtomicBool::new(false),
            gate: RwLock::new(()),
        });

        {
            let mut listeners = self.inner.write_listeners();
            listeners
                .entry(job_id.to_string())
                .or_default()
                .push(Arc::clone(&listener));
        }
        log::debug!("Listener {} subscribed to job {}", listener.id, job_id);

        Subscription {
            hub: Arc::downgrade(&self.inner),
            job_id: job_id.to_string(),
            listener: Some(listener),
        }
    }

    /// Delivers `event` to the job's listeners, then to the feed.
    /// Returns how many callbacks ran.
    pub fn publish(&self, event: &JobEvent) -> usize {
        let targets: Vec<Arc<Listener>> = {
            let listeners = self.inner.read_listeners();
            listeners.get(event.job_id()).cloned().unwrap_or_default()
        };

        let delivered = targets.iter().filter(|l| l.deliver(event)).count();
        self.inner.feed.send(event.clone());
        delivered
    }

    /// Sends `event` on the engine-wide feed only.
    pub fn announce(&self, event: JobEvent) {
        self.inner.feed.send(event);
    }

    /// Drops every listener for `job_id`. Returns how many were dropped.
    pub fn remove_job(&self, job_id: &str) -> usize {
        let removed = {
            let mut listeners = self.inner.write_listeners();
            listeners.remove(job_id).unwrap_or_default()
        };
        for listener in &removed {
            listener.revoke();
        }
        removed.len()
    }

    /// Subscribes to every event of every job.
    pub fn feed(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.feed.subscribe()
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.inner
            .read_listeners()
            .get(job_id)
            .map_or(0, Vec::len)
    }

    /// Number of jobs with at least one listener.
    pub fn watched_jobs(&self) -> usize {
        self.inner.read_listeners().len()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle for one registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<HubInner>,
    job_id: String,
    listener: Option<Arc<Listener>>,
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// False once unsubscribed or once the job was reclaimed.
    pub fn is_active(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|l| !l.revoked.load(Ordering::Acquire))
    }

    /// Stops delivery. No callback runs after this returns.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        match self.hub.upgrade() {
            Some(hub) => hub.remove_listener(&self.job_id, &listener),
            None => listener.revoke(),
        }
        log::debug!(
            "Listener {} unsubscribed from job {}",
            listener.id,
            self.job_id
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("job_id", &self.job_id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Extra, Job};
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn event_for(job_id: &str) -> JobEvent {
        let job = Job::new(
            job_id.to_string(),
            "user-1",
            "file.pdf",
            "PDF_TO_WORD",
            &["Uploading file".to_string()],
            Extra::new(),
            Utc::now(),
        );
        JobEvent::transition(job)
    }

    fn counter(hub: &NotificationHub, job_id: &str) -> (Subscription, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let sub = hub.subscribe(job_id, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (sub, hits)
    }

    #[test]
    fn test_publish_reaches_every_listener() {
        let hub = NotificationHub::default();
        let (_a, hits_a) = counter(&hub, "job-1");
        let (_b, hits_b) = counter(&hub, "job-1");
        let (_c, hits_other) = counter(&hub, "job-2");

        assert_eq!(hub.publish(&event_for("job-1")), 2);
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);
        assert_eq!(hits_other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let hub = NotificationHub::default();
        let _bad = hub.subscribe("job-1", |_| panic!("renderer exploded"));
        let (_good, hits) = counter(&hub, "job-1");

        assert_eq!(hub.publish(&event_for("job-1")), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Still delivering after the panic.
        hub.publish(&event_for("job-1"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery_and_prunes_set() {
        let hub = NotificationHub::default();
        let (sub, hits) = counter(&hub, "job-1");
        assert_eq!(hub.subscriber_count("job-1"), 1);

        sub.unsubscribe();
        assert_eq!(hub.subscriber_count("job-1"), 0);
        assert_eq!(hub.watched_jobs(), 0);

        assert_eq!(hub.publish(&event_for("job-1")), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = NotificationHub::default();
        {
            let (_sub, _hits) = counter(&hub, "job-1");
            assert_eq!(hub.subscriber_count("job-1"), 1);
        }
        assert_eq!(hub.subscriber_count("job-1"), 0);
    }

    #[test]
    fn test_unsubscribe_from_own_callback() {
        let hub = NotificationHub::default();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let slot_in_cb = Arc::clone(&slot);
        let hits_in_cb = Arc::clone(&hits);
        let sub = hub.subscribe("job-1", move |_| {
            hits_in_cb.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = slot_in_cb.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        hub.publish(&event_for("job-1"));
        hub.publish(&event_for("job-1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count("job-1"), 0);
    }

    #[test]
    fn test_remove_job_revokes_subscriptions() {
        let hub = NotificationHub::default();
        let (sub, hits) = counter(&hub, "job-1");

        assert_eq!(hub.remove_job("job-1"), 1);
        assert!(!sub.is_active());
        hub.publish(&event_for("job-1"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Removing again is a no-op; dropping the stale handle is harmless.
        assert_eq!(hub.remove_job("job-1"), 0);
        drop(sub);
    }

    #[test]
    fn test_publish_also_feeds_broadcast() {
        let hub = NotificationHub::new(8);
        let mut feed = hub.feed();

        hub.publish(&event_for("job-9"));
        let received = feed.try_recv().unwrap();
        assert_eq!(received.job_id(), "job-9");
    }

    #[test]
    fn test_subscription_outlives_hub() {
        let hub = NotificationHub::default();
        let (sub, _hits) = counter(&hub, "job-1");
        drop(hub);
        assert!(sub.is_active());
        sub.unsubscribe();
    }

    #[test]
    fn test_counts_survive_poisoned_lock() {
        let hub = NotificationHub::default();
        let _a = hub.subscribe("job-1", |_| {});
        let _b = hub.subscribe("job-1", |_| {});

        let inner = Arc::clone(&hub.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.listeners.write().unwrap();
            panic!("poison the listener map");
        })
        .join();
        assert!(hub.inner.listeners.is_poisoned());

        assert_eq!(hub.subscriber_count("job-1"), 2);
        assert_eq!(hub.watched_jobs(), 1);
    }

    #[test]
    fn test_unsubscribe_waits_for_in_flight_delivery() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let hub = NotificationHub::default();
        let (entered_tx, entered_rx) = mpsc::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_in_cb = Arc::clone(&finished);
        let sub = hub.subscribe("job-1", move |_| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(50));
            finished_in_cb.store(true, Ordering::SeqCst);
        });

        let publisher = {
            let hub = hub.clone();
            thread::spawn(move || hub.publish(&event_for("job-1")))
        };

        entered_rx.recv().unwrap();
        sub.unsubscribe();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(publisher.join().unwrap(), 1);
    }
}
