//! Human-activity detection
//!
//! The screensaver ends on the first human input of any kind. An
//! [`ActivityMonitor`] registers one listener for every [`InputKind`] on an
//! [`ActivitySource`] and fires its handler at most once, no matter how many
//! inputs arrive or from how many threads. The listener is detached when the
//! monitor's [`ActivitySubscription`] is dropped.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, trace};

/// Kind of human input that counts as activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    MouseMove,
    MouseDown,
    KeyDown,
    TouchStart,
    TouchMove,
    Click,
    Wheel,
}

impl InputKind {
    pub const ALL: [InputKind; 7] = [
        InputKind::MouseMove,
        InputKind::MouseDown,
        InputKind::KeyDown,
        InputKind::TouchStart,
        InputKind::TouchMove,
        InputKind::Click,
        InputKind::Wheel,
    ];
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputKind::MouseMove => "mousemove",
            InputKind::MouseDown => "mousedown",
            InputKind::KeyDown => "keydown",
            InputKind::TouchStart => "touchstart",
            InputKind::TouchMove => "touchmove",
            InputKind::Click => "click",
            InputKind::Wheel => "wheel",
        };
        f.write_str(name)
    }
}

pub type ActivityListener = Arc<dyn Fn(InputKind) + Send + Sync>;

/// Handle returned by [`ActivitySource::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Host-provided source of input events
///
/// Listeners may be invoked from any thread, possibly concurrently.
pub trait ActivitySource: Send + Sync {
    fn add_listener(&self, kinds: &[InputKind], listener: ActivityListener) -> ListenerId;

    /// Detach a listener; unknown ids are ignored
    fn remove_listener(&self, id: ListenerId);
}

struct Registration {
    id: ListenerId,
    kinds: Vec<InputKind>,
    listener: ActivityListener,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    registrations: Vec<Registration>,
}

/// In-process [`ActivitySource`]
///
/// Input adapters (stdin reader, window system hooks, tests) call
/// [`ActivityRegistry::dispatch`] for every input they observe.
#[derive(Default)]
pub struct ActivityRegistry {
    inner: Mutex<RegistryInner>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one input to every listener registered for its kind
    pub fn dispatch(&self, kind: InputKind) {
        // Listeners run outside the lock so they may detach themselves
        let listeners: Vec<ActivityListener> = self
            .lock()
            .registrations
            .iter()
            .filter(|r| r.kinds.contains(&kind))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        trace!(input = %kind, listeners = listeners.len(), "Dispatching input");
        for listener in listeners {
            listener(kind);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().registrations.len()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ActivitySource for ActivityRegistry {
    fn add_listener(&self, kinds: &[InputKind], listener: ActivityListener) -> ListenerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.registrations.push(Registration {
            id,
            kinds: kinds.to_vec(),
            listener,
        });
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.lock().registrations.retain(|r| r.id != id);
    }
}

/// Listener registration that detaches on drop
pub struct ActivitySubscription {
    source: Arc<dyn ActivitySource>,
    id: Option<ListenerId>,
}

impl ActivitySubscription {
    pub fn new(source: Arc<dyn ActivitySource>, kinds: &[InputKind], listener: ActivityListener) -> Self {
        let id = source.add_listener(kinds, listener);
        Self { source, id: Some(id) }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Detach now; later calls and the eventual drop are no-ops
    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            debug!(listener = ?id, "Activity listener detached");
            self.source.remove_listener(id);
        }
    }
}

impl Drop for ActivitySubscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Fires a handler on the first human input, exactly once
pub struct ActivityMonitor {
    detected: Arc<OnceLock<InputKind>>,
    subscription: ActivitySubscription,
}

impl ActivityMonitor {
    /// Subscribe to every input kind on `source`
    ///
    /// `on_detect` runs synchronously on the thread that delivered the first
    /// input, before any other queued work of the session.
    pub fn start<F>(source: Arc<dyn ActivitySource>, on_detect: F) -> Self
    where
        F: Fn(InputKind) + Send + Sync + 'static,
    {
        let detected = Arc::new(OnceLock::new());
        let flag = Arc::clone(&detected);
        let listener: ActivityListener = Arc::new(move |kind| {
            if flag.set(kind).is_ok() {
                on_detect(kind);
            }
        });

        Self {
            detected,
            subscription: ActivitySubscription::new(source, &InputKind::ALL, listener),
        }
    }

    /// First input seen, if any
    pub fn detected(&self) -> Option<InputKind> {
        self.detected.get().copied()
    }

    /// Shared flag for code that only needs to check detection
    pub fn detection_flag(&self) -> Arc<OnceLock<InputKind>> {
        Arc::clone(&self.detected)
    }

    pub fn stop(&mut self) {
        self.subscription.release();
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_filters_by_kind() {
        let registry = ActivityRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        registry.add_listener(
            &[InputKind::KeyDown],
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.dispatch(InputKind::MouseMove);
        registry.dispatch(InputKind::KeyDown);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_monitor_fires_once() {
        let registry = Arc::new(ActivityRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let monitor = ActivityMonitor::start(registry.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(InputKind::TouchStart);
        registry.dispatch(InputKind::Click);
        registry.dispatch(InputKind::Wheel);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.detected(), Some(InputKind::TouchStart));
    }

    #[test]
    fn test_concurrent_inputs_fire_once() {
        let registry = Arc::new(ActivityRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _monitor = ActivityMonitor::start(registry.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let threads: Vec<_> = InputKind::ALL
            .iter()
            .map(|kind| {
                let registry = Arc::clone(&registry);
                let kind = *kind;
                std::thread::spawn(move || registry.dispatch(kind))
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_detaches_listener() {
        let registry = Arc::new(ActivityRegistry::new());
        let monitor = ActivityMonitor::start(registry.clone(), |_| {});
        assert_eq!(registry.listener_count(), 1);

        drop(monitor);
        assert_eq!(registry.listener_count(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = Arc::new(ActivityRegistry::new());
        let mut monitor = ActivityMonitor::start(registry.clone(), |_| {});
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_listening());
        assert_eq!(registry.listener_count(), 0);
    }

    #[test]
    fn test_input_kind_names() {
        assert_eq!(InputKind::TouchStart.to_string(), "touchstart");
        assert_eq!(serde_json::to_string(&InputKind::MouseMove).unwrap(), "\"mousemove\"");
    }
}
