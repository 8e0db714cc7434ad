use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Handle returned when a listener is registered; pass it back to remove the
/// listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A set of listeners attached to one observable entity.
///
/// Notification runs over a snapshot taken before the first callback, so a
/// listener may unsubscribe itself (or others) while being notified and may
/// call back into the entity that notified it.
pub(crate) struct Listeners<L: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> Listeners<L> {
    /// Registers `listener`. Adding the same `Arc` twice returns the id of
    /// the existing registration.
    pub(crate) fn add(&self, listener: Arc<L>) -> ListenerId {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((id, _)) = entries.iter().find(|(_, l)| Arc::ptr_eq(l, &listener)) {
            return *id;
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(i, _)| *i != id);
        entries.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn notify(&self, mut f: impl FnMut(&L)) {
        let snapshot: Vec<Arc<L>> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            f(listener.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    trait Ping: Send + Sync {
        fn ping(&self);
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Ping for Counter {
        fn ping(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn same_listener_registers_once() {
        let listeners: Listeners<dyn Ping> = Listeners::default();
        let counter = Arc::new(Counter::default());
        let a = listeners.add(counter.clone());
        let b = listeners.add(counter.clone());
        assert_eq!(a, b);
        assert_eq!(listeners.len(), 1);

        listeners.notify(|l| l.ping());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_listener_is_not_notified() {
        let listeners: Listeners<dyn Ping> = Listeners::default();
        let counter = Arc::new(Counter::default());
        let id = listeners.add(counter.clone());
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));

        listeners.notify(|l| l.ping());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
