//! Observable values with explicit subscription handles.
//!
//! Observers are called after the internal lock is released, with a clone of
//! the new value, so an observer may freely read the value again or even
//! subscribe/unsubscribe from inside its callback. Dropping a
//! [`Subscription`] does nothing; observers are removed only through
//! [`Observable::unsubscribe`], which makes "no longer notified" a
//! deterministic point in time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

impl Subscription {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Inner<T> {
    value: T,
    observers: Vec<(Subscription, Observer<T>)>,
}

/// A value that notifies registered observers on every change.
pub struct Observable<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                observers: Vec::new(),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replaces the value and notifies observers.
    pub fn set(&self, value: T) {
        let (snapshot, observers) = {
            let mut inner = self.lock();
            inner.value = value;
            (inner.value.clone(), Self::observers_of(&inner))
        };
        for observer in observers {
            observer(&snapshot);
        }
    }

    /// Mutates the value in place under the lock, then notifies observers.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let (result, snapshot, observers) = {
            let mut inner = self.lock();
            let result = f(&mut inner.value);
            (result, inner.value.clone(), Self::observers_of(&inner))
        };
        for observer in observers {
            observer(&snapshot);
        }
        result
    }

    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let handle = Subscription::next();
        self.lock().observers.push((handle, Arc::new(observer)));
        handle
    }

    /// Removes an observer. Returns `false` if the handle was not registered here.
    pub fn unsubscribe(&self, handle: Subscription) -> bool {
        let mut inner = self.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(id, _)| *id != handle);
        inner.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn observers_of(inner: &Inner<T>) -> Vec<Observer<T>> {
        inner
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panicking observer never runs under the lock, so poisoning can
        // only come from a panic inside `update`; the value is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("observers", &inner.observers.len())
            .finish()
    }
}
