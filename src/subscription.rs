use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type DisposeFn = Box<dyn FnOnce() + Send>;

/// Releases a live subscription.
///
/// Clones share the same underlying action, which runs at most once no matter
/// how many clones call [`Disposer::dispose`]. Two disposers compare equal when
/// they release the same subscription.
#[derive(Clone)]
pub struct Disposer {
    action: Arc<Mutex<Option<DisposeFn>>>,
}

impl Disposer {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    /// A disposer with nothing to release.
    pub fn noop() -> Self {
        Self {
            action: Arc::new(Mutex::new(None)),
        }
    }

    pub fn dispose(&self) {
        // Take the action out first so it never runs under our own lock.
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl PartialEq for Disposer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.action, &other.action)
    }
}

impl Eq for Disposer {}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispose_runs_once_across_clones() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let disposer = Disposer::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let clone = disposer.clone();

        disposer.dispose();
        clone.dispose();
        disposer.dispose();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clone.is_disposed());
        assert_eq!(disposer, clone);
    }

    #[test]
    fn test_noop_disposers_are_distinct() {
        let a = Disposer::noop();
        let b = Disposer::noop();
        a.dispose();
        assert!(a.is_disposed());
        assert_ne!(a, b);
    }
}
