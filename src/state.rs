use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::AppError;
use crate::models::Course;

/// Local view of the remote collections, as observed by readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorState {
    pub courses: Vec<Course>,
    pub enrolled_course_ids: HashSet<String>,
    pub loading: bool,
    pub error: Option<String>,
    /// Incremented on every change to this state.
    pub revision: u64,
}

impl MirrorState {
    pub fn active_courses(&self) -> Vec<Course> {
        self.courses.iter().filter(|c| c.is_active()).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Catalog,
    Enrollments,
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub view: MirrorState,
    /// Generation of the live course stream, `None` when there is none.
    pub catalog_stream: Option<u64>,
    pub enrollment_stream: Option<u64>,
}

impl Inner {
    pub fn stream_mut(&mut self, kind: StreamKind) -> &mut Option<u64> {
        match kind {
            StreamKind::Catalog => &mut self.catalog_stream,
            StreamKind::Enrollments => &mut self.enrollment_stream,
        }
    }

    pub fn is_current(&self, kind: StreamKind, generation: u64) -> bool {
        let current = match kind {
            StreamKind::Catalog => self.catalog_stream,
            StreamKind::Enrollments => self.enrollment_stream,
        };
        current == Some(generation)
    }
}

/// Mirror state shared between the catalog and the store callbacks.
pub(crate) struct SharedState {
    inner: Mutex<Inner>,
    changes: watch::Sender<u64>,
}

impl SharedState {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&MirrorState) -> R) -> R {
        f(&self.inner.lock().view)
    }

    pub fn is_current(&self, kind: StreamKind, generation: u64) -> bool {
        self.inner.lock().is_current(kind, generation)
    }

    /// Applies `f` and publishes the new revision.
    pub fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock();
        let result = f(&mut inner);
        inner.view.revision += 1;
        self.changes.send_replace(inner.view.revision);
        result
    }

    pub fn record_error(&self, err: &AppError) {
        let message = err.to_string();
        self.update(|s| s.view.error = Some(message));
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

/// Holds `loading` up until dropped, whichever way the operation exits.
pub(crate) struct LoadingGuard<'a> {
    state: &'a SharedState,
}

impl<'a> LoadingGuard<'a> {
    pub fn start(state: &'a SharedState) -> Self {
        state.update(|s| s.view.loading = true);
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.update(|s| s.view.loading = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_guard_resets_on_drop() {
        let state = SharedState::new();
        {
            let _guard = LoadingGuard::start(&state);
            assert!(state.read(|v| v.loading));
        }
        assert!(!state.read(|v| v.loading));
    }

    #[test]
    fn test_updates_publish_revisions() {
        let state = SharedState::new();
        let rx = state.changes();
        state.update(|s| s.view.error = Some("boom".to_string()));
        state.record_error(&AppError::NoCapacity);

        assert_eq!(*rx.borrow(), 2);
        assert_eq!(state.read(|v| v.revision), 2);
        assert_eq!(
            state.read(|v| v.error.clone()),
            Some("No capacity available".to_string())
        );
    }

    #[test]
    fn test_stream_generation_tracking() {
        let state = SharedState::new();
        state.update(|s| *s.stream_mut(StreamKind::Catalog) = Some(4));
        assert!(state.is_current(StreamKind::Catalog, 4));
        assert!(!state.is_current(StreamKind::Catalog, 3));
        assert!(!state.is_current(StreamKind::Enrollments, 4));
    }
}
