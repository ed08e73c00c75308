use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::CatalogConfig;
use crate::error::{AppError, StoreError};
use crate::models::Course;
use crate::state::{LoadingGuard, MirrorState, SharedState, StreamKind};
use crate::store::{DocumentStore, Query, QuerySnapshot};
use crate::subscription::Disposer;

pub(crate) struct ActiveStream {
    pub generation: u64,
    /// Releases the store-side listener.
    pub registration: Disposer,
    /// What callers were handed; also clears this bookkeeping.
    pub handle: Disposer,
}

#[derive(Default)]
pub(crate) struct Streams {
    pub catalog: Option<ActiveStream>,
    pub enrollments: Option<ActiveStream>,
    next_generation: u64,
}

impl Streams {
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub fn slot(&mut self, kind: StreamKind) -> &mut Option<ActiveStream> {
        match kind {
            StreamKind::Catalog => &mut self.catalog,
            StreamKind::Enrollments => &mut self.enrollments,
        }
    }
}

/// Live mirror of the course catalog plus the current user's enrollments.
///
/// Lock order is `streams` -> store -> `shared`; store callbacks only ever
/// touch `shared`.
pub struct CourseCatalog {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) config: CatalogConfig,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) streams: Arc<Mutex<Streams>>,
}

impl CourseCatalog {
    pub fn new(store: Arc<dyn DocumentStore>, config: CatalogConfig) -> Self {
        Self {
            store,
            config,
            shared: Arc::new(SharedState::new()),
            streams: Arc::new(Mutex::new(Streams::default())),
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Starts mirroring the courses collection.
    ///
    /// While the stream is healthy, repeated calls hand back the same
    /// disposer. A stream that failed is released and replaced.
    pub fn subscribe_to_courses(&self) -> Disposer {
        let mut streams = self.streams.lock();
        if let Some(active) = streams.catalog.take() {
            if self.shared.is_current(StreamKind::Catalog, active.generation) {
                let handle = active.handle.clone();
                streams.catalog = Some(active);
                return handle;
            }
            debug!("releasing failed course stream {}", active.generation);
            active.registration.dispose();
        }

        let generation = streams.next_generation();
        self.shared.update(|s| {
            s.view.loading = true;
            s.catalog_stream = Some(generation);
        });

        let on_change = {
            let shared = self.shared.clone();
            Box::new(move |snapshot: QuerySnapshot| {
                shared.update(|s| {
                    if !s.is_current(StreamKind::Catalog, generation) {
                        return;
                    }
                    s.view.courses = snapshot
                        .docs
                        .into_iter()
                        .map(Course::from_document)
                        .collect();
                    s.view.error = None;
                    s.view.loading = false;
                });
            })
        };
        let on_error = {
            let shared = self.shared.clone();
            Box::new(move |err: StoreError| {
                error!("course stream {} failed: {}", generation, err);
                shared.update(|s| {
                    if !s.is_current(StreamKind::Catalog, generation) {
                        return;
                    }
                    s.view.error = Some(err.to_string());
                    s.view.loading = false;
                    s.catalog_stream = None;
                });
            })
        };

        let query = Query::collection(&self.config.courses_collection);
        let registration = match self.store.subscribe(query, on_change, on_error) {
            Ok(registration) => registration,
            Err(err) => {
                error!("failed to subscribe to courses: {}", err);
                self.shared.update(|s| {
                    s.view.error = Some(err.to_string());
                    s.view.loading = false;
                    s.catalog_stream = None;
                });
                return Disposer::noop();
            }
        };

        let handle = self.stream_handle(StreamKind::Catalog, generation, registration.clone());
        streams.catalog = Some(ActiveStream {
            generation,
            registration,
            handle: handle.clone(),
        });
        info!(
            "subscribed to {} (stream {})",
            self.config.courses_collection, generation
        );
        handle
    }

    /// Builds the disposer handed to callers for one stream. It only clears
    /// bookkeeping that still belongs to that stream.
    pub(crate) fn stream_handle(
        &self,
        kind: StreamKind,
        generation: u64,
        registration: Disposer,
    ) -> Disposer {
        let streams = Arc::downgrade(&self.streams);
        let shared = Arc::downgrade(&self.shared);
        Disposer::new(move || {
            registration.dispose();
            if let Some(streams) = streams.upgrade() {
                let mut streams = streams.lock();
                let slot = streams.slot(kind);
                if slot.as_ref().is_some_and(|a| a.generation == generation) {
                    *slot = None;
                }
            }
            if let Some(shared) = shared.upgrade() {
                shared.update(|s| {
                    if !s.is_current(kind, generation) {
                        return;
                    }
                    *s.stream_mut(kind) = None;
                    if kind == StreamKind::Enrollments {
                        s.view.enrolled_course_ids.clear();
                    }
                });
            }
            debug!("disposed {:?} stream {}", kind, generation);
        })
    }

    /// Runs a store operation with `loading` raised, recording any failure.
    pub(crate) async fn tracked<T>(
        &self,
        operation: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        let _loading = LoadingGuard::start(&self.shared);
        let result = operation.await;
        if let Err(err) = &result {
            self.shared.record_error(err);
        }
        result
    }

    pub fn courses(&self) -> Vec<Course> {
        self.shared.read(|v| v.courses.clone())
    }

    /// Courses whose `estado` flag reads as active.
    pub fn active_courses(&self) -> Vec<Course> {
        self.shared.read(MirrorState::active_courses)
    }

    pub fn course(&self, course_id: &str) -> Option<Course> {
        self.shared
            .read(|v| v.courses.iter().find(|c| c.id == course_id).cloned())
    }

    pub fn loading(&self) -> bool {
        self.shared.read(|v| v.loading)
    }

    pub fn error(&self) -> Option<String> {
        self.shared.read(|v| v.error.clone())
    }

    pub fn clear_error(&self) {
        self.shared.update(|s| s.view.error = None);
    }

    pub fn state(&self) -> MirrorState {
        self.shared.read(MirrorState::clone)
    }

    /// Receives the state revision after every local change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changes()
    }
}

impl Drop for CourseCatalog {
    fn drop(&mut self) {
        let mut streams = self.streams.lock();
        for active in [streams.catalog.take(), streams.enrollments.take()]
            .into_iter()
            .flatten()
        {
            active.registration.dispose();
        }
    }
}
