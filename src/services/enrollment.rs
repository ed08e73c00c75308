use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, StoreError};
use crate::models::course::{FIELD_INSCRITOS, to_payload};
use crate::models::enrollment::{FIELD_COURSE_ID, FIELD_USER_ID};
use crate::models::{Course, Enrollment, enrollment_id};
use crate::services::catalog::{ActiveStream, CourseCatalog};
use crate::state::StreamKind;
use crate::store::{Query, QuerySnapshot, Transaction, TransactionBody, run_transaction};
use crate::subscription::Disposer;

/// Capacity and duplicate guarded enrollment, run inside a store transaction.
struct EnrollBody<'a> {
    courses: &'a str,
    enrollments: &'a str,
    course_id: &'a str,
    user_id: &'a str,
}

#[async_trait]
impl<'a> TransactionBody for EnrollBody<'a> {
    type Output = Enrollment;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<Enrollment, AppError> {
        let enrollment_doc_id = enrollment_id(self.user_id, self.course_id);

        let course = tx.get(self.courses, self.course_id).await?;
        let existing = tx.get(self.enrollments, &enrollment_doc_id).await?;

        let course = course
            .map(Course::from_document)
            .ok_or_else(|| AppError::CourseNotFound(self.course_id.to_string()))?;
        if existing.is_some() {
            return Err(AppError::AlreadyEnrolled);
        }
        if course.remaining_seats() <= 0 {
            return Err(AppError::NoCapacity);
        }

        let enrollment = Enrollment::new(self.user_id, self.course_id);
        tx.set(self.enrollments, &enrollment_doc_id, to_payload(&enrollment)?);

        let mut patch = Map::new();
        let enrolled = course.enrolled().saturating_add(1);
        patch.insert(FIELD_INSCRITOS.to_string(), json!(enrolled));
        tx.update(self.courses, self.course_id, patch);

        Ok(enrollment)
    }
}

fn present(user_id: Option<&str>) -> Option<&str> {
    user_id.filter(|u| !u.is_empty())
}

impl CourseCatalog {
    /// Tracks the courses `user_id` is enrolled in.
    ///
    /// Any previous enrollment stream is cancelled first, so only the latest
    /// user's enrollments are ever mirrored. Without a user this does nothing.
    pub fn subscribe_to_user_enrollments(&self, user_id: Option<&str>) -> Disposer {
        let Some(user_id) = present(user_id) else {
            return Disposer::noop();
        };

        let mut streams = self.streams.lock();
        if let Some(previous) = streams.enrollments.take() {
            debug!("cancelling enrollment stream {}", previous.generation);
            previous.registration.dispose();
        }

        let generation = streams.next_generation();
        self.shared.update(|s| {
            s.enrollment_stream = Some(generation);
            s.view.enrolled_course_ids.clear();
        });

        let on_change = {
            let shared = self.shared.clone();
            Box::new(move |snapshot: QuerySnapshot| {
                let ids: HashSet<String> = snapshot
                    .docs
                    .iter()
                    .filter_map(|doc| doc.data.get(FIELD_COURSE_ID).and_then(Value::as_str))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect();
                shared.update(|s| {
                    if s.is_current(StreamKind::Enrollments, generation) {
                        s.view.enrolled_course_ids = ids;
                    }
                });
            })
        };
        let on_error = {
            let shared = self.shared.clone();
            Box::new(move |err: StoreError| {
                error!("enrollment stream {} failed: {}", generation, err);
                shared.update(|s| {
                    if s.is_current(StreamKind::Enrollments, generation) {
                        s.view.error = Some(err.to_string());
                        s.enrollment_stream = None;
                    }
                });
            })
        };

        let query =
            Query::collection(&self.config.enrollments_collection).where_eq(FIELD_USER_ID, user_id);
        let registration = match self.store.subscribe(query, on_change, on_error) {
            Ok(registration) => registration,
            Err(err) => {
                error!("failed to subscribe to enrollments of {}: {}", user_id, err);
                self.shared.update(|s| {
                    s.view.error = Some(err.to_string());
                    s.enrollment_stream = None;
                });
                return Disposer::noop();
            }
        };

        let handle =
            self.stream_handle(StreamKind::Enrollments, generation, registration.clone());
        streams.enrollments = Some(ActiveStream {
            generation,
            registration,
            handle: handle.clone(),
        });
        info!(
            "subscribed to enrollments of {} (stream {})",
            user_id, generation
        );
        handle
    }

    pub fn is_user_enrolled(&self, course_id: &str) -> bool {
        self.shared
            .read(|v| v.enrolled_course_ids.contains(course_id))
    }

    pub fn enrolled_course_ids(&self) -> HashSet<String> {
        self.shared.read(|v| v.enrolled_course_ids.clone())
    }

    /// Enrolls `user_id` in `course_id`, provided the course exists, has a
    /// free seat, and the user is not enrolled yet.
    ///
    /// The enrollment record and the course's `inscritos` bump are committed
    /// together or not at all.
    pub async fn enroll_in_course(
        &self,
        course_id: &str,
        user_id: Option<&str>,
    ) -> Result<Enrollment, AppError> {
        let Some(user_id) = present(user_id) else {
            let err = AppError::NotAuthenticated;
            warn!("enrollment in {} rejected: {}", course_id, err);
            self.shared.record_error(&err);
            return Err(err);
        };

        let body = EnrollBody {
            courses: &self.config.courses_collection,
            enrollments: &self.config.enrollments_collection,
            course_id,
            user_id,
        };
        let result = self
            .tracked(run_transaction(
                &*self.store,
                &body,
                self.config.max_transaction_attempts,
            ))
            .await;

        match &result {
            Ok(_) => info!("enrolled {} in course {}", user_id, course_id),
            Err(err) if err.is_validation() => {
                warn!("enrollment of {} in {} rejected: {}", user_id, course_id, err)
            }
            Err(err) => error!("enrollment of {} in {} failed: {}", user_id, course_id, err),
        }
        result
    }
}
