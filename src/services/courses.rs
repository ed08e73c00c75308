use tracing::info;

use crate::error::AppError;
use crate::models::course::to_payload;
use crate::models::{NewCourseRequest, UpdateCourseRequest};
use crate::services::catalog::CourseCatalog;

// Writes go straight to the store; the mirror catches up through the course
// stream.
impl CourseCatalog {
    /// Creates a course and returns the id the store assigned to it.
    pub async fn add_course(&self, req: NewCourseRequest) -> Result<String, AppError> {
        self.tracked(async {
            let payload = to_payload(&req)?;
            let id = self
                .store
                .create_document(&self.config.courses_collection, payload)
                .await?;
            info!("created course {} ({})", id, req.nombre);
            Ok::<_, AppError>(id)
        })
        .await
    }

    pub async fn update_course(
        &self,
        course_id: &str,
        req: UpdateCourseRequest,
    ) -> Result<(), AppError> {
        self.tracked(async {
            let payload = to_payload(&req)?;
            self.store
                .update_document(&self.config.courses_collection, course_id, payload)
                .await?;
            info!("updated course {}", course_id);
            Ok::<_, AppError>(())
        })
        .await
    }

    pub async fn delete_course(&self, course_id: &str) -> Result<(), AppError> {
        self.tracked(async {
            self.store
                .delete_document(&self.config.courses_collection, course_id)
                .await?;
            info!("deleted course {}", course_id);
            Ok::<_, AppError>(())
        })
        .await
    }
}
