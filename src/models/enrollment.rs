use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const FIELD_USER_ID: &str = "userId";
pub const FIELD_COURSE_ID: &str = "courseId";

const ID_SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub user_id: String,
    pub course_id: String,
    pub created_at: String,
}

impl Enrollment {
    pub fn new(user_id: &str, course_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn id(&self) -> String {
        enrollment_id(&self.user_id, &self.course_id)
    }
}

/// Document id of the enrollment of `user_id` in `course_id`.
///
/// Two attempts for the same pair always address the same document, so the
/// store's transaction isolation is enough to rule out duplicates.
pub fn enrollment_id(user_id: &str, course_id: &str) -> String {
    format!("{user_id}{ID_SEPARATOR}{course_id}")
}
