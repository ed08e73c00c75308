pub mod course;
pub mod enrollment;
pub mod value;

pub use course::{Course, NewCourseRequest, UpdateCourseRequest};
pub use enrollment::{Enrollment, enrollment_id};
pub use value::{to_boolean, to_int};
