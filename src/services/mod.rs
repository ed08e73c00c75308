pub mod catalog;
pub mod courses;
pub mod enrollment;

pub use catalog::CourseCatalog;
