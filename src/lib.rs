pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod subscription;

pub use config::CatalogConfig;
pub use error::{AppError, StoreError};
pub use services::CourseCatalog;
pub use state::MirrorState;
pub use subscription::Disposer;
