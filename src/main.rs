use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_catalog::models::NewCourseRequest;
use course_catalog::store::MemoryStore;
use course_catalog::{CatalogConfig, CourseCatalog};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_catalog=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CatalogConfig::new_from_env()?;
    let store = Arc::new(MemoryStore::new());
    let catalog = CourseCatalog::new(store, config);

    let courses = catalog.subscribe_to_courses();

    let mut taller = NewCourseRequest::new("Taller de Rust", 1);
    taller.descripcion = Some("Ownership y async en la práctica".to_string());
    let taller_id = catalog.add_course(taller).await?;

    let mut archivado = NewCourseRequest::new("Curso archivado", 10);
    archivado.estado = false;
    archivado.extra.insert("semestre".to_string(), json!("2025-2"));
    catalog.add_course(archivado).await?;

    let enrollments = catalog.subscribe_to_user_enrollments(Some("ana"));

    catalog.enroll_in_course(&taller_id, Some("ana")).await?;
    if let Err(err) = catalog.enroll_in_course(&taller_id, Some("luis")).await {
        warn!("luis could not enroll: {}", err);
    }

    for course in catalog.active_courses() {
        info!(
            "{} - {}/{} seats taken, ana enrolled: {}",
            course.id,
            course.enrolled(),
            course.capacity(),
            catalog.is_user_enrolled(&course.id)
        );
    }

    enrollments.dispose();
    courses.dispose();
    Ok(())
}
