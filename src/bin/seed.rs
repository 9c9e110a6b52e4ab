//! Seed sample directory data into the configured database.
//!
//! Usage: `seed` (honors ASSIGNMENT_DB_PATH, defaults to ./data/assignments.db)

use std::sync::Arc;

use assignment_helper::config::AppConfig;
use assignment_helper::store::{Database, LibSqlBackend, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env();
    eprintln!("🌱 Seeding development data into {}", config.db_path);

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&config.db_path)).await?,
    );

    let summary = seed::seed_dev_data(db.as_ref()).await?;

    eprintln!(
        "   Created: {} teachers, {} students, {} classes, {} enrollments",
        summary.teachers, summary.students, summary.classes, summary.enrollments
    );
    eprintln!("\n📧 Try it out:");
    eprintln!("   Teachers: jane.smith@school.example, john.doe@school.example, mary.wilson@school.example");
    eprintln!("   Students: STU001 .. STU005");
    eprintln!("   Classes:  English 7, Math 7, Science 7");

    Ok(())
}
