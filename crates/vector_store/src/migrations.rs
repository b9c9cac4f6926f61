use std::time::Duration;

use anyhow::{Context, Result};
use tokio_postgres::NoTls;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("./migrations");
}

/// Applies the embedded schema migrations (the `chunks` table and the
/// `vector` extension). Returns the number of newly applied migrations.
pub async fn run_migrations(database_url: &str) -> Result<usize> {
    info!("Running vector store migrations...");

    let (mut client, connection) =
        tokio::time::timeout(CONNECT_TIMEOUT, tokio_postgres::connect(database_url, NoTls))
            .await
            .context("Database connection timed out")?
            .context("Failed to connect to database")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Migration connection error: {}", e);
        }
    });

    let report = embedded::migrations::runner()
        .run_async(&mut client)
        .await
        .context("Failed to run migrations")?;

    for migration in report.applied_migrations() {
        info!(
            "Applied migration V{} {}",
            migration.version(),
            migration.name()
        );
    }

    Ok(report.applied_migrations().len())
}
