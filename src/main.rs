use std::sync::Arc;

use gymrank::{
    progression::UserProgress, CheckInRequest, CheckInService, EngineConfig, InMemoryRecordStore,
    PostgresRecordStore, ProgressionError, RecordStore,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const INITIAL_GYMS: &[&str] = &["Downtown", "Riverside", "Uptown"];

/// Replays check-ins read as JSON lines from stdin and prints one JSON outcome per line
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymrank=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EngineConfig::from_env();
    info!(?config, "Starting gymrank replay");

    // Postgres when DATABASE_URL is set, otherwise an in-memory store that
    // registers unknown users on their first check-in
    let (store, memory): (Arc<dyn RecordStore>, Option<Arc<InMemoryRecordStore>>) =
        match std::env::var("DATABASE_URL") {
            Ok(database_url) => {
                let pool = sqlx::PgPool::connect(&database_url).await?;
                info!("Using PostgreSQL record store");
                (Arc::new(PostgresRecordStore::new(pool)), None)
            }
            Err(_) => {
                info!("DATABASE_URL not set, using in-memory record store");
                let memory = Arc::new(InMemoryRecordStore::new());
                (memory.clone(), Some(memory))
            }
        };

    let service = CheckInService::builder(store).with_config(config).build();
    service.ensure_initial_gyms(INITIAL_GYMS).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<CheckInRequest>(&line) {
            Ok(request) => {
                if let Some(memory) = &memory {
                    register_if_unknown(&service, memory, &request).await;
                }
                match service.check_in(request).await {
                    Ok(outcome) => serde_json::to_value(&outcome)?,
                    Err(err) => {
                        error!(error = %err, "Check-in rejected");
                        json!({ "error": err.to_string(), "retryable": err.is_retryable() })
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "Skipping malformed input line");
                json!({ "error": format!("malformed request: {}", err) })
            }
        };

        stdout.write_all(output.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    stdout.flush().await?;
    Ok(())
}

async fn register_if_unknown(
    service: &CheckInService,
    memory: &InMemoryRecordStore,
    request: &CheckInRequest,
) {
    if let Err(ProgressionError::NotFound(_)) = service.progress(&request.user_id).await {
        info!(user_id = %request.user_id, "Registering new user");
        memory
            .insert_user(UserProgress::new(
                request.user_id.clone(),
                Some(request.gym_id.clone()),
            ))
            .await;
    }
}
