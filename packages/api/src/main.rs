use lambda_http::{run, Error};
use std::env::set_var;
use std::sync::Arc;
use tracing::{info, Level};

use api::services::auth_service::AuthService;
use api::{app, state::AppState};
use shared::config::{ConfigError, ConfigHandle, CoordinatorConfig, StoreBackend};
use shared::repositories::memory_queue_repository::InMemoryQueueRepository;
use shared::repositories::queue_repository::{DynamoDbQueueRepository, QueueRepository};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let local_bind_addr = std::env::var("LOCAL_BIND_ADDR").ok();

    match local_bind_addr {
        Some(_) => tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(false)
            .without_time()
            .init(),
        None => {
            set_var("AWS_LAMBDA_HTTP_IGNORE_STAGE_IN_PATH", "true");
            // required to enable CloudWatch error logging by the runtime
            lambda_http::tracing::init_default_subscriber();
        }
    }

    let config = CoordinatorConfig::from_env()?;
    let jwt_secret = std::env::var("JWT_SECRET")
        .ok()
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| ConfigError::Missing("JWT_SECRET".to_string()))?;

    let repository: Arc<dyn QueueRepository + Send + Sync> = match &config.store {
        StoreBackend::DynamoDb {
            table_name,
            station_table_name,
        } => {
            let aws_config = aws_config::load_from_env().await;
            let client = aws_sdk_dynamodb::Client::new(&aws_config);
            Arc::new(DynamoDbQueueRepository::new(
                client,
                table_name,
                station_table_name,
            ))
        }
        StoreBackend::Memory => Arc::new(InMemoryQueueRepository::new()),
    };
    info!("Using {:?} queue store", config.store);

    let state = AppState::new(
        repository,
        ConfigHandle::new(config),
        AuthService::with_jwt_secret(jwt_secret),
    );

    match local_bind_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Serving fuel queue API on {}", addr);
            axum::serve(listener, app(state)).await?;
            Ok(())
        }
        None => run(app(state)).await,
    }
}
