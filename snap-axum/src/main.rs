use snap_axum::{serve, ServerConfig};
use snap_queue::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing(telemetry::json_requested());

    let config = ServerConfig::from_env();
    serve(config).await
}
