use std::sync::Arc;

use axum::Router;
use snap_queue::{
    CallbackSender, Janitor, JanitorHandle, Processor, RateLimiter, Scheduler, SweeperHandle,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    capture::HttpRenderer,
    config::ServerConfig,
    dispatch::CallbackDispatcher,
    processor::{ScreenshotProcessor, ScreenshotResult},
    request::ScreenshotJob,
    rest,
    storage::LocalImageStore,
    AppState,
};

/// Running pipeline: scheduler, limiter sweeper, janitor and callback dispatcher
pub struct Pipeline {
    pub state: AppState,
    janitor: JanitorHandle,
    sweeper: SweeperHandle,
    dispatcher: JoinHandle<()>,
}

impl Pipeline {
    /// Wire every background component around `processor` and start it
    pub fn start<P>(config: ServerConfig, processor: P) -> anyhow::Result<Self>
    where
        P: Processor<ScreenshotJob, ScreenshotResult>,
    {
        let config = Arc::new(config);
        let pipeline = &config.pipeline;

        let queue = Scheduler::new(pipeline.queue.clone());

        let limiter = Arc::new(RateLimiter::new(&pipeline.rate_limit));
        let sweeper = limiter.spawn_sweeper(pipeline.rate_limit.cleanup_interval);

        let sender = CallbackSender::new(pipeline.callback.clone())?;
        let dispatcher = CallbackDispatcher::new(sender).spawn(queue.subscribe_finished());

        let janitor = Janitor::new(queue.clone(), &pipeline.retention).spawn();

        queue.set_processor(pipeline.queue.concurrency, processor);
        info!(
            concurrency = pipeline.queue.concurrency,
            max_attempts = pipeline.queue.max_attempts,
            "screenshot pipeline started"
        );

        Ok(Self {
            state: AppState::new(queue, limiter, Arc::clone(&config)),
            janitor,
            sweeper,
            dispatcher,
        })
    }

    /// Pipeline backed by the HTTP render service and local disk storage
    pub fn with_default_processor(config: ServerConfig) -> anyhow::Result<Self> {
        let renderer =
            HttpRenderer::new(&config.render_service_url, config.capture.navigation_timeout)?;
        let store = LocalImageStore::new(&config.storage_dir, &config.storage_public_url);
        let processor = ScreenshotProcessor::new(renderer, store, config.capture.navigation_timeout);
        Self::start(config, processor)
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Drain in-flight jobs, then stop the background tasks
    pub async fn shutdown(self) {
        info!("shutting down screenshot pipeline");
        self.state.queue.shutdown().await;
        self.janitor.shutdown().await;
        self.sweeper.shutdown().await;
        // Ends once the closed queue drops its finished-record senders
        let _ = self.dispatcher.await;
        info!("screenshot pipeline stopped");
    }
}

/// API routes plus stored images, with request ids, tracing and CORS
pub fn build_router(state: AppState) -> Router {
    let images = ServeDir::new(&state.config.storage_dir);

    rest::api_router(state)
        .nest_service("/screenshots", images)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Run the server until ctrl-c / SIGTERM, then drain the pipeline
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let pipeline = Pipeline::with_default_processor(config)?;

    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "snap-server listening");

    axum::serve(listener, pipeline.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
