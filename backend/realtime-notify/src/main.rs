use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use realtime_notify::{
    config::Config,
    db,
    handlers::{self, register_notifications, register_websocket},
    logging, metrics,
    middleware::CorrelationIdMiddleware,
    presence::{PresenceStore, RedisPresenceStore},
    repository::{PgConfigurationRepository, PgNotificationRepository},
    services::{KafkaNotificationConsumer, NotificationEventProcessor},
    AppState,
};
use std::sync::Arc;
use tokio::sync::watch;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let cfg = Config::from_env().context("failed to load configuration")?;
    tracing::info!(env = %cfg.app.env, "Starting realtime-notify");

    let db = db::init_pool(&cfg.database.url, cfg.database.max_connections)
        .await
        .context("failed to initialize database")?;

    // Without presence the hub cannot honour preferences, so this is fatal.
    let presence: Arc<dyn PresenceStore> = Arc::new(
        RedisPresenceStore::connect(&cfg.redis.url)
            .await
            .context("failed to connect to presence store")?
            .with_command_timeout(cfg.redis.command_timeout()),
    );
    tracing::info!("Presence store connected");

    let state = AppState::new(
        Arc::new(PgNotificationRepository::new(db.clone())),
        Arc::new(PgConfigurationRepository::new(db)),
        presence,
        cfg.websocket.session_settings(),
        cfg.websocket.origin_policy(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = if cfg.kafka.enabled {
        let consumer = KafkaNotificationConsumer::new(
            cfg.kafka.brokers.clone(),
            cfg.kafka.notification_topic.clone(),
            cfg.kafka.group_id.clone(),
        );
        let processor =
            NotificationEventProcessor::new(state.notifications.clone(), state.hub.clone());
        consumer
            .start(processor, shutdown_rx)
            .context("failed to start Kafka consumer")?
    } else {
        tracing::info!("Kafka consumer disabled");
        Vec::new()
    };

    let addr = format!("0.0.0.0:{}", cfg.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let origins = state.origins.clone();
    let app_state = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .wrap(CorrelationIdMiddleware)
            .wrap(handlers::cors(&origins))
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/", web::get().to(|| async { "Realtime Notify v0.1" }))
            .configure(|cfg| {
                register_notifications(cfg);
                register_websocket(cfg);
            })
    })
    .bind(&addr)?
    .run()
    .await?;

    tracing::info!("HTTP server stopped, draining broker workers");
    let _ = shutdown_tx.send(true);

    // In-flight events are finished before a worker exits.
    futures::future::join_all(workers).await;
    tracing::info!("Broker workers stopped");

    Ok(())
}
