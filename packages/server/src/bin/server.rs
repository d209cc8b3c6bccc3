//! Utage server: room synchronization over WebSocket plus the queue workers.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin utage-server
//! cargo run --bin utage-server -- --host 0.0.0.0 --port 3000 --workers 4
//! ```

use std::{net::IpAddr, sync::Arc, time::Duration};

use clap::Parser;
use utage_server::{
    config::{
        CircuitBreakerConfig, CoordinatorConfig, ErrorPolicyConfig, HealthConfig, HttpConfig,
        MetadataConfig, RateLimitConfig, ServerConfig, WorkerConfig,
    },
    domain::MetadataLookup,
    infrastructure::{
        broadcaster::WebSocketRoomBroadcaster,
        metadata::{HttpMetadataClient, StaticMetadataCatalog},
        repository::{InMemoryQueueItemRepository, InMemoryRoomRepository},
        store::InMemoryStore,
    },
    ui::{AppState, Server, shutdown_signal},
    usecase::{RoomLockRegistry, RoomSync},
    worker::{MetricsRegistry, ProcessorContext, WorkerFactory, WorkerStores, WorkerSupervisor},
};
use utage_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};

#[derive(Parser, Debug)]
#[command(name = "utage-server")]
#[command(about = "Shared media queue server with distributed validation workers", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "UTAGE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "UTAGE_PORT", default_value = "8080")]
    port: u16,

    /// Shared coordination store
    #[arg(long, env = "UTAGE_STORE_URL", default_value = "memory://")]
    store_url: String,

    /// Base URL of the video metadata provider (in-memory catalog when omitted)
    #[arg(long, env = "UTAGE_METADATA_URL")]
    metadata_url: Option<String>,

    #[arg(long, env = "UTAGE_METADATA_TIMEOUT_SECS", default_value = "10")]
    metadata_timeout_secs: u64,

    #[arg(long, env = "UTAGE_RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    rate_limit_window_secs: u64,

    #[arg(long, env = "UTAGE_RATE_LIMIT_MAX", default_value = "1000")]
    rate_limit_max: usize,

    #[arg(long, env = "UTAGE_BREAKER_FAILURE_THRESHOLD", default_value = "5")]
    breaker_failure_threshold: u32,

    #[arg(long, env = "UTAGE_BREAKER_RESET_SECS", default_value = "30")]
    breaker_reset_secs: u64,

    #[arg(long, env = "UTAGE_BREAKER_HALF_OPEN_ATTEMPTS", default_value = "3")]
    breaker_half_open_attempts: u32,

    /// Longest accepted video in seconds
    #[arg(long, env = "UTAGE_MAX_VIDEO_DURATION", default_value = "600")]
    max_video_duration: u32,

    #[arg(long, env = "UTAGE_HEARTBEAT_INTERVAL_SECS", default_value = "15")]
    heartbeat_interval_secs: u64,

    #[arg(long, env = "UTAGE_HEARTBEAT_TIMEOUT_SECS", default_value = "30")]
    heartbeat_timeout_secs: u64,

    #[arg(long, env = "UTAGE_WORKER_RECORD_TTL_SECS", default_value = "60")]
    worker_record_ttl_secs: u64,

    /// Interval of the dead-worker scan that releases stale in-flight claims
    #[arg(long, env = "UTAGE_REAP_INTERVAL_SECS", default_value = "5")]
    reap_interval_secs: u64,

    /// Consecutive errors before a worker runs full recovery
    #[arg(long, env = "UTAGE_WORKER_ERROR_THRESHOLD", default_value = "10")]
    worker_error_threshold: u32,

    #[arg(long, env = "UTAGE_MAX_RETRIES", default_value = "3")]
    max_retries: u32,

    #[arg(long, env = "UTAGE_RETRY_BASE_DELAY_MS", default_value = "1000")]
    retry_base_delay_ms: u64,

    /// How long queue intake stays paused after a CRITICAL error
    #[arg(long, env = "UTAGE_PAUSE_DURATION_SECS", default_value = "300")]
    pause_duration_secs: u64,

    /// Number of queue workers
    #[arg(short = 'w', long, env = "UTAGE_WORKERS", default_value = "2")]
    workers: usize,

    /// Queue length above which `/health` reports unhealthy
    #[arg(long, env = "UTAGE_BACKLOG_THRESHOLD", default_value = "1000")]
    backlog_threshold: usize,

    /// Callers allowed to read `/health`
    #[arg(
        long,
        env = "UTAGE_HEALTH_ALLOWED_IPS",
        value_delimiter = ',',
        default_value = "127.0.0.1,::1"
    )]
    health_allowed_ips: Vec<IpAddr>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        let worker_defaults = WorkerConfig::default();
        ServerConfig {
            http: HttpConfig {
                host: args.host,
                port: args.port,
            },
            store_url: args.store_url,
            metadata: MetadataConfig {
                base_url: args.metadata_url,
                request_timeout: Duration::from_secs(args.metadata_timeout_secs),
            },
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(args.rate_limit_window_secs),
                max_requests: args.rate_limit_max,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: args.breaker_failure_threshold,
                reset_timeout: Duration::from_secs(args.breaker_reset_secs),
                half_open_max_attempts: args.breaker_half_open_attempts,
            },
            coordinator: CoordinatorConfig {
                heartbeat_interval: Duration::from_secs(args.heartbeat_interval_secs),
                heartbeat_timeout: Duration::from_secs(args.heartbeat_timeout_secs),
                record_ttl: Duration::from_secs(args.worker_record_ttl_secs),
                reap_interval: Duration::from_secs(args.reap_interval_secs),
            },
            error_policy: ErrorPolicyConfig {
                max_retries: args.max_retries,
                base_delay: Duration::from_millis(args.retry_base_delay_ms),
                error_threshold: args.worker_error_threshold,
                pause_duration: Duration::from_secs(args.pause_duration_secs),
            },
            worker: WorkerConfig {
                count: args.workers,
                max_video_duration_seconds: args.max_video_duration,
                ..worker_defaults
            },
            health: HealthConfig {
                backlog_threshold: args.backlog_threshold,
                allowed_ips: args.health_allowed_ips,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let config = ServerConfig::from(Args::parse());
    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize dependencies in order:
    // 1. Clock / shared store / repositories
    // 2. Broadcaster and metadata lookup
    // 3. UseCases (AppState) and workers
    // 4. Server
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 1. Shared coordination store and persistence
    let store = Arc::new(InMemoryStore::connect(&config.store_url, clock.clone())?);
    let stores = WorkerStores {
        queue: store.clone(),
        registry: store.clone(),
        rate_limits: store.clone(),
        control: store,
    };
    let rooms = Arc::new(InMemoryRoomRepository::new());
    let items = Arc::new(InMemoryQueueItemRepository::new());

    // 2. Broadcaster and metadata lookup
    let broadcaster = Arc::new(WebSocketRoomBroadcaster::new(clock.clone()));
    let lookup: Arc<dyn MetadataLookup> = match &config.metadata.base_url {
        Some(base_url) => Arc::new(HttpMetadataClient::new(
            base_url.clone(),
            config.metadata.request_timeout,
        )?),
        None => {
            tracing::warn!("No metadata provider configured; using the in-memory catalog");
            Arc::new(StaticMetadataCatalog::new())
        }
    };

    // 3. UseCases and workers
    let metrics = Arc::new(MetricsRegistry::new()?);
    let room_locks = Arc::new(RoomLockRegistry::new());
    let room_sync = Arc::new(RoomSync::new(items.clone(), broadcaster, clock.clone()));
    let app_state = Arc::new(AppState::new(
        rooms.clone(),
        items.clone(),
        &stores,
        room_locks.clone(),
        room_sync.clone(),
        clock.clone(),
        metrics.clone(),
        &config,
    ));
    let context = ProcessorContext {
        items,
        rooms,
        lookup,
        room_locks,
        room_sync,
        max_video_duration_seconds: config.worker.max_video_duration_seconds,
    };
    let factory = WorkerFactory::new(stores, context, clock, config.clone(), metrics);
    let supervisor = WorkerSupervisor::start(
        factory,
        config.worker.count,
        config.worker.restart_delay,
    );

    // 4. Run the server
    let result = Server::new(app_state)
        .run(&config.http.host, config.http.port, shutdown_signal())
        .await;
    supervisor.shutdown().await;
    result
}
