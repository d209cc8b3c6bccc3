//! Runtime configuration.
//!
//! The binary parses its command line / environment with clap and converts the
//! result into a [`ServerConfig`]; every service receives the section it needs
//! through its constructor.

use std::{net::IpAddr, time::Duration};

/// HTTP / WebSocket listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// External metadata provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataConfig {
    /// `None` uses the bundled in-memory catalog
    pub base_url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_attempts: 3,
        }
    }
}

/// Heartbeat cadence of the worker coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub heartbeat_interval: Duration,
    /// A worker is considered dead when its last heartbeat is older than this
    pub heartbeat_timeout: Duration,
    /// TTL of the worker record in the shared store
    pub record_ttl: Duration,
    /// How often each worker scans for dead siblings' in-flight jobs
    pub reap_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(30),
            record_ttl: Duration::from_secs(60),
            reap_interval: Duration::from_secs(5),
        }
    }
}

/// Retry and recovery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicyConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Consecutive errors that trigger a full recovery cycle
    pub error_threshold: u32,
    /// How long intake stays paused after a CRITICAL error
    pub pause_duration: Duration,
}

impl Default for ErrorPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            error_threshold: 10,
            pause_duration: Duration::from_secs(300),
        }
    }
}

/// Worker loop and supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub count: usize,
    pub dequeue_timeout: Duration,
    /// Delay between loop iterations
    pub idle_delay: Duration,
    /// Delay before a throttled / paused worker looks again
    pub backoff_delay: Duration,
    /// Delay before a crashed worker is restarted
    pub restart_delay: Duration,
    /// Longest accepted video
    pub max_video_duration_seconds: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 2,
            dequeue_timeout: Duration::from_secs(5),
            idle_delay: Duration::from_millis(100),
            backoff_delay: Duration::from_secs(1),
            restart_delay: Duration::from_secs(1),
            max_video_duration_seconds: 600,
        }
    }
}

/// `/health` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Queue length above which the service reports unhealthy
    pub backlog_threshold: usize,
    pub allowed_ips: Vec<IpAddr>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            backlog_threshold: 1000,
            allowed_ips: vec![
                IpAddr::from([127, 0, 0, 1]),
                IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1]),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub store_url: String,
    pub metadata: MetadataConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub coordinator: CoordinatorConfig,
    pub error_policy: ErrorPolicyConfig,
    pub worker: WorkerConfig,
    pub health: HealthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            store_url: "memory://".to_string(),
            metadata: MetadataConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            error_policy: ErrorPolicyConfig::default(),
            worker: WorkerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Parse a comma separated IP list, e.g. `127.0.0.1,::1`.
pub fn parse_ip_list(value: &str) -> Result<Vec<IpAddr>, std::net::AddrParseError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
