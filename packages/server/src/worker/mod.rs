//! Queue workers: the validation pipeline that turns PENDING items into
//! COMPLETED or ERROR.
//!
//! - `runner`: the worker loop and its supervisor
//! - `processor`: validation of a single job
//! - `coordinator`: heartbeat records and dead-worker reaping
//! - `rate_limiter`, `circuit_breaker`: admission control
//! - `error_handler`, `recovery`: failure classification and recovery
//! - `metrics`: per-worker counters

pub mod circuit_breaker;
pub mod coordinator;
pub mod error_handler;
pub mod metrics;
pub mod processor;
pub mod rate_limiter;
pub mod recovery;
pub mod runner;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use coordinator::WorkerCoordinator;
pub use error_handler::{ErrorAction, ErrorHandler, Severity, WorkerError};
pub use metrics::{MetricsRegistry, WorkerMetrics};
pub use processor::{ProcessOutcome, ProcessorContext, QueueProcessor};
pub use rate_limiter::RateLimiter;
pub use recovery::{Recovery, StuckJobs};
pub use runner::{Worker, WorkerExit, WorkerFactory, WorkerStores, WorkerSupervisor};
