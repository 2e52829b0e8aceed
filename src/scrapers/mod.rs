//! HTTP plumbing shared by the upstream clients.

pub mod http_client;
pub mod rate_limiter;
pub mod retry;

pub use http_client::{resolve_user_agent, HttpClient, HttpClientBuilder, HttpResponse};
pub use rate_limiter::{DomainStats, RateLimitConfig, RateLimiter};
pub use retry::{
    execute_with_retry, RecordingSleeper, RetryOutcome, RetryPolicy, Retryable, Sleeper,
    TokioSleeper,
};
