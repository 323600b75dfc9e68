//! Upstream RPC / enhanced-transactions adapter (spec §4.1): retry,
//! circuit breaking, and TTL caching wrapped around an `RpcProvider`.

mod adapter;
mod circuit_breaker;
mod provider;
mod retry;
mod types;

pub use adapter::UpstreamAdapter;
pub use circuit_breaker::CircuitBreaker;
pub use provider::{HttpRpcProvider, RpcProvider};
pub use retry::RetryPolicy;
pub use types::{Pagination, SignatureEntry, TokenAccountEntry};
