//! Tuning constants and option structs shared by the indexer and the server.
//!
//! Binaries override these through their command-line arguments.

use std::time::Duration;

/// Damping factor of the importance ranking.
pub const DAMPING: f64 = 0.85;

/// Ranking stops once the L1 change between two iterations drops below this.
pub const TOLERANCE: f64 = 1e-6;

/// Upper bound on ranking iterations.
pub const MAX_ITERATIONS: usize = 100;

/// Number of top books whose graph neighbours are returned with a search.
pub const TOP_K: usize = 3;

/// Concurrent fetches during ingestion.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Postings buffered before the ingestor flushes to the store.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Per-book fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Longest regex accepted from a client.
pub const MAX_PATTERN_LEN: usize = 256;

/// Compiled size limit handed to the regex builder.
pub const REGEX_SIZE_LIMIT: usize = 1 << 20;

pub const DEFAULT_METADATA_BASE_URL: &str = "https://gutendex.com";
pub const DEFAULT_CONTENT_BASE_URL: &str = "https://gutenberg.org";
pub const DEFAULT_USER_AGENT: &str = "bookrank/0.1";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum number of fetches in flight.
    pub concurrency: usize,
    /// Postings buffered before a flush.
    pub batch_size: usize,
    pub fetch_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankConfig {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub top_k: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self { damping: DAMPING, tolerance: TOLERANCE, max_iterations: MAX_ITERATIONS, top_k: TOP_K }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub metadata_base_url: String,
    pub content_base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            metadata_base_url: DEFAULT_METADATA_BASE_URL.to_string(),
            content_base_url: DEFAULT_CONTENT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
