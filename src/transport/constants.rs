/// Configured `max_attempts` value meaning retry forever.
pub const UNLIMITED_ATTEMPTS: u32 = 0;

/// The exponential backoff stops doubling after this many attempts.
pub const BACKOFF_MAX_EXPONENT: u32 = 5;

/// Timeout (ms) allowed for the socket write task to flush and stop.
pub const WRITE_TASK_SHUTDOWN_MS: u64 = 500;

/// Shards the client reports in the handshake. The node only uses it for
/// bookkeeping.
pub const NUM_SHARDS: u32 = 1;
