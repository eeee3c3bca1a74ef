/// Pool client configuration.
///
/// The consumer constructs this struct however they want (flags, env vars,
/// etc.) — teller does no file I/O or env reading beyond the genesis
/// stream it is handed.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long to wait for a single TCP connect + handshake (ms).
    pub connect_timeout_ms: u64,
    /// Total connection attempts before giving up. Each attempt rotates to
    /// the next validator in genesis order.
    pub max_connect_attempts: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            max_connect_attempts: 3,
        }
    }
}
