// Network reachability probe used as an optional pre-flight check

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Public DNS resolver used when no probe target is given
pub const DEFAULT_PROBE_HOST: &str = "8.8.8.8";
pub const DEFAULT_PROBE_PORT: u16 = 53;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Try a raw TCP connection to `host:port` within `timeout`.
///
/// Returns `false` on refusal, resolution failure or timeout; never errors.
pub async fn check_internet(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => {
            debug!(host = host, port = port, "Reachability probe succeeded");
            true
        }
        Ok(Err(e)) => {
            warn!(host = host, port = port, error = %e, "No internet connection detected");
            false
        }
        Err(_) => {
            warn!(
                host = host,
                port = port,
                timeout_ms = timeout.as_millis() as u64,
                "No internet connection detected (probe timed out)"
            );
            false
        }
    }
}

/// Probe the default public resolver
pub async fn check_internet_default() -> bool {
    check_internet(DEFAULT_PROBE_HOST, DEFAULT_PROBE_PORT, DEFAULT_PROBE_TIMEOUT).await
}
