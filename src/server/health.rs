//! Liveness probe endpoint.

/// Returns 200 "OK" while the server is up.
pub async fn health_handler() -> &'static str {
    "OK"
}
