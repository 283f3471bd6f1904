//! Polling helpers for effects that land on a background task.

use room_controller::media::MediaNodeConnection;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// How long [`eventually`] polls before failing the test.
pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics with `what` if the condition is still false after
/// [`EVENTUALLY_TIMEOUT`].
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(EVENTUALLY_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for: {what}");
}

/// Await `future`, failing the test if it does not finish in time.
///
/// # Panics
///
/// Panics with `what` on timeout.
pub async fn within<T>(what: &str, future: impl Future<Output = T>) -> T {
    match tokio::time::timeout(EVENTUALLY_TIMEOUT, future).await {
        Ok(value) => value,
        Err(_) => panic!("timed out waiting for: {what}"),
    }
}

/// Method name a [`MockMediaNode`](crate::MockMediaNode) never handles.
pub const FLUSH_METHOD: &str = "__flush";

/// Round-trip one request so every frame sent before it has been seen by
/// the node.
pub async fn flush(connection: &MediaNodeConnection) {
    let _ = connection.request_raw(FLUSH_METHOD, Value::Null).await;
}
