pub mod auth;
pub mod error;
pub mod help;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod settings;

use anyhow::anyhow;
use tracing::error;

use circle_gateway::dispatcher::Dispatcher;
use circle_match::{MatchError, Notifications};

use crate::error::ApiError;

/// Run a blocking coordinator call off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, MatchError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError),
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            Err(ApiError(MatchError::Db(anyhow!("worker task failed"))))
        }
    }
}

/// Deliver coordinator fan-out through the gateway.
pub(crate) async fn notify(dispatcher: &Dispatcher, notifications: Notifications) {
    for (user_id, event) in notifications {
        dispatcher.send_to_user(user_id, event).await;
    }
}
