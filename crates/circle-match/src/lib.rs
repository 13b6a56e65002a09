pub mod error;
pub mod help;
pub mod masking;
pub mod matchmaker;
pub mod reveal;

mod convert;

use std::sync::Arc;

use chrono::Duration;
use circle_db::Database;

pub use error::{MatchError, MatchResult};

/// Tunables for the coordinator. Defaults mirror the production service.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Bounded retry budget for version-guarded reveal updates before
    /// surfacing `Conflict`.
    pub reveal_retry_attempts: u32,
    /// Active matches with no delivered message for this long get expired.
    pub match_ttl: Duration,
    /// How long a help request stays `searching` before it expires.
    pub help_request_timeout: Duration,
    /// Helpers contacted before a searching request gives up.
    pub help_attempt_cap: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reveal_retry_attempts: 3,
            match_ttl: Duration::days(7),
            help_request_timeout: Duration::minutes(30),
            help_attempt_cap: 5,
        }
    }
}

/// Stateless logic over the transactional store. All operations are
/// synchronous; async callers run them via `spawn_blocking`.
///
/// The operations are split across modules the way circle-db splits its
/// queries: reveal protocol in `reveal`, pairing/settings in
/// `matchmaker`, help requests in `help`.
#[derive(Clone)]
pub struct Coordinator {
    db: Arc<Database>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(db: Arc<Database>, config: CoordinatorConfig) -> Self {
        Self { db, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

/// Targeted event fan-out: which user gets which event. Delivery is the
/// gateway's job; the coordinator only decides recipients and payloads.
pub type Notifications = Vec<(uuid::Uuid, circle_types::events::GatewayEvent)>;
