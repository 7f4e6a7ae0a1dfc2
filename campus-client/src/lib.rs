//! Campus client library exports.

pub mod alerts;
pub mod api_client;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod nav;
pub mod poller;
pub mod queries;
pub mod session;
pub mod sync;
pub mod telemetry;
pub mod views;

pub use alerts::{Alert, AlertCenter, AlertLevel, AlertSink, ChannelAlertSink};
pub use cache::{CacheEvent, QueryCache, QueryKey, QueryValue, RefreshOutcome};
pub use config::ClientConfig;
pub use error::{AppError, ClientError, ClientResult};
pub use gateway::{Gateway, GatewayError, GatewayResult};
pub use poller::{spawn_notification_poller, NotificationPoller, PollerConfig};
pub use queries::Queries;
pub use session::{AuthState, Session, SessionId};
pub use sync::{observe, NotificationSync, Observation, SummaryUpdate};
