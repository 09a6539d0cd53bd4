pub mod aggregation;
pub mod context;
pub mod cursor;
pub mod export;
pub mod filter;
pub mod permissions;
pub mod query;
pub mod ratelimit;
pub mod self_audit;
pub mod stream;

pub use aggregation::{actor_activity, summary, ActorActivity, Summary};
pub use context::{get_with_context, EventContext};
pub use cursor::Cursor;
pub use export::{ExportFormat, ExportJob, ExportJobTable, ExportRequest, ExportStatus};
pub use filter::{EventFilter, QueryMetadata, DEFAULT_LIMIT, MAX_LIMIT};
pub use permissions::{Capability, PermissionSet};
pub use query::{query_events, QueryResult};
pub use ratelimit::{RateLimitScope, RateLimiter};
pub use self_audit::{record_access, C6Operation};
pub use stream::{EventStream, Subscription};
