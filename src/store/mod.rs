//! The sole durable state holder.
//!
//! `Database` wraps a bounded `sqlx::PgPool` and exposes narrow typed
//! operations rather than free-form SQL at call sites.

mod articles;
mod broadcasts;
mod channels;
mod embeddings;
mod events;
mod feed_sources;
mod locks;
mod models;
mod pool;
mod preferences;
mod scores;
mod users;

pub use articles::{Article, NewArticle};
pub use broadcasts::BroadcastEntry;
pub use channels::{Channel, HourMask};
pub use embeddings::{Embedding, SimilarArticle};
pub use events::{AdminEvent, EventSeverity};
pub use feed_sources::{FeedSource, FeedSourceKind};
pub use locks::AdvisoryLock;
pub use models::Model;
pub use pool::{Database, DatabaseError};
pub use preferences::{LabelSource, Preference};
pub use scores::PredictedScore;
pub use users::User;
