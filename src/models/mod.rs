//! Core data models for grants, queries and statistics.

mod grant;
mod query;
mod stats;

pub use grant::{
    AttachmentCategory, AttachmentRef, AttachmentSource, DownloadOutcome, GrantDetail,
    GrantStatus, GrantSummary,
};
pub use query::{
    build_query, AcceptanceFilter, RemoteQuery, SearchParams, SearchResultSet, SortKey,
    SortOrder, DEFAULT_KEYWORD, MAX_KEYWORD_CHARS, MIN_KEYWORD_CHARS,
};
pub use stats::{
    AmountBuckets, DeadlineBuckets, HighValueGrant, OverviewCsv, StatisticsSnapshot, UrgentGrant,
};
