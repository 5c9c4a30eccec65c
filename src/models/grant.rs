//! Grant model representing one subsidy listing from the jGrants portal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Whether a grant is currently accepting applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Open,
    Closed,
    Unknown,
}

impl GrantStatus {
    /// Derive the status from an acceptance window.
    ///
    /// A missing bound is treated as unbounded on that side. With both bounds
    /// missing nothing can be said, so the status is `Unknown`.
    pub fn from_window(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        if start.is_none() && end.is_none() {
            return GrantStatus::Unknown;
        }
        let started = start.map_or(true, |s| s <= now);
        let not_ended = end.map_or(true, |e| now <= e);
        if started && not_ended {
            GrantStatus::Open
        } else {
            GrantStatus::Closed
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            GrantStatus::Open => "受付中",
            GrantStatus::Closed => "受付終了",
            GrantStatus::Unknown => "不明",
        }
    }
}

impl std::fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Attachment grouping used by the portal's detail endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentCategory {
    ApplicationGuidelines,
    OutlineOfGrant,
    ApplicationForm,
}

impl AttachmentCategory {
    /// All categories in display order
    pub const ALL: [AttachmentCategory; 3] = [
        AttachmentCategory::ApplicationGuidelines,
        AttachmentCategory::OutlineOfGrant,
        AttachmentCategory::ApplicationForm,
    ];

    /// Wire field name on the detail record
    pub fn wire_name(&self) -> &'static str {
        match self {
            AttachmentCategory::ApplicationGuidelines => "application_guidelines",
            AttachmentCategory::OutlineOfGrant => "outline_of_grant",
            AttachmentCategory::ApplicationForm => "application_form",
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            AttachmentCategory::ApplicationGuidelines => "申請ガイドライン",
            AttachmentCategory::OutlineOfGrant => "補助金概要",
            AttachmentCategory::ApplicationForm => "申請書類",
        }
    }
}

/// Where the bytes of an attachment come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentSource {
    /// Base64 payload embedded in the detail response
    Inline {
        #[serde(skip_serializing, default)]
        data: String,
    },

    /// Separate download endpoint
    Remote { url: String },
}

/// Result of trying to put an attachment into the local cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// No download attempted yet
    Pending,

    /// Present in the cache
    Cached { path: PathBuf, size: u64 },

    /// Download or write failed
    Failed { reason: String },
}

impl DownloadOutcome {
    pub fn is_cached(&self) -> bool {
        matches!(self, DownloadOutcome::Cached { .. })
    }
}

/// Reference to one attachment of a grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Original remote file name (also the cache file name)
    pub name: String,

    /// Remote location of the bytes
    pub source: AttachmentSource,

    /// Size announced by the portal, if any
    pub declared_size: Option<u64>,

    /// Download result
    pub outcome: DownloadOutcome,
}

impl AttachmentRef {
    /// Attachment whose bytes are embedded as base64
    pub fn inline(name: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        // base64 expands 3 bytes into 4 chars
        let declared_size = Some((data.len() as u64 / 4) * 3);
        Self {
            name: name.into(),
            source: AttachmentSource::Inline { data },
            declared_size,
            outcome: DownloadOutcome::Pending,
        }
    }

    /// Attachment served from its own URL
    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: AttachmentSource::Remote { url: url.into() },
            declared_size: None,
            outcome: DownloadOutcome::Pending,
        }
    }
}

/// Summary of one grant as returned by the search endpoint
///
/// Immutable snapshot of a remote record, rebuilt on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantSummary {
    /// Portal identifier (e.g. `a0WJ200000CDR9HMAX`)
    pub id: String,

    /// Internal program code
    pub name: String,

    /// Grant title
    pub title: String,

    /// Start of the acceptance window
    pub acceptance_start: Option<DateTime<Utc>>,

    /// End of the acceptance window
    pub acceptance_end: Option<DateTime<Utc>>,

    /// Subsidy ceiling in yen
    pub subsidy_max_limit: Option<u64>,

    /// Target area (free text)
    pub target_area_search: String,

    /// Target industry (free text)
    pub industry: String,

    /// Employee-count constraint (free text)
    pub target_number_of_employees: String,

    /// Derived acceptance status
    pub status: GrantStatus,
}

impl GrantSummary {
    /// Minimal summary with only an id and a title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            title: title.into(),
            acceptance_start: None,
            acceptance_end: None,
            subsidy_max_limit: None,
            target_area_search: String::new(),
            industry: String::new(),
            target_number_of_employees: String::new(),
            status: GrantStatus::Unknown,
        }
    }

    /// Set the acceptance window and recompute the status against `now`
    pub fn window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        self.acceptance_start = start;
        self.acceptance_end = end;
        self.status = GrantStatus::from_window(start, end, now);
        self
    }

    /// Set the subsidy ceiling
    pub fn max_limit(mut self, amount: Option<u64>) -> Self {
        self.subsidy_max_limit = amount;
        self
    }
}

/// Full detail of a grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantDetail {
    #[serde(flatten)]
    pub summary: GrantSummary,

    /// Short tagline
    pub catch_phrase: String,

    /// Plain-text description
    pub description: String,

    /// Usage purpose (free text)
    pub use_purpose: String,

    /// Detailed target area
    pub target_area_detail: String,

    /// Subsidy rate (free text, e.g. "1/2以内")
    pub subsidy_rate: String,

    /// Deadline for the funded project itself
    pub project_end_deadline: Option<DateTime<Utc>>,

    /// Portal page for applying
    pub application_url: Option<String>,

    /// Attachments grouped by category
    pub attachments: BTreeMap<AttachmentCategory, Vec<AttachmentRef>>,
}

impl GrantDetail {
    /// Detail with no extra fields beyond the summary
    pub fn from_summary(summary: GrantSummary) -> Self {
        Self {
            summary,
            catch_phrase: String::new(),
            description: String::new(),
            use_purpose: String::new(),
            target_area_detail: String::new(),
            subsidy_rate: String::new(),
            project_end_deadline: None,
            application_url: None,
            attachments: BTreeMap::new(),
        }
    }

    /// Add an attachment under a category
    pub fn attach(mut self, category: AttachmentCategory, attachment: AttachmentRef) -> Self {
        self.attachments
            .entry(category)
            .or_default()
            .push(attachment);
        self
    }

    /// Iterate over all attachments in category order
    pub fn all_attachments(&self) -> impl Iterator<Item = (AttachmentCategory, &AttachmentRef)> {
        self.attachments
            .iter()
            .flat_map(|(cat, list)| list.iter().map(move |a| (*cat, a)))
    }

    /// Total number of attachments
    pub fn attachment_count(&self) -> usize {
        self.attachments.values().map(Vec::len).sum()
    }
}
