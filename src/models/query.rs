//! Search parameters and the remote query contract.

use serde::{Deserialize, Serialize};

use super::GrantSummary;
use crate::utils::ValidationError;

/// Keyword used when the caller gives none
pub const DEFAULT_KEYWORD: &str = "事業";

/// Minimum keyword length accepted by the portal (in characters)
pub const MIN_KEYWORD_CHARS: usize = 2;

/// Maximum keyword length accepted by the portal (in characters)
pub const MAX_KEYWORD_CHARS: usize = 255;

/// Sort field understood by the search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    #[serde(rename = "acceptance_end_datetime")]
    AcceptanceEnd,
    #[serde(rename = "acceptance_start_datetime")]
    AcceptanceStart,
    #[serde(rename = "created_date")]
    CreatedDate,
}

impl SortKey {
    pub fn as_wire(&self) -> &'static str {
        match self {
            SortKey::AcceptanceEnd => "acceptance_end_datetime",
            SortKey::AcceptanceStart => "acceptance_start_datetime",
            SortKey::CreatedDate => "created_date",
        }
    }

    /// Parse the wire name, as accepted from tool arguments
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "acceptance_end_datetime" => Some(SortKey::AcceptanceEnd),
            "acceptance_start_datetime" => Some(SortKey::AcceptanceStart),
            "created_date" => Some(SortKey::CreatedDate),
            _ => None,
        }
    }
}

/// Sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_wire(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(SortOrder::Asc),
            "DESC" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Acceptance-state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceFilter {
    /// Every grant regardless of window (wire `0`)
    All,
    /// Only grants currently accepting applications (wire `1`)
    #[default]
    OpenOnly,
}

impl AcceptanceFilter {
    pub fn as_wire(&self) -> u8 {
        match self {
            AcceptanceFilter::All => 0,
            AcceptanceFilter::OpenOnly => 1,
        }
    }

    pub fn from_wire(value: u64) -> Self {
        if value == 0 {
            AcceptanceFilter::All
        } else {
            AcceptanceFilter::OpenOnly
        }
    }
}

/// User-facing search parameters, before defaults and validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// Search keyword; `None` means "use the default placeholder"
    pub keyword: Option<String>,

    /// Industry filter
    pub industry: Option<String>,

    /// Target area filter
    pub target_area: Option<String>,

    /// Employee-count band filter
    pub employees: Option<String>,

    /// Usage purpose filter
    pub use_purpose: Option<String>,

    /// Sort field
    pub sort: Option<SortKey>,

    /// Sort order
    pub order: Option<SortOrder>,

    /// Acceptance filter
    pub acceptance: Option<AcceptanceFilter>,
}

impl SearchParams {
    /// Parameters with a keyword
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Default::default()
        }
    }

    pub fn industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn target_area(mut self, area: impl Into<String>) -> Self {
        self.target_area = Some(area.into());
        self
    }

    pub fn employees(mut self, employees: impl Into<String>) -> Self {
        self.employees = Some(employees.into());
        self
    }

    pub fn use_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.use_purpose = Some(purpose.into());
        self
    }

    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn acceptance(mut self, acceptance: AcceptanceFilter) -> Self {
        self.acceptance = Some(acceptance);
        self
    }
}

/// Query in the shape the remote search endpoint expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteQuery {
    pub keyword: String,
    pub sort: SortKey,
    pub order: SortOrder,
    pub acceptance: AcceptanceFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_number_of_employees: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_area_search: Option<String>,
}

impl RemoteQuery {
    /// Query-string pairs in the order the portal documents them
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("keyword", self.keyword.clone()),
            ("sort", self.sort.as_wire().to_string()),
            ("order", self.order.as_wire().to_string()),
            ("acceptance", self.acceptance.as_wire().to_string()),
        ];
        let optional = [
            ("use_purpose", &self.use_purpose),
            ("industry", &self.industry),
            ("target_number_of_employees", &self.target_number_of_employees),
            ("target_area_search", &self.target_area_search),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                pairs.push((key, v.clone()));
            }
        }
        pairs
    }

    /// URL-encoded query string without the leading `?`
    pub fn to_query_string(&self) -> String {
        self.to_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(&v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Result of one search call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultSet {
    /// Count reported by the portal (falls back to the list length)
    pub total_count: usize,

    /// Returned grants, in remote order
    pub grants: Vec<GrantSummary>,
}

/// Turn user parameters into a remote query.
///
/// A missing keyword becomes [`DEFAULT_KEYWORD`]. A supplied keyword is trimmed
/// and must hold between [`MIN_KEYWORD_CHARS`] and [`MAX_KEYWORD_CHARS`]
/// characters. Blank optional filters are dropped.
pub fn build_query(params: &SearchParams) -> Result<RemoteQuery, ValidationError> {
    let keyword = match params.keyword.as_deref() {
        None => DEFAULT_KEYWORD.to_string(),
        Some(raw) => {
            let trimmed = raw.trim();
            let chars = trimmed.chars().count();
            if chars < MIN_KEYWORD_CHARS {
                return Err(ValidationError::KeywordTooShort {
                    min: MIN_KEYWORD_CHARS,
                    actual: chars,
                });
            }
            if chars > MAX_KEYWORD_CHARS {
                return Err(ValidationError::KeywordTooLong {
                    max: MAX_KEYWORD_CHARS,
                    actual: chars,
                });
            }
            trimmed.to_string()
        }
    };

    Ok(RemoteQuery {
        keyword,
        sort: params.sort.unwrap_or_default(),
        order: params.order.unwrap_or_default(),
        acceptance: params.acceptance.unwrap_or_default(),
        use_purpose: non_blank(&params.use_purpose),
        industry: non_blank(&params.industry),
        target_number_of_employees: non_blank(&params.employees),
        target_area_search: non_blank(&params.target_area),
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
