//! Input validation for keywords, grant ids, file names and URLs.
//!
//! Grant ids and file names become path components under the cache root, so
//! anything that could escape the grant directory is rejected outright rather
//! than rewritten (the cache must keep the portal's original file name).

use thiserror::Error;

/// Validation error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("keyword must be at least {min} characters (got {actual})")]
    KeywordTooShort { min: usize, actual: usize },

    #[error("keyword must be at most {max} characters (got {actual})")]
    KeywordTooLong { max: usize, actual: usize },

    #[error("Invalid grant ID: {0}")]
    InvalidGrantId(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),
}

const MAX_FILENAME_LENGTH: usize = 255;

/// Validate a grant id for use as a directory name.
///
/// Portal ids are alphanumeric (e.g. `a0WJ200000CDR9HMAX`); hyphens and
/// underscores are tolerated for test fixtures.
pub fn validate_grant_id(id: &str) -> Result<String, ValidationError> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::InvalidGrantId("empty ID".to_string()));
    }

    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(ValidationError::PathTraversal(id.to_string()));
    }

    if let Some(ch) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ValidationError::InvalidGrantId(format!(
            "contains disallowed character: {:?}",
            ch
        )));
    }

    Ok(id.to_string())
}

/// Validate a remote file name for use as a cache file name.
///
/// The name is returned trimmed but otherwise unchanged.
pub fn validate_file_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::InvalidFilename("empty name".to_string()));
    }

    if name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains(":/")
        || name.contains(":\\")
    {
        return Err(ValidationError::PathTraversal(name.to_string()));
    }

    // Hidden names are reserved for in-flight temp files
    if name.starts_with('.') {
        return Err(ValidationError::InvalidFilename(
            "must not start with '.'".to_string(),
        ));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFilename(
            "contains control characters".to_string(),
        ));
    }

    if name.len() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::InvalidFilename(format!(
            "longer than {} bytes",
            MAX_FILENAME_LENGTH
        )));
    }

    Ok(name.to_string())
}

/// Validate an API base URL (http or https only)
pub fn validate_base_url(url: &str) -> Result<String, ValidationError> {
    let url = url.trim();

    if url.is_empty() {
        return Err(ValidationError::InvalidUrl("empty URL".to_string()));
    }

    let parsed = url::Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationError::InvalidUrl(format!(
                "invalid scheme: {}",
                other
            )))
        }
    }

    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_grant_id_valid() {
        assert_eq!(
            validate_grant_id(" a0WJ200000CDR9HMAX ").unwrap(),
            "a0WJ200000CDR9HMAX"
        );
        assert!(validate_grant_id("grant-1_test").is_ok());
    }

    #[test]
    fn test_validate_grant_id_invalid() {
        assert!(validate_grant_id("").is_err());
        assert!(validate_grant_id("   ").is_err());
        assert!(matches!(
            validate_grant_id("../etc"),
            Err(ValidationError::PathTraversal(_))
        ));
        assert!(validate_grant_id("a/b").is_err());
        assert!(validate_grant_id("id;rm").is_err());
    }

    #[test]
    fn test_validate_file_name_keeps_original() {
        assert_eq!(
            validate_file_name("公募要領（第1回）.pdf").unwrap(),
            "公募要領（第1回）.pdf"
        );
        assert_eq!(
            validate_file_name("Form 1 (draft).docx").unwrap(),
            "Form 1 (draft).docx"
        );
    }

    #[test]
    fn test_validate_file_name_dangerous() {
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("/etc/passwd").is_err());
        assert!(validate_file_name("C:\\Windows\\System32").is_err());
        assert!(validate_file_name(".tmpAbc").is_err());
        assert!(validate_file_name("a\0b.pdf").is_err());
        assert!(validate_file_name(&"x".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_base_url() {
        assert_eq!(
            validate_base_url("https://api.jgrants-portal.go.jp/exp/v1/public/").unwrap(),
            "https://api.jgrants-portal.go.jp/exp/v1/public"
        );
        assert!(validate_base_url("http://127.0.0.1:1234").is_ok());
        assert!(validate_base_url("ftp://example.com").is_err());
        assert!(validate_base_url("").is_err());
    }
}
