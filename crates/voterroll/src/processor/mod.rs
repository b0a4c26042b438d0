//! OCR worker adapter.
//!
//! The queue processor only sees [`VoterExtractor`]; how a document is
//! turned into voter records (which binary, which interpreter, which
//! arguments) stays behind that seam.

pub mod output;
pub mod subprocess;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ExtractError;

pub use output::parse_worker_output;
pub use subprocess::SubprocessExtractor;

/// Turns one document into voter-shaped records.
#[async_trait]
pub trait VoterExtractor: Send + Sync {
    async fn extract(
        &self,
        file_path: &Path,
        pages: PageRange,
    ) -> Result<Vec<ExtractedVoter>, ExtractError>;
}

/// Optional 1-based, inclusive page bounds for a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRange {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl PageRange {
    pub fn new(start: Option<u32>, end: Option<u32>) -> Self {
        Self { start, end }
    }

    pub fn is_full_document(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Rejects a zero start page or a start past the end.
    pub fn check(&self) -> Result<(), String> {
        if self.start == Some(0) || self.end == Some(0) {
            return Err("page numbers start at 1".to_string());
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(format!("startPage {} is after endPage {}", start, end));
            }
        }
        Ok(())
    }

    /// Positional worker arguments: `[start] [end]`.
    ///
    /// The worker reads positionally, so an end bound alone still needs
    /// a start of 1 in front of it.
    pub fn worker_args(&self) -> Vec<String> {
        match (self.start, self.end) {
            (None, None) => Vec::new(),
            (Some(start), None) => vec![start.to_string()],
            (start, Some(end)) => vec![start.unwrap_or(1).to_string(), end.to_string()],
        }
    }
}

/// One voter box as reported by the OCR worker.
///
/// OCR output is noisy: numbers may arrive as strings, blanks as empty
/// strings. Values that cannot be read are dropped to `None` rather than
/// failing the whole document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedVoter {
    #[serde(default, deserialize_with = "lenient_text")]
    pub epic: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub relative_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub relation_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub house_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub age: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub booth_number: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub village: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub area: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub page_number: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub box_index: Option<i64>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_args() {
        assert!(PageRange::default().worker_args().is_empty());
        assert_eq!(PageRange::new(Some(3), None).worker_args(), vec!["3"]);
        assert_eq!(PageRange::new(Some(3), Some(9)).worker_args(), vec!["3", "9"]);
        assert_eq!(PageRange::new(None, Some(9)).worker_args(), vec!["1", "9"]);
    }

    #[test]
    fn test_check_rejects_inverted_and_zero_bounds() {
        assert!(PageRange::new(Some(5), Some(2)).check().is_err());
        assert!(PageRange::new(Some(0), None).check().is_err());
        assert!(PageRange::new(Some(2), Some(2)).check().is_ok());
        assert!(PageRange::default().check().is_ok());
    }

    #[test]
    fn test_voter_tolerates_ocr_noise() {
        let voter: ExtractedVoter = serde_json::from_str(
            r#"{"epic": " ABC1234567 ", "name": "Asha Devi", "age": "34",
                "houseNumber": 12, "gender": "", "pageNumber": 3, "boxIndex": "x",
                "originalText": "ignored"}"#,
        )
        .unwrap();
        assert_eq!(voter.epic.as_deref(), Some("ABC1234567"));
        assert_eq!(voter.age, Some(34));
        assert_eq!(voter.house_number.as_deref(), Some("12"));
        assert_eq!(voter.gender, None);
        assert_eq!(voter.page_number, Some(3));
        assert_eq!(voter.box_index, None);
    }
}
