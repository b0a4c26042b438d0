//! Parsing of OCR worker stdout.
//!
//! The worker prints one JSON array of voter objects, possibly wrapped
//! in progress chatter. Everything from the first `[` to the last `]`
//! is taken as the payload.

use serde_json::Value;

use super::ExtractedVoter;
use crate::error::ExtractError;

pub fn parse_worker_output(stdout: &str) -> Result<Vec<ExtractedVoter>, ExtractError> {
    let start = stdout
        .find('[')
        .ok_or_else(|| ExtractError::Parse("no JSON array in worker output".to_string()))?;
    let end = stdout
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| ExtractError::Parse("no JSON array in worker output".to_string()))?;

    let payload = &stdout[start..=end];
    let items: Vec<Value> = serde_json::from_str(payload)
        .map_err(|e| ExtractError::Parse(format!("invalid JSON array: {}", e)))?;

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(ExtractError::Parse(format!(
                    "record {} is not an object",
                    index
                )));
            }
            serde_json::from_value(item)
                .map_err(|e| ExtractError::Parse(format!("record {}: {}", index, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        let voters =
            parse_worker_output(r#"[{"name": "Asha"}, {"name": "Ravi", "age": 41}]"#).unwrap();
        assert_eq!(voters.len(), 2);
        assert_eq!(voters[1].age, Some(41));
    }

    #[test]
    fn test_array_between_diagnostics() {
        let stdout = "Loading model...\nPage 1/3 done\n[{\"epic\": \"XYZ0000001\"}]\nbye\n";
        let voters = parse_worker_output(stdout).unwrap();
        assert_eq!(voters.len(), 1);
        assert_eq!(voters[0].epic.as_deref(), Some("XYZ0000001"));
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert!(parse_worker_output("no voters found\n[]").unwrap().is_empty());
    }

    #[test]
    fn test_no_brackets() {
        let err = parse_worker_output("garbage text no brackets").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn test_reversed_brackets() {
        let err = parse_worker_output("] before [").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn test_invalid_json_between_brackets() {
        let err = parse_worker_output("[{name: Asha}]").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn test_non_object_record() {
        let err = parse_worker_output(r#"[{"name": "Asha"}, 42]"#).unwrap_err();
        assert!(err.to_string().contains("record 1"));
    }
}
