//! Document intake endpoint

use std::str::FromStr;

use axum::extract::{Multipart, State};

use crate::error::ImportError;
use crate::pipeline::{IntakeReceipt, IntakeRequest, UploadedDocument};
use crate::server::response::ApiResponse;
use crate::server::routes::run_blocking;
use crate::server::state::AppState;

/// POST /api/import - store documents and queue one job each
///
/// Every part with a file name is a document. Text parts carry the
/// metadata; empty values count as absent.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiResponse<IntakeReceipt>, ImportError> {
    let mut request = IntakeRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ImportError::validation(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field.bytes().await.map_err(|e| {
                ImportError::validation(format!("failed to read '{}': {}", file_name, e))
            })?;
            tracing::debug!(file = %file_name, bytes = bytes.len(), "Received document");
            request.documents.push(UploadedDocument {
                file_name,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ImportError::validation(format!("failed to read '{}': {}", name, e)))?;

        match name.as_str() {
            "assemblyId" => request.assembly_id = parse_number(&name, &value)?,
            "boothNumber" => request.location.booth_number = parse_number(&name, &value)?,
            "boothName" => request.location.booth_name = non_empty(value),
            "commonAddress" => request.location.common_address = non_empty(value),
            "expectedVoters" => request.expected_voters = parse_number(&name, &value)?,
            "startPage" => request.pages.start = parse_number(&name, &value)?,
            "endPage" => request.pages.end = parse_number(&name, &value)?,
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let service = state.service.clone();
    let receipt = run_blocking(move || service.submit(&request)).await?;
    Ok(ApiResponse::ok(receipt))
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<Option<T>, ImportError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ImportError::validation(format!("{} must be a number, got '{}'", field, trimmed)))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<i64>("assemblyId", " 7 ").unwrap(), Some(7));
        assert_eq!(parse_number::<i64>("assemblyId", "").unwrap(), None);
        assert!(parse_number::<u32>("startPage", "-1").is_err());
        assert!(parse_number::<i64>("boothNumber", "twelve").is_err());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  Rampur ".to_string()).as_deref(), Some("Rampur"));
        assert_eq!(non_empty("   ".to_string()), None);
    }
}
