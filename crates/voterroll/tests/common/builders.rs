//! Builders for intake requests and OCR results.

#![allow(dead_code)]

use voterroll::{ExtractedVoter, IntakeRequest, JobLocation, PageRange, UploadedDocument};

/// Builder for `IntakeRequest` instances.
pub struct IntakeBuilder {
    documents: Vec<UploadedDocument>,
    assembly_id: Option<i64>,
    location: JobLocation,
    expected_voters: Option<i64>,
    pages: PageRange,
}

impl IntakeBuilder {
    /// A request for assembly 7 with no documents yet.
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
            assembly_id: Some(7),
            location: JobLocation::default(),
            expected_voters: None,
            pages: PageRange::default(),
        }
    }

    /// Adds a small PDF-looking document.
    pub fn document(mut self, file_name: &str) -> Self {
        self.documents.push(UploadedDocument {
            file_name: file_name.to_string(),
            bytes: format!("%PDF-1.7 {}", file_name).into_bytes(),
        });
        self
    }

    pub fn assembly(mut self, assembly_id: Option<i64>) -> Self {
        self.assembly_id = assembly_id;
        self
    }

    pub fn booth(mut self, number: i64, name: &str) -> Self {
        self.location.booth_number = Some(number);
        self.location.booth_name = Some(name.to_string());
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.location.common_address = Some(address.to_string());
        self
    }

    pub fn expected_voters(mut self, expected: i64) -> Self {
        self.expected_voters = Some(expected);
        self
    }

    pub fn pages(mut self, start: Option<u32>, end: Option<u32>) -> Self {
        self.pages = PageRange::new(start, end);
        self
    }

    pub fn build(self) -> IntakeRequest {
        IntakeRequest {
            documents: self.documents,
            assembly_id: self.assembly_id,
            location: self.location,
            expected_voters: self.expected_voters,
            pages: self.pages,
        }
    }
}

/// A voter with a name and EPIC number and nothing else.
pub fn voter(name: &str) -> ExtractedVoter {
    ExtractedVoter {
        epic: Some(format!("EPC{:07}", name.len())),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

/// `count` anonymous voters on consecutive boxes of page 1.
pub fn voters(count: usize) -> Vec<ExtractedVoter> {
    (0..count)
        .map(|i| ExtractedVoter {
            box_index: Some(i as i64),
            page_number: Some(1),
            ..voter(&format!("Voter {}", i))
        })
        .collect()
}
