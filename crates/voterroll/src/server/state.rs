use crate::pipeline::ImportService;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: ImportService,
}

impl AppState {
    pub fn new(service: ImportService) -> Self {
        Self { service }
    }
}
