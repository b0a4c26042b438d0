mod uploads;

pub use uploads::{StoredUpload, UploadStore};
