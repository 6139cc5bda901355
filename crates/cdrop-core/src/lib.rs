pub mod config;
pub mod error;
pub mod mime;
pub mod types;

pub use error::{CdropError, CdropResult};
pub use mime::guess_type;
pub use types::{Cid, FileRef, PlaintextFile, PreparedUpload, UploadResponse};

/// Suffix appended to the wrapper artifact's name on upload.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Opaque content type of the wrapper artifact.
pub const ENCRYPTED_CONTENT_TYPE: &str = "application/encrypted";

/// Fallback MIME type for unknown content.
pub const OCTET_STREAM: &str = "application/octet-stream";
