//! cdrop-transfer: upload preparation and the decryption orchestrator
//!
//! Upload: `PlaintextFile` → [`prepare_upload`] → `PreparedUpload` →
//! `cdrop_storage::UploadClient::upload` → `Cid`.
//!
//! Display: `Cid` → [`DecryptionOrchestrator`] (fetch, decrypt, cache) →
//! revocable [`DisplayUrl`] held in an [`ObjectUrlRegistry`].

pub mod cache;
pub mod object_url;
pub mod orchestrator;
pub mod upload;

pub use cache::{DecryptState, DecryptionCache, DEFAULT_FAILURE_LIMIT};
pub use object_url::{DisplayUrl, ObjectBlob, ObjectUrlRegistry};
pub use orchestrator::{
    display_type, BatchConfig, BatchItem, BatchReport, DecryptionOrchestrator, ItemOutcome,
    ProgressFn,
};
pub use upload::{prepare_upload, prepare_upload_blocking, read_plaintext_file};
