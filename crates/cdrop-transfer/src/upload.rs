//! Upload preparation: encrypt a local file and package its metadata.

use std::path::Path;

use anyhow::Context;
use tracing::debug;

use cdrop_core::{guess_type, CdropError, CdropResult, PlaintextFile, PreparedUpload};
use cdrop_core::{ENCRYPTED_CONTENT_TYPE, ENCRYPTED_SUFFIX};
use cdrop_crypto::{encrypt, encrypt_blocking, EncryptionKey};

/// Encrypt `file` and wrap it as `<name>.encrypted` / `application/encrypted`.
///
/// The true name, type and size travel beside the envelope, never inside it.
/// An empty type is filled in from the file name.
pub fn prepare_upload(file: &PlaintextFile, key: &EncryptionKey) -> CdropResult<PreparedUpload> {
    validate_name(&file.original_name)?;
    let envelope = encrypt(&file.bytes, key)?;
    Ok(package(file, envelope))
}

/// [`prepare_upload`] with encryption on the blocking thread pool.
pub async fn prepare_upload_blocking(
    file: PlaintextFile,
    key: EncryptionKey,
) -> CdropResult<PreparedUpload> {
    validate_name(&file.original_name)?;
    let meta = PlaintextFile::new(file.original_name.clone(), file.original_type.clone(), Vec::new());
    let size = file.original_size();
    let envelope = encrypt_blocking(file.bytes, key).await?;

    let mut prepared = package(&meta, envelope);
    prepared.original_size = size;
    Ok(prepared)
}

/// Read a local file for upload, naming it after the path's final component
/// and typing it by extension.
pub async fn read_plaintext_file(path: &Path) -> anyhow::Result<PlaintextFile> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("path has no usable file name: {}", path.display()))?
        .to_string();

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let mime = guess_type(&name);
    debug!(path = %path.display(), bytes = bytes.len(), mime = %mime, "read plaintext file");
    Ok(PlaintextFile::new(name, mime, bytes))
}

fn validate_name(name: &str) -> CdropResult<()> {
    if name.trim().is_empty() {
        return Err(CdropError::validation("originalName", "file name is required"));
    }
    Ok(())
}

fn package(file: &PlaintextFile, envelope: String) -> PreparedUpload {
    let original_type = if file.original_type.trim().is_empty() {
        guess_type(&file.original_name).to_string()
    } else {
        file.original_type.clone()
    };

    PreparedUpload {
        envelope,
        wrapper_name: format!("{}{ENCRYPTED_SUFFIX}", file.original_name),
        wrapper_type: ENCRYPTED_CONTENT_TYPE.to_string(),
        original_name: file.original_name.clone(),
        original_type,
        original_size: file.original_size(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdrop_crypto::{decrypt, derive_key_from_private_key};

    fn key() -> EncryptionKey {
        derive_key_from_private_key("0xdeadbeef")
    }

    #[test]
    fn wrapper_carries_metadata_beside_envelope() {
        let file = PlaintextFile::new("photo.jpg", "image/jpeg", vec![9u8; 1000]);
        let prepared = prepare_upload(&file, &key()).unwrap();

        assert_eq!(prepared.wrapper_name, "photo.jpg.encrypted");
        assert_eq!(prepared.wrapper_type, "application/encrypted");
        assert_eq!(prepared.original_name, "photo.jpg");
        assert_eq!(prepared.original_type, "image/jpeg");
        assert_eq!(prepared.original_size, 1000);
        assert_eq!(decrypt(&prepared.envelope, &key()).unwrap(), vec![9u8; 1000]);
    }

    #[test]
    fn empty_file_prepares_and_roundtrips() {
        let file = PlaintextFile::new("empty.txt", "text/plain", Vec::new());
        let prepared = prepare_upload(&file, &key()).unwrap();

        assert_eq!(prepared.original_size, 0);
        assert!(decrypt(&prepared.envelope, &key()).unwrap().is_empty());
    }

    #[test]
    fn missing_type_is_inferred() {
        let file = PlaintextFile::new("notes.md", "", b"# hi".to_vec());
        let prepared = prepare_upload(&file, &key()).unwrap();
        assert_eq!(prepared.original_type, "text/markdown");
    }

    #[test]
    fn empty_name_is_rejected() {
        let file = PlaintextFile::new("  ", "text/plain", b"x".to_vec());
        let err = prepare_upload(&file, &key()).unwrap_err();
        assert!(matches!(err, CdropError::Validation { field: "originalName", .. }));
    }

    #[tokio::test]
    async fn blocking_variant_matches_metadata() {
        let file = PlaintextFile::new("data.csv", "text/csv", b"a,b\n1,2\n".to_vec());
        let prepared = prepare_upload_blocking(file, key()).await.unwrap();

        assert_eq!(prepared.wrapper_name, "data.csv.encrypted");
        assert_eq!(prepared.original_size, 8);
        assert_eq!(decrypt(&prepared.envelope, &key()).unwrap(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn read_plaintext_file_types_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        tokio::fs::write(&path, b"%PDF-1.7").await.unwrap();

        let file = read_plaintext_file(&path).await.unwrap();
        assert_eq!(file.original_name, "report.pdf");
        assert_eq!(file.original_type, "application/pdf");
        assert_eq!(file.original_size(), 8);
    }
}
