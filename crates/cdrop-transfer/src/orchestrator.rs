//! Decryption orchestrator: fetch + decrypt + cache for single files and
//! bulk listings.
//!
//! Bulk decryption runs in sequential groups of `batch_size` with a short
//! pause between groups, so at most `batch_size` fetches are in flight for a
//! batch. Items within a group run concurrently and fail independently.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cdrop_core::config::DecryptConfig;
use cdrop_core::{guess_type, CdropError, CdropResult, Cid, FileRef};
use cdrop_core::{ENCRYPTED_CONTENT_TYPE, ENCRYPTED_SUFFIX, OCTET_STREAM};
use cdrop_crypto::{decrypt_blocking, EncryptionKey};
use cdrop_storage::ObjectFetcher;

use crate::cache::{wait_for_outcome, Claim, DecryptState, DecryptionCache};
use crate::object_url::{DisplayUrl, ObjectUrlRegistry};

/// A URL taken out of the cache by `refresh`; revoked on drop.
struct SupersededUrl<'a> {
    urls: &'a ObjectUrlRegistry,
    url: DisplayUrl,
}

impl Drop for SupersededUrl<'_> {
    fn drop(&mut self) {
        if self.urls.revoke(&self.url) {
            debug!(url = %self.url, "superseded url revoked");
        }
    }
}

/// Progress callback type (items_done, items_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Items decrypted concurrently per group (clamped to at least 1).
    pub batch_size: usize,
    /// Pause between consecutive groups.
    pub batch_pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause: Duration::from_millis(100),
        }
    }
}

impl From<&DecryptConfig> for BatchConfig {
    fn from(cfg: &DecryptConfig) -> Self {
        Self {
            batch_size: cfg.batch_size,
            batch_pause: cfg.batch_pause(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Resolved(DisplayUrl),
    Failed(CdropError),
    /// The batch was cancelled before this item's group started.
    NotStarted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub cid: Cid,
    pub name: String,
    pub outcome: ItemOutcome,
}

/// Result of one [`DecryptionOrchestrator::decrypt_batch`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Size of each group that was started, in order.
    pub groups: Vec<usize>,
    pub items: Vec<BatchItem>,
    /// Refs filtered out: not encrypted, duplicated, or already resolved or
    /// in flight.
    pub skipped: Vec<Cid>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn resolved(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Resolved(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn not_started(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::NotStarted))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }
}

/// MIME type to render decrypted content as.
///
/// The recorded type wins unless it is absent, empty, or one of the opaque
/// types (`application/octet-stream`, `application/encrypted`); then the type
/// is guessed from the original name with any `.encrypted` suffix removed.
pub fn display_type(original_name: &str, original_type: Option<&str>) -> String {
    match original_type.map(str::trim) {
        Some(t) if !t.is_empty() && t != OCTET_STREAM && t != ENCRYPTED_CONTENT_TYPE => {
            t.to_string()
        }
        _ => {
            let name = original_name
                .strip_suffix(ENCRYPTED_SUFFIX)
                .unwrap_or(original_name);
            guess_type(name).to_string()
        }
    }
}

pub struct DecryptionOrchestrator<F> {
    fetcher: Arc<F>,
    cache: Arc<DecryptionCache>,
    config: BatchConfig,
}

impl<F> Clone for DecryptionOrchestrator<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
        }
    }
}

impl<F: ObjectFetcher> DecryptionOrchestrator<F> {
    pub fn new(fetcher: Arc<F>, cache: Arc<DecryptionCache>, config: BatchConfig) -> Self {
        Self {
            fetcher,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<DecryptionCache> {
        &self.cache
    }

    pub fn urls(&self) -> &Arc<ObjectUrlRegistry> {
        self.cache.urls()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn state(&self, cid: &Cid) -> DecryptState {
        self.cache.state(cid)
    }

    pub fn invalidate(&self, cid: &Cid) -> bool {
        self.cache.invalidate(cid)
    }

    /// Revoke every cached URL (view teardown / session end).
    pub fn clear(&self) -> usize {
        self.cache.clear()
    }

    /// Fetch and decrypt one file, or return its cached URL.
    ///
    /// Concurrent calls for the same CID share a single fetch. Dropping the
    /// returned future while it owns the fetch cancels it for every waiter.
    pub async fn decrypt_single(
        &self,
        cid: &Cid,
        key: &EncryptionKey,
        original_name: &str,
        original_type: Option<&str>,
    ) -> CdropResult<DisplayUrl> {
        match self.cache.claim(cid) {
            Claim::Resolved(url) => {
                debug!(cid = %cid, "decrypt cache hit");
                Ok(url)
            }
            Claim::Wait(rx) => {
                debug!(cid = %cid, "joining in-flight decrypt");
                wait_for_outcome(rx, cid).await
            }
            Claim::Owner(guard) => {
                let outcome = self
                    .fetch_and_decrypt(cid, key, original_name, original_type)
                    .await;
                guard.complete(&outcome);
                outcome
            }
        }
    }

    /// Force a fresh decrypt, revoking the previously cached URL.
    ///
    /// The old URL stays resolvable until the fresh decrypt settles or the
    /// returned future is dropped, whichever comes first.
    pub async fn refresh(
        &self,
        cid: &Cid,
        key: &EncryptionKey,
        original_name: &str,
        original_type: Option<&str>,
    ) -> CdropResult<DisplayUrl> {
        let superseded = self
            .cache
            .take_resolved(cid)
            .map(|url| SupersededUrl { urls: self.urls(), url });
        let outcome = self
            .decrypt_single(cid, key, original_name, original_type)
            .await;
        drop(superseded);
        outcome
    }

    /// Decrypt a file and write the plaintext to `dest`. Returns bytes written.
    pub async fn download(
        &self,
        cid: &Cid,
        key: &EncryptionKey,
        original_name: &str,
        original_type: Option<&str>,
        dest: &Path,
    ) -> anyhow::Result<u64> {
        let url = self
            .decrypt_single(cid, key, original_name, original_type)
            .await?;
        let blob = self
            .urls()
            .resolve(url.url())
            .with_context(|| format!("object url for {cid} was revoked before download"))?;

        tokio::fs::write(dest, &blob.bytes)
            .await
            .with_context(|| format!("writing {}", dest.display()))?;

        info!(cid = %cid, dest = %dest.display(), bytes = blob.bytes.len(), "downloaded");
        Ok(blob.bytes.len() as u64)
    }

    /// Decrypt every encrypted, not-yet-handled ref in `files`.
    ///
    /// Never fails as a whole: each item's outcome is recorded in the report.
    /// Cancelling `cancel` aborts the running group (those items fail with
    /// `Cancelled`) and marks the remaining items `NotStarted`.
    pub async fn decrypt_batch(
        &self,
        files: &[FileRef],
        key: &EncryptionKey,
        cancel: &CancellationToken,
    ) -> BatchReport {
        self.decrypt_batch_with_progress(files, key, cancel, None)
            .await
    }

    /// [`Self::decrypt_batch`], reporting after every finished group.
    pub async fn decrypt_batch_with_progress(
        &self,
        files: &[FileRef],
        key: &EncryptionKey,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for file in files {
            let wanted = file.is_encrypted()
                && seen.insert(file.cid.clone())
                && matches!(
                    self.cache.state(&file.cid),
                    DecryptState::Unrequested | DecryptState::Failed(_)
                );
            if wanted {
                targets.push(file);
            } else {
                report.skipped.push(file.cid.clone());
            }
        }

        let size = self.config.batch_size.max(1);
        info!(
            targets = targets.len(),
            skipped = report.skipped.len(),
            batch_size = size,
            "batch decrypt starting"
        );

        let total = targets.len() as u64;
        let group_count = targets.len().div_ceil(size);
        for (index, group) in targets.chunks(size).enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.batch_pause) => {}
                }
            }
            if cancel.is_cancelled() {
                report.items.extend(targets[index * size..].iter().map(|file| BatchItem {
                    cid: file.cid.clone(),
                    name: file.display_name().to_string(),
                    outcome: ItemOutcome::NotStarted,
                }));
                break;
            }

            report.groups.push(group.len());
            debug!(group = index + 1, items = group.len(), "batch group starting");

            let results =
                join_all(group.iter().map(|file| self.decrypt_item(file, key, cancel))).await;

            for (file, result) in group.iter().zip(results) {
                let outcome = match result {
                    Ok(url) => ItemOutcome::Resolved(url),
                    Err(e) => {
                        warn!(cid = %file.cid, name = %file.display_name(), error = %e, "batch item failed");
                        ItemOutcome::Failed(e)
                    }
                };
                report.items.push(BatchItem {
                    cid: file.cid.clone(),
                    name: file.display_name().to_string(),
                    outcome,
                });
            }

            if let Some(cb) = progress {
                cb(
                    report.items.len() as u64,
                    total,
                    &format!("group {}/{group_count}", index + 1),
                );
            }
        }

        report.cancelled = cancel.is_cancelled();
        info!(
            resolved = report.resolved(),
            failed = report.failed(),
            not_started = report.not_started(),
            cancelled = report.cancelled,
            "batch decrypt finished"
        );
        report
    }

    /// Run [`Self::decrypt_batch`] in the background.
    pub fn spawn_batch(
        &self,
        files: Vec<FileRef>,
        key: EncryptionKey,
        cancel: CancellationToken,
    ) -> JoinHandle<BatchReport> {
        let this = self.clone();
        tokio::spawn(async move { this.decrypt_batch(&files, &key, &cancel).await })
    }

    async fn decrypt_item(
        &self,
        file: &FileRef,
        key: &EncryptionKey,
        cancel: &CancellationToken,
    ) -> CdropResult<DisplayUrl> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CdropError::Cancelled { cid: file.cid.clone() }),
            result = self.decrypt_single(
                &file.cid,
                key,
                file.display_name(),
                file.original_type.as_deref(),
            ) => result,
        }
    }

    async fn fetch_and_decrypt(
        &self,
        cid: &Cid,
        key: &EncryptionKey,
        original_name: &str,
        original_type: Option<&str>,
    ) -> CdropResult<DisplayUrl> {
        let envelope = self.fetcher.fetch_text(cid).await?;
        let bytes = decrypt_blocking(envelope, key.clone())
            .await
            .map_err(|e| e.with_cid(cid))?;

        let mime = display_type(original_name, original_type);
        let url = self.urls().create(Bytes::from(bytes), &mime);
        info!(cid = %cid, mime = %mime, bytes = url.size(), "decrypted");
        Ok(url)
    }
}
