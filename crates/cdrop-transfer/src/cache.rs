//! Session-scoped decryption cache: CID → display URL, plus in-flight markers.
//!
//! Every CID has at most one slot, so a CID can never be both resolved and
//! pending. A pending slot is owned by exactly one [`PendingGuard`]; other
//! requests for the same CID subscribe to its outcome instead of fetching.
//!
//! Failed slots are bounded: past the failure limit the oldest failures are
//! forgotten, and a retry replaces a failed slot in place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::debug;

use cdrop_core::{CdropError, CdropResult, Cid};

use crate::object_url::{DisplayUrl, ObjectUrlRegistry};

pub(crate) type Outcome = CdropResult<DisplayUrl>;

type OutcomeRx = watch::Receiver<Option<Outcome>>;

enum Slot {
    Pending(OutcomeRx),
    Resolved(DisplayUrl),
    /// Last attempt failed. Kept for reporting only; a new request retries.
    Failed { error: CdropError, seq: u64 },
}

/// Failed slots retained before the oldest are evicted.
pub const DEFAULT_FAILURE_LIMIT: usize = 256;

/// Observable per-CID state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptState {
    Unrequested,
    Pending,
    Resolved(DisplayUrl),
    Failed(CdropError),
}

pub(crate) enum Claim<'a> {
    Resolved(DisplayUrl),
    Wait(OutcomeRx),
    Owner(PendingGuard<'a>),
}

pub struct DecryptionCache {
    slots: Mutex<HashMap<Cid, Slot>>,
    urls: Arc<ObjectUrlRegistry>,
    failure_limit: usize,
    failure_seq: AtomicU64,
}

impl DecryptionCache {
    pub fn new(urls: Arc<ObjectUrlRegistry>) -> Self {
        Self::with_failure_limit(urls, DEFAULT_FAILURE_LIMIT)
    }

    pub fn with_failure_limit(urls: Arc<ObjectUrlRegistry>, failure_limit: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            urls,
            failure_limit,
            failure_seq: AtomicU64::new(0),
        }
    }

    /// Registry holding the bytes behind cached URLs.
    pub fn urls(&self) -> &Arc<ObjectUrlRegistry> {
        &self.urls
    }

    pub fn state(&self, cid: &Cid) -> DecryptState {
        match self.lock().get(cid) {
            None => DecryptState::Unrequested,
            Some(Slot::Pending(_)) => DecryptState::Pending,
            Some(Slot::Resolved(url)) => DecryptState::Resolved(url.clone()),
            Some(Slot::Failed { error, .. }) => DecryptState::Failed(error.clone()),
        }
    }

    pub fn get(&self, cid: &Cid) -> Option<DisplayUrl> {
        match self.lock().get(cid) {
            Some(Slot::Resolved(url)) => Some(url.clone()),
            _ => None,
        }
    }

    /// Resolve from cache, join an in-flight request, or become its owner.
    pub(crate) fn claim(&self, cid: &Cid) -> Claim<'_> {
        let mut slots = self.lock();
        match slots.get(cid) {
            Some(Slot::Resolved(url)) => return Claim::Resolved(url.clone()),
            Some(Slot::Pending(rx)) => return Claim::Wait(rx.clone()),
            Some(Slot::Failed { .. }) | None => {}
        }

        let (tx, rx) = watch::channel(None);
        slots.insert(cid.clone(), Slot::Pending(rx));
        debug!(cid = %cid, "decrypt pending");
        Claim::Owner(PendingGuard {
            cache: self,
            cid: cid.clone(),
            tx,
            done: false,
        })
    }

    /// Remove a resolved or failed entry, revoking its URL.
    ///
    /// In-flight requests are left alone. Returns true if a URL was revoked.
    pub fn invalidate(&self, cid: &Cid) -> bool {
        let removed = {
            let mut slots = self.lock();
            if matches!(slots.get(cid), Some(Slot::Pending(_)) | None) {
                return false;
            }
            slots.remove(cid)
        };
        match removed {
            Some(Slot::Resolved(url)) => self.urls.revoke(&url),
            _ => false,
        }
    }

    /// Detach a resolved URL without revoking it, so the caller can revoke it
    /// once a replacement exists.
    pub(crate) fn take_resolved(&self, cid: &Cid) -> Option<DisplayUrl> {
        let mut slots = self.lock();
        if !matches!(slots.get(cid), Some(Slot::Resolved(_))) {
            return None;
        }
        match slots.remove(cid) {
            Some(Slot::Resolved(url)) => Some(url),
            _ => None,
        }
    }

    /// Revoke every cached URL and forget failures. Returns the number of
    /// URLs revoked. In-flight requests complete normally.
    pub fn clear(&self) -> usize {
        let mut revoked = Vec::new();
        self.lock().retain(|_, slot| match slot {
            Slot::Pending(_) => true,
            Slot::Resolved(url) => {
                revoked.push(url.clone());
                false
            }
            Slot::Failed { .. } => false,
        });

        for url in &revoked {
            self.urls.revoke(url);
        }
        debug!(revoked = revoked.len(), "decryption cache cleared");
        revoked.len()
    }

    pub fn resolved_len(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| matches!(s, Slot::Resolved(_)))
            .count()
    }

    pub fn failed_len(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| matches!(s, Slot::Failed { .. }))
            .count()
    }

    pub fn pending_len(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| matches!(s, Slot::Pending(_)))
            .count()
    }

    /// Drop the oldest failed slots beyond the failure limit.
    fn evict_failures(&self, slots: &mut HashMap<Cid, Slot>) {
        let mut failed: Vec<(u64, Cid)> = slots
            .iter()
            .filter_map(|(cid, slot)| match slot {
                Slot::Failed { seq, .. } => Some((*seq, cid.clone())),
                _ => None,
            })
            .collect();
        if failed.len() <= self.failure_limit {
            return;
        }

        failed.sort_unstable_by_key(|(seq, _)| *seq);
        let excess = failed.len() - self.failure_limit;
        for (_, cid) in failed.into_iter().take(excess) {
            slots.remove(&cid);
        }
        debug!(evicted = excess, "stale decrypt failures evicted");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Cid, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Ownership of a pending slot.
///
/// Dropping the guard without calling [`PendingGuard::complete`] returns the
/// CID to `Unrequested` and hands every waiter a `Cancelled` error.
pub(crate) struct PendingGuard<'a> {
    cache: &'a DecryptionCache,
    cid: Cid,
    tx: watch::Sender<Option<Outcome>>,
    done: bool,
}

impl PendingGuard<'_> {
    pub(crate) fn complete(mut self, outcome: &Outcome) {
        {
            let mut slots = self.cache.lock();
            match outcome {
                Ok(url) => {
                    slots.insert(self.cid.clone(), Slot::Resolved(url.clone()));
                }
                Err(e) => {
                    let seq = self.cache.failure_seq.fetch_add(1, Ordering::Relaxed);
                    slots.insert(
                        self.cid.clone(),
                        Slot::Failed {
                            error: e.clone(),
                            seq,
                        },
                    );
                    self.cache.evict_failures(&mut slots);
                }
            }
        }
        self.tx.send_replace(Some(outcome.clone()));
        self.done = true;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        {
            let mut slots = self.cache.lock();
            if matches!(slots.get(&self.cid), Some(Slot::Pending(_))) {
                slots.remove(&self.cid);
            }
        }
        self.tx.send_replace(Some(Err(CdropError::Cancelled {
            cid: self.cid.clone(),
        })));
        debug!(cid = %self.cid, "pending decrypt abandoned");
    }
}

/// Wait for the owner of a pending slot to publish its outcome.
pub(crate) async fn wait_for_outcome(mut rx: OutcomeRx, cid: &Cid) -> Outcome {
    let published = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
    match published {
        Ok(Some(outcome)) => outcome,
        _ => Err(CdropError::Cancelled { cid: cid.clone() }),
    }
}
