//! In-memory registry of revocable object URLs for decrypted content.
//!
//! URLs have the form `blob:cdrop/<uuid>`. Each one pins its bytes in memory
//! until revoked.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

const URL_PREFIX: &str = "blob:cdrop/";

/// Handle to decrypted bytes registered in an [`ObjectUrlRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayUrl {
    url: String,
    mime: String,
    size: u64,
}

impl DisplayUrl {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// MIME type the content should be rendered as.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for DisplayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Bytes and type behind a live URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectBlob {
    pub bytes: Bytes,
    pub mime: String,
}

#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    entries: Mutex<HashMap<String, ObjectBlob>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Bytes, mime: &str) -> DisplayUrl {
        let url = format!("{URL_PREFIX}{}", Uuid::new_v4());
        let size = bytes.len() as u64;
        self.lock().insert(
            url.clone(),
            ObjectBlob {
                bytes,
                mime: mime.to_string(),
            },
        );
        debug!(url = %url, mime = %mime, bytes = size, "object url created");
        DisplayUrl {
            url,
            mime: mime.to_string(),
            size,
        }
    }

    /// Look up a live URL. Revoked or unknown URLs resolve to `None`.
    pub fn resolve(&self, url: &str) -> Option<ObjectBlob> {
        self.lock().get(url).cloned()
    }

    /// Release a URL and its bytes. Returns false if it was not live.
    pub fn revoke(&self, url: &DisplayUrl) -> bool {
        let removed = self.lock().remove(url.url()).is_some();
        if removed {
            debug!(url = %url, "object url revoked");
        }
        removed
    }

    /// Number of live URLs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ObjectBlob>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
