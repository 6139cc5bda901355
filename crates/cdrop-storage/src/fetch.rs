//! Ciphertext retrieval by content identifier

use std::future::Future;

use opendal::{ErrorKind, Operator};
use tracing::debug;

use cdrop_core::{CdropError, CdropResult, Cid};

/// Retrieves the textual envelope stored under a CID.
pub trait ObjectFetcher: Send + Sync + 'static {
    fn fetch_text(&self, cid: &Cid) -> impl Future<Output = CdropResult<String>> + Send;
}

/// [`ObjectFetcher`] over any OpenDAL operator.
///
/// Objects live at `<cid>` under the operator root, or at `<prefix>/<cid>`
/// when a key prefix is set (S3 buckets).
#[derive(Clone, Debug)]
pub struct OperatorFetcher {
    op: Operator,
    prefix: Option<String>,
}

impl OperatorFetcher {
    pub fn new(op: Operator) -> Self {
        Self { op, prefix: None }
    }

    pub fn with_prefix(op: Operator, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_matches('/');
        Self {
            op,
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
        }
    }

    /// Object path for a CID.
    pub fn path_for(&self, cid: &Cid) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{cid}"),
            None => cid.to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }
}

impl ObjectFetcher for OperatorFetcher {
    async fn fetch_text(&self, cid: &Cid) -> CdropResult<String> {
        let path = self.path_for(cid);
        debug!(cid = %cid, path = %path, "fetching envelope");

        let buf = self.op.read(&path).await.map_err(|e| CdropError::Fetch {
            cid: cid.clone(),
            retryable: !matches!(
                e.kind(),
                ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::ConfigInvalid
            ),
            reason: e.to_string(),
        })?;

        let bytes = buf.to_vec();
        debug!(cid = %cid, bytes = bytes.len(), "fetched envelope");

        String::from_utf8(bytes).map_err(|_| {
            CdropError::decryption("stored object is not a text envelope").with_cid(cid)
        })
    }
}
