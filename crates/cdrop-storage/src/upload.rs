//! Client for the upload and delete HTTP endpoints

use anyhow::Context;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use cdrop_core::config::ApiConfig;
use cdrop_core::{CdropError, CdropResult, Cid, PreparedUpload, UploadResponse};

/// Sends prepared envelopes to the upload endpoint and deletes stored files.
#[derive(Clone, Debug)]
pub struct UploadClient {
    client: reqwest::Client,
    upload_url: String,
    delete_url: String,
}

impl UploadClient {
    pub fn new(cfg: &ApiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self::with_client(client, cfg))
    }

    pub fn with_client(client: reqwest::Client, cfg: &ApiConfig) -> Self {
        let base = cfg.base_url.trim_end_matches('/');
        Self {
            client,
            upload_url: format!("{base}{}", cfg.upload_path),
            delete_url: format!("{base}{}", cfg.delete_path.trim_end_matches('/')),
        }
    }

    /// Submit one prepared upload and return the CID the server assigned.
    ///
    /// The form carries the envelope as `file` plus the descriptive fields
    /// `isEncrypted`, `originalName`, `originalType`, `originalSize` and
    /// `walletAddress`. Validation happens before anything is sent.
    pub async fn upload(&self, prepared: &PreparedUpload, wallet_address: &str) -> CdropResult<Cid> {
        let wallet_address = wallet_address.trim();
        if wallet_address.is_empty() {
            return Err(CdropError::validation("walletAddress", "owner address is required"));
        }
        if prepared.original_name.trim().is_empty() {
            return Err(CdropError::validation("originalName", "file name is required"));
        }

        let file_part = Part::text(prepared.envelope.clone())
            .file_name(prepared.wrapper_name.clone())
            .mime_str(&prepared.wrapper_type)
            .map_err(|e| CdropError::Upload {
                reason: format!("invalid wrapper content type: {e}"),
            })?;

        let form = Form::new()
            .part("file", file_part)
            .text("isEncrypted", "true")
            .text("originalName", prepared.original_name.clone())
            .text("originalType", prepared.original_type.clone())
            .text("originalSize", prepared.original_size.to_string())
            .text("walletAddress", wallet_address.to_string());

        debug!(
            url = %self.upload_url,
            name = %prepared.wrapper_name,
            envelope_len = prepared.envelope.len(),
            "submitting upload"
        );

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CdropError::Upload {
                reason: format!("upload request failed: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| CdropError::Upload {
            reason: format!("reading upload response: {e}"),
        })?;
        let parsed: Option<UploadResponse> = serde_json::from_str(&body).ok();

        let cid = match parsed {
            Some(UploadResponse {
                success: true,
                cid: Some(cid),
                ..
            }) if status.is_success() => cid,
            Some(UploadResponse { error: Some(error), .. }) => {
                return Err(CdropError::Upload {
                    reason: format!("server rejected upload ({status}): {error}"),
                })
            }
            Some(_) => {
                return Err(CdropError::Upload {
                    reason: format!("server did not return a cid ({status})"),
                })
            }
            None => {
                return Err(CdropError::Upload {
                    reason: format!("unexpected upload response ({status}): {body}"),
                })
            }
        };

        let cid = Cid::new(cid).map_err(|e| CdropError::Upload {
            reason: format!("server returned an unusable cid: {e}"),
        })?;
        info!(cid = %cid, name = %prepared.original_name, "upload complete");
        Ok(cid)
    }

    /// Ask the server to delete a stored file owned by `wallet_address`.
    pub async fn delete(&self, cid: &Cid, wallet_address: &str) -> CdropResult<()> {
        let wallet_address = wallet_address.trim();
        if wallet_address.is_empty() {
            return Err(CdropError::validation("walletAddress", "owner address is required"));
        }

        let url = format!("{}/{}", self.delete_url, cid);
        let response = self
            .client
            .delete(&url)
            .query(&[("walletAddress", wallet_address)])
            .send()
            .await
            .map_err(|e| CdropError::Upload {
                reason: format!("delete request failed: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| CdropError::Upload {
            reason: format!("reading delete response: {e}"),
        })?;

        match serde_json::from_str::<UploadResponse>(&body) {
            Ok(UploadResponse { success: true, .. }) if status.is_success() => {}
            Ok(UploadResponse { error: Some(error), .. }) => {
                return Err(CdropError::Upload {
                    reason: format!("delete of {cid} rejected ({status}): {error}"),
                })
            }
            Ok(_) => {
                return Err(CdropError::Upload {
                    reason: format!("delete of {cid} not confirmed ({status})"),
                })
            }
            Err(_) => {
                return Err(CdropError::Upload {
                    reason: format!("delete of {cid} rejected ({status}): {body}"),
                })
            }
        }

        info!(cid = %cid, "delete complete");
        Ok(())
    }
}
