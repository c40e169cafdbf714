// DocServer over the embedded server's internal desktop endpoints.
//
//   POST /api/desktop/docs/<id>/open          {session, mode}    -> {handle}
//   POST /api/desktop/docs/<id>/plugins/wait  {handle}
//   POST /api/desktop/docs/<id>/import        {handle, uploadId}
//
// Calls carry the per-process credential as a bearer token.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gristdesk_common::types::DocId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{DocHandle, DocServer, OpenMode, SessionContext};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpDocServer {
    client: Client,
    home_url: Url,
    credential: String,
}

#[derive(Serialize)]
struct OpenRequest {
    session: SessionContext,
    mode: OpenMode,
}

#[derive(Deserialize)]
struct OpenResponse {
    handle: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HandleRequest<'a> {
    handle: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload_id: Option<i64>,
}

impl HttpDocServer {
    pub fn new(home_url: Url, credential: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().context("failed to build HTTP client")?;
        Ok(Self { client, home_url, credential: credential.into() })
    }

    fn endpoint(&self, doc_id: &DocId, action: &[&str]) -> Result<Url> {
        let mut url = self.home_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("home URL `{}` cannot be a base", self.home_url))?
            .pop_if_empty()
            .extend(["api", "desktop", "docs", doc_id.as_str()])
            .extend(action);
        Ok(url)
    }

    async fn post<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.credential)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to `{url}` failed"))?;
        response.error_for_status().with_context(|| format!("server rejected `{url}`"))
    }
}

#[async_trait]
impl DocServer for HttpDocServer {
    async fn open_doc(&self, session: SessionContext, doc_id: &DocId, mode: OpenMode) -> Result<DocHandle> {
        let url = self.endpoint(doc_id, &["open"])?;
        let response: OpenResponse = self
            .post(url, &OpenRequest { session, mode })
            .await?
            .json()
            .await
            .with_context(|| format!("invalid open response for document `{doc_id}`"))?;
        Ok(DocHandle { doc_id: doc_id.clone(), handle: response.handle })
    }

    async fn wait_plugins_ready(&self, handle: &DocHandle) -> Result<()> {
        let url = self.endpoint(&handle.doc_id, &["plugins", "wait"])?;
        self.post(url, &HandleRequest { handle: &handle.handle, upload_id: None }).await?;
        Ok(())
    }

    async fn import_upload(&self, handle: &DocHandle, upload_id: i64) -> Result<()> {
        let url = self.endpoint(&handle.doc_id, &["import"])?;
        self.post(url, &HandleRequest { handle: &handle.handle, upload_id: Some(upload_id) })
            .await
            .with_context(|| format!("import of upload {upload_id} into `{}` failed", handle.doc_id))?;
        Ok(())
    }
}
