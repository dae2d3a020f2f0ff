//! Typed client for the gateway.
//!
//! This is the call surface application code uses to reach the backend. It
//! builds gateway URLs, picks the body encoding for each call and maps every
//! failure into a [`RequestFailure`].

use reqwest::{Method, RequestBuilder, Url, multipart};
use serde::de::DeserializeOwned;

use crate::api::routes::is_dot_segment;
use crate::data_models::{
    ActionOutcome, ChatParams, ChatResult, DocumentDetail, DocumentFilter, DocumentList,
    HealthReport, SearchParams, SearchResults, UploadReceipt,
};
use crate::error::RequestFailure;

/// A file attached to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Fields of a document upload. Callers should supply exactly one of
/// `content` or `file`; when both are present the file wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadFields {
    pub title: String,
    pub category: String,
    pub tenant_slug: String,
    pub content: Option<String>,
    pub file: Option<FilePart>,
}

impl UploadFields {
    /// Caller-side precondition check; [`ApiClient::upload_document`] does
    /// not run it.
    pub fn validate(&self) -> Result<(), RequestFailure> {
        if self.title.trim().is_empty() {
            return Err(RequestFailure::validation("title is required"));
        }
        if self.tenant_slug.trim().is_empty() {
            return Err(RequestFailure::validation("tenantSlug is required"));
        }
        let has_content = self
            .content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if !has_content && self.file.is_none() {
            return Err(RequestFailure::validation(
                "provide either content or a file",
            ));
        }
        Ok(())
    }

    fn into_form(self) -> Result<multipart::Form, RequestFailure> {
        let mut form = multipart::Form::new()
            .text("title", self.title)
            .text("category", self.category)
            .text("tenantSlug", self.tenant_slug);

        match (self.file, self.content) {
            (Some(file), _) => {
                let mut part = multipart::Part::bytes(file.bytes).file_name(file.file_name);
                if let Some(mime) = file.mime_type {
                    part = part.mime_str(&mime).map_err(|e| {
                        RequestFailure::validation(format!("invalid file mime type: {e}"))
                    })?;
                }
                form = form.part("file", part);
            }
            (None, Some(content)) if !content.trim().is_empty() => {
                form = form.text("content", content);
            }
            (None, _) => {}
        }
        Ok(form)
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    /// `base_url` is the gateway's public root, e.g. `http://localhost:3000/api`.
    pub fn new(base_url: &str) -> Result<Self, RequestFailure> {
        Self::with_http(base_url, reqwest::Client::new())
    }

    pub fn with_http(base_url: &str, http: reqwest::Client) -> Result<Self, RequestFailure> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RequestFailure::validation(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RequestFailure::validation(format!(
                "{base_url} cannot be used as a base url"
            )));
        }
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get_health(&self) -> Result<HealthReport, RequestFailure> {
        self.send(self.request(Method::GET, &["health"])).await
    }

    pub async fn list_documents(
        &self,
        filter: &DocumentFilter,
    ) -> Result<DocumentList, RequestFailure> {
        let mut url = self.endpoint(&["knowledge", "documents"]);
        let pairs = filter.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        self.send(self.http.get(url)).await
    }

    pub async fn get_document(&self, id: &str) -> Result<DocumentDetail, RequestFailure> {
        check_id(id)?;
        self.send(self.request(Method::GET, &["knowledge", "documents", id]))
            .await
    }

    pub async fn upload_document(
        &self,
        fields: UploadFields,
    ) -> Result<UploadReceipt, RequestFailure> {
        if fields.file.is_some() && fields.content.is_some() {
            log::debug!("upload has both content and file; sending the file only");
        }
        let form = fields.into_form()?;
        self.send(
            self.request(Method::POST, &["knowledge", "documents"])
                .multipart(form),
        )
        .await
    }

    pub async fn delete_document(&self, id: &str) -> Result<ActionOutcome, RequestFailure> {
        check_id(id)?;
        self.send(self.request(Method::DELETE, &["knowledge", "documents", id]))
            .await
    }

    pub async fn reindex_document(&self, id: &str) -> Result<ActionOutcome, RequestFailure> {
        check_id(id)?;
        self.send(self.request(Method::POST, &["knowledge", "reindex", id]))
            .await
    }

    pub async fn search(&self, params: &SearchParams) -> Result<SearchResults, RequestFailure> {
        self.send(
            self.request(Method::POST, &["knowledge", "search"])
                .json(params),
        )
        .await
    }

    pub async fn chat(&self, params: &ChatParams) -> Result<ChatResult, RequestFailure> {
        self.send(self.request(Method::POST, &["chat"]).json(params))
            .await
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http.request(method, self.endpoint(segments))
    }

    /// Appends `segments` to the base url, encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RequestFailure> {
        let response = request.send().await.map_err(|e| {
            log::warn!("gateway unreachable: {:#}", e);
            RequestFailure::network(e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(RequestFailure::network)?;

        if !status.is_success() {
            let failure = RequestFailure::backend(status, &body);
            log::warn!("{}", failure);
            return Err(failure);
        }

        serde_json::from_slice(&body).map_err(|e| {
            log::error!("unexpected response body: {:#}", e);
            RequestFailure::protocol(e)
        })
    }
}

/// Ids must survive as one path segment.
fn check_id(id: &str) -> Result<(), RequestFailure> {
    if id.trim().is_empty() {
        return Err(RequestFailure::validation("document id cannot be empty"));
    }
    if is_dot_segment(id) {
        return Err(RequestFailure::validation(format!(
            "{id:?} is not a valid document id"
        )));
    }
    Ok(())
}
