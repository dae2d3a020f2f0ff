use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Indexing,
    Indexed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Indexing => "indexing",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: DocumentStatus,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    pub file_type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentList {
    pub documents: Vec<DocumentSummary>,
    pub total: u64,
}

/// Query filter for document listing. Blank fields are never sent.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl DocumentFilter {
    /// Query pairs in wire order, skipping absent and empty values.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let candidates = [
            ("tenantSlug", self.tenant_slug.as_deref()),
            ("status", self.status.as_ref().map(DocumentStatus::as_str)),
            ("category", self.category.as_deref()),
        ];
        candidates
            .into_iter()
            .filter_map(|(key, value)| match value {
                Some(v) if !v.trim().is_empty() => Some((key, v)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub document_id: String,
    pub status: String,
    pub message: String,
}

/// Reply to delete and reindex.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchChunk {
    pub id: String,
    pub score: f64,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub chunks: Vec<SearchChunk>,
    pub max_score: f64,
    pub total: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    pub tenant_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl SearchParams {
    /// Checks a raw search body. Only the checked fields are read, so
    /// anything else the caller sent is left for the backend to judge.
    pub fn check_body(body: &Value) -> Result<(), String> {
        let view: SearchView<'_> = view_of(body)?;
        require_text("query", view.query.unwrap_or_default())?;
        require_text("tenantSlug", view.tenant_slug.unwrap_or_default())?;
        if view.top_k.is_some_and(|k| k < 1.0) {
            return Err("topK must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchView<'a> {
    #[serde(default, borrow)]
    query: Option<&'a str>,
    #[serde(default, borrow)]
    tenant_slug: Option<&'a str>,
    #[serde(default)]
    top_k: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Visitor,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn visitor(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Visitor,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call overrides of the tenant's assistant settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_response_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_display_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatParams {
    pub message: String,
    pub tenant_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<ChatTurn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ChatConfig>,
}

impl ChatParams {
    /// Checks a raw chat body; see [`SearchParams::check_body`].
    pub fn check_body(body: &Value) -> Result<(), String> {
        let view: ChatView<'_> = view_of(body)?;
        require_text("message", view.message.unwrap_or_default())?;
        require_text("tenantSlug", view.tenant_slug.unwrap_or_default())?;
        if let Some(threshold) = view.config.and_then(|c| c.confidence_threshold) {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("config.confidenceThreshold must be between 0 and 1".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatView<'a> {
    #[serde(default, borrow)]
    message: Option<&'a str>,
    #[serde(default, borrow)]
    tenant_slug: Option<&'a str>,
    #[serde(default)]
    config: Option<ChatConfigView>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatConfigView {
    #[serde(default)]
    confidence_threshold: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRef {
    pub chunk_id: String,
    pub score: f64,
    pub content: String,
    pub document_title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    pub response: String,
    pub confidence: f64,
    pub intent: String,
    pub should_escalate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    pub retrieved_chunks: Vec<ChunkRef>,
    pub token_usage: u64,
    #[serde(rename = "processingTime", alias = "processingTimeMs")]
    pub processing_time_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok,
    Degraded,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreState {
    Connected,
    Disconnected,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProviderState {
    Available,
    Unavailable,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub qdrant: VectorStoreState,
    pub gemini: ModelProviderState,
    pub timestamp: DateTime<Utc>,
}

/// The only failure body the gateway ever emits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

fn view_of<'a, T: Deserialize<'a>>(body: &'a Value) -> Result<T, String> {
    if !body.is_object() {
        return Err("request body must be a JSON object".to_string());
    }
    T::deserialize(body).map_err(|e| format!("invalid request body: {e}"))
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_skips_absent_and_blank_fields() {
        let filter = DocumentFilter {
            tenant_slug: Some("acme".into()),
            status: None,
            category: Some("  ".into()),
        };
        assert_eq!(filter.query_pairs(), vec![("tenantSlug", "acme")]);

        let full = DocumentFilter {
            tenant_slug: Some("acme".into()),
            status: Some(DocumentStatus::Indexed),
            category: Some("faq".into()),
        };
        assert_eq!(
            full.query_pairs(),
            vec![("tenantSlug", "acme"), ("status", "indexed"), ("category", "faq")]
        );
        assert!(DocumentFilter::default().query_pairs().is_empty());
    }

    #[test]
    fn test_document_summary_wire_names() {
        let summary: DocumentSummary = serde_json::from_value(json!({
            "id": "doc-1",
            "title": "Policy",
            "category": "general",
            "status": "failed",
            "chunkCount": 0,
            "createdAt": "2025-03-01T10:00:00Z",
            "errorMessage": "unsupported file type"
        }))
        .unwrap();
        assert_eq!(summary.status, DocumentStatus::Failed);
        assert_eq!(summary.indexed_at, None);
        assert_eq!(summary.error_message.as_deref(), Some("unsupported file type"));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let parsed = serde_json::from_value::<HealthReport>(json!({
            "status": "exploded",
            "qdrant": "connected",
            "gemini": "available",
            "timestamp": "2025-03-01T10:00:00Z"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_chat_result_keeps_processing_time_wire_name() {
        let wire = json!({
            "response": "Hi",
            "confidence": 0.9,
            "intent": "greeting",
            "shouldEscalate": false,
            "retrievedChunks": [],
            "tokenUsage": 12,
            "processingTime": 150
        });
        let result: ChatResult = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(result.processing_time_ms, 150);
        assert_eq!(serde_json::to_value(&result).unwrap(), wire);

        let aliased: ChatResult = serde_json::from_value(json!({
            "response": "Hi",
            "confidence": 0.9,
            "intent": "greeting",
            "shouldEscalate": true,
            "escalationReason": "low confidence",
            "retrievedChunks": [],
            "tokenUsage": 12,
            "processingTimeMs": 75
        }))
        .unwrap();
        assert_eq!(aliased.processing_time_ms, 75);
    }

    #[test]
    fn test_request_checks() {
        let err = SearchParams::check_body(&json!({
            "query": "refund",
            "tenantSlug": "acme",
            "topK": 0
        }))
        .unwrap_err();
        assert_eq!(err, "topK must be at least 1");

        let err = ChatParams::check_body(&json!({ "message": " ", "tenantSlug": "acme" }))
            .unwrap_err();
        assert_eq!(err, "message cannot be empty");

        let err = ChatParams::check_body(&json!({
            "message": "hi",
            "tenantSlug": "acme",
            "config": { "confidenceThreshold": 1.5 }
        }))
        .unwrap_err();
        assert_eq!(err, "config.confidenceThreshold must be between 0 and 1");

        let err = SearchParams::check_body(&json!(["refund"])).unwrap_err();
        assert_eq!(err, "request body must be a JSON object");
    }

    #[test]
    fn test_body_checks_ignore_unmodelled_fields() {
        assert!(
            SearchParams::check_body(&json!({
                "query": "refund",
                "tenantSlug": "acme",
                "minScore": 0.4
            }))
            .is_ok()
        );
        assert!(
            ChatParams::check_body(&json!({
                "message": "Hello",
                "tenantSlug": "acme",
                "visitorId": "v-1",
                "config": { "maxResponseLength": 500.5, "temperature": 0.2 }
            }))
            .is_ok()
        );
    }

    #[test]
    fn test_chat_params_omit_absent_fields() {
        let params = ChatParams {
            message: "Hello".into(),
            tenant_slug: "acme".into(),
            conversation_history: Some(vec![]),
            config: Some(ChatConfig {
                language: Some("vi".into()),
                ..ChatConfig::default()
            }),
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "message": "Hello",
                "tenantSlug": "acme",
                "conversationHistory": [],
                "config": { "language": "vi" }
            })
        );
    }
}
