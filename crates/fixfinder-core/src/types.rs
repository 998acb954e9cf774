//! Core domain types for Fixfinder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for content records.
pub type ContentId = String;

/// Unique identifier for chunks.
pub type ChunkId = String;

/// Unique identifier for resources (documents, videos, links, parts).
pub type ResourceId = String;

/// Unique identifier for ingestion tasks.
pub type TaskId = String;

/// Unique identifier for error-code records.
pub type ErrorCodeId = String;

/// Generate a new unique ID.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Normalize an error code for matching: uppercase, dashes and spaces
/// stripped, so `c-2801`, `C2801`, and `C-2801` all compare equal.
pub fn normalize_error_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// A content-addressed record of raw bytes.
///
/// Created on first sight of a byte sequence and never updated. The
/// `content_hash` (SHA-256 hex) uniquely identifies one record; re-submitting
/// identical bytes resolves to the existing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: ContentId,
    pub content_hash: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl ContentRecord {
    pub fn new(content_hash: impl Into<String>, size: i64) -> Self {
        Self {
            id: new_id(),
            content_hash: content_hash.into(),
            size,
            created_at: Utc::now(),
        }
    }
}

/// Processing status of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ChunkStatus::Pending),
            "completed" => Some(ChunkStatus::Completed),
            "failed" => Some(ChunkStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chunk of extracted document text.
///
/// The fingerprint is a SHA-256 of the text, unique per document, so
/// re-indexing identical content is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: ResourceId,
    pub chunk_index: i32,
    pub text: String,
    pub fingerprint: String,
    pub status: ChunkStatus,
}

impl Chunk {
    pub fn new(
        document_id: ResourceId,
        chunk_index: i32,
        text: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            document_id,
            chunk_index,
            text: text.into(),
            fingerprint: fingerprint.into(),
            status: ChunkStatus::Pending,
        }
    }
}

/// An embedding model with a fixed vector dimension.
///
/// Vectors whose length does not match `dimensions` are rejected at write
/// time, never truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub name: String,
    pub version: String,
    pub dimensions: usize,
}

impl EmbeddingModel {
    pub fn new(name: impl Into<String>, version: impl Into<String>, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dimensions,
        }
    }
}

/// Severity of a documented error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an error-code record was extracted from.
///
/// At least one reference must be present; records with an empty source are
/// rejected at write time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorCodeSource {
    pub chunk_id: Option<ChunkId>,
    pub document_id: Option<ResourceId>,
    pub manufacturer_id: Option<String>,
}

impl ErrorCodeSource {
    pub fn from_chunk(chunk_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            chunk_id: Some(chunk_id.into()),
            document_id: Some(document_id.into()),
            manufacturer_id: None,
        }
    }

    pub fn from_document(document_id: impl Into<String>) -> Self {
        Self {
            chunk_id: None,
            document_id: Some(document_id.into()),
            manufacturer_id: None,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer_id: impl Into<String>) -> Self {
        self.manufacturer_id = Some(manufacturer_id.into());
        self
    }

    /// True when no reference is set at all.
    pub fn is_empty(&self) -> bool {
        self.chunk_id.is_none() && self.document_id.is_none() && self.manufacturer_id.is_none()
    }
}

/// A structured record linking an error code to its description and remedy.
///
/// Records are never hard-deleted; superseded entries are marked via
/// `superseded_by` to preserve the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCodeRecord {
    pub id: ErrorCodeId,
    pub error_code: String,
    pub description: String,
    pub solution: Option<String>,
    pub severity: Severity,
    pub confidence: f64,
    pub source: ErrorCodeSource,
    pub verified: bool,
    pub verified_by: Option<String>,
    pub ai_extracted: bool,
    pub superseded_by: Option<ErrorCodeId>,
    pub created_at: DateTime<Utc>,
}

impl ErrorCodeRecord {
    pub fn new(
        error_code: impl Into<String>,
        description: impl Into<String>,
        source: ErrorCodeSource,
    ) -> Self {
        Self {
            id: new_id(),
            error_code: error_code.into(),
            description: description.into(),
            solution: None,
            severity: Severity::default(),
            confidence: 0.5,
            source,
            verified: false,
            verified_by: None,
            ai_extracted: false,
            superseded_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn ai_extracted(mut self) -> Self {
        self.ai_extracted = true;
        self
    }
}

/// Type of a retrievable resource.
///
/// This is a closed set; the authority ordering over these types is a
/// property of the type (see the ranking policy), never computed per
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Bulletin,
    Manual,
    Video,
    Link,
    Part,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Bulletin => "bulletin",
            ResourceType::Manual => "manual",
            ResourceType::Video => "video",
            ResourceType::Link => "link",
            ResourceType::Part => "part",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bulletin" => Some(ResourceType::Bulletin),
            "manual" => Some(ResourceType::Manual),
            "video" => Some(ResourceType::Video),
            "link" => Some(ResourceType::Link),
            "part" => Some(ResourceType::Part),
            _ => None,
        }
    }

    /// All resource types, in default authority order.
    pub fn all() -> [ResourceType; 5] {
        [
            ResourceType::Bulletin,
            ResourceType::Manual,
            ResourceType::Video,
            ResourceType::Link,
            ResourceType::Part,
        ]
    }

    /// True for types that carry document text (chunks reference these).
    pub fn is_document(&self) -> bool {
        matches!(self, ResourceType::Bulletin | ResourceType::Manual)
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A retrievable resource: service bulletin, manual, video, external link,
/// or spare part, under one common shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLink {
    pub id: ResourceId,
    pub resource_type: ResourceType,
    pub title: String,
    pub manufacturer_id: Option<String>,
    pub series_id: Option<String>,
    /// For videos/links/parts: the document they are attached to.
    pub document_id: Option<ResourceId>,
    /// For bulletins/manuals: the stored raw bytes.
    pub content_id: Option<ContentId>,
    pub url: Option<String>,
    pub part_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResourceLink {
    pub fn new(resource_type: ResourceType, title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            resource_type,
            title: title.into(),
            manufacturer_id: None,
            series_id: None,
            document_id: None,
            content_id: None,
            url: None,
            part_number: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer_id: impl Into<String>) -> Self {
        self.manufacturer_id = Some(manufacturer_id.into());
        self
    }

    pub fn with_series(mut self, series_id: impl Into<String>) -> Self {
        self.series_id = Some(series_id.into());
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_content(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_part_number(mut self, part_number: impl Into<String>) -> Self {
        self.part_number = Some(part_number.into());
        self
    }

    /// True when the resource has no association at all (rejected at write
    /// time for non-document types).
    pub fn has_association(&self) -> bool {
        self.manufacturer_id.is_some() || self.series_id.is_some() || self.document_id.is_some()
    }
}

/// Type of ingestion work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    IngestDocument,
    ChunkDocument,
    EmbedChunk,
    ExtractErrorCodes,
    IngestImage,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::IngestDocument => "ingest_document",
            TaskType::ChunkDocument => "chunk_document",
            TaskType::EmbedChunk => "embed_chunk",
            TaskType::ExtractErrorCodes => "extract_error_codes",
            TaskType::IngestImage => "ingest_image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ingest_document" => Some(TaskType::IngestDocument),
            "chunk_document" => Some(TaskType::ChunkDocument),
            "embed_chunk" => Some(TaskType::EmbedChunk),
            "extract_error_codes" => Some(TaskType::ExtractErrorCodes),
            "ingest_image" => Some(TaskType::IngestImage),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of an ingestion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work in the ingestion queue.
///
/// State machine: pending -> processing -> {completed | failed}. A failure
/// below the retry cap re-queues the task as pending with backoff; at the
/// cap it is terminally failed (dead letter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTask {
    pub id: TaskId,
    pub task_type: TaskType,
    pub target_ref: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_secs: i64,
    pub cancel_requested: bool,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IngestionTask {
    pub fn new(task_type: TaskType, target_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            task_type,
            target_ref: target_ref.into(),
            priority: 0,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            timeout_secs: 300,
            cancel_requested: false,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: i64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Operation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Insert => "insert",
            AuditOperation::Update => "update",
            AuditOperation::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Some(AuditOperation::Insert),
            "update" => Some(AuditOperation::Update),
            "delete" => Some(AuditOperation::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An append-only record of a mutation to a tracked store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub entity_name: String,
    pub entity_id: String,
    pub operation: AuditOperation,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// The unified result type returned by the ranker.
///
/// `priority_level` is the authority ordinal of the resource type (1 = most
/// authoritative); `relevance_score` only orders hits within the same level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceHit {
    pub resource_type: ResourceType,
    pub id: ResourceId,
    pub priority_level: u8,
    pub relevance_score: f32,
    pub snippet: String,
    pub document_id: Option<ResourceId>,
    pub chunk_id: Option<ChunkId>,
    pub manufacturer_id: Option<String>,
}

impl ResourceHit {
    pub fn new(
        resource_type: ResourceType,
        id: impl Into<String>,
        priority_level: u8,
        relevance_score: f32,
    ) -> Self {
        Self {
            resource_type,
            id: id.into(),
            priority_level,
            relevance_score,
            snippet: String::new(),
            document_id: None,
            chunk_id: None,
            manufacturer_id: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_chunk(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer_id: impl Into<String>) -> Self {
        self.manufacturer_id = Some(manufacturer_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_roundtrip() {
        for rt in ResourceType::all() {
            assert_eq!(ResourceType::from_str(rt.as_str()), Some(rt));
        }
        assert_eq!(ResourceType::from_str("poster"), None);
        assert!(ResourceType::Bulletin.is_document());
        assert!(!ResourceType::Part.is_document());
    }

    #[test]
    fn test_task_defaults() {
        let task = IngestionTask::new(TaskType::ExtractErrorCodes, "chunk-1")
            .with_priority(2)
            .with_max_retries(5);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_retries, 5);
        assert_eq!(task.priority, 2);
        assert!(!task.status.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_error_code_source_validation() {
        let empty = ErrorCodeSource::default();
        assert!(empty.is_empty());

        let from_doc = ErrorCodeSource::from_document("doc-1");
        assert!(!from_doc.is_empty());
    }

    #[test]
    fn test_confidence_clamped() {
        let record = ErrorCodeRecord::new("C-2801", "Paper jam", ErrorCodeSource::from_document("d"))
            .with_confidence(1.7);
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn test_normalize_error_code() {
        assert_eq!(normalize_error_code("c-2801"), "C2801");
        assert_eq!(normalize_error_code("C 2801"), "C2801");
        assert_eq!(normalize_error_code("SC542"), "SC542");
    }

    #[test]
    fn test_resource_association() {
        let part = ResourceLink::new(ResourceType::Part, "Fuser unit");
        assert!(!part.has_association());

        let part = part.with_manufacturer("mfr-1");
        assert!(part.has_association());
    }
}
