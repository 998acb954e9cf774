//! The unified search engine.
//!
//! A query fans out to three sub-indexes (error-code catalog, lexical FTS,
//! semantic vectors), attaches related resources, and merges everything
//! through the priority ranker. A failing sub-index degrades the result set
//! instead of failing the query; only a total blackout is an error.

use crate::codes::detect_error_codes;
use crate::error::{SearchError, SearchResult};
use crate::ranker::{merge_hits, PriorityPolicy};
use fixfinder_config::Config;
use fixfinder_core::{
    Chunk, EmbeddingModel, ErrorCodeRecord, ResourceHit, ResourceLink, ResourceType,
};
use fixfinder_db::Database;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Relevance assigned to resources attached by association rather than
/// matched by content. Keeps them at the bottom of their priority band.
const ASSOCIATED_RELEVANCE: f32 = 0.05;

const SNIPPET_LEN: usize = 160;

/// Produces a query vector for semantic search. Absent an embedder the
/// engine runs lexical and catalog search only.
pub trait QueryEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> SearchResult<Vec<f32>>;
}

/// A search request. `text` is required; everything else narrows or caps
/// the result set.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub manufacturer_id: Option<String>,
    pub series_id: Option<String>,
    pub doc_type: Option<ResourceType>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            manufacturer_id: None,
            series_id: None,
            doc_type: None,
            limit: None,
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

    pub fn with_doc_type(mut self, doc_type: ResourceType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct SearchEngine {
    db: Database,
    model: EmbeddingModel,
    default_limit: usize,
    similarity_threshold: f32,
    policy: PriorityPolicy,
    embedder: Option<Box<dyn QueryEmbedder>>,
}

impl SearchEngine {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            model: config.embedding.model(),
            default_limit: config.search.default_limit,
            similarity_threshold: config.search.similarity_threshold,
            policy: PriorityPolicy::new(config.ranking.clone()),
            embedder: None,
        }
    }

    /// Enable semantic search with the given embedder.
    pub fn with_embedder(mut self, embedder: Box<dyn QueryEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run a query across every available sub-index and return the merged,
    /// priority-ranked hits.
    pub fn search(&self, query: &SearchQuery) -> SearchResult<Vec<ResourceHit>> {
        if query.text.trim().is_empty() {
            return Err(SearchError::InvalidQuery("empty query".to_string()));
        }

        let limit = query.limit.unwrap_or(self.default_limit);
        let mut hits: Vec<ResourceHit> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        let mut attempted = 0usize;
        let mut documents: HashMap<String, Option<ResourceLink>> = HashMap::new();

        let codes = detect_error_codes(&query.text);
        if !codes.is_empty() {
            attempted += 1;
            match self.catalog_hits(&codes, query, &mut documents) {
                Ok(mut catalog) => hits.append(&mut catalog),
                Err(e) => {
                    warn!("Catalog lookup failed, continuing without it: {}", e);
                    failures.push(format!("catalog: {}", e));
                }
            }
        }

        attempted += 1;
        match self.lexical_hits(query, limit, &mut documents) {
            Ok(mut lexical) => hits.append(&mut lexical),
            Err(e) => {
                warn!("Lexical search failed, continuing without it: {}", e);
                failures.push(format!("lexical: {}", e));
            }
        }

        if let Some(embedder) = &self.embedder {
            attempted += 1;
            match self.semantic_hits(embedder.as_ref(), query, limit, &mut documents) {
                Ok(mut semantic) => hits.append(&mut semantic),
                Err(e) => {
                    warn!("Semantic search failed, continuing without it: {}", e);
                    failures.push(format!("semantic: {}", e));
                }
            }
        }

        if failures.len() == attempted {
            return Err(SearchError::AllIndexesUnavailable(failures.join("; ")));
        }

        // Attached resources ride along with whatever the indexes found
        match self.associated_hits(&hits, &documents) {
            Ok(mut associated) => hits.append(&mut associated),
            Err(e) => warn!("Attached-resource fetch failed: {}", e),
        }

        debug!(
            "Query '{}' produced {} raw hits across {} indexes",
            query.text,
            hits.len(),
            attempted
        );

        Ok(merge_hits(hits, limit))
    }

    fn catalog_hits(
        &self,
        codes: &[String],
        query: &SearchQuery,
        documents: &mut HashMap<String, Option<ResourceLink>>,
    ) -> SearchResult<Vec<ResourceHit>> {
        let mut hits = Vec::new();
        for code in codes {
            let records = self
                .db
                .find_error_codes(code, query.manufacturer_id.as_deref())?;
            for record in records {
                if let Some(hit) = self.catalog_hit(&record, query, documents)? {
                    hits.push(hit);
                }
            }
        }
        Ok(hits)
    }

    fn catalog_hit(
        &self,
        record: &ErrorCodeRecord,
        query: &SearchQuery,
        documents: &mut HashMap<String, Option<ResourceLink>>,
    ) -> SearchResult<Option<ResourceHit>> {
        // Catalog entries inherit the type of their source document
        let document = match record.source.document_id.as_deref() {
            Some(doc_id) => self.document(doc_id, documents)?,
            None => None,
        };
        let resource_type = document
            .as_ref()
            .map(|d| d.resource_type)
            .unwrap_or(ResourceType::Manual);

        if let Some(filter) = query.doc_type {
            if resource_type != filter {
                return Ok(None);
            }
        }
        if let Some(series) = query.series_id.as_deref() {
            let document_series = document.as_ref().and_then(|d| d.series_id.as_deref());
            if document_series != Some(series) {
                return Ok(None);
            }
        }

        let snippet = match &record.solution {
            Some(solution) => format!("{} Fix: {}", record.description, solution),
            None => record.description.clone(),
        };

        let mut hit = ResourceHit::new(
            resource_type,
            record.id.clone(),
            self.policy.priority_level(resource_type),
            record.confidence as f32,
        )
        .with_snippet(truncate_snippet(&snippet));

        if let Some(doc_id) = &record.source.document_id {
            hit = hit.with_document(doc_id.clone());
        }
        if let Some(chunk_id) = &record.source.chunk_id {
            hit = hit.with_chunk(chunk_id.clone());
        }
        if let Some(manufacturer_id) = &record.source.manufacturer_id {
            hit = hit.with_manufacturer(manufacturer_id.clone());
        }

        Ok(Some(hit))
    }

    fn lexical_hits(
        &self,
        query: &SearchQuery,
        limit: usize,
        documents: &mut HashMap<String, Option<ResourceLink>>,
    ) -> SearchResult<Vec<ResourceHit>> {
        let chunks = self.db.search_chunks(
            &query.text,
            query.manufacturer_id.as_deref(),
            query.doc_type,
            limit,
        )?;

        let mut hits = Vec::with_capacity(chunks.len());
        for (chunk, score) in chunks {
            if let Some(hit) = self.chunk_hit(&chunk, score, query.series_id.as_deref(), documents)? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    fn semantic_hits(
        &self,
        embedder: &dyn QueryEmbedder,
        query: &SearchQuery,
        limit: usize,
        documents: &mut HashMap<String, Option<ResourceLink>>,
    ) -> SearchResult<Vec<ResourceHit>> {
        let vector = embedder.embed(&query.text)?;
        let semantic =
            self.db
                .vector_search(&vector, &self.model, self.similarity_threshold, limit)?;

        let mut hits = Vec::new();
        for result in semantic {
            let Some(hit) = self.chunk_hit(
                &result.chunk,
                result.similarity,
                query.series_id.as_deref(),
                documents,
            )?
            else {
                continue;
            };

            // Vector search has no SQL-side filters; apply them here
            if let Some(manufacturer) = &query.manufacturer_id {
                if hit.manufacturer_id.as_deref() != Some(manufacturer.as_str()) {
                    continue;
                }
            }
            if let Some(filter) = query.doc_type {
                if hit.resource_type != filter {
                    continue;
                }
            }

            hits.push(hit);
        }
        Ok(hits)
    }

    fn chunk_hit(
        &self,
        chunk: &Chunk,
        relevance: f32,
        series_filter: Option<&str>,
        documents: &mut HashMap<String, Option<ResourceLink>>,
    ) -> SearchResult<Option<ResourceHit>> {
        let Some(document) = self.document(&chunk.document_id, documents)? else {
            // Orphaned chunk; nothing to attribute the hit to
            return Ok(None);
        };

        if let Some(series) = series_filter {
            if document.series_id.as_deref() != Some(series) {
                return Ok(None);
            }
        }

        let mut hit = ResourceHit::new(
            document.resource_type,
            chunk.id.clone(),
            self.policy.priority_level(document.resource_type),
            relevance,
        )
        .with_snippet(truncate_snippet(&chunk.text))
        .with_document(document.id.clone())
        .with_chunk(chunk.id.clone());

        if let Some(manufacturer_id) = &document.manufacturer_id {
            hit = hit.with_manufacturer(manufacturer_id.clone());
        }

        Ok(Some(hit))
    }

    /// Resources sharing an association with the hit set: parts, videos, and
    /// links attached to the documents and manufacturers already found.
    fn associated_hits(
        &self,
        hits: &[ResourceHit],
        documents: &HashMap<String, Option<ResourceLink>>,
    ) -> SearchResult<Vec<ResourceHit>> {
        let mut manufacturer_ids: Vec<String> = Vec::new();
        let mut series_ids: Vec<String> = Vec::new();
        let mut document_ids: Vec<String> = Vec::new();
        for hit in hits {
            if let Some(m) = &hit.manufacturer_id {
                if !manufacturer_ids.contains(m) {
                    manufacturer_ids.push(m.clone());
                }
            }
            if let Some(d) = &hit.document_id {
                if !document_ids.contains(d) {
                    document_ids.push(d.clone());
                }
                if let Some(Some(doc)) = documents.get(d) {
                    if let Some(s) = &doc.series_id {
                        if !series_ids.contains(s) {
                            series_ids.push(s.clone());
                        }
                    }
                }
            }
        }

        let related = self
            .db
            .related_resources(&manufacturer_ids, &series_ids, &document_ids)?;

        let hits = related
            .into_iter()
            .filter(|r| !r.resource_type.is_document())
            .map(|r| {
                let mut hit = ResourceHit::new(
                    r.resource_type,
                    r.id.clone(),
                    self.policy.priority_level(r.resource_type),
                    ASSOCIATED_RELEVANCE,
                )
                .with_snippet(r.title.clone());
                if let Some(d) = &r.document_id {
                    hit = hit.with_document(d.clone());
                }
                if let Some(m) = &r.manufacturer_id {
                    hit = hit.with_manufacturer(m.clone());
                }
                hit
            })
            .collect();

        Ok(hits)
    }

    fn document(
        &self,
        document_id: &str,
        cache: &mut HashMap<String, Option<ResourceLink>>,
    ) -> SearchResult<Option<ResourceLink>> {
        if let Some(cached) = cache.get(document_id) {
            return Ok(cached.clone());
        }

        let resolved = match self.db.get_resource(&document_id.to_string()) {
            Ok(resource) => Some(resource),
            Err(fixfinder_db::DbError::NotFound(_)) => None,
            Err(e) => return Err(SearchError::from(e)),
        };

        cache.insert(document_id.to_string(), resolved.clone());
        Ok(resolved)
    }
}

fn truncate_snippet(text: &str) -> String {
    if text.len() <= SNIPPET_LEN {
        return text.to_string();
    }
    let mut end = SNIPPET_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixfinder_core::{ChunkStatus, ErrorCodeSource};

    struct FixedEmbedder(Vec<f32>);

    impl QueryEmbedder for FixedEmbedder {
        fn embed(&self, _text: &str) -> SearchResult<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenEmbedder;

    impl QueryEmbedder for BrokenEmbedder {
        fn embed(&self, _text: &str) -> SearchResult<Vec<f32>> {
            Err(SearchError::Embedding("model unavailable".to_string()))
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.embedding.dimensions = 3;
        config
    }

    fn engine_with_fixtures() -> (SearchEngine, Database, ResourceLink, ResourceLink) {
        let db = Database::open_in_memory().unwrap();

        let manual = ResourceLink::new(ResourceType::Manual, "X100 service manual")
            .with_manufacturer("acme");
        db.create_resource(&manual).unwrap();

        let bulletin = ResourceLink::new(ResourceType::Bulletin, "TSB-17 fuser update")
            .with_manufacturer("acme");
        db.create_resource(&bulletin).unwrap();

        let manual_chunk = Chunk::new(
            manual.id.clone(),
            0,
            "The fuser unit must be replaced when error C-2801 appears repeatedly. \
             Remove the rear cover and disconnect the thermistor harness first.",
            fixfinder_db::content_hash(b"manual-chunk"),
        );
        db.create_chunk(&manual_chunk).unwrap();

        let bulletin_chunk = Chunk::new(
            bulletin.id.clone(),
            0,
            "Revised fuser replacement procedure superseding the manual section.",
            fixfinder_db::content_hash(b"bulletin-chunk"),
        );
        db.create_chunk(&bulletin_chunk).unwrap();

        let engine = SearchEngine::new(db.clone(), &test_config());
        (engine, db, manual, bulletin)
    }

    #[test]
    fn test_empty_query_rejected() {
        let (engine, _db, _m, _b) = engine_with_fixtures();
        let result = engine.search(&SearchQuery::new("   "));
        assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    }

    #[test]
    fn test_bulletin_band_precedes_manual_band() {
        let (engine, _db, manual, bulletin) = engine_with_fixtures();

        let hits = engine.search(&SearchQuery::new("fuser replacement")).unwrap();
        assert!(hits.len() >= 2);

        // The bulletin chunk leads no matter how the text scores shake out
        assert_eq!(hits[0].resource_type, ResourceType::Bulletin);
        assert_eq!(hits[0].document_id.as_deref(), Some(bulletin.id.as_str()));
        assert!(hits
            .iter()
            .any(|h| h.document_id.as_deref() == Some(manual.id.as_str())));
    }

    #[test]
    fn test_error_code_query_hits_catalog() {
        let (engine, db, manual, _bulletin) = engine_with_fixtures();

        let record = ErrorCodeRecord::new(
            "C-2801",
            "Fuser thermistor open circuit",
            ErrorCodeSource::from_document(manual.id.clone()).with_manufacturer("acme"),
        )
        .with_solution("Replace the fuser unit")
        .with_confidence(0.9);
        db.upsert_error_code_candidate(&record).unwrap();

        let hits = engine.search(&SearchQuery::new("what is C-2801")).unwrap();

        let catalog_hit = hits
            .iter()
            .find(|h| h.id == record.id)
            .expect("catalog record in results");
        assert!(catalog_hit.snippet.contains("thermistor"));
        assert!(catalog_hit.snippet.contains("Replace the fuser"));
    }

    #[test]
    fn test_manufacturer_filter() {
        let (engine, db, _manual, _bulletin) = engine_with_fixtures();

        let globex_manual = ResourceLink::new(ResourceType::Manual, "Globex G5 manual")
            .with_manufacturer("globex");
        db.create_resource(&globex_manual).unwrap();
        db.create_chunk(&Chunk::new(
            globex_manual.id.clone(),
            0,
            "Globex fuser assembly service notes.",
            fixfinder_db::content_hash(b"globex-chunk"),
        ))
        .unwrap();

        let hits = engine
            .search(&SearchQuery::new("fuser").with_manufacturer("globex"))
            .unwrap();

        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .all(|h| h.manufacturer_id.as_deref() == Some("globex")));
    }

    #[test]
    fn test_series_filter() {
        let (engine, db, _manual, _bulletin) = engine_with_fixtures();

        let series_manual = ResourceLink::new(ResourceType::Manual, "X200 series manual")
            .with_manufacturer("acme")
            .with_series("x200");
        db.create_resource(&series_manual).unwrap();
        db.create_chunk(&Chunk::new(
            series_manual.id.clone(),
            0,
            "X200 fuser alignment procedure.",
            fixfinder_db::content_hash(b"x200-chunk"),
        ))
        .unwrap();

        let hits = engine
            .search(&SearchQuery::new("fuser").with_series("x200"))
            .unwrap();

        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .all(|h| h.document_id.as_deref() == Some(series_manual.id.as_str())));
    }

    #[test]
    fn test_doc_type_filter() {
        let (engine, _db, _manual, _bulletin) = engine_with_fixtures();

        let hits = engine
            .search(&SearchQuery::new("fuser").with_doc_type(ResourceType::Bulletin))
            .unwrap();

        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .all(|h| h.resource_type == ResourceType::Bulletin));
    }

    #[test]
    fn test_semantic_hits_merge_in() {
        let (engine, db, manual, _bulletin) = engine_with_fixtures();

        let model = test_config().embedding.model();
        let chunks = db.get_chunks_by_document(&manual.id).unwrap();
        db.upsert_embedding(&chunks[0].id, &model, &[1.0, 0.0, 0.0])
            .unwrap();
        db.set_chunk_status(&chunks[0].id, ChunkStatus::Completed)
            .unwrap();

        let engine = engine.with_embedder(Box::new(FixedEmbedder(vec![1.0, 0.0, 0.0])));

        // A query with no lexical overlap still finds the embedded chunk
        let hits = engine.search(&SearchQuery::new("overheating symptoms")).unwrap();
        assert!(hits.iter().any(|h| h.chunk_id.as_deref() == Some(chunks[0].id.as_str())));
    }

    #[test]
    fn test_degrades_when_embedder_fails() {
        let (engine, _db, _manual, _bulletin) = engine_with_fixtures();
        let engine = engine.with_embedder(Box::new(BrokenEmbedder));

        // Lexical results still come back
        let hits = engine.search(&SearchQuery::new("fuser replacement")).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_all_indexes_failing_is_an_error() {
        let config = test_config();
        let db = Database::open_in_memory().unwrap();
        let engine = SearchEngine::new(db.clone(), &config)
            .with_embedder(Box::new(BrokenEmbedder));

        // Corrupt the FTS index so lexical search errors too
        {
            let conn = db.conn().unwrap();
            conn.execute_batch("DROP TABLE chunks_fts;").unwrap();
        }

        let result = engine.search(&SearchQuery::new("fuser"));
        assert!(matches!(result, Err(SearchError::AllIndexesUnavailable(_))));
    }

    #[test]
    fn test_associated_resources_trail_results() {
        let (engine, db, manual, _bulletin) = engine_with_fixtures();

        let part = ResourceLink::new(ResourceType::Part, "Fuser unit FU-100")
            .with_manufacturer("acme")
            .with_part_number("FU-100");
        db.create_resource(&part).unwrap();

        let video = ResourceLink::new(ResourceType::Video, "Fuser swap walkthrough")
            .with_document(manual.id.clone());
        db.create_resource(&video).unwrap();

        let hits = engine.search(&SearchQuery::new("fuser replacement")).unwrap();

        let part_pos = hits.iter().position(|h| h.id == part.id);
        let video_pos = hits.iter().position(|h| h.id == video.id);
        let manual_pos = hits
            .iter()
            .position(|h| h.document_id.as_deref() == Some(manual.id.as_str()));

        assert!(part_pos.is_some());
        assert!(video_pos.is_some());
        // Video band (3) sits between manual (2) and part (5)
        assert!(manual_pos.unwrap() < video_pos.unwrap());
        assert!(video_pos.unwrap() < part_pos.unwrap());
    }
}
