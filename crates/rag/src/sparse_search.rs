//! Keyword Search Adapter (C3, §4.2), backed by Tantivy BM25.
//!
//! Accepts the same `(query, limit, prefilter)` shape as the vector adapter
//! (§4.2) so the fusion engine can treat both result sets uniformly. Tantivy
//! has no native filtered-search API matching qdrant's payload filter, so the
//! prefilter here is applied as a post-search pass using the same
//! [`AccessFilter`] conditions rather than pushed into the query itself —
//! documented in DESIGN.md as a store-specific adaptation, not a semantic gap.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};

use ragcore_core::{Passage, PassagePayload, SearchType};

use crate::access_filter::{AccessFilter, FilterCondition};
use crate::RagError;

#[derive(Debug, Clone)]
pub struct SparseIndexConfig {
    pub index_path: Option<String>,
    pub top_k: usize,
    pub stemming: bool,
    pub language: String,
}

impl Default for SparseIndexConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            top_k: 20,
            stemming: true,
            language: "en".to_string(),
        }
    }
}

impl From<&ragcore_config::SparseIndexConfig> for SparseIndexConfig {
    fn from(cfg: &ragcore_config::SparseIndexConfig) -> Self {
        Self {
            index_path: Some(cfg.index_path.clone()),
            top_k: 20,
            stemming: true,
            language: "en".to_string(),
        }
    }
}

/// A document to be indexed. Mirrors the fields of [`PassagePayload`] that
/// the sparse index stores for retrieval.
#[derive(Debug, Clone)]
pub struct SparseDocument {
    pub id: String,
    pub content: String,
    pub tenant_id: String,
    pub doc_id: String,
    pub acl: Vec<String>,
    pub language: String,
    pub section_path: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Keyword search index. One index serves all tenants; tenant/ACL isolation
/// is enforced by the prefilter applied in [`SparseIndex::search`], the same
/// invariant the vector adapter upholds (§4.2, §8, §9).
#[allow(dead_code)]
pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<Option<IndexWriter>>,
    schema: Schema,
    id_field: Field,
    content_field: Field,
    title_field: Field,
    tenant_field: Field,
    doc_id_field: Field,
    acl_field: Field,
    language_field: Field,
    section_path_field: Field,
    url_field: Field,
    config: SparseIndexConfig,
}

impl SparseIndex {
    pub fn new(config: SparseIndexConfig) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("multilingual")
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let content_field = schema_builder.add_text_field("content", text_options.clone());
        let title_field = schema_builder.add_text_field("title", text_options);
        let tenant_field = schema_builder.add_text_field("tenant_id", STRING | STORED);
        let doc_id_field = schema_builder.add_text_field("doc_id", STRING | STORED);
        let acl_field = schema_builder.add_text_field("acl", STRING | STORED);
        let language_field = schema_builder.add_text_field("language", STRING | STORED);
        let section_path_field = schema_builder.add_text_field("section_path", STRING | STORED);
        let url_field = schema_builder.add_text_field("url", STRING | STORED);

        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RagError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema.clone()).map_err(|e| RagError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema.clone())
        };

        let tokenizer = Self::build_tokenizer(&config);
        index.tokenizers().register("multilingual", tokenizer);

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;
        let writer = index.writer(50_000_000).map_err(|e| RagError::Index(e.to_string()))?;

        tracing::info!(
            language = %config.language,
            stemming = config.stemming,
            "sparse index created"
        );

        Ok(Self {
            index,
            reader,
            writer: RwLock::new(Some(writer)),
            schema,
            id_field,
            content_field,
            title_field,
            tenant_field,
            doc_id_field,
            acl_field,
            language_field,
            section_path_field,
            url_field,
            config,
        })
    }

    fn build_tokenizer(config: &SparseIndexConfig) -> TextAnalyzer {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);

        if config.stemming && config.language == "en" {
            base.filter(Stemmer::new(Language::English)).build()
        } else {
            if config.language != "en" {
                tracing::warn!(language = %config.language, "no stemmer for language, using simple tokenization");
            }
            base.build()
        }
    }

    pub fn index_documents(&self, documents: &[SparseDocument]) -> Result<(), RagError> {
        let mut writer = self.writer.write();
        let writer = writer.as_mut().ok_or_else(|| RagError::Index("writer not available".to_string()))?;

        for doc in documents {
            let mut tantivy_doc = TantivyDocument::default();
            tantivy_doc.add_text(self.id_field, &doc.id);
            tantivy_doc.add_text(self.content_field, &doc.content);
            tantivy_doc.add_text(self.tenant_field, &doc.tenant_id);
            tantivy_doc.add_text(self.doc_id_field, &doc.doc_id);
            tantivy_doc.add_text(self.language_field, &doc.language);
            for acl_entry in &doc.acl {
                tantivy_doc.add_text(self.acl_field, acl_entry);
            }
            if let Some(ref title) = doc.title {
                tantivy_doc.add_text(self.title_field, title);
            }
            if let Some(ref section_path) = doc.section_path {
                tantivy_doc.add_text(self.section_path_field, section_path);
            }
            if let Some(ref url) = doc.url {
                tantivy_doc.add_text(self.url_field, url);
            }

            writer.add_document(tantivy_doc).map_err(|e| RagError::Index(e.to_string()))?;
        }

        writer.commit().map_err(|e| RagError::Index(e.to_string()))?;
        self.reader.reload().map_err(|e| RagError::Index(e.to_string()))?;
        Ok(())
    }

    /// Run BM25 search, then drop any hit failing the prefilter (§4.2). Tantivy
    /// has no native boolean-filter API matching qdrant's, so `limit` is
    /// over-fetched by a small factor to absorb the post-filter drop rate.
    pub fn search(&self, query: &str, limit: usize, filter: Option<&AccessFilter>) -> Result<Vec<Passage>, RagError> {
        let over_fetch = limit.saturating_mul(3).max(limit);

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field, self.title_field]);
        let parsed_query = query_parser.parse_query(query).map_err(|e| RagError::Search(e.to_string()))?;

        let top_docs = searcher
            .search(&parsed_query, &TopDocs::with_limit(over_fetch))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address).map_err(|e| RagError::Search(e.to_string()))?;
            let passage = self.doc_to_passage(&doc, score);
            if filter.map(|f| passes_filter(&passage, f)).unwrap_or(true) {
                results.push(passage);
            }
            if results.len() >= limit {
                break;
            }
        }

        Ok(results)
    }

    fn doc_to_passage(&self, doc: &TantivyDocument, score: f32) -> Passage {
        let get_str = |field: Field| -> String {
            doc.get_first(field)
                .and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_default()
        };
        let get_str_vec = |field: Field| -> Vec<String> {
            doc.get_all(field)
                .filter_map(|v| match v {
                    OwnedValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        };
        let get_opt_str = |field: Field| -> Option<String> {
            let s = get_str(field);
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        };

        let id = get_str(self.id_field);
        let content = get_str(self.content_field);
        let tenant_id = get_str(self.tenant_field);
        let doc_id = get_str(self.doc_id_field);
        let acl = get_str_vec(self.acl_field);
        let mut language = get_str(self.language_field);
        if language.is_empty() {
            language = "en".to_string();
        }
        let section_path = get_opt_str(self.section_path_field);
        let url = get_opt_str(self.url_field);
        let title = get_opt_str(self.title_field);

        Passage {
            id,
            content,
            vector_score: None,
            keyword_score: Some(score),
            fused_score: None,
            reranker_score: None,
            final_score: score,
            search_type: SearchType::KeywordOnly,
            payload: PassagePayload {
                tenant_id,
                doc_id,
                acl,
                language,
                section_path,
                created_at: chrono::Utc::now(),
                modified_at: chrono::Utc::now(),
                url,
                title,
            },
        }
    }

    pub fn delete(&self, ids: &[String]) -> Result<(), RagError> {
        let mut writer = self.writer.write();
        let writer = writer.as_mut().ok_or_else(|| RagError::Index("writer not available".to_string()))?;

        for id in ids {
            writer.delete_term(Term::from_field_text(self.id_field, id));
        }
        writer.commit().map_err(|e| RagError::Index(e.to_string()))?;
        self.reader.reload().map_err(|e| RagError::Index(e.to_string()))?;
        Ok(())
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

/// Apply the same flat-conjunction semantics as the qdrant prefilter, against
/// an already-materialized passage.
fn passes_filter(passage: &Passage, filter: &AccessFilter) -> bool {
    filter.conditions().iter().all(|condition| match condition {
        FilterCondition::Equals { field, value } => field_equals(passage, field, value),
        FilterCondition::OneOf { field, values } => field_one_of(passage, field, values),
    })
}

fn field_equals(passage: &Passage, field: &str, value: &str) -> bool {
    match field {
        "tenant_id" => passage.payload.tenant_id == value,
        "doc_id" => passage.payload.doc_id == value,
        "language" => passage.payload.language == value,
        _ => true,
    }
}

fn field_one_of(passage: &Passage, field: &str, values: &[String]) -> bool {
    match field {
        "acl" => passage.payload.acl.iter().any(|a| values.contains(a)),
        "language" => values.contains(&passage.payload.language),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str, tenant_id: &str) -> SparseDocument {
        SparseDocument {
            id: id.to_string(),
            content: content.to_string(),
            tenant_id: tenant_id.to_string(),
            doc_id: format!("doc-{id}"),
            acl: vec!["public".to_string()],
            language: "en".to_string(),
            section_path: None,
            url: None,
            title: None,
        }
    }

    #[test]
    fn index_and_search_roundtrip() {
        let index = SparseIndex::new(SparseIndexConfig::default()).unwrap();
        index
            .index_documents(&[
                doc("1", "gold loan interest rate is ten percent per annum", "tenant-a"),
                doc("2", "apply for a gold loan online easily", "tenant-a"),
            ])
            .unwrap();
        assert_eq!(index.doc_count(), 2);

        let results = index.search("interest rate", 5, None).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "1");
    }

    #[test]
    fn prefilter_drops_cross_tenant_hits() {
        let index = SparseIndex::new(SparseIndexConfig::default()).unwrap();
        index
            .index_documents(&[
                doc("1", "interest rate policy document", "tenant-a"),
                doc("2", "interest rate policy document", "tenant-b"),
            ])
            .unwrap();

        let filter = crate::access_filter::AccessFilterBuilder::new("tenant-a").build();
        let results = index.search("interest rate", 5, Some(&filter)).unwrap();
        assert!(results.iter().all(|p| p.payload.tenant_id == "tenant-a"));
    }

    #[test]
    fn delete_removes_from_index() {
        let index = SparseIndex::new(SparseIndexConfig::default()).unwrap();
        index.index_documents(&[doc("1", "some content", "tenant-a")]).unwrap();
        assert_eq!(index.doc_count(), 1);
        index.delete(&["1".to_string()]).unwrap();
        assert_eq!(index.doc_count(), 0);
    }
}
