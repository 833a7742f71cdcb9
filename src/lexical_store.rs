//! The Lexical Store: an in-memory BM25 index over chunk text.
//!
//! Built on `tantivy`'s in-RAM directory (`Index::create_in_ram`), following
//! the schema-builder shape used for on-disk indexes in
//! `vyotiq-ai-vyotiq-agent/src/indexer.rs`. Rebuilt wholesale at server
//! startup from the Vector Store's persisted contents, then kept in sync
//! incrementally on every Chunk upsert/delete. Protected by a
//! readers-writer lock: many concurrent readers, one exclusive writer
//! during a rebuild or incremental write.

use anyhow::Result;
use parking_lot::RwLock;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Schema, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use crate::models::{Chunk, VectorRecord};

/// The minimal shape the Lexical Store needs to index a unit of text —
/// decoupled from [`Chunk`] so a rebuild can run directly off
/// [`VectorRecord`]s without reconstructing a full `Chunk`.
pub struct LexicalDoc<'a> {
    pub chunk_id: &'a str,
    pub source_path: &'a str,
    pub text: &'a str,
}

impl<'a> From<&'a Chunk> for LexicalDoc<'a> {
    fn from(chunk: &'a Chunk) -> Self {
        LexicalDoc {
            chunk_id: &chunk.id,
            source_path: &chunk.source_path,
            text: &chunk.text,
        }
    }
}

impl<'a> From<&'a VectorRecord> for LexicalDoc<'a> {
    fn from(record: &'a VectorRecord) -> Self {
        LexicalDoc {
            chunk_id: &record.chunk_id,
            source_path: &record.source_path,
            text: &record.text,
        }
    }
}

struct IndexSchema {
    schema: Schema,
    chunk_id: tantivy::schema::Field,
    source_path: tantivy::schema::Field,
    text: tantivy::schema::Field,
}

impl IndexSchema {
    fn build() -> Self {
        let mut builder = Schema::builder();
        let chunk_id = builder.add_text_field("chunk_id", STRING | STORED);
        let source_path = builder.add_text_field("source_path", STRING | STORED);
        let text = builder.add_text_field("text", TEXT | STORED);
        let schema = builder.build();
        Self {
            schema,
            chunk_id,
            source_path,
            text,
        }
    }
}

struct State {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    schema: IndexSchema,
}

pub struct LexicalStore {
    state: RwLock<State>,
}

impl LexicalStore {
    /// Build an empty in-memory index.
    pub fn new() -> Result<Self> {
        let schema = IndexSchema::build();
        let index = Index::create_in_ram(schema.schema.clone());
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let writer: IndexWriter = index.writer(50_000_000)?;
        Ok(Self {
            state: RwLock::new(State {
                index,
                reader,
                writer,
                schema,
            }),
        })
    }

    /// Full rebuild from the current corpus. Exclusive writer access for
    /// the duration of the rebuild.
    pub fn rebuild<'a>(&self, docs: impl IntoIterator<Item = LexicalDoc<'a>>) -> Result<()> {
        let mut state = self.state.write();
        state.writer.delete_all_documents()?;
        let (chunk_id_f, source_path_f, text_f) =
            (state.schema.chunk_id, state.schema.source_path, state.schema.text);
        for doc in docs {
            state.writer.add_document(doc!(
                chunk_id_f => doc.chunk_id.to_string(),
                source_path_f => doc.source_path.to_string(),
                text_f => doc.text.to_string(),
            ))?;
        }
        state.writer.commit()?;
        state.reader.reload()?;
        Ok(())
    }

    /// Incrementally add/replace a single chunk (upsert).
    pub fn upsert(&self, doc: LexicalDoc<'_>) -> Result<()> {
        let mut state = self.state.write();
        let chunk_id_f = state.schema.chunk_id;
        let term = tantivy::Term::from_field_text(chunk_id_f, doc.chunk_id);
        state.writer.delete_term(term);
        let (source_path_f, text_f) = (state.schema.source_path, state.schema.text);
        state.writer.add_document(doc!(
            chunk_id_f => doc.chunk_id.to_string(),
            source_path_f => doc.source_path.to_string(),
            text_f => doc.text.to_string(),
        ))?;
        state.writer.commit()?;
        state.reader.reload()?;
        Ok(())
    }

    /// Remove a chunk by ID.
    pub fn delete(&self, chunk_id: &str) -> Result<()> {
        let mut state = self.state.write();
        let chunk_id_f = state.schema.chunk_id;
        let term = tantivy::Term::from_field_text(chunk_id_f, chunk_id);
        state.writer.delete_term(term);
        state.writer.commit()?;
        state.reader.reload()?;
        Ok(())
    }

    /// Top-`k` BM25 matches for `text`, returned as (chunk_id, score) pairs
    /// in descending score order. Many concurrent readers may call this at
    /// once.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<(String, f64)>> {
        if text.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let searcher = state.reader.searcher();
        let query_parser = QueryParser::for_index(&state.index, vec![state.schema.text]);
        let query = match query_parser.parse_query(text) {
            Ok(q) => q,
            Err(_) => return Ok(Vec::new()),
        };
        let top_docs = searcher.search(&query, &TopDocs::with_limit(k))?;

        let mut out = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(address)?;
            if let Some(value) = retrieved.get_first(state.schema.chunk_id) {
                if let Some(id) = value.as_str() {
                    out.push((id.to_string(), score as f64));
                }
            }
        }
        Ok(out)
    }
}
