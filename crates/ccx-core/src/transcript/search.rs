use crate::error::{CcxError, Result};
use crate::transcript::models::{Conversation, MessageType};
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, Schema, Value, STORED, STRING, TEXT},
    Index, IndexWriter, ReloadPolicy, TantivyDocument,
};

/// Body text kept per conversation.
const MAX_BODY_BYTES: usize = 512 * 1024;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub session_id: String,
    pub started: String,
    pub score: f32,
}

// ---------------------------------------------------------------------------
// TranscriptIndex
// ---------------------------------------------------------------------------

struct Fields {
    session_id: Field,
    started: Field,
    body: Field,
    tools: Field,
}

pub struct TranscriptIndex {
    index: Index,
    reader: tantivy::IndexReader,
    fields: Fields,
}

fn search_err(e: impl std::fmt::Display) -> CcxError {
    CcxError::Search(e.to_string())
}

impl TranscriptIndex {
    /// Build an ephemeral in-RAM index over the given conversations.
    ///
    /// Indexed fields:
    /// - `session_id`: STRING, exact match, stored
    /// - `started`: STRING, stored; RFC 3339 start time, empty if unknown
    /// - `body`: TEXT; user and assistant text plus tool targets
    /// - `tools`: TEXT; tool names, reachable as `tools:grep`
    pub fn build(conversations: &[Conversation]) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index.writer(15_000_000).map_err(search_err)?;

        for conv in conversations {
            let mut doc = TantivyDocument::default();
            doc.add_text(fields.session_id, &conv.metadata.session_id);
            doc.add_text(
                fields.started,
                conv.metadata
                    .start_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            );

            let mut body = String::new();
            for msg in &conv.messages {
                if matches!(msg.message_type, MessageType::User | MessageType::Assistant) {
                    body.push_str(&msg.text());
                    body.push('\n');
                }
            }
            for call in &conv.tool_calls {
                if let Some(target) = &call.target {
                    body.push_str(target);
                    body.push('\n');
                }
            }
            if body.len() > MAX_BODY_BYTES {
                let mut end = MAX_BODY_BYTES;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            doc.add_text(fields.body, &body);

            let tools: Vec<&str> = conv.unique_tools().into_iter().collect();
            doc.add_text(fields.tools, tools.join(" "));

            writer.add_document(doc).map_err(search_err)?;
        }

        writer.commit().map_err(search_err)?;

        // Manual reload: the index is only read after the single commit above.
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| search_err(e))?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// BM25 full-text search, best match first.
    ///
    /// Bare terms are ANDed. Phrases, `OR`/`NOT` and `tools:<name>` scoping
    /// follow tantivy query syntax. Malformed queries return no hits.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let searcher = self.reader.searcher();

        let mut parser =
            QueryParser::for_index(&self.index, vec![self.fields.body, self.fields.tools]);
        parser.set_conjunction_by_default();

        let query = match parser.parse_query(query_str) {
            Ok(q) => q,
            Err(_) => return Ok(vec![]),
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(search_err)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(search_err)?;
            let text = |field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            hits.push(SearchHit {
                session_id: text(self.fields.session_id),
                started: text(self.fields.started),
                score,
            });
        }
        Ok(hits)
    }
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();

    let session_id = builder.add_text_field("session_id", STRING | STORED);
    let started = builder.add_text_field("started", STRING | STORED);
    let body = builder.add_text_field("body", TEXT);
    let tools = builder.add_text_field("tools", TEXT);

    let schema = builder.build();
    (
        schema,
        Fields {
            session_id,
            started,
            body,
            tools,
        },
    )
}
