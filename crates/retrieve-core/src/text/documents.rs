//! Offset-addressable document store (C5).
//!
//! Grounded on `documents.py`: one JSON object per line in `documents.jsonl`,
//! looked up either by a full linear scan or by a `docId -> byte offset`
//! table built once and cached for the lifetime of the store.

use crate::error::{RetrieveError, RetrieveResult};
use crate::persistence::Directory;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};

/// One document record: its id, indexed text, and any passthrough fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub text: String,
    pub extra: Map<String, Value>,
}

/// Write `documents.jsonl` for a corpus from an in-order iterator of records.
pub fn write_documents<'a>(
    directory: &dyn Directory,
    corpus: &str,
    records: impl Iterator<Item = &'a DocumentRecord>,
) -> RetrieveResult<usize> {
    let mut writer = directory.create_file(&format!("{}/documents.jsonl", corpus))?;
    let mut count = 0;
    for record in records {
        let mut obj = record.extra.clone();
        obj.insert("docId".to_string(), Value::String(record.doc_id.clone()));
        obj.insert("text".to_string(), Value::String(record.text.clone()));
        serde_json::to_writer(&mut writer, &Value::Object(obj))
            .map_err(|e| RetrieveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Read-only handle over a corpus's `documents.jsonl`, with a lazily built
/// `docId -> offset` index cached for the store's lifetime.
pub struct DocumentStore<'a> {
    directory: &'a dyn Directory,
    path: String,
    offsets: HashMap<String, u64>,
}

impl<'a> std::fmt::Debug for DocumentStore<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.path)
            .field("offsets", &self.offsets)
            .finish()
    }
}

impl<'a> DocumentStore<'a> {
    /// Open a corpus's document store and build its offset table in one
    /// linear pass.
    pub fn open(directory: &'a dyn Directory, corpus: &str) -> RetrieveResult<Self> {
        let path = format!("{}/documents.jsonl", corpus);
        let reader = directory
            .open_file(&path)
            .map_err(|_| RetrieveError::MissingArtifact {
                corpus: corpus.to_string(),
                artifact: "documents.jsonl".to_string(),
            })?;
        let mut offsets = HashMap::new();
        let mut offset: u64 = 0;
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line_len = line.len() as u64 + 1;
            if line.trim().is_empty() {
                offset += line_len;
                continue;
            }
            let value: Value = serde_json::from_str(&line).map_err(|e| {
                RetrieveError::CorruptIndex(format!("malformed document record: {}", e))
            })?;
            if let Some(doc_id) = value.get("docId").and_then(Value::as_str) {
                offsets.insert(doc_id.to_string(), offset);
            }
            offset += line_len;
        }
        Ok(Self {
            directory,
            path,
            offsets,
        })
    }

    /// Fetch one record by docId, or `None` if it isn't present.
    pub fn get(&self, doc_id: &str) -> RetrieveResult<Option<DocumentRecord>> {
        let Some(&offset) = self.offsets.get(doc_id) else {
            return Ok(None);
        };
        let mut reader = self.directory.open_file(&self.path)?;
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut buf)?;
        let slice = &buf[offset as usize..];
        let line_end = slice.iter().position(|&b| b == b'\n').unwrap_or(slice.len());
        let line = std::str::from_utf8(&slice[..line_end])
            .map_err(|e| RetrieveError::CorruptIndex(format!("non-UTF-8 document record: {}", e)))?;
        let mut value: Map<String, Value> = serde_json::from_str(line).map_err(|e| {
            RetrieveError::CorruptIndex(format!("malformed document record: {}", e))
        })?;
        let doc_id = value
            .remove("docId")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| doc_id.to_string());
        let text = value
            .remove("text")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Ok(Some(DocumentRecord {
            doc_id,
            text,
            extra: value,
        }))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::directory::MemoryDirectory;

    fn record(doc_id: &str, text: &str, title: &str) -> DocumentRecord {
        let mut extra = Map::new();
        extra.insert("title".to_string(), Value::String(title.to_string()));
        DocumentRecord {
            doc_id: doc_id.to_string(),
            text: text.to_string(),
            extra,
        }
    }

    #[test]
    fn round_trips_records_with_passthrough_fields() {
        let dir = MemoryDirectory::new();
        let records = vec![
            record("d1", "the quick brown fox", "Fox Story"),
            record("d2", "lazy dogs", "Dog Story"),
        ];
        write_documents(&dir, "c1", records.iter()).unwrap();

        let store = DocumentStore::open(&dir, "c1").unwrap();
        assert_eq!(store.len(), 2);
        let got = store.get("d2").unwrap().unwrap();
        assert_eq!(got.text, "lazy dogs");
        assert_eq!(got.extra.get("title").unwrap().as_str().unwrap(), "Dog Story");
    }

    #[test]
    fn missing_doc_id_returns_none_not_error() {
        let dir = MemoryDirectory::new();
        write_documents(&dir, "c1", std::iter::once(&record("d1", "text", "t"))).unwrap();
        let store = DocumentStore::open(&dir, "c1").unwrap();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn missing_corpus_is_a_missing_artifact_error() {
        let dir = MemoryDirectory::new();
        let err = DocumentStore::open(&dir, "ghost").unwrap_err();
        assert!(matches!(err, RetrieveError::MissingArtifact { .. }));
    }
}
