use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::analysis::Analysis;
use crate::Result;

/// One ingested item as the topic aggregator sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusItem {
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Only imported items take part in topic counts
    #[serde(default, alias = "is_imported")]
    pub imported: bool,

    #[serde(default, alias = "ai_analysis")]
    pub analysis: Option<Analysis>,
}

impl CorpusItem {
    pub fn topic_labels(&self) -> impl Iterator<Item = &str> {
        self.analysis.iter().flat_map(|analysis| analysis.topic_names())
    }
}

/// Label lists of the imported items in a snapshot
pub fn imported_label_sets(items: &[CorpusItem]) -> impl Iterator<Item = impl Iterator<Item = &str>> {
    items.iter().filter(|item| item.imported).map(CorpusItem::topic_labels)
}

/// Read access to the corpus. A snapshot is a consistent copy; writers may
/// proceed while a caller aggregates over it.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn snapshot(&self) -> Result<Vec<CorpusItem>>;
}

/// Corpus persisted as a JSON document
pub struct JsonFileCorpus {
    path: PathBuf,
}

impl JsonFileCorpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Accepts a bare array, `{"items": [...]}`, `{"videos": [...]}` or
/// `{"youtube": {"videos": [...]}}`; unreadable entries are skipped
pub(crate) fn parse_corpus(content: &str) -> Result<Vec<CorpusItem>> {
    let document: Value = serde_json::from_str(content).context("Corpus is not valid JSON")?;

    let entries = [
        document.as_array(),
        document.get("items").and_then(Value::as_array),
        document.get("videos").and_then(Value::as_array),
        document.pointer("/youtube/videos").and_then(Value::as_array),
    ]
    .into_iter()
    .flatten()
    .next()
    .context("Corpus has no item list (expected an array, \"items\" or \"videos\")")?;

    let mut items = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match CorpusItem::deserialize(entry) {
            Ok(item) => items.push(item),
            Err(e) => tracing::warn!(index, error = %e, "Skipping unreadable corpus item"),
        }
    }
    Ok(items)
}

#[async_trait]
impl CorpusStore for JsonFileCorpus {
    async fn snapshot(&self) -> Result<Vec<CorpusItem>> {
        let content = fs_err::tokio::read_to_string(&self.path).await?;
        let items = parse_corpus(&content).with_context(|| format!("Failed to read corpus {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), items = items.len(), "Loaded corpus");
        Ok(items)
    }
}

/// In-process corpus for embedding and tests
#[derive(Default)]
pub struct MemoryCorpus {
    items: RwLock<Vec<CorpusItem>>,
}

impl MemoryCorpus {
    pub fn new(items: Vec<CorpusItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// Insert or replace by id
    pub async fn upsert(&self, item: CorpusItem) {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }

    pub async fn remove(&self, id: &str) -> Option<CorpusItem> {
        let mut items = self.items.write().await;
        let index = items.iter().position(|item| item.id == id)?;
        Some(items.remove(index))
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpus {
    async fn snapshot(&self) -> Result<Vec<CorpusItem>> {
        Ok(self.items.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TopicTag;
    use std::io::Write;

    fn item(id: &str, imported: bool, topics: &[&str]) -> CorpusItem {
        CorpusItem {
            id: id.to_string(),
            title: String::new(),
            imported,
            analysis: Some(Analysis {
                topic_tags: topics
                    .iter()
                    .map(|name| TopicTag {
                        name: name.to_string(),
                        confidence: 0.5,
                        relevance: 0.5,
                    })
                    .collect(),
                ..Analysis::default()
            }),
        }
    }

    #[test]
    fn test_parse_corpus_shapes() {
        let array = r#"[{"id": "a", "imported": true, "analysis": {"topicTags": [{"name": "EVs"}]}}]"#;
        let items = parse_corpus(array).unwrap();
        assert_eq!(items[0].topic_labels().collect::<Vec<_>>(), vec!["EVs"]);

        let legacy = r#"{"youtube": {"videos": [
            {"id": "b", "video_id": "dQw4w9WgXcQ", "is_imported": true, "ai_analysis": {"topics": ["AI", "Robotaxis"]}},
            {"id": "c", "is_imported": false, "ai_analysis": null},
            {"title": "no id"}
        ]}}"#;
        let items = parse_corpus(legacy).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "b");
        assert_eq!(items[0].topic_labels().collect::<Vec<_>>(), vec!["AI", "Robotaxis"]);
        assert!(items[1].analysis.is_none());

        assert!(parse_corpus(r#"{"other": 1}"#).is_err());
        assert!(parse_corpus("not json").is_err());
    }

    #[test]
    fn test_only_imported_items_contribute_labels() {
        let items = vec![item("a", true, &["AI"]), item("b", false, &["EVs"])];

        let labels: Vec<Vec<&str>> = imported_label_sets(&items).map(|labels| labels.collect()).collect();

        assert_eq!(labels, vec![vec!["AI"]]);
    }

    #[tokio::test]
    async fn test_json_file_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"items": [{{"id": "a", "imported": true}}]}}"#).unwrap();

        let corpus = JsonFileCorpus::new(file.path());
        let items = corpus.snapshot().await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(corpus.path(), file.path());
    }

    #[tokio::test]
    async fn test_memory_corpus_snapshot_is_isolated() {
        let corpus = MemoryCorpus::new(vec![item("a", true, &["AI"])]);

        let before = corpus.snapshot().await.unwrap();
        corpus.upsert(item("a", true, &["EVs"])).await;
        corpus.upsert(item("b", true, &["FSD"])).await;

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].topic_labels().collect::<Vec<_>>(), vec!["AI"]);

        let after = corpus.snapshot().await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].topic_labels().collect::<Vec<_>>(), vec!["EVs"]);

        assert!(corpus.remove("b").await.is_some());
        assert!(corpus.remove("b").await.is_none());
    }
}
