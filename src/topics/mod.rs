pub mod aggregate;
pub mod corpus;
pub mod normalize;

pub use aggregate::{aggregate, NormalizedTopic, TopicAggregator, TopicCount};
pub use corpus::{imported_label_sets, CorpusItem, CorpusStore, JsonFileCorpus, MemoryCorpus};
pub use normalize::{normalize, TopicNormalizer};

use std::collections::BTreeMap;

use crate::Result;

/// Display spelling -> count over the imported items of a corpus snapshot.
///
/// Recomputed from scratch on every call so the result always reflects the
/// snapshot that was read, including edits and removals.
pub async fn topic_frequencies(store: &dyn CorpusStore, aggregator: &TopicAggregator) -> Result<BTreeMap<String, usize>> {
    let items = store.snapshot().await?;
    Ok(aggregator.frequencies(imported_label_sets(&items)))
}

/// Ranked topics (count desc, key asc) over the imported items of a snapshot
pub async fn ranked_topics(store: &dyn CorpusStore, aggregator: &TopicAggregator) -> Result<Vec<NormalizedTopic>> {
    let items = store.snapshot().await?;
    let topics = aggregator.ranked(imported_label_sets(&items));
    tracing::debug!(items = items.len(), topics = topics.len(), "Aggregated topics");
    Ok(topics)
}
