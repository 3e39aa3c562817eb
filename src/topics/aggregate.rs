use serde::Serialize;
use std::collections::BTreeMap;

use super::TopicNormalizer;

/// Count and display spelling for one canonical key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicCount {
    pub canonical: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTopic {
    pub normalized_key: String,
    pub canonical_display: String,
    pub count: usize,
}

/// Spellings seen for one key, in first-seen order
#[derive(Debug, Default)]
struct SpellingHistogram {
    spellings: Vec<(String, usize)>,
    total: usize,
}

impl SpellingHistogram {
    fn record(&mut self, spelling: &str) {
        self.total += 1;
        match self.spellings.iter_mut().find(|(seen, _)| seen == spelling) {
            Some((_, count)) => *count += 1,
            None => self.spellings.push((spelling.to_string(), 1)),
        }
    }

    /// Most frequent spelling; the earliest wins a tie
    fn canonical(&self) -> Option<&str> {
        let mut best: Option<&(String, usize)> = None;
        for entry in &self.spellings {
            if best.map_or(true, |(_, count)| entry.1 > *count) {
                best = Some(entry);
            }
        }
        best.map(|(spelling, _)| spelling.as_str())
    }
}

/// Recomputes topic frequencies from scratch over a set of label lists
#[derive(Debug, Clone, Default)]
pub struct TopicAggregator {
    normalizer: TopicNormalizer,
}

impl TopicAggregator {
    pub fn new(normalizer: TopicNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &TopicNormalizer {
        &self.normalizer
    }

    /// One label list per corpus item; every label occurrence counts once
    pub fn aggregate<L, S>(&self, label_sets: L) -> BTreeMap<String, TopicCount>
    where
        L: IntoIterator,
        L::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut histograms: BTreeMap<String, SpellingHistogram> = BTreeMap::new();

        for labels in label_sets {
            for label in labels {
                let spelling = label.as_ref().trim();
                let key = self.normalizer.normalize(spelling);
                if key.is_empty() {
                    continue;
                }
                histograms.entry(key).or_default().record(spelling);
            }
        }

        histograms
            .into_iter()
            .map(|(key, histogram)| {
                let canonical = histogram.canonical().unwrap_or(key.as_str()).to_string();
                let count = histogram.total;
                (key, TopicCount { canonical, count })
            })
            .collect()
    }

    /// Topics by descending count, then key
    pub fn ranked<L, S>(&self, label_sets: L) -> Vec<NormalizedTopic>
    where
        L: IntoIterator,
        L::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut topics: Vec<NormalizedTopic> = self
            .aggregate(label_sets)
            .into_iter()
            .map(|(normalized_key, topic)| NormalizedTopic {
                normalized_key,
                canonical_display: topic.canonical,
                count: topic.count,
            })
            .collect();

        topics.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.normalized_key.cmp(&b.normalized_key)));
        topics
    }

    /// Display spelling -> count, for rendering relative prevalence
    pub fn frequencies<L, S>(&self, label_sets: L) -> BTreeMap<String, usize>
    where
        L: IntoIterator,
        L::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aggregate(label_sets)
            .into_values()
            .map(|topic| (topic.canonical, topic.count))
            .collect()
    }
}

/// Aggregate with the built-in alias table
pub fn aggregate<L, S>(label_sets: L) -> BTreeMap<String, TopicCount>
where
    L: IntoIterator,
    L::Item: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    TopicAggregator::default().aggregate(label_sets)
}
