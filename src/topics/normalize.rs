use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::utils::collapse_whitespace;

/// Variant spellings that singularization alone cannot merge
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("ev", "electric vehicle"),
    ("evs", "electric vehicle"),
    ("electric vehicles", "electric vehicle"),
    ("ai", "artificial intelligence"),
    ("fsd", "full self-driving"),
    ("self driving", "self-driving"),
    ("self drive", "self-driving"),
    ("self-drive", "self-driving"),
    ("robotaxis", "robotaxi"),
    ("autonomous car", "autonomous vehicle"),
    ("autonomous vehicles", "autonomous vehicle"),
];

/// Maps free-text topic labels to canonical keys.
///
/// A key is the lowercased, whitespace-collapsed label with plural suffixes
/// stripped until none applies, then looked up once in the alias table.
/// Alias keys and targets are stored in that same stripped form with chains
/// resolved, which keeps `normalize` idempotent.
#[derive(Debug, Clone)]
pub struct TopicNormalizer {
    aliases: HashMap<String, String>,
}

impl Default for TopicNormalizer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TopicNormalizer {
    pub fn builtin() -> Self {
        Self::from_pairs(BUILTIN_ALIASES.iter().map(|(from, to)| (from.to_string(), to.to_string())))
    }

    /// Built-in table extended (and overridden) by configured aliases
    pub fn with_aliases(extra: &BTreeMap<String, String>) -> Self {
        Self::from_pairs(
            BUILTIN_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .chain(extra.iter().map(|(from, to)| (from.clone(), to.clone()))),
        )
    }

    fn from_pairs(pairs: impl Iterator<Item = (String, String)>) -> Self {
        let mut direct: HashMap<String, String> = HashMap::new();
        for (from, to) in pairs {
            let (from, to) = (base_form(&from), base_form(&to));
            if from.is_empty() || to.is_empty() {
                continue;
            }
            direct.insert(from, to);
        }

        let mut aliases = HashMap::with_capacity(direct.len());
        for from in direct.keys() {
            match resolve_chain(&direct, from) {
                Some(target) if target != *from => {
                    aliases.insert(from.clone(), target);
                }
                Some(_) => {}
                None => tracing::warn!(alias = %from, "Ignoring cyclic topic alias"),
            }
        }

        Self { aliases }
    }

    pub fn normalize(&self, label: &str) -> String {
        let base = base_form(label);
        match self.aliases.get(&base) {
            Some(target) => target.clone(),
            None => base,
        }
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

/// Follow `from -> to` links until a form that is not itself aliased;
/// `None` on a cycle
fn resolve_chain(direct: &HashMap<String, String>, from: &str) -> Option<String> {
    let mut current = from;
    for _ in 0..=direct.len() {
        match direct.get(current) {
            Some(next) if next == current => return Some(next.clone()),
            Some(next) => current = next.as_str(),
            None => return Some(current.to_string()),
        }
    }
    None
}

/// Normalize with the built-in alias table
pub fn normalize(label: &str) -> String {
    static BUILTIN: OnceLock<TopicNormalizer> = OnceLock::new();
    BUILTIN.get_or_init(TopicNormalizer::builtin).normalize(label)
}

/// Lowercase, collapse whitespace, singularize
fn base_form(label: &str) -> String {
    singularize(&collapse_whitespace(&label.to_lowercase()))
}

/// Strip plural suffixes until none applies: "ies" -> "y", else "es"
/// unless preceded by "i", else "s" unless "ss". A strip that would leave
/// nothing is not applied.
fn singularize(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_plural(&current);
        match next {
            Some(next) if !next.is_empty() && next != current => current = next,
            _ => return current,
        }
    }
}

fn strip_plural(word: &str) -> Option<String> {
    let stripped = if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = word.strip_suffix("es").filter(|stem| !stem.ends_with('i')) {
        stem.to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        return None;
    };
    // A suffix cut back to a word boundary leaves trailing whitespace
    Some(stripped.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_rules() {
        assert_eq!(normalize("Robotaxis"), "robotaxi");
        assert_eq!(normalize("batteries"), "battery");
        assert_eq!(normalize("Boxes"), "box");
        assert_eq!(normalize("glasses"), "glass");
        assert_eq!(normalize("  Business  "), "business");
        assert_eq!(normalize("s"), "s");
        assert_eq!(normalize("ies"), "y");
    }

    #[test]
    fn test_plural_and_singular_share_a_key() {
        assert_eq!(normalize("robotaxis"), normalize("robotaxi"));
        assert_eq!(normalize("EVs"), normalize("electric vehicle"));
        assert_eq!(normalize("EV"), "electric vehicle");
        assert_eq!(normalize("AI"), "artificial intelligence");
        assert_eq!(normalize("FSD"), "full self-driving");
        assert_eq!(normalize("Self  Driving"), "self-driving");
        assert_eq!(normalize("self-drive"), "self-driving");
        assert_eq!(normalize("Autonomous Cars"), "autonomous vehicle");
        assert_eq!(normalize("autonomous vehicles"), normalize("autonomous vehicle"));
        assert_eq!(normalize("Electric Vehicles"), "electric vehicle");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let labels = [
            "Robotaxis",
            "EVs",
            "AI",
            "glasses",
            "buses",
            "Self Driving",
            "autonomous cars",
            "analysis",
            "Tesla's Earnings",
            "ties",
            "news s",
            "",
            "   ",
        ];
        for label in labels {
            let once = normalize(label);
            assert_eq!(normalize(&once), once, "label {:?}", label);
        }
    }

    #[test]
    fn test_configured_aliases_extend_and_chain() {
        let extra = BTreeMap::from([
            ("llms".to_string(), "large language model".to_string()),
            ("gpt".to_string(), "LLM".to_string()),
            ("ai".to_string(), "Machine Learning".to_string()),
        ]);
        let normalizer = TopicNormalizer::with_aliases(&extra);

        assert_eq!(normalizer.normalize("LLMs"), "large language model");
        // gpt -> llm -> large language model
        assert_eq!(normalizer.normalize("GPT"), "large language model");
        assert_eq!(normalizer.normalize("AI"), "machine learning");
        assert_eq!(normalizer.normalize("EVs"), "electric vehicle");

        for label in ["GPT", "LLM", "AI", "Machine Learning"] {
            let once = normalizer.normalize(label);
            assert_eq!(normalizer.normalize(&once), once);
        }
    }

    #[test]
    fn test_cyclic_aliases_are_dropped() {
        let extra = BTreeMap::from([
            ("alpha".to_string(), "beta".to_string()),
            ("beta".to_string(), "alpha".to_string()),
        ]);
        let normalizer = TopicNormalizer::with_aliases(&extra);

        assert_eq!(normalizer.normalize("alpha"), "alpha");
        assert_eq!(normalizer.normalize("beta"), "beta");
        assert_eq!(normalizer.alias_count(), TopicNormalizer::builtin().alias_count());
    }
}
