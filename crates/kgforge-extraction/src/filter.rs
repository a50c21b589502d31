use kgforge_core::document::{EntityCatalog, EntityInfo, PromptUnit, Sentence};

/// Narrows sentences to those mentioning at least one catalog entity.
///
/// Matching is an unanchored substring test after lower-casing and removing
/// whitespace on both sides, so a short entity name also matches inside a
/// longer one.
#[derive(Debug, Clone)]
pub struct EntityFilter {
    patterns: Vec<(String, String)>,
}

impl EntityFilter {
    /// Snapshot the catalog. Names that normalize to nothing are skipped.
    pub fn new(catalog: &EntityCatalog) -> Self {
        let patterns = catalog
            .names()
            .iter()
            .filter_map(|name| {
                let pattern = normalize(name);
                (!pattern.is_empty()).then(|| (name.clone(), pattern))
            })
            .collect();
        Self { patterns }
    }

    /// Catalog entities found in `text`, in catalog order, without duplicates.
    pub fn matches(&self, text: &str) -> Vec<EntityInfo> {
        let haystack = normalize(text);
        let mut found: Vec<EntityInfo> = Vec::new();
        for (name, pattern) in &self.patterns {
            if haystack.contains(pattern.as_str()) && !found.iter().any(|e| &e.entity_name == name) {
                found.push(EntityInfo {
                    entity_name: name.clone(),
                });
            }
        }
        found
    }

    /// Build prompt units for matching sentences. Ids are `Prompt_<ordinal>`,
    /// so dropped sentences leave gaps in the numbering.
    pub fn filter(&self, sentences: &[Sentence]) -> Vec<PromptUnit> {
        sentences
            .iter()
            .filter_map(|sentence| {
                let entity_info = self.matches(&sentence.text);
                if entity_info.is_empty() {
                    return None;
                }
                Some(PromptUnit {
                    id: prompt_id(sentence.ordinal),
                    entity_info,
                    content: sentence.text.clone(),
                })
            })
            .collect()
    }
}

pub fn prompt_id(ordinal: usize) -> String {
    format!("Prompt_{ordinal}")
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
