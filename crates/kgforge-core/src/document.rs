use serde::{Deserialize, Serialize};

/// A bounded, contiguous span of document text produced by segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// A single sentence of a chunk. `ordinal` counts sentences across the whole
/// document, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub ordinal: usize,
    pub chunk_index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_name: String,
}

/// Known entity names, snapshotted once per pipeline run.
///
/// Insertion order is preserved and duplicates are collapsed. Blank names are
/// never stored: an empty pattern would match every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCatalog {
    names: Vec<String>,
}

impl EntityCatalog {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::default();
        for name in names {
            catalog.insert(name);
        }
        catalog
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.trim().is_empty() || self.names.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A chunk (sentence) annotated with the catalog entities it mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptUnit {
    pub id: String,
    pub entity_info: Vec<EntityInfo>,
    pub content: String,
}

impl PromptUnit {
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entity_info.iter().map(|e| e.entity_name.as_str())
    }
}

/// One allowed `(relation, start type, end type)` combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationSchemaEntry {
    pub relation_name: String,
    pub start_node_type: String,
    pub end_node_type: String,
}

impl RelationSchemaEntry {
    pub fn new(
        relation_name: impl Into<String>,
        start_node_type: impl Into<String>,
        end_node_type: impl Into<String>,
    ) -> Self {
        Self {
            relation_name: relation_name.into(),
            start_node_type: start_node_type.into(),
            end_node_type: end_node_type.into(),
        }
    }
}

/// The relation schema loaded for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSchema {
    entries: Vec<RelationSchemaEntry>,
}

impl RelationSchema {
    pub fn new(entries: Vec<RelationSchemaEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RelationSchemaEntry] {
        &self.entries
    }

    pub fn allows(&self, relation: &str, start_type: &str, end_type: &str) -> bool {
        self.entries.iter().any(|e| {
            e.relation_name == relation && e.start_node_type == start_type && e.end_node_type == end_type
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_drops_blank_and_duplicate_names() {
        let catalog = EntityCatalog::new(["大渡河", "", "  ", "四川", "大渡河"]);
        assert_eq!(catalog.names(), &["大渡河".to_string(), "四川".to_string()]);
    }

    #[test]
    fn schema_allows_exact_triples_only() {
        let schema = RelationSchema::new(vec![RelationSchemaEntry::new("位于", "河流", "位置")]);
        assert!(schema.allows("位于", "河流", "位置"));
        assert!(!schema.allows("位于", "位置", "河流"));
        assert!(!schema.allows("属于", "河流", "位置"));
    }
}
