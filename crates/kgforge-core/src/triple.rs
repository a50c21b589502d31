use serde::{Deserialize, Serialize};

/// Placeholder the model is told to emit in every field when a text holds no fact.
pub const NONE_SENTINEL: &str = "无";

/// Cell values treated as missing, matching the NA tokens of the tabular
/// tooling the triple files are produced with.
const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Map missing/NaN-like values to the empty string. Anything else passes
/// through untouched, including surrounding whitespace.
pub fn normalize_field(value: &str) -> &str {
    if MISSING_TOKENS.contains(&value) {
        ""
    } else {
        value
    }
}

/// An unvalidated fact recovered from model output or read from a triple file.
///
/// The classification fields and `relation_type` are empty for extracted
/// triples; they are filled only by pre-structured tabular input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateTriple {
    pub head: String,
    pub relation: String,
    pub tail: String,
    pub head_type: String,
    pub tail_type: String,
    #[serde(default)]
    pub head_major_classification: String,
    #[serde(default)]
    pub head_minor_classification: String,
    #[serde(default)]
    pub tail_major_classification: String,
    #[serde(default)]
    pub tail_minor_classification: String,
    #[serde(default)]
    pub relation_type: String,
}

impl CandidateTriple {
    pub fn new(
        head: impl Into<String>,
        relation: impl Into<String>,
        tail: impl Into<String>,
        head_type: impl Into<String>,
        tail_type: impl Into<String>,
    ) -> Self {
        Self {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
            head_type: head_type.into(),
            tail_type: tail_type.into(),
            ..Default::default()
        }
    }

    /// True when any of the five extracted fields is the "no fact" sentinel.
    pub fn is_sentinel(&self) -> bool {
        [
            &self.head,
            &self.relation,
            &self.tail,
            &self.head_type,
            &self.tail_type,
        ]
        .iter()
        .any(|field| field.as_str() == NONE_SENTINEL)
    }
}

/// The verbatim reply to one extraction batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub batch_index: usize,
    pub prompt_ids: Vec<String>,
    /// Entity names the batch allowed as heads.
    pub head_candidates: Vec<String>,
    pub text: String,
}

/// Identifies the ingestion unit that produced a node or edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub docx_id: Option<String>,
    pub csv_id: Option<String>,
}

impl Provenance {
    /// Document runs tag facts with the document id and its derived triple-file id.
    pub fn for_document(unit_id: &str) -> Self {
        Self {
            docx_id: Some(unit_id.to_string()),
            csv_id: Some(format!("{unit_id}_csv")),
        }
    }

    pub fn for_dataset(unit_id: &str) -> Self {
        Self {
            docx_id: None,
            csv_id: Some(unit_id.to_string()),
        }
    }

    pub fn docx_key(&self) -> &str {
        normalize_field(self.docx_id.as_deref().unwrap_or(""))
    }

    pub fn csv_key(&self) -> &str {
        normalize_field(self.csv_id.as_deref().unwrap_or(""))
    }
}
