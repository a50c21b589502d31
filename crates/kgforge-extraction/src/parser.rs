use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use kgforge_core::config::TripleValidation;
use kgforge_core::document::RelationSchema;
use kgforge_core::triple::{CandidateTriple, RawResponse};

static TRIPLE_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<Triple>\s*<Head>([^<]*)</Head>\s*<Relation>([^<]*)</Relation>\s*<Tail>([^<]*)</Tail>\s*<start_node_Type>([^<]*)</start_node_Type>\s*<end_node_Type>([^<]*)</end_node_Type>\s*</Triple>",
    )
    .expect("triple record pattern is valid")
});

const PREVIEW_CHARS: usize = 100;

/// Counts and triples recovered from a sequence of raw responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub triples: Vec<CandidateTriple>,
    /// Well-formed records found, sentinels included.
    pub records: usize,
    pub sentinels: usize,
    /// Records dropped by strict validation.
    pub rejected: usize,
    /// Responses that held no well-formed record.
    pub unmatched_responses: usize,
}

/// Recovers candidate triples from loosely formatted model output.
///
/// Every well-formed record is taken wherever it appears; prose, broken
/// markup and missing container tags around it are ignored.
#[derive(Debug, Clone, Default)]
pub struct TripleParser {
    validation: TripleValidation,
    schema: RelationSchema,
}

impl TripleParser {
    pub fn new(validation: TripleValidation, schema: RelationSchema) -> Self {
        Self { validation, schema }
    }

    pub fn parse(&self, responses: &[RawResponse]) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        for response in responses {
            self.parse_response(response, &mut outcome);
        }
        outcome
    }

    fn parse_response(&self, response: &RawResponse, outcome: &mut ParseOutcome) {
        let records = scan_records(&response.text);
        if records.is_empty() {
            outcome.unmatched_responses += 1;
            let preview: String = response.text.chars().take(PREVIEW_CHARS).collect();
            tracing::warn!(
                batch = response.batch_index,
                preview = %preview,
                "No triple records in response"
            );
            return;
        }

        outcome.records += records.len();
        for triple in records {
            if triple.is_sentinel() {
                outcome.sentinels += 1;
                continue;
            }
            if !self.accepts(&triple, response) {
                outcome.rejected += 1;
                tracing::debug!(
                    batch = response.batch_index,
                    head = %triple.head,
                    relation = %triple.relation,
                    "Rejected triple outside schema or batch entities"
                );
                continue;
            }
            outcome.triples.push(triple);
        }
    }

    fn accepts(&self, triple: &CandidateTriple, response: &RawResponse) -> bool {
        match self.validation {
            TripleValidation::Off => true,
            TripleValidation::Strict => {
                self.schema
                    .allows(&triple.relation, &triple.head_type, &triple.tail_type)
                    && response.head_candidates.iter().any(|h| h == &triple.head)
            }
        }
    }
}

/// All well-formed records in `text`, sentinels included, fields trimmed.
pub fn scan_records(text: &str) -> Vec<CandidateTriple> {
    let flat: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    TRIPLE_RECORD
        .captures_iter(&flat)
        .map(|caps| {
            let field = |i: usize| caps.get(i).map_or("", |m| m.as_str()).trim().to_string();
            CandidateTriple::new(field(1), field(2), field(3), field(4), field(5))
        })
        .collect()
}
