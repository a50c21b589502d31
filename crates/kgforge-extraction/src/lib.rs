pub mod catalog;
pub mod client;
pub mod docx;
pub mod extractor;
pub mod filter;
pub mod parser;
pub mod prompt;
pub mod segmenter;
pub mod tabular;

pub use catalog::{JsonCatalogFile, StaticCatalog};
pub use client::ChatCompletionsClient;
pub use docx::read_document;
pub use extractor::{BatchReport, TripleExtractor};
pub use filter::EntityFilter;
pub use parser::{ParseOutcome, TripleParser};
pub use prompt::PromptBuilder;
pub use segmenter::Segmenter;
