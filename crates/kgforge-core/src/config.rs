use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KgError, Result};
use crate::graph::RelationshipMergePolicy;

/// Parse-time validation of extracted triples.
///
/// `Off` accepts every well-formed non-sentinel record and leaves checking
/// to downstream review. `Strict` drops records whose
/// `(relation, head_type, tail_type)` is not in the relation schema or whose
/// head is not among the batch's matched entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleValidation {
    #[default]
    Off,
    Strict,
}

impl fmt::Display for TripleValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for TripleValidation {
    type Err = KgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "strict" => Ok(Self::Strict),
            other => Err(KgError::Config(format!(
                "unknown triple validation mode '{other}' (expected off or strict)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://open.bigmodel.cn/api/paas/v4/".into(),
            api_key: String::new(),
            model: "glm-4-air".into(),
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(KgError::Config("LLM_BASE_URL must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(KgError::Config("LLM_MODEL must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(KgError::Config("LLM_TIMEOUT_SECS must be greater than 0".into()));
        }
        Ok(())
    }
}

/// The orchestrator's slice of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub max_chunk_chars: usize,
    pub relationship_merge: RelationshipMergePolicy,
    pub triple_validation: TripleValidation,
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_chunk_chars: 1000,
            relationship_merge: RelationshipMergePolicy::default(),
            triple_validation: TripleValidation::default(),
            artifacts_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(KgError::Config("KG_BATCH_SIZE must be greater than 0".into()));
        }
        if self.max_chunk_chars == 0 {
            return Err(KgError::Config("KG_MAX_CHUNK_CHARS must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Process configuration read from the environment.
///
/// | Variable                  | Default                                  |
/// |---------------------------|------------------------------------------|
/// | `NEO4J_URI`               | `bolt://localhost:7687`                  |
/// | `NEO4J_USER`              | `neo4j`                                  |
/// | `NEO4J_PASSWORD`          | `12345678`                               |
/// | `LLM_BASE_URL`            | `https://open.bigmodel.cn/api/paas/v4/`  |
/// | `LLM_API_KEY`             | empty                                    |
/// | `LLM_MODEL`               | `glm-4-air`                              |
/// | `LLM_TIMEOUT_SECS`        | `120`                                    |
/// | `KG_BATCH_SIZE`           | `3`                                      |
/// | `KG_MAX_CHUNK_CHARS`      | `1000`                                   |
/// | `KG_RELATIONSHIP_MERGE`   | `per_run`                                |
/// | `KG_TRIPLE_VALIDATION`    | `off`                                    |
/// | `KG_ENTITY_CATALOG_PATH`  | `data/entities.json`                     |
/// | `KG_RELATION_SCHEMA_PATH` | `data/relations.json`                    |
/// | `KG_ARTIFACTS_DIR`        | unset                                    |
/// | `SERVER_HOST`             | `0.0.0.0`                                |
/// | `SERVER_PORT`             | `8080`                                   |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub entity_catalog_path: PathBuf,
    pub relation_schema_path: PathBuf,
    pub server_host: String,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unset or blank variables take
    /// their defaults; malformed values are configuration errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let llm_defaults = LlmConfig::default();
        let pipeline_defaults = PipelineConfig::default();

        let config = Self {
            neo4j_uri: string_or("NEO4J_URI", "bolt://localhost:7687"),
            neo4j_user: string_or("NEO4J_USER", "neo4j"),
            neo4j_password: string_or("NEO4J_PASSWORD", "12345678"),
            llm: LlmConfig {
                base_url: string_or("LLM_BASE_URL", &llm_defaults.base_url),
                api_key: var("LLM_API_KEY").unwrap_or_default(),
                model: string_or("LLM_MODEL", &llm_defaults.model),
                timeout_secs: parse_or("LLM_TIMEOUT_SECS", var("LLM_TIMEOUT_SECS"), llm_defaults.timeout_secs)?,
            },
            pipeline: PipelineConfig {
                batch_size: parse_or("KG_BATCH_SIZE", var("KG_BATCH_SIZE"), pipeline_defaults.batch_size)?,
                max_chunk_chars: parse_or(
                    "KG_MAX_CHUNK_CHARS",
                    var("KG_MAX_CHUNK_CHARS"),
                    pipeline_defaults.max_chunk_chars,
                )?,
                relationship_merge: match var("KG_RELATIONSHIP_MERGE") {
                    Some(v) => v.parse()?,
                    None => pipeline_defaults.relationship_merge,
                },
                triple_validation: match var("KG_TRIPLE_VALIDATION") {
                    Some(v) => v.parse()?,
                    None => pipeline_defaults.triple_validation,
                },
                artifacts_dir: var("KG_ARTIFACTS_DIR").map(PathBuf::from),
            },
            entity_catalog_path: PathBuf::from(string_or("KG_ENTITY_CATALOG_PATH", "data/entities.json")),
            relation_schema_path: PathBuf::from(string_or("KG_RELATION_SCHEMA_PATH", "data/relations.json")),
            server_host: string_or("SERVER_HOST", "0.0.0.0"),
            server_port: parse_or("SERVER_PORT", var("SERVER_PORT"), 8080)?,
        };

        config.llm.validate()?;
        config.pipeline.validate()?;
        Ok(config)
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| KgError::Config(format!("{key} has an invalid value '{v}'"))),
        None => Ok(default),
    }
}
