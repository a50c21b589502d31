use std::path::{Path, PathBuf};

use kgforge_core::document::PromptUnit;
use kgforge_core::error::Result;
use kgforge_core::job::JobUnit;
use kgforge_core::triple::{CandidateTriple, RawResponse};
use kgforge_extraction::tabular;

/// Writes the per-run audit files for one unit into a directory.
///
/// Files are `<kind>_<id>_prompts.json`, `<kind>_<id>_responses.json` and
/// `<kind>_<id>_triples.csv`; a re-run overwrites them.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, unit: &JobUnit, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{suffix}", unit.kind, file_safe(&unit.id)))
    }

    pub async fn write_prompts(&self, unit: &JobUnit, prompts: &[PromptUnit]) -> Result<PathBuf> {
        self.write(unit, "prompts.json", serde_json::to_vec_pretty(prompts)?)
            .await
    }

    pub async fn write_responses(&self, unit: &JobUnit, responses: &[RawResponse]) -> Result<PathBuf> {
        self.write(unit, "responses.json", serde_json::to_vec_pretty(responses)?)
            .await
    }

    pub async fn write_triples(&self, unit: &JobUnit, triples: &[CandidateTriple]) -> Result<PathBuf> {
        self.write(unit, "triples.csv", tabular::write_triples(triples)?)
            .await
    }

    async fn write(&self, unit: &JobUnit, suffix: &str, bytes: Vec<u8>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(unit, suffix);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(job_id = %unit, path = %path.display(), "Wrote run artifact");
        Ok(path)
    }
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_ids_cannot_escape_the_directory() {
        let writer = ArtifactWriter::new("/tmp/kg");
        let path = writer.path_for(&JobUnit::document("../etc/passwd"), "prompts.json");
        assert_eq!(path, PathBuf::from("/tmp/kg/document____etc_passwd_prompts.json"));
    }

    #[tokio::test]
    async fn writes_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("nested"));
        let unit = JobUnit::document("7");

        let prompts = writer.write_prompts(&unit, &[]).await.unwrap();
        let responses = writer
            .write_responses(
                &unit,
                &[RawResponse {
                    batch_index: 0,
                    prompt_ids: vec!["Prompt_1".into()],
                    head_candidates: vec!["大渡河".into()],
                    text: "<Triples/>".into(),
                }],
            )
            .await
            .unwrap();
        let triples = writer
            .write_triples(&unit, &[CandidateTriple::new("大渡河", "位于", "四川", "河流", "位置")])
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(prompts).unwrap(), "[]");
        assert!(std::fs::read_to_string(responses).unwrap().contains("大渡河"));
        let csv = std::fs::read_to_string(triples).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }
}
