use std::path::Path;

use kgforge_core::error::{KgError, Result};
use kgforge_core::triple::CandidateTriple;

/// Column header of a tabular triple file, in order.
pub const TRIPLE_COLUMNS: [&str; 10] = [
    "Head",
    "Relation",
    "Tail",
    "Head Type",
    "Tail Type",
    "Head Major Classification",
    "Head Minor Classification",
    "Tail Major Classification",
    "Tail Minor Classification",
    "Relation Type",
];

/// Parse a triple CSV. The header must match [`TRIPLE_COLUMNS`] exactly;
/// cells are kept verbatim and missing values are normalized at merge time.
pub fn read_triples(data: &str) -> Result<Vec<CandidateTriple>> {
    let data = data.strip_prefix('\u{feff}').unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(data.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| KgError::Input(format!("Unreadable triple file header: {e}")))?;
    let found: Vec<&str> = headers.iter().map(str::trim).collect();
    if found != TRIPLE_COLUMNS {
        return Err(KgError::Input(format!(
            "Unexpected triple file columns {found:?}, expected {TRIPLE_COLUMNS:?}"
        )));
    }

    let mut triples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| KgError::Input(format!("Malformed triple row {}: {e}", row + 1)))?;
        let cell = |i: usize| record.get(i).unwrap_or_default().to_string();
        triples.push(CandidateTriple {
            head: cell(0),
            relation: cell(1),
            tail: cell(2),
            head_type: cell(3),
            tail_type: cell(4),
            head_major_classification: cell(5),
            head_minor_classification: cell(6),
            tail_major_classification: cell(7),
            tail_minor_classification: cell(8),
            relation_type: cell(9),
        });
    }
    Ok(triples)
}

pub async fn read_triples_file(path: &Path) -> Result<Vec<CandidateTriple>> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| KgError::Input(format!("Failed to read {}: {e}", path.display())))?;
    read_triples(&data)
}

/// Render triples as a CSV with the [`TRIPLE_COLUMNS`] header.
pub fn write_triples(triples: &[CandidateTriple]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(TRIPLE_COLUMNS)
        .map_err(|e| KgError::Internal(format!("Failed to write triple header: {e}")))?;
    for t in triples {
        writer
            .write_record([
                &t.head,
                &t.relation,
                &t.tail,
                &t.head_type,
                &t.tail_type,
                &t.head_major_classification,
                &t.head_minor_classification,
                &t.tail_major_classification,
                &t.tail_minor_classification,
                &t.relation_type,
            ])
            .map_err(|e| KgError::Internal(format!("Failed to write triple row: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| KgError::Internal(format!("Failed to flush triple file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Head,Relation,Tail,Head Type,Tail Type,Head Major Classification,\
                          Head Minor Classification,Tail Major Classification,Tail Minor Classification,Relation Type";

    #[test]
    fn reads_rows_with_classification_columns() {
        let data = format!("{HEADER}\n大渡河,位于,四川,河流,位置,水系,NaN,,,地理\n");
        let triples = read_triples(&data).unwrap();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].head_major_classification, "水系");
        assert_eq!(triples[0].head_minor_classification, "NaN");
        assert_eq!(triples[0].relation_type, "地理");
    }

    #[test]
    fn tolerates_byte_order_mark() {
        let data = format!("\u{feff}{HEADER}\n大渡河,位于,四川,河流,位置,,,,,\n");
        assert_eq!(read_triples(&data).unwrap().len(), 1);
    }

    #[test]
    fn wrong_header_is_input_error() {
        let err = read_triples("Head,Relation,Tail\n甲,乙,丙\n").unwrap_err();
        assert!(matches!(err, KgError::Input(_)));
    }

    #[test]
    fn short_row_is_input_error() {
        let data = format!("{HEADER}\n大渡河,位于\n");
        assert!(matches!(read_triples(&data), Err(KgError::Input(_))));
    }

    #[test]
    fn written_file_reads_back() {
        let triples = vec![CandidateTriple::new("大渡河", "位于", "四川", "河流", "位置")];
        let bytes = write_triples(&triples).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Head,Relation,Tail,Head Type,Tail Type,"));
        assert_eq!(read_triples(&text).unwrap(), triples);
    }

    #[tokio::test]
    async fn missing_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_triples_file(&dir.path().join("absent.csv")).await.unwrap_err();
        assert!(matches!(err, KgError::Input(_)));
    }
}
