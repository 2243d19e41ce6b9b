use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::normalize::Normalizer;
use crate::types::{Header, QualityCounters, RawRow};
use csv::{ByteRecord, ReaderBuilder};
use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Rows of a source after delimiter parsing, before any typing.
#[derive(Debug, Clone)]
pub struct ParsedRows {
    pub header: Arc<Header>,
    pub rows: Vec<RawRow>,
    pub rows_read: usize,
    pub rows_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub skipped_rows: usize,
    pub fields_defaulted: usize,
    pub quality: QualityCounters,
    /// Recognized columns the source header lacks.
    pub missing_columns: Vec<&'static str>,
}

impl LoadReport {
    fn from_dataset(dataset: &Dataset) -> Self {
        let quality = dataset.quality();
        Self {
            total_rows: quality.rows_read,
            loaded_rows: dataset.len(),
            skipped_rows: quality.rows_skipped,
            fields_defaulted: quality.fields_defaulted(),
            quality: quality.clone(),
            missing_columns: dataset.missing_columns(),
        }
    }
}

/// Read the whole source into memory. The file handle is scoped to this
/// function and closed on every return path.
pub fn read_source(path: &Path) -> Result<Vec<u8>> {
    let unavailable = |source: std::io::Error| PipelineError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(unavailable)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(unavailable)?;
    Ok(bytes)
}

pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| PipelineError::UnknownEncoding {
        label: label.to_string(),
    })
}

fn decode_record(record: &ByteRecord, encoding: &'static Encoding) -> Option<Vec<String>> {
    record
        .iter()
        .map(|field| {
            encoding
                .decode_without_bom_handling_and_without_replacement(field)
                .map(Cow::into_owned)
        })
        .collect()
}

/// Split raw source bytes into header + rows, decoding every record on its own
/// with the declared encoding. Rows the CSV reader rejects, rows with
/// undecodable bytes and rows whose field count differs from the header are
/// skipped and counted. Only an undecodable header fails the source.
pub fn parse_source(
    bytes: &[u8],
    encoding: &'static Encoding,
    delimiter: u8,
    path: &Path,
) -> Result<ParsedRows> {
    let bytes = if encoding == UTF_8 {
        bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
    } else {
        bytes
    };
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let names =
        decode_record(rdr.byte_headers()?, encoding).ok_or_else(|| PipelineError::DecodeError {
            path: path.to_path_buf(),
            encoding: encoding.name().to_string(),
        })?;
    let header = Header::new(names.iter());
    if header.is_empty() || header.names().iter().all(|n| n.is_empty()) {
        return Err(PipelineError::MissingHeader {
            path: path.to_path_buf(),
        });
    }
    let header = Arc::new(header);

    let mut rows = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_skipped = 0usize;
    for (line, result) in rdr.byte_records().enumerate() {
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                trace!(row = line + 1, error = %e, "skipping unreadable row");
                rows_skipped += 1;
                continue;
            }
        };
        if record.len() != header.len() {
            trace!(
                row = line + 1,
                fields = record.len(),
                expected = header.len(),
                "skipping row with wrong field count"
            );
            rows_skipped += 1;
            continue;
        }
        let Some(values) = decode_record(&record, encoding) else {
            trace!(row = line + 1, encoding = encoding.name(), "skipping undecodable row");
            rows_skipped += 1;
            continue;
        };
        rows.push(RawRow::new(Arc::clone(&header), values));
    }

    Ok(ParsedRows {
        header,
        rows,
        rows_read,
        rows_skipped,
    })
}

/// [`parse_source`] over text that is already decoded.
pub fn parse_rows(text: &str, delimiter: u8, path: &Path) -> Result<ParsedRows> {
    parse_source(text.as_bytes(), UTF_8, delimiter, path)
}

/// Run the full ingest: read, decode, parse, normalize.
pub fn load_dataset(path: &Path, config: &PipelineConfig) -> Result<(Dataset, LoadReport)> {
    let bytes = read_source(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "read source");
    let encoding = resolve_encoding(&config.encoding)?;
    let parsed = parse_source(&bytes, encoding, config.delimiter, path)?;

    let dataset = build_dataset(parsed, config);
    let report = LoadReport::from_dataset(&dataset);
    if !report.missing_columns.is_empty() {
        warn!(
            columns = ?report.missing_columns,
            "recognized columns not found; the dependent fields stay unknown"
        );
    }
    if report.skipped_rows > 0 {
        warn!(skipped = report.skipped_rows, "rows skipped due to malformed fields");
    }
    info!(
        path = %path.display(),
        rows = report.loaded_rows,
        skipped = report.skipped_rows,
        fields_defaulted = report.fields_defaulted,
        "dataset loaded"
    );
    Ok((dataset, report))
}

pub fn build_dataset(parsed: ParsedRows, config: &PipelineConfig) -> Dataset {
    let normalizer = Normalizer::new(config);
    let mut quality = QualityCounters {
        rows_read: parsed.rows_read,
        rows_skipped: parsed.rows_skipped,
        ..QualityCounters::default()
    };
    let records = parsed
        .rows
        .iter()
        .map(|row| normalizer.normalize(row, &mut quality))
        .collect();
    Dataset::new(parsed.header, parsed.rows, records, quality, config)
}

/// Like [`load_dataset`], but a fatal error yields an empty dataset and the
/// error message instead.
pub fn load_or_empty(path: &Path, config: &PipelineConfig) -> (Dataset, Option<String>) {
    match load_dataset(path, config) {
        Ok((dataset, _)) => (dataset, None),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to load source");
            (Dataset::empty(config), Some(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaseStatus;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_source(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn parses_semicolon_rows_and_lowercases_lookup() {
        let text = " DT_NOTIFIC ;CLASSI_FIN\n01/01/2024;10\n02/01/2024;5\n";
        let parsed = parse_rows(text, b';', Path::new("t")).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].get("classi_fin"), Some("5"));
        assert_eq!(parsed.header.names()[0], "DT_NOTIFIC");
    }

    #[test]
    fn skips_rows_with_wrong_field_count() {
        let parsed = parse_rows("a;b\n1;2\n3\n4;5;6\n7;8\n", b';', Path::new("t")).unwrap();
        assert_eq!(parsed.rows_read, 4);
        assert_eq!(parsed.rows_skipped, 2);
        assert_eq!(parsed.rows.len(), 2);
    }

    #[test]
    fn decodes_latin1() {
        let bytes = b"nm_bairro\nS\xc3O JOS\xc9\n";
        let latin1 = resolve_encoding("latin1").unwrap();
        let parsed = parse_source(bytes, latin1, b';', Path::new("t")).unwrap();
        assert_eq!(parsed.rows[0].get("nm_bairro"), Some("SÃO JOSÉ"));
    }

    #[test]
    fn strips_utf8_bom_from_header() {
        let parsed = parse_source(b"\xef\xbb\xbfDT_NOTIFIC\n01/01/2024\n", UTF_8, b';', Path::new("t"))
            .unwrap();
        assert_eq!(parsed.header.names()[0], "DT_NOTIFIC");
    }

    #[test]
    fn undecodable_row_is_skipped_not_fatal() {
        let file = temp_source(b"dt_notific;nm_bairro\n01/01/2024;IBURA\n02/01/2024;\xff\xfe\n03/01/2024;VARZEA\n");
        let config = PipelineConfig::default().with_encoding("utf-8");
        let (dataset, report) = load_dataset(file.path(), &config).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[1].neighborhood_name, "VARZEA");
    }

    #[test]
    fn undecodable_header_is_a_decode_error() {
        let err = parse_source(b"nm_\xffbairro\nIBURA\n", UTF_8, b';', Path::new("t")).unwrap_err();
        assert!(matches!(err, PipelineError::DecodeError { .. }));
    }

    #[test]
    fn unknown_encoding_label() {
        let err = resolve_encoding("klingon").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownEncoding { .. }));
    }

    #[test]
    fn missing_recognized_columns_are_reported() {
        let file = temp_source(b"dt_notific;id_distrit;nm_bairro;nu_idade_n;sem_not\n01/01/2024;117;IBURA;30;202401\n");
        let (dataset, report) = load_dataset(file.path(), &PipelineConfig::default()).unwrap();
        assert_eq!(report.missing_columns, vec!["classi_fin", "cs_sexo"]);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].case_status, CaseStatus::UnderInvestigation);
        assert_eq!(dataset.records()[0].sex, None);
    }

    #[test]
    fn optional_week_column_is_not_reported_missing() {
        let file = temp_source(
            b"dt_notific;classi_fin;id_distrit;nm_bairro;nu_idade_n;cs_sexo\n01/01/2024;10;117;IBURA;30;F\n",
        );
        let (_, report) = load_dataset(file.path(), &PipelineConfig::default()).unwrap();
        assert!(report.missing_columns.is_empty());
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = load_dataset(Path::new("/nonexistent/dengue.csv"), &PipelineConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn load_or_empty_reports_message() {
        let (dataset, message) =
            load_or_empty(Path::new("/nonexistent/dengue.csv"), &PipelineConfig::default());
        assert!(dataset.is_empty());
        assert!(message.unwrap().contains("source unavailable"));
    }

    #[test]
    fn loads_file_end_to_end() {
        let file = temp_source(
            b"dt_notific;classi_fin;id_distrit;nm_bairro\n01/01/2024;10;117;boa vista\n02/01/2024;;200;\nbroken\n",
        );
        let (dataset, report) = load_dataset(file.path(), &PipelineConfig::default()).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.loaded_rows, 2);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(dataset.records()[1].case_status, CaseStatus::UnderInvestigation);
        assert_eq!(report.quality.districts_defaulted, 1);
    }
}
