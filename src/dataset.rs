// The normalized, read-only collection of notifications, and a process-wide
// cache of datasets keyed by source file.

use crate::config::{columns, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::loader::load_dataset;
use crate::types::{CaseStatus, Header, NotificationRecord, QualityCounters, RawRow};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tracing::debug;

/// Immutable after construction. Shared across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Dataset {
    header: Arc<Header>,
    rows: Vec<RawRow>,
    records: Vec<NotificationRecord>,
    districts: BTreeSet<String>,
    statuses: BTreeSet<CaseStatus>,
    quality: QualityCounters,
    delimiter: u8,
    encoding: String,
}

impl Dataset {
    /// `rows[i]` is the source row `records[i]` was normalized from.
    pub(crate) fn new(
        header: Arc<Header>,
        rows: Vec<RawRow>,
        records: Vec<NotificationRecord>,
        quality: QualityCounters,
        config: &PipelineConfig,
    ) -> Self {
        debug_assert_eq!(rows.len(), records.len());
        let districts = records.iter().map(|r| r.district_name.clone()).collect();
        let statuses = records.iter().map(|r| r.case_status).collect();
        Self {
            header,
            rows,
            records,
            districts,
            statuses,
            quality,
            delimiter: config.delimiter,
            encoding: config.encoding.clone(),
        }
    }

    pub fn empty(config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(Header::default()),
            Vec::new(),
            Vec::new(),
            QualityCounters::default(),
            config,
        )
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Distinct district names, sorted.
    pub fn districts(&self) -> impl Iterator<Item = &str> {
        self.districts.iter().map(String::as_str)
    }

    /// Distinct case statuses, sorted.
    pub fn statuses(&self) -> impl Iterator<Item = CaseStatus> + '_ {
        self.statuses.iter().copied()
    }

    /// Required columns the source header lacks, in [`columns::REQUIRED`] order.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        columns::REQUIRED
            .into_iter()
            .filter(|c| !self.header.contains(c))
            .collect()
    }

    pub fn quality(&self) -> &QualityCounters {
        &self.quality
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SourceKey {
    path: PathBuf,
    modified: Option<SystemTime>,
    len: u64,
}

impl SourceKey {
    fn for_path(path: &Path) -> Result<Self> {
        let unavailable = |source: std::io::Error| PipelineError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        };
        let path = path.canonicalize().map_err(unavailable)?;
        let meta = std::fs::metadata(&path).map_err(unavailable)?;
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
            path,
        })
    }
}

/// Builds each source once and hands out shared references. A source whose
/// modification time or size changed is rebuilt.
#[derive(Debug)]
pub struct DatasetCache {
    config: PipelineConfig,
    entries: Mutex<HashMap<SourceKey, Arc<Dataset>>>,
}

impl DatasetCache {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn get_or_load(&self, path: &Path) -> Result<Arc<Dataset>> {
        let key = SourceKey::for_path(path)?;
        if let Some(hit) = self.lock().get(&key) {
            debug!(path = %key.path.display(), "dataset cache hit");
            return Ok(Arc::clone(hit));
        }

        // Parsing runs without the lock held; a concurrent miss on the same
        // key only costs a duplicate build.
        debug!(path = %key.path.display(), "dataset cache miss");
        let (dataset, _) = load_dataset(&key.path, &self.config)?;
        let dataset = Arc::new(dataset);
        let mut entries = self.lock();
        entries.retain(|k, _| k.path != key.path);
        entries.insert(key, Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SourceKey, Arc<Dataset>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SOURCE: &str = "dt_notific;classi_fin;id_distrit;nm_bairro\n\
                          01/01/2024;10;118;AREIAS\n\
                          02/01/2024;5;117;IBURA\n\
                          03/01/2024;12;118;IBURA\n";

    fn temp_source(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn exposes_sorted_distinct_values() {
        let file = temp_source(SOURCE);
        let (dataset, _) = load_dataset(file.path(), &PipelineConfig::default()).unwrap();
        let districts: Vec<&str> = dataset.districts().collect();
        assert_eq!(
            districts,
            vec!["DS I - Centro Expandido", "DS II - Encruzilhada-Beberibe"]
        );
        let statuses: Vec<CaseStatus> = dataset.statuses().collect();
        assert_eq!(statuses, vec![CaseStatus::Confirmed, CaseStatus::Discarded]);
    }

    #[test]
    fn source_rows_stay_aligned_after_skips() {
        let file = temp_source(
            "dt_notific;classi_fin;id_distrit;nm_bairro\n\
             01/01/2024;10;118;AREIAS\n\
             broken\n\
             03/01/2024;12;118;IBURA\n",
        );
        let (dataset, report) = load_dataset(file.path(), &PipelineConfig::default()).unwrap();
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(dataset.rows().len(), dataset.records().len());
        let neighborhoods: Vec<&str> = dataset
            .rows()
            .iter()
            .filter_map(|row| row.get("nm_bairro"))
            .collect();
        assert_eq!(neighborhoods, vec!["AREIAS", "IBURA"]);
        assert_eq!(dataset.records()[1].neighborhood_name, "IBURA");
    }

    #[test]
    fn lists_missing_required_columns() {
        let dataset = Dataset::empty(&PipelineConfig::default());
        assert_eq!(dataset.missing_columns().len(), columns::REQUIRED.len());
        let file = temp_source(SOURCE);
        let (dataset, _) = load_dataset(file.path(), &PipelineConfig::default()).unwrap();
        assert_eq!(dataset.missing_columns(), vec!["nu_idade_n", "cs_sexo"]);
    }

    #[test]
    fn cache_returns_the_same_dataset() {
        let file = temp_source(SOURCE);
        let cache = DatasetCache::new(PipelineConfig::default());
        let first = cache.get_or_load(file.path()).unwrap();
        let second = cache.get_or_load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_rebuilds_when_source_changes() {
        let mut file = temp_source(SOURCE);
        let cache = DatasetCache::new(PipelineConfig::default());
        let first = cache.get_or_load(file.path()).unwrap();
        writeln!(file, "04/01/2024;11;119;VARZEA").unwrap();
        file.flush().unwrap();
        let second = cache.get_or_load(file.path()).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_miss_on_missing_file_is_fatal() {
        let cache = DatasetCache::new(PipelineConfig::default());
        let err = cache.get_or_load(Path::new("/nonexistent/x.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn empty_dataset_has_no_values() {
        let dataset = Dataset::empty(&PipelineConfig::default());
        assert!(dataset.is_empty());
        assert_eq!(dataset.districts().count(), 0);
        assert_eq!(dataset.statuses().count(), 0);
    }
}
