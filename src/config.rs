// Pipeline configuration: source format, reference tables and fallback
// policies.

use std::collections::BTreeMap;

/// Recife's administrative health districts (Distritos Sanitários), keyed by
/// the code found in the `id_distrit` column.
pub const RECIFE_DISTRICTS: [(i64, &str); 8] = [
    (117, "DS I - Centro Expandido"),
    (118, "DS II - Encruzilhada-Beberibe"),
    (119, "DS III - Casa Amarela-Dois Irmãos"),
    (120, "DS IV - Caxangá-Várzea"),
    (121, "DS V - Afogados-Tejipió"),
    (122, "DS VI - Ibura-Boa Viagem"),
    (123, "DS VII - Noroeste"),
    (124, "DS VIII - Jordão"),
];

pub const DEFAULT_DISTRICT_FALLBACK: &str = "DISTRITO NAO IDENTIFICADO";
pub const DEFAULT_AGE_CEILING: f64 = 120.0;
pub const DEFAULT_ENCODING: &str = "latin1";
pub const DEFAULT_DELIMITER: u8 = b';';

/// Textual markers that mean "no value" in free-text columns, compared after
/// trimming and upper-casing.
pub const DEFAULT_NULL_MARKERS: [&str; 7] = ["NULL", "NAN", "NONE", "N/A", "NA", "-", "IGNORADO"];

/// Source column names (matched case-insensitively after trimming).
pub mod columns {
    pub const NOTIFICATION_DATE: &str = "dt_notific";
    pub const CLASSIFICATION: &str = "classi_fin";
    pub const DISTRICT: &str = "id_distrit";
    pub const NEIGHBORHOOD: &str = "nm_bairro";
    pub const AGE: &str = "nu_idade_n";
    pub const SEX: &str = "cs_sexo";
    pub const EPI_WEEK: &str = "sem_not";

    /// Columns every record draws on. `sem_not` is left out: the ISO week of
    /// the notification date stands in for it.
    pub const REQUIRED: [&str; 6] = [NOTIFICATION_DATE, CLASSIFICATION, DISTRICT, NEIGHBORHOOD, AGE, SEX];
}

/// Read-only code → name lookup for health districts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistrictTable {
    names: BTreeMap<i64, String>,
}

impl DistrictTable {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        Self {
            names: entries.into_iter().map(|(code, name)| (code, name.into())).collect(),
        }
    }

    pub fn recife() -> Self {
        Self::new(RECIFE_DISTRICTS)
    }

    pub fn name(&self, code: i64) -> Option<&str> {
        self.names.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for DistrictTable {
    fn default() -> Self {
        Self::recife()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Field delimiter of the source (and of exports).
    pub delimiter: u8,
    /// WHATWG encoding label of the source, e.g. `latin1` or `utf-8`.
    pub encoding: String,
    /// Ages at or above this value are left out of age statistics.
    pub age_ceiling: f64,
    /// Name given to records whose district code is missing or unmapped.
    pub district_fallback: String,
    pub districts: DistrictTable,
    pub null_markers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            encoding: DEFAULT_ENCODING.to_string(),
            age_ceiling: DEFAULT_AGE_CEILING,
            district_fallback: DEFAULT_DISTRICT_FALLBACK.to_string(),
            districts: DistrictTable::recife(),
            null_markers: DEFAULT_NULL_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    #[must_use]
    pub fn with_age_ceiling(mut self, ceiling: f64) -> Self {
        self.age_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_district_fallback(mut self, name: impl Into<String>) -> Self {
        self.district_fallback = name.into();
        self
    }

    #[must_use]
    pub fn with_districts(mut self, districts: DistrictTable) -> Self {
        self.districts = districts;
        self
    }
}
