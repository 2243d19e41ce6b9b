use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tabled::Tabled;

/// Column names of a source, in file order, with a lower-cased lookup index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    /// Build a header from the raw names of the first row. Names are stored
    /// trimmed (for export) and indexed lower-cased.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().trim().to_string()).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.to_lowercase()).or_insert(i);
        }
        Self { names, index }
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

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains_key(&column.trim().to_lowercase())
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&column.trim().to_lowercase()).copied()
    }
}

/// One data row of the source, untyped. Values line up with the shared header.
#[derive(Debug, Clone)]
pub struct RawRow {
    header: Arc<Header>,
    values: Vec<String>,
}

impl RawRow {
    pub fn new(header: Arc<Header>, values: Vec<String>) -> Self {
        Self { header, values }
    }

    /// Value of `column` (case-insensitive), or `None` when the source has no
    /// such column.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.header.position(column)?;
        self.values.get(idx).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

/// Derived classification of a notification. Variant order is the label order
/// so that sorted sets come out alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CaseStatus {
    Confirmed,
    Discarded,
    Inconclusive,
    UnderInvestigation,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 4] = [
        CaseStatus::Confirmed,
        CaseStatus::Discarded,
        CaseStatus::Inconclusive,
        CaseStatus::UnderInvestigation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CaseStatus::Confirmed => "Confirmed",
            CaseStatus::Discarded => "Discarded",
            CaseStatus::Inconclusive => "Inconclusive",
            CaseStatus::UnderInvestigation => "UnderInvestigation",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        match key.to_ascii_lowercase().as_str() {
            "confirmed" => Ok(CaseStatus::Confirmed),
            "discarded" => Ok(CaseStatus::Discarded),
            "inconclusive" => Ok(CaseStatus::Inconclusive),
            "underinvestigation" | "investigation" => Ok(CaseStatus::UnderInvestigation),
            _ => Err(format!("unknown case status '{}'", s)),
        }
    }
}

/// Sex code as recorded on the notification form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sex {
    Male,
    Female,
    Ignored,
    /// Any other non-blank code, kept as written.
    Other(String),
}

impl Sex {
    pub fn code(&self) -> &str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Ignored => "I",
            Sex::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A normalized dengue notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub notification_date: Option<NaiveDate>,
    pub classification_code: Option<i64>,
    pub case_status: CaseStatus,
    pub district_id: Option<i64>,
    pub district_name: String,
    pub neighborhood_name: String,
    /// Parsed age, kept even when outside the valid range.
    pub age_years: Option<f64>,
    pub sex: Option<Sex>,
    pub epi_week: Option<u32>,
}

// Aggregate output rows. These derive both `Serialize` (CSV/JSON files) and
// `Tabled` (console previews).

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct DailyCount {
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Cases")]
    #[tabled(rename = "Cases")]
    pub cases: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct EpidemicCurvePoint {
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Cases")]
    #[tabled(rename = "Cases")]
    pub cases: usize,
    #[serde(rename = "MovingAverage7")]
    #[tabled(rename = "MovingAverage7", display_with = "display_optional")]
    pub moving_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct WeeklyCount {
    #[serde(rename = "EpiWeek")]
    #[tabled(rename = "EpiWeek")]
    pub epi_week: u32,
    #[serde(rename = "Cases")]
    #[tabled(rename = "Cases")]
    pub cases: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct CategoryCount {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub name: String,
    #[serde(rename = "Cases")]
    #[tabled(rename = "Cases")]
    pub cases: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct DistrictMonthCount {
    #[serde(rename = "District")]
    #[tabled(rename = "District")]
    pub district: String,
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: u32,
    #[serde(rename = "Cases")]
    #[tabled(rename = "Cases")]
    pub cases: usize,
}

/// One row of the age pyramid. Counts are always non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct AgeBucket {
    #[serde(rename = "AgeGroup")]
    #[tabled(rename = "AgeGroup")]
    pub label: String,
    #[serde(rename = "Male")]
    #[tabled(rename = "Male")]
    pub male: usize,
    #[serde(rename = "Female")]
    #[tabled(rename = "Female")]
    pub female: usize,
}

/// Pyramid bar as handed to a mirrored chart axis; `value` is negative on the
/// male side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct PyramidBar {
    #[serde(rename = "AgeGroup")]
    #[tabled(rename = "AgeGroup")]
    pub age_group: String,
    #[serde(rename = "Sex")]
    #[tabled(rename = "Sex")]
    pub sex: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
}

/// Data-quality counters of one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityCounters {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub dates_defaulted: usize,
    pub classifications_defaulted: usize,
    pub districts_defaulted: usize,
    pub neighborhoods_defaulted: usize,
    pub ages_defaulted: usize,
    pub epi_weeks_defaulted: usize,
}

impl QualityCounters {
    pub fn fields_defaulted(&self) -> usize {
        self.dates_defaulted
            + self.classifications_defaulted
            + self.districts_defaulted
            + self.neighborhoods_defaulted
            + self.ages_defaulted
            + self.epi_weeks_defaulted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_notifications: usize,
    pub confirmed_cases: usize,
    pub severe_cases: usize,
    pub severe_rate: f64,
    pub critical_neighborhood: String,
    pub age: Option<AgeStats>,
    pub quality: QualityCounters,
}

fn display_optional(value: &Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}
