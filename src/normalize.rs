// Field normalizers.
//
// Each `normalize_*` function is total: bad input maps to `None` or to a
// sentinel, never to an error. [`Normalizer`] ties them together for a whole
// row and counts the fields that had to be defaulted.

use crate::classify::{classify, derive_epi_week, epi_week_from_code};
use crate::config::{columns, DistrictTable, PipelineConfig};
use crate::types::{NotificationRecord, QualityCounters, RawRow, Sex};
use crate::util::{is_present, parse_date_safe, parse_f64_safe, parse_i64_safe};
use chrono::NaiveDate;

pub const UNINFORMED: &str = "UNINFORMED";

pub fn normalize_date(raw: Option<&str>) -> Option<NaiveDate> {
    parse_date_safe(raw)
}

pub fn normalize_classification(raw: Option<&str>) -> Option<i64> {
    parse_i64_safe(raw)
}

/// Parsed district code plus its resolved name. Missing or unparseable codes
/// are resolved as code 0, which is never in the table.
pub fn normalize_district(
    raw: Option<&str>,
    table: &DistrictTable,
    fallback: &str,
) -> (Option<i64>, String) {
    let code = parse_i64_safe(raw);
    let name = table.name(code.unwrap_or(0)).unwrap_or(fallback);
    (code, name.to_string())
}

pub fn normalize_neighborhood<S: AsRef<str>>(raw: Option<&str>, null_markers: &[S]) -> String {
    let value = raw.unwrap_or("").trim().to_uppercase();
    if value.is_empty() || null_markers.iter().any(|m| m.as_ref() == value) {
        UNINFORMED.to_string()
    } else {
        value
    }
}

/// Parsed age. Range checks happen in the aggregates, see [`is_valid_age`].
pub fn normalize_age(raw: Option<&str>) -> Option<f64> {
    parse_f64_safe(raw)
}

pub fn is_valid_age(age: f64, ceiling: f64) -> bool {
    age >= 0.0 && age < ceiling
}

pub fn normalize_sex(raw: Option<&str>) -> Option<Sex> {
    let value = raw?.trim();
    match value {
        "" => None,
        "M" | "m" => Some(Sex::Male),
        "F" | "f" => Some(Sex::Female),
        "I" | "i" => Some(Sex::Ignored),
        other => Some(Sex::Other(other.to_string())),
    }
}

/// Row-level normalizer holding the reference data and policies.
#[derive(Debug, Clone)]
pub struct Normalizer {
    districts: DistrictTable,
    district_fallback: String,
    null_markers: Vec<String>,
}

impl Normalizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            districts: config.districts.clone(),
            district_fallback: config.district_fallback.clone(),
            null_markers: config.null_markers.iter().map(|m| m.trim().to_uppercase()).collect(),
        }
    }

    pub fn district_fallback(&self) -> &str {
        &self.district_fallback
    }

    pub fn normalize(&self, row: &RawRow, counters: &mut QualityCounters) -> NotificationRecord {
        let raw_date = row.get(columns::NOTIFICATION_DATE);
        let notification_date = normalize_date(raw_date);
        if notification_date.is_none() && is_present(raw_date) {
            counters.dates_defaulted += 1;
        }

        let raw_class = row.get(columns::CLASSIFICATION);
        let classification_code = normalize_classification(raw_class);
        if classification_code.is_none() && is_present(raw_class) {
            counters.classifications_defaulted += 1;
        }

        let raw_district = row.get(columns::DISTRICT);
        let (district_id, district_name) =
            normalize_district(raw_district, &self.districts, &self.district_fallback);
        let mapped = district_id.and_then(|c| self.districts.name(c)).is_some();
        if !mapped && is_present(raw_district) {
            counters.districts_defaulted += 1;
        }

        let raw_neighborhood = row.get(columns::NEIGHBORHOOD);
        let neighborhood_name = normalize_neighborhood(raw_neighborhood, &self.null_markers);
        if neighborhood_name == UNINFORMED && is_present(raw_neighborhood) {
            counters.neighborhoods_defaulted += 1;
        }

        let raw_age = row.get(columns::AGE);
        let age_years = normalize_age(raw_age);
        if age_years.is_none() && is_present(raw_age) {
            counters.ages_defaulted += 1;
        }

        let raw_week = row.get(columns::EPI_WEEK);
        if epi_week_from_code(raw_week).is_none() && is_present(raw_week) {
            counters.epi_weeks_defaulted += 1;
        }
        let epi_week = derive_epi_week(raw_week, notification_date);

        NotificationRecord {
            notification_date,
            classification_code,
            case_status: classify(classification_code),
            district_id,
            district_name,
            neighborhood_name,
            age_years,
            sex: normalize_sex(row.get(columns::SEX)),
            epi_week,
        }
    }
}
