// Case classification and epidemiological week derivation.
//
// Both are pure functions of already-parsed values; the classifier looks at
// the final classification code (`classi_fin`) and nothing else.
use crate::types::CaseStatus;
use crate::util::parse_i64_safe;
use chrono::{Datelike, NaiveDate};

pub const DISCARDED_CODE: i64 = 5;
pub const CONFIRMED_CODES: [i64; 3] = [10, 11, 12];
/// Dengue with alarm signs / severe dengue.
pub const SEVERE_CODE: i64 = 12;

pub fn classify(code: Option<i64>) -> CaseStatus {
    match code {
        None => CaseStatus::UnderInvestigation,
        Some(DISCARDED_CODE) => CaseStatus::Discarded,
        Some(c) if CONFIRMED_CODES.contains(&c) => CaseStatus::Confirmed,
        Some(_) => CaseStatus::Inconclusive,
    }
}

pub fn is_severe(code: Option<i64>) -> bool {
    code == Some(SEVERE_CODE)
}

/// Week number from a combined year+week code such as `202407`: the two
/// low-order digits, kept only when they form a valid week.
pub fn epi_week_from_code(raw: Option<&str>) -> Option<u32> {
    let code = parse_i64_safe(raw)?;
    if code < 0 {
        return None;
    }
    let week = (code % 100) as u32;
    (1..=53).contains(&week).then_some(week)
}

pub fn iso_week(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// The week code wins when it yields a valid week; otherwise the ISO week of
/// the notification date. Near year boundaries the two can disagree.
pub fn derive_epi_week(week_code: Option<&str>, date: Option<NaiveDate>) -> Option<u32> {
    epi_week_from_code(week_code).or_else(|| date.map(iso_week))
}
