use crate::classify::is_severe;
use crate::filter::FilteredView;
use crate::normalize::{is_valid_age, UNINFORMED};
use crate::types::{
    AgeBucket, AgeStats, CaseStatus, CategoryCount, DailyCount, DistrictMonthCount,
    EpidemicCurvePoint, NotificationRecord, Sex, SummaryStats, WeeklyCount,
};
use crate::util::{average, median, safe_ratio};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const MOVING_AVERAGE_WINDOW: usize = 7;
/// Returned by [`critical_neighborhood`] when no neighborhood is informed.
pub const NO_NEIGHBORHOOD: &str = "-";
/// Ages at or above this bound are left out of the pyramid.
pub const PYRAMID_AGE_LIMIT: f64 = 100.0;
const PYRAMID_BUCKET_WIDTH: u32 = 10;
const PYRAMID_OPEN_BUCKET: u32 = 80;

/// Cases per notification date, ascending. Undated records are left out.
pub fn daily_series(view: &FilteredView<'_>) -> Vec<DailyCount> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in view.iter().filter_map(|r| r.notification_date) {
        *counts.entry(date).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(date, cases)| DailyCount { date, cases })
        .collect()
}

/// Trailing mean over `window` points. Positions with fewer than `window`
/// points behind them (inclusive) are `None`.
pub fn moving_average(values: &[usize], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let mut out = Vec::with_capacity(values.len());
    let mut running = 0usize;
    for (i, v) in values.iter().enumerate() {
        running += v;
        if i >= window {
            running -= values[i - window];
        }
        if i + 1 >= window {
            out.push(Some(running as f64 / window as f64));
        } else {
            out.push(None);
        }
    }
    out
}

/// Daily series with its 7-point trailing moving average.
pub fn epidemic_curve(view: &FilteredView<'_>) -> Vec<EpidemicCurvePoint> {
    let daily = daily_series(view);
    let counts: Vec<usize> = daily.iter().map(|d| d.cases).collect();
    daily
        .into_iter()
        .zip(moving_average(&counts, MOVING_AVERAGE_WINDOW))
        .map(|(d, moving_average)| EpidemicCurvePoint {
            date: d.date,
            cases: d.cases,
            moving_average,
        })
        .collect()
}

pub fn weekly_series(view: &FilteredView<'_>) -> Vec<WeeklyCount> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for week in view.iter().filter_map(|r| r.epi_week) {
        *counts.entry(week).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(epi_week, cases)| WeeklyCount { epi_week, cases })
        .collect()
}

/// Sort by count descending, then name ascending.
fn rank(counts: HashMap<String, usize>) -> Vec<CategoryCount> {
    let mut rows: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(name, cases)| CategoryCount { name, cases })
        .collect();
    rows.sort_by(|a, b| b.cases.cmp(&a.cases).then_with(|| a.name.cmp(&b.name)));
    rows
}

fn neighborhood_counts(view: &FilteredView<'_>) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in view.iter().filter(|r| r.neighborhood_name != UNINFORMED) {
        *counts.entry(r.neighborhood_name.clone()).or_default() += 1;
    }
    counts
}

/// The `n` neighborhoods with most notifications, uninformed ones excluded.
pub fn top_neighborhoods(view: &FilteredView<'_>, n: usize) -> Vec<CategoryCount> {
    let mut rows = rank(neighborhood_counts(view));
    rows.truncate(n);
    rows
}

/// Most frequent informed neighborhood; ties go to the alphabetically first.
pub fn critical_neighborhood(view: &FilteredView<'_>) -> String {
    rank(neighborhood_counts(view))
        .into_iter()
        .next()
        .map(|row| row.name)
        .unwrap_or_else(|| NO_NEIGHBORHOOD.to_string())
}

pub fn severe_count(view: &FilteredView<'_>) -> usize {
    view.iter().filter(|r| is_severe(r.classification_code)).count()
}

pub fn status_count(view: &FilteredView<'_>, status: CaseStatus) -> usize {
    view.iter().filter(|r| r.case_status == status).count()
}

/// Severe cases over all cases in the view; 0 for an empty view.
pub fn severe_rate(view: &FilteredView<'_>) -> f64 {
    let mut total = 0usize;
    let mut severe = 0usize;
    for r in view.iter() {
        total += 1;
        if is_severe(r.classification_code) {
            severe += 1;
        }
    }
    safe_ratio(severe, total)
}

pub fn status_distribution(view: &FilteredView<'_>) -> Vec<CategoryCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in view.iter() {
        *counts.entry(r.case_status.to_string()).or_default() += 1;
    }
    rank(counts)
}

pub fn sex_distribution(view: &FilteredView<'_>) -> Vec<CategoryCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in view.iter() {
        let key = r.sex.as_ref().map(Sex::code).unwrap_or(UNINFORMED);
        *counts.entry(key.to_string()).or_default() += 1;
    }
    rank(counts)
}

fn valid_ages<'v>(view: &FilteredView<'v>, ceiling: f64) -> Vec<(f64, &'v NotificationRecord)> {
    view.iter()
        .filter_map(|r| {
            r.age_years
                .filter(|age| is_valid_age(*age, ceiling))
                .map(|age| (age, r))
        })
        .collect()
}

/// Mean and median of ages in `[0, ceiling)`; `None` when there are none.
pub fn age_stats(view: &FilteredView<'_>, ceiling: f64) -> Option<AgeStats> {
    let ages: Vec<f64> = valid_ages(view, ceiling).into_iter().map(|(age, _)| age).collect();
    if ages.is_empty() {
        return None;
    }
    Some(AgeStats {
        count: ages.len(),
        mean: average(&ages),
        median: median(ages),
    })
}

fn bucket_label(lower: u32) -> String {
    if lower >= PYRAMID_OPEN_BUCKET {
        format!("{}+", lower)
    } else {
        format!("{}-{}", lower, lower + PYRAMID_BUCKET_WIDTH - 1)
    }
}

/// Male/female counts per ten-year age group `[0,10)`, …, `[80,100)`. Other
/// sex codes are not part of this view.
pub fn age_pyramid(view: &FilteredView<'_>) -> Vec<AgeBucket> {
    let mut buckets: Vec<AgeBucket> = (0..=PYRAMID_OPEN_BUCKET)
        .step_by(PYRAMID_BUCKET_WIDTH as usize)
        .map(|lower| AgeBucket {
            label: bucket_label(lower),
            male: 0,
            female: 0,
        })
        .collect();
    let last = buckets.len() - 1;
    for (age, r) in valid_ages(view, PYRAMID_AGE_LIMIT) {
        let idx = ((age as u32) / PYRAMID_BUCKET_WIDTH) as usize;
        let bucket = &mut buckets[idx.min(last)];
        match r.sex {
            Some(Sex::Male) => bucket.male += 1,
            Some(Sex::Female) => bucket.female += 1,
            _ => {}
        }
    }
    buckets
}

/// Notifications per district and calendar month, undated records excluded.
pub fn district_month_matrix(view: &FilteredView<'_>) -> Vec<DistrictMonthCount> {
    let mut counts: BTreeMap<(String, u32), usize> = BTreeMap::new();
    for r in view.iter() {
        if let Some(date) = r.notification_date {
            *counts.entry((r.district_name.clone(), date.month())).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|((district, month), cases)| DistrictMonthCount {
            district,
            month,
            cases,
        })
        .collect()
}

/// Headline metrics of a view.
pub fn generate_summary(view: &FilteredView<'_>, age_ceiling: f64) -> SummaryStats {
    let total_notifications = view.len();
    let severe_cases = severe_count(view);
    let summary = SummaryStats {
        total_notifications,
        confirmed_cases: status_count(view, CaseStatus::Confirmed),
        severe_cases,
        severe_rate: safe_ratio(severe_cases, total_notifications),
        critical_neighborhood: critical_neighborhood(view),
        age: age_stats(view, age_ceiling),
        quality: view.dataset().quality().clone(),
    };
    debug!(
        total = summary.total_notifications,
        severe = summary.severe_cases,
        "summary computed"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::dataset::Dataset;
    use crate::filter::{apply, FilterSelection};
    use crate::loader::{build_dataset, parse_rows};
    use std::path::Path;

    fn dataset(text: &str) -> Dataset {
        let parsed = parse_rows(text, b';', Path::new("t")).unwrap();
        build_dataset(parsed, &PipelineConfig::default())
    }

    /// Ten consecutive days starting 2024-01-01 with the given daily counts.
    fn ten_days() -> Dataset {
        let counts = [5, 3, 8, 2, 9, 4, 6, 7, 1, 5];
        let mut text = String::from("dt_notific;classi_fin\n");
        for (day, n) in counts.iter().enumerate() {
            for _ in 0..*n {
                text.push_str(&format!("{:02}/01/2024;10\n", day + 1));
            }
        }
        dataset(&text)
    }

    #[test]
    fn moving_average_is_undefined_before_a_full_window() {
        let ma = moving_average(&[5, 3, 8, 2, 9, 4, 6, 7, 1, 5], 7);
        assert!(ma[..6].iter().all(Option::is_none));
        let expected = (5 + 3 + 8 + 2 + 9 + 4 + 6) as f64 / 7.0;
        assert!((ma[6].unwrap() - expected).abs() < 1e-9);
        assert!((ma[9].unwrap() - (2 + 9 + 4 + 6 + 7 + 1 + 5) as f64 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn moving_average_of_short_series_is_all_none() {
        assert_eq!(moving_average(&[1, 2, 3], 7), vec![None, None, None]);
        assert!(moving_average(&[], 7).is_empty());
    }

    #[test]
    fn epidemic_curve_matches_worked_example() {
        let ds = ten_days();
        let view = apply(&ds, &FilterSelection::all());
        let curve = epidemic_curve(&view);
        assert_eq!(curve.len(), 10);
        assert_eq!(curve[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let seventh = &curve[6];
        assert_eq!(seventh.date, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(format!("{:.2}", seventh.moving_average.unwrap()), "5.29");
        assert!(curve[5].moving_average.is_none());
    }

    #[test]
    fn weekly_series_sums_daily_counts() {
        let ds = ten_days();
        let view = apply(&ds, &FilterSelection::all());
        let weekly = weekly_series(&view);
        assert_eq!(
            weekly,
            vec![
                WeeklyCount { epi_week: 1, cases: 37 },
                WeeklyCount { epi_week: 2, cases: 13 },
            ]
        );
        assert_eq!(weekly.iter().map(|w| w.cases).sum::<usize>(), 50);
    }

    #[test]
    fn undated_records_are_left_out_of_date_series() {
        let ds = dataset("dt_notific;classi_fin\n01/01/2024;10\nnot a date;10\n;10\n");
        let view = apply(&ds, &FilterSelection::all());
        assert_eq!(view.len(), 3);
        assert_eq!(daily_series(&view).len(), 1);
        assert_eq!(district_month_matrix(&view).len(), 1);
    }

    #[test]
    fn neighborhood_spellings_count_as_one() {
        let ds = dataset("nm_bairro\n  ibura \nIBURA\nIbura\nVARZEA\n\n");
        let view = apply(&ds, &FilterSelection::all());
        let top = top_neighborhoods(&view, 10);
        assert_eq!(top[0], CategoryCount { name: "IBURA".into(), cases: 3 });
        assert_eq!(critical_neighborhood(&view), "IBURA");
    }

    #[test]
    fn ranking_ties_break_by_name() {
        let ds = dataset("nm_bairro\nVARZEA\nAREIAS\nVARZEA\nAREIAS\nIBURA\nNULL\nNULL\nNULL\n");
        let view = apply(&ds, &FilterSelection::all());
        let names: Vec<String> = top_neighborhoods(&view, 2).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["AREIAS", "VARZEA"]);
        assert_eq!(critical_neighborhood(&view), "AREIAS");
    }

    #[test]
    fn severe_code_counts_as_confirmed_and_severe() {
        let ds = dataset("classi_fin\n12\n10\n5\n");
        let view = apply(&ds, &FilterSelection::all());
        assert_eq!(status_count(&view, CaseStatus::Confirmed), 2);
        assert_eq!(severe_count(&view), 1);
        assert!((severe_rate(&view) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_view_yields_empty_results() {
        let ds = ten_days();
        let view = apply(&ds, &FilterSelection::all().with_statuses(Vec::<CaseStatus>::new()));
        assert!(view.is_empty());
        assert!(daily_series(&view).is_empty());
        assert!(epidemic_curve(&view).is_empty());
        assert!(weekly_series(&view).is_empty());
        assert!(top_neighborhoods(&view, 10).is_empty());
        assert_eq!(critical_neighborhood(&view), NO_NEIGHBORHOOD);
        assert_eq!(severe_rate(&view), 0.0);
        assert!(age_stats(&view, 120.0).is_none());
        assert!(age_pyramid(&view).iter().all(|b| b.male == 0 && b.female == 0));
        let summary = generate_summary(&view, 120.0);
        assert_eq!(summary.total_notifications, 0);
        assert_eq!(summary.severe_rate, 0.0);
    }

    #[test]
    fn age_pyramid_buckets_and_exclusions() {
        let ds = dataset(
            "nu_idade_n;cs_sexo\n0;M\n9;M\n10;F\n85;F\n99;M\n100;M\n150;F\n-1;F\n30;I\n40;\nabc;M\n",
        );
        let view = apply(&ds, &FilterSelection::all());
        let pyramid = age_pyramid(&view);
        assert_eq!(pyramid.len(), 9);
        assert_eq!(pyramid[0], AgeBucket { label: "0-9".into(), male: 2, female: 0 });
        assert_eq!(pyramid[1].female, 1);
        assert_eq!(pyramid[8], AgeBucket { label: "80+".into(), male: 1, female: 1 });
        let total: usize = pyramid.iter().map(|b| b.male + b.female).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn age_stats_respect_ceiling() {
        let ds = dataset("nu_idade_n\n10\n20\n30\n130\n");
        let view = apply(&ds, &FilterSelection::all());
        let stats = age_stats(&view, 120.0).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 20.0);
        assert_eq!(stats.median, 20.0);
    }

    #[test]
    fn sex_distribution_groups_missing_values() {
        let ds = dataset("cs_sexo;x\nM;1\nF;1\nM;1\n;1\n");
        let view = apply(&ds, &FilterSelection::all());
        let dist = sex_distribution(&view);
        assert_eq!(dist[0], CategoryCount { name: "M".into(), cases: 2 });
        assert!(dist.iter().any(|c| c.name == UNINFORMED && c.cases == 1));
    }

    #[test]
    fn district_month_matrix_groups_by_month() {
        let ds = dataset("dt_notific;id_distrit\n01/01/2024;117\n15/01/2024;117\n01/02/2024;117\n01/02/2024;118\n");
        let view = apply(&ds, &FilterSelection::all());
        let matrix = district_month_matrix(&view);
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix[0].month, 1);
        assert_eq!(matrix[0].cases, 2);
        assert_eq!(matrix[2].district, "DS II - Encruzilhada-Beberibe");
    }
}
