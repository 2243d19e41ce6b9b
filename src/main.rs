// Entry point and high-level CLI flow.
//
// - Option [1] loads and normalizes the notification export, printing
//   data-quality counters.
// - Option [2] generates the aggregate reports and a JSON summary for the
//   current filter selection.
// - Option [3] exports the filtered notifications in the source format.
use clap::Parser;
use dengue_report::config::{DEFAULT_AGE_CEILING, DEFAULT_DISTRICT_FALLBACK, DEFAULT_ENCODING};
use dengue_report::logging::{init_logging, LogConfig};
use dengue_report::types::CaseStatus;
use dengue_report::util::{format_int, format_number};
use dengue_report::{
    apply, output, reports, Dataset, DatasetCache, FilterSelection, PipelineConfig,
};
use once_cell::sync::{Lazy, OnceCell};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Parser, Debug)]
#[command(
    name = "dengue_report",
    version,
    about = "Dengue notification reports: epidemic curve, hotspots, severity and age profile"
)]
struct Cli {
    /// Notification export to load.
    #[arg(long, value_name = "PATH", default_value = "./dados-historicos/dengue-recife-2024.csv")]
    source: PathBuf,

    /// Field delimiter of the source.
    #[arg(long, default_value = ";", value_parser = parse_delimiter)]
    delimiter: u8,

    /// Text encoding of the source (any WHATWG label).
    #[arg(long, default_value = DEFAULT_ENCODING)]
    encoding: String,

    /// Ages at or above this value are left out of age statistics.
    #[arg(long, default_value_t = DEFAULT_AGE_CEILING)]
    age_ceiling: f64,

    /// Name used for missing or unmapped district codes.
    #[arg(long, default_value = DEFAULT_DISTRICT_FALLBACK)]
    district_fallback: String,

    /// Number of neighborhoods in the ranking.
    #[arg(long, default_value_t = 10)]
    top_n: usize,

    /// Only include this district (repeatable).
    #[arg(long = "district", value_name = "NAME")]
    districts: Vec<String>,

    /// Only include this case status (repeatable).
    #[arg(long = "status", value_name = "STATUS")]
    statuses: Vec<CaseStatus>,

    /// Leave out discarded notifications.
    #[arg(long)]
    exclude_discarded: bool,

    /// Directory for report files and exports.
    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Single-line log output.
    #[arg(long)]
    compact_logs: bool,
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s.as_bytes() {
        [b] => Ok(*b),
        _ if s == "\\t" => Ok(b'\t'),
        _ => Err(format!("delimiter must be a single byte, got '{}'", s)),
    }
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_delimiter(self.delimiter)
            .with_encoding(self.encoding.clone())
            .with_age_ceiling(self.age_ceiling)
            .with_district_fallback(self.district_fallback.clone())
    }

    fn selection(&self) -> FilterSelection {
        let mut selection = FilterSelection::all();
        if !self.districts.is_empty() {
            selection = selection.with_districts(self.districts.iter().cloned());
        }
        if !self.statuses.is_empty() {
            selection = selection.with_statuses(self.statuses.iter().copied());
        }
        if self.exclude_discarded {
            selection = selection.without_status(CaseStatus::Discarded);
        }
        selection
    }
}

// Datasets are cached per source file for the whole run; the app state only
// remembers which one is current.
static DATASET_CACHE: OnceCell<DatasetCache> = OnceCell::new();
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct AppState {
    data: Option<Arc<Dataset>>,
}

fn current_dataset() -> Option<Arc<Dataset>> {
    let state = APP_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    state.data.clone()
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
///
/// Returns `None` once stdin is closed.
fn read_choice() -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Ask whether to go back to the report selection menu.
///
/// Returns `true` for `Y`, `false` for `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        if io::stdin().read_line(&mut buf).unwrap_or(0) == 0 {
            return false;
        }
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Handle option [1]: load (or fetch from cache) and normalize the source.
fn handle_load(cli: &Cli) {
    let Some(cache) = DATASET_CACHE.get() else {
        eprintln!("Internal error: dataset cache not initialized.\n");
        return;
    };
    match cache.get_or_load(&cli.source) {
        Ok(dataset) => {
            let quality = dataset.quality();
            println!(
                "Processing dataset... ({} rows read, {} notifications loaded)",
                format_int(quality.rows_read),
                format_int(dataset.len())
            );
            println!(
                "Note: {} rows skipped due to malformed fields.",
                format_int(quality.rows_skipped)
            );
            if quality.fields_defaulted() > 0 {
                println!(
                    "Info: {} fields replaced by an unknown/sentinel value \
                     (dates {}, classifications {}, districts {}, neighborhoods {}, ages {}, weeks {}).",
                    format_int(quality.fields_defaulted()),
                    quality.dates_defaulted,
                    quality.classifications_defaulted,
                    quality.districts_defaulted,
                    quality.neighborhoods_defaulted,
                    quality.ages_defaulted,
                    quality.epi_weeks_defaulted,
                );
            }
            let missing = dataset.missing_columns();
            if !missing.is_empty() {
                println!(
                    "Warning: columns not found in the source: {}. Those fields stay unknown.",
                    missing.join(", ")
                );
            }
            let districts: Vec<&str> = dataset.districts().collect();
            println!("Districts: {}", districts.join(", "));
            println!();
            let mut state = APP_STATE.lock().unwrap_or_else(PoisonError::into_inner);
            state.data = Some(dataset);
        }
        Err(e) => {
            tracing::error!(error = %e, "load failed");
            eprintln!("Failed to load file: {}\n", e);
            let mut state = APP_STATE.lock().unwrap_or_else(PoisonError::into_inner);
            state.data = Some(Arc::new(Dataset::empty(cache.config())));
        }
    }
}

fn report_path(cli: &Cli, name: &str) -> PathBuf {
    cli.out_dir.join(name)
}

fn save_csv<T: serde::Serialize>(path: &Path, rows: &[T]) {
    if let Err(e) = output::write_csv(path, rows) {
        eprintln!("Write error: {}", e);
    }
}

/// Handle option [2]: generate every aggregate for the current selection,
/// write them to files and print previews.
fn handle_generate_reports(cli: &Cli) {
    let Some(data) = current_dataset() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return;
    };
    let selection = cli.selection();
    let view = apply(&data, &selection);
    tracing::debug!(records = view.len(), "filtered view");

    println!("Generating reports...");
    println!("Outputs saved to individual files...\n");

    let curve = reports::epidemic_curve(&view);
    let file1 = report_path(cli, "report1_epidemic_curve.csv");
    save_csv(&file1, &curve);
    println!("Report 1: Daily Epidemic Curve (7-day moving average)\n");
    output::preview_table_rows(&curve, 10);
    println!("(Full table exported to {})\n", file1.display());

    let weekly = reports::weekly_series(&view);
    let file2 = report_path(cli, "report2_weekly_cases.csv");
    save_csv(&file2, &weekly);
    println!("Report 2: Cases per Epidemiological Week\n");
    output::preview_table_rows(&weekly, 5);
    println!("(Full table exported to {})\n", file2.display());

    let top = reports::top_neighborhoods(&view, cli.top_n);
    let file3 = report_path(cli, "report3_top_neighborhoods.csv");
    save_csv(&file3, &top);
    println!("Report 3: Top {} Neighborhoods\n", cli.top_n);
    output::preview_table_rows(&top, cli.top_n);
    println!("(Full table exported to {})\n", file3.display());

    let sexes = reports::sex_distribution(&view);
    let file4 = report_path(cli, "report4_sex_distribution.csv");
    save_csv(&file4, &sexes);
    println!("Report 4: Distribution by Sex\n");
    output::preview_table_rows(&sexes, 5);

    let bars = output::pyramid_bars(&reports::age_pyramid(&view));
    let file5 = report_path(cli, "report5_age_pyramid.csv");
    save_csv(&file5, &bars);
    println!("Report 5: Age Pyramid\n");
    output::preview_table_rows(&bars, 18);
    println!("(Full table exported to {})\n", file5.display());

    let matrix = reports::district_month_matrix(&view);
    let file6 = report_path(cli, "report6_district_month.csv");
    save_csv(&file6, &matrix);
    println!("Report 6: Risk Matrix (District x Month)\n");
    output::preview_table_rows(&matrix, 5);
    println!("(Full table exported to {})\n", file6.display());

    let statuses = reports::status_distribution(&view);
    println!("Case status breakdown:\n");
    output::preview_table_rows(&statuses, 4);

    let summary = reports::generate_summary(&view, cli.age_ceiling);
    if let Err(e) = output::write_json(&report_path(cli, "summary.json"), &summary) {
        eprintln!("Write error: {}", e);
    }
    println!("Summary Stats (summary.json):");
    println!(
        "{{\"total_notifications\": {}, \"severe_cases\": {}, \"severe_rate\": {}%, \"critical_neighborhood\": \"{}\"}}",
        format_int(summary.total_notifications),
        format_int(summary.severe_cases),
        format_number(summary.severe_rate * 100.0, 2),
        summary.critical_neighborhood
    );
    if let Some(age) = &summary.age {
        println!(
            "Mean age is {} years and the median is {} years.",
            format_number(age.mean, 1),
            format_number(age.median, 0)
        );
    }
    println!();
}

/// Handle option [3]: write the filtered notifications back in the source
/// format.
fn handle_export(cli: &Cli) {
    let Some(data) = current_dataset() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return;
    };
    let view = apply(&data, &cli.selection());
    let path = report_path(cli, "filtered_notifications.csv");
    match output::export_view_to_path(&view, &path) {
        Ok(()) => println!(
            "Exported {} notifications to {}\n",
            format_int(view.len()),
            path.display()
        ),
        Err(e) => eprintln!("Write error: {}\n", e),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose).with_compact(cli.compact_logs));
    let _ = DATASET_CACHE.set(DatasetCache::new(cli.pipeline_config()));

    loop {
        println!("Select Option:");
        println!("[1] Load the file");
        println!("[2] Generate Reports");
        println!("[3] Export Filtered Notifications\n");
        let Some(choice) = read_choice() else {
            println!("Exiting the program.");
            break;
        };
        match choice.as_str() {
            "1" => handle_load(&cli),
            "2" => {
                println!();
                handle_generate_reports(&cli);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "3" => handle_export(&cli),
            _ => println!("Invalid choice. Please enter 1, 2 or 3.\n"),
        }
    }
}
