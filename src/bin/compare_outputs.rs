use clap::Parser;
use oas_harvest::core::compare::compare_outputs;
use oas_harvest::core::reconcile::{ReconcileOptions, DEFAULT_ROW_LIMIT};
use oas_harvest::core::CsvLoader;
use oas_harvest::utils::logger;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "compare-outputs")]
#[command(about = "Compare dashboard exports, API reports and harvested messages")]
struct Args {
    /// Directory holding ui*, report* and messages* files
    #[arg(default_value = "data")]
    data_dir: PathBuf,

    /// Extension of the exported tables to compare
    #[arg(long, default_value = "csv")]
    table_extension: String,

    /// Pair rows by this flattened column instead of by position
    #[arg(long)]
    identity_column: Option<String>,

    /// Number of message rows compared against the report
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
    row_limit: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn verdict(equal: Option<bool>, what: &str) -> String {
    match equal {
        Some(true) => format!("The {} from the UI exactly equals the {} from the API", what, what),
        Some(false) => "Unexpected difference!".to_string(),
        None => format!("No UI {} export found, skipped", what),
    }
}

fn main() {
    let args = Args::parse();

    // 初始化日誌
    if let Err(e) = logger::init_cli_logger(args.verbose, None, None) {
        eprintln!("⚠️ Logging setup failed: {}", e);
    }

    let options = ReconcileOptions::default()
        .with_labels("message", "report")
        .with_row_limit(Some(args.row_limit))
        .with_identity_column(args.identity_column);

    let summary = match compare_outputs(
        &args.data_dir,
        &CsvLoader::default(),
        &args.table_extension,
        Some(options),
    ) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("❌ Comparison failed: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    println!("=============== Start comparing tables ===============");
    println!("{}", verdict(summary.tabular_equal, "table"));

    println!("=============== Start comparing json ===============");
    println!("{}", verdict(summary.json_equal, "json"));

    println!("=============== Start comparing report and messages ===============");
    print!("{}", summary.reconciliation);

    println!("finished!");
}
