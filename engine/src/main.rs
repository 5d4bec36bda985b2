//! Tabmap CLI - run declarative spreadsheet pipelines
//!
//! # Main Commands
//!
//! ```bash
//! tabmap run gods.yaml                  # Run a pipeline config
//! tabmap run gods.yaml --dump "Male God names" --relative
//! tabmap check gods.yaml                # List jobs and operators without running
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! tabmap sheets gods.xlsx               # List the sheets of a workbook
//! tabmap read gods.xlsx --sheet Gods    # Print a sheet as JSON records
//! tabmap operators                      # Show available operators
//! tabmap example-config                 # Print an example pipeline
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); a `.env` file is loaded
//! if present.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tabmap::{
    example_config, read_records, run_config_file, sheet_names, Config, Op, PipelineOptions,
    SheetSelection,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabmap")]
#[command(about = "Declarative transformations of spreadsheet records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline config (YAML or JSON)
    Run {
        /// Config file
        config: PathBuf,

        /// Print a collection as JSON after the run (repeatable)
        #[arg(short, long)]
        dump: Vec<String>,

        /// Resolve load/save paths relative to the config file
        #[arg(short, long)]
        relative: bool,
    },

    /// Parse a config and list its jobs without running them
    Check {
        /// Config file
        config: PathBuf,
    },

    /// Read a sheet, CSV or JSON file and print its records as JSON
    Read {
        /// Input file
        path: PathBuf,

        /// Sheet name (default: first sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Top-left cell of the region to read, e.g. D4
        #[arg(long)]
        range_from: Option<String>,

        /// Bottom-right cell of the region to read, e.g. E18
        #[arg(long)]
        range_to: Option<String>,

        /// Output JSON file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the sheets of a workbook
    Sheets {
        /// Workbook file
        path: PathBuf,
    },

    /// Show available operators
    Operators,

    /// Print an example pipeline config
    ExampleConfig,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, dump, relative } => cmd_run(&config, &dump, relative),
        Commands::Check { config } => cmd_check(&config),
        Commands::Read {
            path,
            sheet,
            range_from,
            range_to,
            output,
        } => cmd_read(
            &path,
            sheet.as_deref(),
            range_from.as_deref(),
            range_to.as_deref(),
            output.as_deref(),
        ),
        Commands::Sheets { path } => cmd_sheets(&path),
        Commands::Operators => cmd_operators(),
        Commands::ExampleConfig => cmd_example_config(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config: &Path, dump: &[String], relative: bool) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Running: {}", config.display());

    let options = PipelineOptions {
        relative_to_config: relative,
        ..Default::default()
    };
    let report = run_config_file(config, options)?;

    for name in dump {
        let records = report.store.get(name)?;
        eprintln!("\n📦 {} ({} records)", name, records.len());
        println!("{}", serde_json::to_string_pretty(records)?);
    }

    eprintln!("\n✨ Done: {}", report.summary());
    Ok(())
}

fn cmd_check(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file(config)?;
    let jobs = config.jobs();

    eprintln!("✅ {} jobs\n", jobs.len());
    for job in jobs {
        println!("  {}", job.name);
        for op in &job.ops {
            let mut keys: Vec<String> = op.operators().iter().map(|s| s.to_string()).collect();
            keys.extend(op.unknown.keys().map(|k| format!("{} (unknown)", k)));
            println!("    - {}", keys.join(", "));
        }
    }
    Ok(())
}

fn cmd_read(
    path: &Path,
    sheet: Option<&str>,
    range_from: Option<&str>,
    range_to: Option<&str>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Reading: {}", path.display());

    let first_sheet;
    let sheet_name = match sheet {
        Some(name) => name,
        None if tabmap::adapters::is_json_path(path) || has_csv_extension(path) => "",
        None => {
            first_sheet = sheet_names(path)?
                .into_iter()
                .next()
                .ok_or("workbook has no sheets")?;
            first_sheet.as_str()
        }
    };

    let selection = SheetSelection {
        sheet_name,
        range_from,
        range_to,
    };
    let records = read_records(path, &selection)?;
    eprintln!("✅ Read {} records", records.len());

    let json = serde_json::to_string_pretty(&records)?;
    write_output(&json, output)?;
    Ok(())
}

fn has_csv_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

fn cmd_sheets(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    for name in sheet_names(path)? {
        println!("{}", name);
    }
    Ok(())
}

fn cmd_operators() -> Result<(), Box<dyn std::error::Error>> {
    let descriptions = [
        ("load", "{path, sheetName?, rangeFrom?, rangeTo?} read a sheet/csv/json into the collection"),
        ("copyTo", "NAME append copies of every record to another collection"),
        ("cloneObjects", "{field, filter, values} add clones of matching records with new field values"),
        ("filterObjects", "[{field, include|exclude}] keep records matching every predicate"),
        ("filterFields", "{include|exclude} keep or drop fields"),
        ("mapFields", "[{from, to, copy?}] or {from: to} rename or copy fields"),
        ("mapValues", "[{field, from, to} | {map: EXPR} | {call: NAME}] rewrite values"),
        ("copyToArray", "{copyTo, field} append one field of every record to a value array"),
        ("mergeObjects", "{name, key, strict?} merge another collection on a composite key"),
        ("aggregate", "{name, aggregatedField, aggregationField} group values into a new collection"),
        ("save", "{path, sheetName?} write a workbook plus a .json mirror"),
    ];

    println!("Operators (run in this order when an op holds several):\n");
    for name in Op::OPERATOR_ORDER {
        let description = descriptions
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, d)| *d)
            .unwrap_or_default();
        println!("  {:<14} {}", name, description);
    }
    Ok(())
}

fn cmd_example_config() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", example_config());
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
