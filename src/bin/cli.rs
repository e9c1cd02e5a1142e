//! Binary entry point for the Sombra store consistency checker.
#![forbid(unsafe_code)]

#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sombra_consistency::{
    config::CONFIG_ENV,
    logging::init_logging,
    report::TracingLogger,
    store::builder::StoreBuilder,
    CheckConfig, CheckError, CheckSummary, DirectStoreAccess, ExecutionOrder, FullCheck,
};
use ui::{Theme, Ui};

const EXIT_INCONSISTENT: i32 = 2;
const EXIT_FAILED: i32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "sombra-check",
    version,
    about = "Offline consistency checker for Sombra store files",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "warn",
        help = "Log filter used when RUST_LOG is unset"
    )]
    log_level: String,

    #[arg(long, global = true, help = "Plain output without colors or progress")]
    quiet: bool,

    #[arg(long, global = true, value_enum, default_value_t = ThemeArg::Auto)]
    theme: ThemeArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CheckCmd {
    #[arg(value_name = "DIR")]
    store_dir: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        env = CONFIG_ENV,
        help = "Check configuration (TOML)"
    )]
    config: Option<PathBuf>,

    #[arg(long, help = "Audit property and value chain ownership")]
    check_property_owners: bool,

    #[arg(long, value_enum, help = "Task scheduling")]
    execution_order: Option<ExecutionOrderArg>,

    #[arg(long, value_name = "BYTES", help = "Memory budget for projections")]
    memory_budget: Option<u64>,

    #[arg(long, value_name = "N", help = "Worker threads for multi-threaded runs")]
    threads: Option<usize>,

    #[arg(
        long,
        value_name = "N",
        help = "Inconsistencies kept verbatim in the summary"
    )]
    max_findings: Option<usize>,

    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for the summary"
    )]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct SeedDemoCmd {
    #[arg(value_name = "DIR")]
    store_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Check every store, index and schema rule in a store directory")]
    Check(CheckCmd),
    #[command(about = "Write a small consistent store set (Ada, Grace, Alan)")]
    SeedDemo(SeedDemoCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ExecutionOrderArg {
    Sequential,
    MultiThreaded,
}

impl From<ExecutionOrderArg> for ExecutionOrder {
    fn from(order: ExecutionOrderArg) -> Self {
        match order {
            ExecutionOrderArg::Sequential => ExecutionOrder::Sequential,
            ExecutionOrderArg::MultiThreaded => ExecutionOrder::MultiThreaded,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let ui = Ui::new(cli.theme.into(), cli.quiet);
    let code = match run(&cli, &ui) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            EXIT_FAILED
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli, ui: &Ui) -> Result<i32, Box<dyn Error>> {
    match &cli.command {
        Command::Check(cmd) => run_check(cmd, ui),
        Command::SeedDemo(cmd) => {
            run_seed_demo(&cmd.store_dir)?;
            ui.success(&format!("Demo store written to {}", cmd.store_dir.display()));
            Ok(0)
        }
    }
}

fn build_config(cmd: &CheckCmd) -> Result<CheckConfig, CheckError> {
    let mut config = match &cmd.config {
        Some(path) => CheckConfig::load(path)?,
        None => CheckConfig::discover(None)?,
    };
    if cmd.check_property_owners {
        config.check_property_owners = true;
    }
    if let Some(order) = cmd.execution_order {
        config.execution_order = order.into();
    }
    if let Some(budget) = cmd.memory_budget {
        config.total_mapped_memory_budget = budget;
    }
    if let Some(threads) = cmd.threads {
        config.worker_threads = Some(threads);
    }
    if let Some(max) = cmd.max_findings {
        config.max_retained_findings = max;
    }
    config.validate()?;
    Ok(config)
}

fn run_check(cmd: &CheckCmd, ui: &Ui) -> Result<i32, Box<dyn Error>> {
    let config = build_config(cmd)?;
    let stores = DirectStoreAccess::open(&cmd.store_dir)?;
    let check = FullCheck::new(config.clone()).with_progress(ui.progress_bar());
    let summary = check.execute(&stores, Arc::new(TracingLogger))?;
    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print_summary_text(ui, &cmd.store_dir, &config, &summary),
    }
    Ok(if summary.consistent { 0 } else { EXIT_INCONSISTENT })
}

fn print_summary_text(ui: &Ui, dir: &Path, config: &CheckConfig, summary: &CheckSummary) {
    let order = match config.execution_order {
        ExecutionOrder::Sequential => "sequential",
        ExecutionOrder::MultiThreaded => "multi-threaded",
    };
    ui.table(
        "Consistency check",
        [
            ("store", dir.display().to_string()),
            ("execution", order.to_string()),
            ("owner audit", config.check_property_owners.to_string()),
            ("errors", summary.errors.to_string()),
            ("warnings", summary.warnings.to_string()),
        ],
    );
    ui.table("By record type", &summary.counts);
    ui.findings(summary);
    if !summary.consistent {
        ui.warn(&format!("Inconsistencies found: {summary}"));
    } else if summary.warnings > 0 {
        ui.success(&format!("Store is consistent ({} warnings)", summary.warnings));
    } else {
        ui.success("Store is consistent");
    }
}

fn run_seed_demo(dir: &Path) -> Result<(), Box<dyn Error>> {
    StoreBuilder::demo().write_to(dir)?;
    Ok(())
}
