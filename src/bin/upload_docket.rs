//! `upload-docket`: plan (and optionally submit) a docket to the hardware database.
//!
//! Without `--submit` the resolved plan is printed and nothing is posted.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use hwdb_docket::docket::{Docket, DocketOptions};
use hwdb_docket::execution::ExecutionOptions;
use hwdb_docket::logging::{init_logging, LogConfig, LogFormat};
use hwdb_docket::lookup::LookupService;
use hwdb_docket::rest::HttpClient;
use hwdb_docket::submit::{submit, SubmitMode, SubmitOptions};
use hwdb_docket::HwdbResult;

#[derive(Parser)]
#[command(
    name = "upload-docket",
    version,
    about = "Encode lab spreadsheets described by a docket and upload them to the HWDB",
    long_about = "Reads the sources named in a docket, encodes every sheet with its encoder and \
                  prints the resulting upload plan.\n\n\
                  Nothing is sent to the database unless --submit is given."
)]
struct Cli {
    /// Docket file (JSON).
    #[arg(value_name = "DOCKET")]
    docket: PathBuf,

    /// Submit the plan. Without this flag only the plan is shown.
    #[arg(long)]
    submit: bool,

    /// Base URL of the HWDB REST API.
    #[arg(long, env = "HWDB_URL", value_name = "URL")]
    url: Option<String>,

    /// JSON file with part type, institution, country and manufacturer tables.
    #[arg(long, value_name = "PATH")]
    lookups: Option<PathBuf>,

    /// Verify every part type in the plan with the server before submitting.
    #[arg(long)]
    verify: bool,

    /// Print the plan payloads as JSON.
    #[arg(long)]
    json: bool,

    /// Worker threads for loading and encoding sheets.
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Request timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    timeout: u64,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value = "pretty")]
    log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_logging(&log_config_from_cli(&cli)) {
        eprintln!("error: failed to initialize logging: {error}");
        return ExitCode::FAILURE;
    }
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every operation went through.
fn run(cli: &Cli) -> HwdbResult<bool> {
    let lookup = match &cli.lookups {
        Some(path) => LookupService::from_path(path)?,
        None => LookupService::empty(),
    };
    let docket = Docket::from_path(&cli.docket)?;
    let options = DocketOptions {
        execution: ExecutionOptions { num_threads: cli.jobs },
        ..DocketOptions::default()
    };
    let plan = docket.build_plan(&lookup, &options)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&plan.to_json())?);
    } else {
        print!("{plan}");
    }

    let needs_server = cli.submit || cli.verify;
    if !needs_server {
        println!("dry run: nothing submitted (use --submit to upload)");
        return Ok(true);
    }
    let Some(url) = &cli.url else {
        eprintln!("error: --url (or HWDB_URL) is required to contact the database");
        return Ok(false);
    };

    let client = HttpClient::new(url.as_str(), Duration::from_secs(cli.timeout))?;
    let submit_options = SubmitOptions {
        mode: if cli.submit {
            SubmitMode::Submit
        } else {
            SubmitMode::DryRun
        },
        verify_part_types: cli.verify,
    };
    let report = submit(&plan, &client, &submit_options)?;
    println!("{report}");
    Ok(report.is_success())
}

fn log_config_from_cli(cli: &Cli) -> LogConfig {
    LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        use_env_filter: !cli.verbosity.is_present(),
        format: match cli.log_format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        },
        with_ansi: cli.log_file.is_none() && io::stderr().is_terminal(),
        log_file: cli.log_file.clone(),
        ..LogConfig::default()
    }
}
