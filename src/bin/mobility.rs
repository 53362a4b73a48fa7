//! Mobility CLI - Command-line interface for the mobility engine
//!
//! Commands:
//! - compute: Segment and classify the trips of one or more days
//! - validate: Check day sample files for window and ordering errors
//! - doctor: Diagnose engine version and configuration
//! - config: Print the default engine configuration

use chrono::{FixedOffset, NaiveDate, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use mobility_engine::{ComputeError, DayResult, DaySamples, EngineConfig, MobilityEngine, ENGINE_VERSION};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Mobility - On-device trip segmentation and transport-mode classification
#[derive(Parser)]
#[command(name = "mobility")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Turn a day of phone sensor samples into classified trips", long_about = None)]
struct Cli {
    /// Log every pipeline pass (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute trips and daily summary for each day in the input
    Compute {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Engine configuration file (JSON, missing fields use defaults)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Return samples only, without trips, summary or chart
        #[arg(long)]
        no_chart: bool,

        /// Override the window with this calendar day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// UTC offset of the calendar day in minutes
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        utc_offset_minutes: i32,
    },

    /// Validate day sample files
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose engine health and configuration
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default engine configuration
    Config,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one day per line)
    Ndjson,
    /// A single day object or a JSON array of days
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one day result per line)
    Ndjson,
    /// JSON array of day results
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MobilityCliError> {
    match cli.command {
        Commands::Compute {
            input,
            output,
            input_format,
            output_format,
            config,
            no_chart,
            date,
            utc_offset_minutes,
        } => {
            let window = match date {
                Some(date) => Some(day_window(&date, utc_offset_minutes)?),
                None => None,
            };
            cmd_compute(
                &input,
                &output,
                input_format,
                output_format,
                config.as_deref(),
                !no_chart,
                window,
            )
        }
        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),
        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
        Commands::Config => cmd_config(),
    }
}

fn cmd_compute(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
    compute_chart: bool,
    window: Option<(i64, i64)>,
) -> Result<(), MobilityCliError> {
    let days = read_days(input, &input_format)?;
    if days.is_empty() {
        return Err(MobilityCliError::NoDays);
    }

    let engine = match config {
        Some(path) => MobilityEngine::with_config(EngineConfig::from_json(&fs::read_to_string(path)?)?)?,
        None => MobilityEngine::new(),
    };

    let mut results: Vec<DayResult> = Vec::with_capacity(days.len());
    for mut day in days {
        if let Some((start, end)) = window {
            day.start_time = start;
            day.end_time = end;
        }
        log::info!("Computing window [{}, {})", day.start_time, day.end_time);
        results.push(engine.compute_samples(day, compute_chart)?);
    }

    let output_data = format_output(&results, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), MobilityCliError> {
    let days = read_days(input, &input_format)?;

    let errors: Vec<ValidationErrorDetail> = days
        .iter()
        .enumerate()
        .filter_map(|(index, day)| {
            day.validate().err().map(|e| ValidationErrorDetail {
                index,
                start_time: day.start_time,
                end_time: day.end_time,
                error: e.to_string(),
            })
        })
        .collect();

    let report = ValidationReport {
        total_days: days.len(),
        valid_days: days.len() - errors.len(),
        invalid_days: errors.len(),
        total_samples: days.iter().map(sample_count).sum(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total days:    {}", report.total_days);
        println!("Valid days:    {}", report.valid_days);
        println!("Invalid days:  {}", report.invalid_days);
        println!("Total samples: {}", report.total_samples);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Day {} [{}, {}): {}",
                    err.index, err.start_time, err.end_time, err.error
                );
            }
        }
    }

    if report.invalid_days > 0 {
        Err(MobilityCliError::ValidationFailed(report.invalid_days))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), MobilityCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Mobility engine version {}", ENGINE_VERSION),
    });

    match config {
        Some(path) if path.exists() => {
            let check = match fs::read_to_string(path) {
                Ok(content) => match EngineConfig::from_json(&content) {
                    Ok(config) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid (stay points {}, short activity {} s)",
                            if config.use_stay_points { "on" } else { "off" },
                            config.short_activity_ms / 1000
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                },
            };
            checks.push(check);
        }
        Some(_) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist, defaults apply".to_string(),
        }),
        None => {
            let status = match EngineConfig::default().validate() {
                Ok(()) => CheckStatus::Ok,
                Err(_) => CheckStatus::Error,
            };
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status,
                message: "Using default configuration".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (use --input - to read days)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Mobility Doctor Report");
        println!("======================");
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(MobilityCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_config() -> Result<(), MobilityCliError> {
    println!("{}", EngineConfig::default().to_json()?);
    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, MobilityCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_days(input: &Path, format: &InputFormat) -> Result<Vec<DaySamples>, MobilityCliError> {
    let data = read_input(input)?;

    match format {
        InputFormat::Ndjson => data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| DaySamples::from_json(line).map_err(MobilityCliError::from))
            .collect(),
        InputFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(&data)?;
            if value.is_array() {
                Ok(serde_json::from_value(value)?)
            } else {
                Ok(vec![serde_json::from_value(value)?])
            }
        }
    }
}

/// Millisecond window `[start, end)` of a calendar day at a fixed UTC offset
fn day_window(date: &str, utc_offset_minutes: i32) -> Result<(i64, i64), MobilityCliError> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| MobilityCliError::InvalidDate(format!("{}: {}", date, e)))?;
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
        MobilityCliError::InvalidDate(format!("UTC offset out of range: {} min", utc_offset_minutes))
    })?;
    let start = day
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .ok_or_else(|| MobilityCliError::InvalidDate(format!("{} has no unique midnight", date)))?
        .timestamp_millis();
    Ok((start, start + DAY_MS))
}

fn sample_count(day: &DaySamples) -> usize {
    day.locations.len()
        + day.steps.len()
        + day.activities.len()
        + day.heart_rates.len()
        + day.batteries.len()
}

fn format_output(results: &[DayResult], format: &OutputFormat) -> Result<String, MobilityCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for result in results {
                lines.push(serde_json::to_string(result)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(results)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(results)?),
    }
}

// Error types

#[derive(Debug)]
enum MobilityCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoDays,
    InvalidDate(String),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for MobilityCliError {
    fn from(e: io::Error) -> Self {
        MobilityCliError::Io(e)
    }
}

impl From<ComputeError> for MobilityCliError {
    fn from(e: ComputeError) -> Self {
        MobilityCliError::Compute(e)
    }
}

impl From<serde_json::Error> for MobilityCliError {
    fn from(e: serde_json::Error) -> Self {
        MobilityCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MobilityCliError> for CliError {
    fn from(e: MobilityCliError) -> Self {
        match e {
            MobilityCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MobilityCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::InvalidWindow { .. } => {
                        ("INVALID_WINDOW", "end_time must be after start_time")
                    }
                    ComputeError::UnsortedSamples { .. } => {
                        ("UNSORTED_SAMPLES", "Sort each sample list by timestamp")
                    }
                    ComputeError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'mobility config' for a valid template")
                    }
                    ComputeError::ParseError(_) | ComputeError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input matches the day samples format")
                    }
                    ComputeError::Store(_) | ComputeError::EncodingError(_) => {
                        ("COMPUTE_ERROR", "Run 'mobility doctor' to check the setup")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            MobilityCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            MobilityCliError::NoDays => CliError {
                code: "NO_DAYS".to_string(),
                message: "No days found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            MobilityCliError::InvalidDate(msg) => CliError {
                code: "INVALID_DATE".to_string(),
                message: msg,
                hint: Some("Use --date YYYY-MM-DD and an offset within +/-1440 minutes".to_string()),
            },
            MobilityCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} days failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            MobilityCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_days: usize,
    valid_days: usize,
    invalid_days: usize,
    total_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    start_time: i64,
    end_time: i64,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_window_at_offset() {
        let (start, end) = day_window("2024-03-10", 60).unwrap();
        // Midnight in UTC+1 is 23:00 UTC the day before
        assert_eq!(start, 1_710_025_200_000);
        assert_eq!(end - start, DAY_MS);
    }

    #[test]
    fn test_day_window_rejects_bad_date() {
        assert!(matches!(
            day_window("2024-13-01", 0),
            Err(MobilityCliError::InvalidDate(_))
        ));
    }
}
