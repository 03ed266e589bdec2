//! vitaltrace CLI - Command-line interface for the vitaltrace pipeline
//!
//! Commands:
//! - decode: Decode one device frame into a typed reading and canonical metrics
//! - ppg: Analyze recorded PPG samples into a heart-rate estimate
//! - extract: Extract canonical metrics from free text
//! - predict: Predict a health trajectory from a metric history
//! - config: Print the effective configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitaltrace::config::VitalsConfig;
use vitaltrace::devices::{self, DeviceKind};
use vitaltrace::history::{InMemoryMetricStore, MetricStore};
use vitaltrace::normalizer::{Normalizer, TextExtractor};
use vitaltrace::pipeline::VitalsProcessor;
use vitaltrace::ppg::analyze_signal;
use vitaltrace::types::{CanonicalMetric, PpgSample};
use vitaltrace::{VitalsError, VERSION};

/// vitaltrace - Turn raw health-sensor data into normalized metrics and trajectories
#[derive(Parser)]
#[command(name = "vitaltrace")]
#[command(version = VERSION)]
#[command(about = "Decode, normalize and predict from health-sensor data", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode one device frame
    Decode {
        /// Device kind (heart_rate, blood_pressure, weight_scale, pulse_oximeter,
        /// glucose, thermometer)
        #[arg(short, long)]
        kind: String,

        /// Frame bytes as hex, e.g. "0648" or "06 48"
        #[arg(long)]
        hex: String,
    },

    /// Analyze recorded PPG samples
    Ppg {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,
    },

    /// Extract metrics from free text
    Extract {
        /// Text to scan
        #[arg(short, long)]
        text: String,
    },

    /// Predict a trajectory from a metric history
    Predict {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Subject identifier stamped on the payload
        #[arg(long, default_value = "cli")]
        subject: String,

        /// Seed for the noise terms
        #[arg(long)]
        seed: Option<u64>,

        /// Prediction time (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON
    Ndjson,
    /// JSON array
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_target(false))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = serde_json::to_string(&CliError::from(e))
                .unwrap_or_else(|_| "Unknown error".to_string());
            eprintln!("{report}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), VitalsCliError> {
    let config = match &cli.config {
        Some(path) => VitalsConfig::load(path)?,
        None => VitalsConfig::default(),
    };

    match cli.command {
        Commands::Decode { kind, hex } => cmd_decode(&kind, &hex),
        Commands::Ppg { input, input_format } => cmd_ppg(&input, input_format),
        Commands::Extract { text } => cmd_extract(&text),
        Commands::Predict {
            input,
            input_format,
            subject,
            seed,
            now,
        } => cmd_predict(config, &input, input_format, &subject, seed, now.as_deref()),
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}

fn cmd_decode(kind: &str, hex: &str) -> Result<(), VitalsCliError> {
    let kind: DeviceKind = kind.parse()?;
    let frame = parse_hex(hex)?;
    let reading = devices::decode(kind, &frame)?;
    let metrics = Normalizer::from_reading(&reading, Utc::now())?;

    let output = serde_json::json!({
        "kind": kind.as_str(),
        "characteristic": format!("0x{:04X}", kind.characteristic_uuid()),
        "unit": reading.unit(),
        "values": reading.values(),
        "reading": reading,
        "metrics": metrics,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_ppg(input: &Path, input_format: InputFormat) -> Result<(), VitalsCliError> {
    let samples: Vec<PpgSample> = parse_records(&read_input(input)?, &input_format)?;
    if samples.is_empty() {
        return Err(VitalsCliError::NoRecords);
    }

    let result = analyze_signal(&samples);
    if !result.is_valid() {
        tracing::warn!(samples = result.sample_count, "no pulse found");
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_extract(text: &str) -> Result<(), VitalsCliError> {
    let metrics = TextExtractor::new()?.extract(text, Utc::now());
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn cmd_predict(
    config: VitalsConfig,
    input: &Path,
    input_format: InputFormat,
    subject: &str,
    seed: Option<u64>,
    now: Option<&str>,
) -> Result<(), VitalsCliError> {
    let now = match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| VitalsCliError::ParseError(format!("invalid --now '{raw}': {e}")))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let metrics: Vec<CanonicalMetric> = parse_records(&read_input(input)?, &input_format)?;
    let store = Arc::new(InMemoryMetricStore::new());
    store.append_all(subject, metrics)?;

    let processor = VitalsProcessor::with_config(subject, config, store)?;
    let payload = match seed {
        Some(seed) => processor.predict_json(now, &mut StdRng::seed_from_u64(seed))?,
        None => processor.predict_json(now, &mut rand::thread_rng())?,
    };
    println!("{payload}");
    Ok(())
}

fn read_input(input: &Path) -> Result<String, VitalsCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_records<T: DeserializeOwned>(
    data: &str,
    format: &InputFormat,
) -> Result<Vec<T>, VitalsCliError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_str(data)?),
        InputFormat::Ndjson => data
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line.trim())
                    .map_err(|e| VitalsCliError::ParseError(format!("line {}: {e}", i + 1)))
            })
            .collect(),
    }
}

fn parse_hex(hex: &str) -> Result<Vec<u8>, VitalsCliError> {
    let digits: String = hex
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(VitalsCliError::ParseError(format!(
            "'{hex}' is not an even number of hex digits"
        )));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let byte = &digits[i..i + 2];
            u8::from_str_radix(byte, 16)
                .map_err(|_| VitalsCliError::ParseError(format!("invalid hex byte '{byte}'")))
        })
        .collect()
}

// Error types

#[derive(Debug)]
enum VitalsCliError {
    Io(io::Error),
    Vitals(VitalsError),
    Json(serde_json::Error),
    NoRecords,
    ParseError(String),
}

impl From<io::Error> for VitalsCliError {
    fn from(e: io::Error) -> Self {
        VitalsCliError::Io(e)
    }
}

impl From<VitalsError> for VitalsCliError {
    fn from(e: VitalsError) -> Self {
        VitalsCliError::Vitals(e)
    }
}

impl From<serde_json::Error> for VitalsCliError {
    fn from(e: serde_json::Error) -> Self {
        VitalsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VitalsCliError> for CliError {
    fn from(e: VitalsCliError) -> Self {
        match e {
            VitalsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VitalsCliError::Vitals(e) => {
                let (code, hint) = match &e {
                    VitalsError::MalformedFrame { .. } => {
                        ("MALFORMED_FRAME", "Check the device kind and the frame bytes")
                    }
                    VitalsError::InsufficientSignal(_) => {
                        ("INSUFFICIENT_SIGNAL", "Try the measurement again")
                    }
                    VitalsError::Validation(_) => (
                        "VALIDATION_ERROR",
                        "Values must be finite and within physiological bounds",
                    ),
                    VitalsError::Config(_) => ("CONFIG_ERROR", "Check the configuration file"),
                    VitalsError::ParseError(_) | VitalsError::Json(_) => {
                        ("PARSE_ERROR", "Check input format")
                    }
                    _ => ("VITALS_ERROR", "See the message for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            VitalsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VitalsCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            VitalsCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}
