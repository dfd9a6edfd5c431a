//! Validate a density given on the command line, then sample and bin it.
//!
//! Set `RUST_LOG` to see the library's logging on stderr.

use std::{
    io::Write,
    ops::ControlFlow,
    path::PathBuf,
    process::ExitCode,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use pdfsample::{
    curve::Curve,
    math::histogram::format_rows,
    session::{
        Progress,
        Session,
        SessionResult,
    },
    settings::Settings,
    status::{
        LogNotify,
        Status,
    },
    validate::Report,
};

/// Check that a density on [0, 1] integrates to one and draw samples from it.
#[derive(Debug, Parser)]
#[command(name = "pdfsample")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Density expression in the variable x, e.g. "2x" or "6x(1 - x)"
    expr: String,

    /// Number of samples to draw (0 to only validate)
    #[arg(short = 'n', long, default_value_t = 10000)]
    samples: usize,

    /// Number of histogram buckets [default: from config, or 20]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    buckets: Option<u64>,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the sampling RNG
    #[arg(long)]
    seed: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    /// Plain rows
    Table,
    /// A single JSON object
    Json,
}

const EXIT_INVALID: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn load_settings(cli: &Cli) -> Result<Settings, String> {
    let mut settings: Settings
        = match &cli.config {
            Some(path) => Settings::from_file(path).map_err(|e| e.to_string())?,
            None => Settings::default(),
        };
    if let Some(seed) = cli.seed {
        settings.seed = Some(seed);
    }
    if let Some(buckets) = cli.buckets {
        settings.buckets
            = usize::try_from(buckets).map_err(|e| e.to_string())?;
    }
    return Ok(settings);
}

fn print_progress(progress: &Progress) -> ControlFlow<()> {
    let status = Status::Progress {
        done: progress.done,
        total: progress.total,
        failures: progress.failures,
    };
    let mut stderr = std::io::stderr();
    write!(stderr, "\r{}", status).ok();
    if progress.done >= progress.total {
        writeln!(stderr).ok();
    }
    return ControlFlow::Continue(());
}

fn draw(session: &mut Session, samples: usize, show_progress: bool)
    -> SessionResult<(Status, Vec<(f64, f64)>)>
{
    let batch = session.generate(samples)?;
    let status: Status
        = if show_progress {
            session.run_batch(batch, print_progress)?
        } else {
            session.run_batch(batch, |_| ControlFlow::Continue(()))?
        };
    let hist: Vec<(f64, f64)> = session.histogram()?;
    return Ok((status, hist));
}

fn print_json(
    report: &Report,
    curve: Option<&Curve>,
    status: Option<&Status>,
    hist: Option<&[(f64, f64)]>,
) {
    let out = serde_json::json!({
        "validation": report,
        "curve": curve,
        "status": status,
        "histogram": hist,
    });
    match serde_json::to_string_pretty(&out) {
        Ok(s) => { println!("{}", s); },
        Err(e) => { eprintln!("error: {}", e); },
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .init();

    let settings: Settings
        = match load_settings(&cli) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(EXIT_CONFIG);
            },
        };

    let mut session = Session::new(settings).with_notify(LogNotify);
    let report: Report = session.set_expression(&cli.expr);
    if !report.ok {
        match cli.format {
            OutputFormat::Table => { println!("{}", report.message); },
            OutputFormat::Json => { print_json(&report, None, None, None); },
        }
        return ExitCode::from(EXIT_INVALID);
    }
    let curve: Curve = session.curve().unwrap_or_default();

    let drawn: Option<(Status, Vec<(f64, f64)>)>
        = if cli.samples > 0 {
            let show_progress: bool = cli.format == OutputFormat::Table;
            match draw(&mut session, cli.samples, show_progress) {
                Ok(drawn) => Some(drawn),
                Err(e) => {
                    eprintln!("error: {}", e);
                    return ExitCode::from(EXIT_INVALID);
                },
            }
        } else {
            None
        };

    match cli.format {
        OutputFormat::Table => {
            println!("{}", report.message);
            println!("\ndensity:");
            println!("{}", format_rows(&curve.points));
            if let Some((status, hist)) = &drawn {
                println!("\nhistogram ({} buckets):", hist.len());
                println!("{}", format_rows(hist));
                println!("\n{}", status);
            }
        },
        OutputFormat::Json => {
            print_json(
                &report,
                Some(&curve),
                drawn.as_ref().map(|(status, _)| status),
                drawn.as_ref().map(|(_, hist)| hist.as_slice()),
            );
        },
    }
    return ExitCode::SUCCESS;
}
