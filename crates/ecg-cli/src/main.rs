use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ecg_creds::{
    default_secrets_path, json_to_toml, load_service_account_json, validate_secrets,
    write_secrets,
};
use ecg_lib::{
    annotate::{AnnotationConfig, BeatRecord},
    detectors::ecg::PeakConfig,
    io::table::{read_annotations_csv, write_annotations_csv, write_signal_csv},
    metrics::summary::{summarize, Summary},
    plot::{figure_from_analysis, Figure, Series},
    simulate::SimulationConfig,
};
use ecg_run::{read_config, simulate_run, write_bundle, RunConfig, SheetsConfig};
use ecg_sheets::{push_table, GoogleSheets, LocalWorkbook, SheetSink};
use env_logger::Env;
use log::{info, warn};
use plotters::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

const PLOT_MAX_POINTS: usize = 4096;
const PLOT_FILE: &str = "tracing.png";

#[derive(Parser)]
#[command(
    name = "ecg",
    version,
    about = "Simulated ECG annotation: beat detection, summary, export"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug)]
struct AnalysisArgs {
    /// Samples per second
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..))]
    sampling_rate: u32,
    /// Tracing length (seconds)
    #[arg(long, default_value_t = 5.0)]
    duration: f64,
    /// Standard deviation of the additive noise (mV)
    #[arg(long, default_value_t = 0.3)]
    noise: f64,
    /// Frequency of the simulated rhythm (Hz)
    #[arg(long, default_value_t = 1.2)]
    frequency_hz: f64,
    /// Minimum R-peak amplitude (mV)
    #[arg(long, default_value_t = 0.5)]
    min_height: f64,
    /// Minimum spacing between R-peaks (seconds)
    #[arg(long, default_value_t = 0.5)]
    min_distance_s: f64,
    /// Seed for the noise generator; drawn at random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

impl AnalysisArgs {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            seed: self.seed,
            simulation: SimulationConfig {
                sampling_rate: self.sampling_rate,
                duration_s: self.duration,
                frequency_hz: self.frequency_hz,
                noise_scale: self.noise,
            },
            detection: PeakConfig {
                min_height: self.min_height,
                min_distance_s: self.min_distance_s,
            },
            annotation: AnnotationConfig::default(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a tracing, detect beats and print the annotation table as JSON
    Annotate {
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Also write the annotation table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Also write the raw tracing as CSV
        #[arg(long)]
        signal_csv: Option<PathBuf>,
        /// Render the tracing with R-peak markers to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Execute a TOML run description and write a run bundle
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Render tracing.png into the bundle
        #[arg(long)]
        plot: bool,
    },
    /// Recompute summary statistics from an exported annotation CSV
    Summarize {
        #[arg(long)]
        input: PathBuf,
    },
    /// Render a simulated tracing to a PNG via plotters
    Plot {
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Overwrite a worksheet with an exported annotation table
    SheetsPush {
        #[arg(long)]
        input: PathBuf,
        /// Write into a local directory workbook instead of Google Sheets
        #[arg(long, conflicts_with = "spreadsheet_id")]
        workbook_dir: Option<PathBuf>,
        #[arg(long)]
        spreadsheet_id: Option<String>,
        #[arg(long)]
        worksheet: Option<String>,
        /// Service-account secrets (TOML); defaults to $ECG_SECRETS or the config dir
        #[arg(long)]
        secrets: Option<PathBuf>,
        /// Run description supplying [sheets] defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Inspect or create service-account secrets
    Creds {
        #[command(subcommand)]
        command: CredsCommand,
    },
}

#[derive(Subcommand)]
enum CredsCommand {
    /// Check a secrets file for missing keys and a malformed private key
    Validate {
        #[arg(long)]
        secrets: Option<PathBuf>,
    },
    /// Convert a provider JSON key file into a secrets TOML table
    Convert {
        #[arg(long)]
        json: PathBuf,
        /// Write to this path instead of stdout (never overwrites)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Annotate {
            analysis,
            csv,
            signal_csv,
            plot,
        } => cmd_annotate(
            &analysis,
            csv.as_deref(),
            signal_csv.as_deref(),
            plot.as_deref(),
        )?,
        Commands::Run { config, out, plot } => cmd_run(&config, &out, plot)?,
        Commands::Summarize { input } => cmd_summarize(&input)?,
        Commands::Plot { analysis, out } => cmd_plot(&analysis, &out)?,
        Commands::SheetsPush {
            input,
            workbook_dir,
            spreadsheet_id,
            worksheet,
            secrets,
            config,
        } => cmd_sheets_push(
            &input,
            workbook_dir.as_deref(),
            spreadsheet_id,
            worksheet,
            secrets.as_deref(),
            config.as_deref(),
        )?,
        Commands::Creds { command } => match command {
            CredsCommand::Validate { secrets } => cmd_creds_validate(secrets.as_deref())?,
            CredsCommand::Convert { json, out } => cmd_creds_convert(&json, out.as_deref())?,
        },
    }
    Ok(())
}

#[derive(Serialize)]
struct AnnotateOutput<'a> {
    seed: u64,
    peaks: &'a [usize],
    summary: Option<Summary>,
    records: &'a [BeatRecord],
}

fn cmd_annotate(
    analysis: &AnalysisArgs,
    csv: Option<&Path>,
    signal_csv: Option<&Path>,
    plot: Option<&Path>,
) -> Result<()> {
    let bundle = simulate_run(&analysis.run_config())?;
    let result = &bundle.analysis;
    if let Some(path) = csv {
        write_annotations_csv(path, &result.records)?;
        info!("annotations written to {}", path.display());
    }
    if let Some(path) = signal_csv {
        write_signal_csv(path, &result.waveform)?;
    }
    if let Some(path) = plot {
        draw_plotters_figure(path, &figure_from_analysis(result, PLOT_MAX_POINTS))?;
    }
    let out = AnnotateOutput {
        seed: bundle.manifest.seed,
        peaks: &result.peaks.indices,
        summary: summarize(&result.records),
        records: &result.records,
    };
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_run(config: &Path, out: &Path, plot: bool) -> Result<()> {
    let cfg = read_config(config)?;
    let bundle = simulate_run(&cfg)?;
    write_bundle(out, &bundle)?;
    if plot {
        draw_plotters_figure(
            &out.join(PLOT_FILE),
            &figure_from_analysis(&bundle.analysis, PLOT_MAX_POINTS),
        )?;
    }
    println!("{}", serde_json::to_string(&bundle.manifest)?);
    Ok(())
}

fn cmd_summarize(input: &Path) -> Result<()> {
    let records = read_annotations_csv(input)?;
    let Some(summary) = summarize(&records) else {
        bail!("{} contains no beats", input.display());
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_plot(analysis: &AnalysisArgs, out: &Path) -> Result<()> {
    let bundle = simulate_run(&analysis.run_config())?;
    let fig = figure_from_analysis(&bundle.analysis, PLOT_MAX_POINTS);
    draw_plotters_figure(out, &fig)?;
    Ok(())
}

fn cmd_sheets_push(
    input: &Path,
    workbook_dir: Option<&Path>,
    spreadsheet_id: Option<String>,
    worksheet: Option<String>,
    secrets: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    let records = read_annotations_csv(input)?;
    let sheets = match config {
        Some(path) => read_config(path)?.sheets.unwrap_or_default(),
        None => SheetsConfig::default(),
    };
    let worksheet = worksheet.unwrap_or(sheets.worksheet);
    let mut sink: Box<dyn SheetSink> = match workbook_dir {
        Some(dir) => Box::new(LocalWorkbook::new(dir)),
        None => {
            let Some(id) = spreadsheet_id.or(sheets.spreadsheet_id) else {
                bail!("no spreadsheet id: pass --spreadsheet-id, set [sheets] spreadsheet_id, or use --workbook-dir");
            };
            let secrets_path = match secrets {
                Some(path) => path.to_path_buf(),
                None => default_secrets_path()?,
            };
            let sheet = GoogleSheets::from_env(id)?
                .with_name(sheets.spreadsheet_name)
                .with_secrets(&secrets_path)?;
            Box::new(sheet)
        }
    };
    let report = push_table(sink.as_mut(), &worksheet, &records)
        .with_context(|| format!("sheet sync of {} failed", input.display()))?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_creds_validate(secrets: Option<&Path>) -> Result<()> {
    let path = match secrets {
        Some(path) => path.to_path_buf(),
        None => default_secrets_path()?,
    };
    let report = validate_secrets(&path)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    for key in &report.missing_keys {
        warn!("missing required key: {}", key);
    }
    for issue in &report.key_issues {
        warn!("private key: {}", issue);
    }
    if !report.is_ok() {
        bail!("credentials in {} need attention", path.display());
    }
    if let Some(email) = &report.client_email {
        info!("share the spreadsheet with {} (Editor access)", email);
    }
    Ok(())
}

fn cmd_creds_convert(json: &Path, out: Option<&Path>) -> Result<()> {
    let account = load_service_account_json(json)?;
    match out {
        Some(path) => {
            write_secrets(path, &account)?;
            info!("wrote {}; keep it out of version control", path.display());
        }
        None => print!("{}", json_to_toml(&account)),
    }
    Ok(())
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let Some((x_min, x_max, y_min, y_max)) = fig.bounds() else {
        bail!("nothing to plot");
    };
    let x_max = if x_max > x_min { x_max } else { x_min + 1.0 };
    let pad = ((y_max - y_min) * 0.1).max(0.1);
    let backend = BitMapBackend::new(path, (1200, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, (y_min - pad)..(y_max + pad))?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                let color = RGBColor(r, g, b);
                chart
                    .draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        &color,
                    ))?
                    .label(line.name.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            Series::Markers(markers) => {
                let (r, g, b) = markers.style.color.rgb();
                let color = RGBColor(r, g, b);
                let radius = markers.style.width.round().max(1.0) as i32;
                chart
                    .draw_series(
                        markers
                            .points
                            .iter()
                            .map(|p| Circle::new((p[0], p[1]), radius, color.filled())),
                    )?
                    .label(markers.name.clone())
                    .legend(move |(x, y)| Circle::new((x + 10, y), radius, color.filled()));
            }
        }
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
