use clap::{Parser, Subcommand};
use hn_app::{
    AppError, AppResult, ChannelSink, Controller, RunProgress, SimEvent, archive_run,
    extract_series, get_run_summary, load_and_open, parse_element, restore_run, series_csv,
    validate_project,
};
use hn_core::{Attribute, RunId};
use hn_engine::ReferenceFactory;
use hn_results::{ResultsStore, RunArchive};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hn")]
#[command(about = "HydroNet CLI - water distribution network simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the network topology and scenario of a project
    Validate {
        /// Path to the project file (YAML, or JSON by extension)
        project_path: PathBuf,
    },
    /// Print the topology report of a project's network
    Topology {
        /// Path to the project file
        project_path: PathBuf,
    },
    /// Run the project's scenario and archive the results
    Run {
        /// Path to the project file
        project_path: PathBuf,
        /// Keep results in memory only
        #[arg(long)]
        no_archive: bool,
    },
    /// List archived runs of a project
    Runs {
        /// Path to the project file
        project_path: PathBuf,
    },
    /// Show details of an archived run
    ShowRun {
        /// Path to the project file
        project_path: PathBuf,
        /// Numeric run id
        run_id: u64,
    },
    /// Export one series of an archived run as CSV
    ExportSeries {
        /// Path to the project file
        project_path: PathBuf,
        /// Numeric run id
        run_id: u64,
        /// Element as node:<id> or link:<id>
        element: String,
        /// Attribute (demand, head, pressure, flow, velocity, headloss, status, quality)
        attribute: String,
        /// Keep only points on the scenario's reporting grid
        #[arg(long)]
        report: bool,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { project_path } => cmd_validate(&project_path),
        Commands::Topology { project_path } => cmd_topology(&project_path),
        Commands::Run {
            project_path,
            no_archive,
        } => cmd_run(&project_path, !no_archive),
        Commands::Runs { project_path } => cmd_runs(&project_path),
        Commands::ShowRun {
            project_path,
            run_id,
        } => cmd_show_run(&project_path, RunId(run_id)),
        Commands::ExportSeries {
            project_path,
            run_id,
            element,
            attribute,
            report,
            output,
        } => cmd_export_series(
            &project_path,
            RunId(run_id),
            &element,
            &attribute,
            report,
            output.as_deref(),
        ),
    }
}

fn cmd_validate(project_path: &Path) -> AppResult<()> {
    println!("Validating project: {}", project_path.display());
    let project = load_and_open(project_path)?;
    match validate_project(&project) {
        Ok(()) => {
            println!("✓ Project is valid");
            Ok(())
        }
        Err(failure) => {
            for message in failure.messages() {
                println!("  ✗ {}", message);
            }
            Err(failure.into())
        }
    }
}

fn cmd_topology(project_path: &Path) -> AppResult<()> {
    let project = load_and_open(project_path)?;
    let net = &project.network;
    let report = net.validate_topology();

    println!(
        "Network '{}': {} nodes, {} links",
        project.name,
        net.node_count(),
        net.link_count()
    );
    for control in net.controls() {
        println!("  Control: {}", control);
    }
    println!("  Components: {}", report.components.len());
    for (i, component) in report.components.iter().enumerate() {
        println!("    #{}: {} nodes", i + 1, component.len());
    }
    if report.is_ok() {
        println!("✓ No blocking issues");
    }
    for issue in &report.issues {
        println!("  ✗ {}", issue);
    }
    for warning in &report.warnings {
        println!("  ! {}", warning);
    }
    Ok(())
}

fn cmd_run(project_path: &Path, archive_results: bool) -> AppResult<()> {
    let project = load_and_open(project_path)?;
    let archive = RunArchive::for_project(project_path)?;

    let (sink, events) = ChannelSink::new();
    let controller = Controller::new(Arc::new(ReferenceFactory))
        .with_sink(Arc::new(sink))
        .starting_at(archive.next_run_id()?);

    println!("Running scenario for '{}'", project.name);
    let run_id = controller.start_run(&project.network, &project.scenario)?;

    for event in events.iter() {
        match event {
            SimEvent::Progress(progress) => render_progress(&progress),
            SimEvent::RunCompleted { .. }
            | SimEvent::RunFailed { .. }
            | SimEvent::RunCancelled { .. } => break,
            SimEvent::NetworkChanged(_) => {}
        }
    }
    clear_progress_line();

    let record = controller.wait().ok_or(AppError::RunNotFound(run_id))?;
    println!("{} {}: {}", status_mark(&record.state), run_id, record.state.label());
    if let Some(error) = &record.error {
        println!("  Error: {}", error);
    }
    println!("  Steps: {}", record.steps);

    if let Ok(summary) = get_run_summary(controller.store(), run_id) {
        println!("  Series: {}", summary.series_count);
        println!("  Samples: {}", summary.sample_count);
    }

    if archive_results {
        let manifest = archive_run(&controller, &archive, run_id, &project.name)?;
        println!("  Archived to {}", archive.root().join(manifest.run_id.to_string()).display());
    }
    Ok(())
}

fn status_mark(state: &hn_app::RunState) -> &'static str {
    match state {
        hn_app::RunState::Completed => "✓",
        hn_app::RunState::Cancelled => "!",
        _ => "✗",
    }
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(80));
    let _ = io::stdout().flush();
}

fn render_progress(progress: &RunProgress) {
    let width = 28usize;
    let fraction = progress.fraction_complete();
    let filled = ((fraction * width as f64).round() as usize).min(width);
    print!(
        "\r[{}{}] {:>6.2}%  t={}/{}s  step={}",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled)),
        fraction * 100.0,
        progress.time_s,
        progress.duration_s,
        progress.step
    );
    let _ = io::stdout().flush();
}

fn cmd_runs(project_path: &Path) -> AppResult<()> {
    let archive = RunArchive::for_project(project_path)?;
    let runs = archive.list_runs()?;

    if runs.is_empty() {
        println!("No archived runs for {}", project_path.display());
    } else {
        println!("Archived runs:");
        for manifest in runs {
            println!(
                "  {} {} ({}, {} steps, {})",
                manifest.run_id,
                manifest.name,
                manifest.outcome.label(),
                manifest.steps,
                manifest.created_at
            );
        }
    }
    Ok(())
}

fn cmd_show_run(project_path: &Path, run_id: RunId) -> AppResult<()> {
    let archive = RunArchive::for_project(project_path)?;
    let store = ResultsStore::new();
    let manifest = restore_run(&store, &archive, run_id)?;
    let summary = get_run_summary(&store, run_id)?;

    println!("Run {} ({})", run_id, manifest.name);
    println!("  Outcome: {}", manifest.outcome.label());
    if let hn_results::RunOutcome::Failed { message } = &manifest.outcome {
        println!("  Error: {}", message);
    }
    println!("  Engine: {}", manifest.engine);
    println!("  Created: {}", manifest.created_at);
    println!("  Fingerprint: {}", manifest.fingerprint);
    println!("  Steps: {} of {}s", manifest.steps, manifest.duration_s);
    if let Some((start, end)) = summary.time_range {
        println!("  Time range: {} - {} s", start, end);
    }
    println!("  Series: {}", summary.series_count);
    println!("  Samples: {}", summary.sample_count);

    println!("\nSeries:");
    for (key, attribute) in store.series_keys(run_id)? {
        println!("  {} {}", key, attribute);
    }
    Ok(())
}

fn cmd_export_series(
    project_path: &Path,
    run_id: RunId,
    element: &str,
    attribute: &str,
    report: bool,
    output: Option<&Path>,
) -> AppResult<()> {
    let key = parse_element(element)?;
    let attribute: Attribute = attribute
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Unknown attribute: {}", attribute)))?;

    let archive = RunArchive::for_project(project_path)?;
    let store = ResultsStore::new();
    restore_run(&store, &archive, run_id)?;

    let grid = if report {
        let options = load_and_open(project_path)?.scenario.options().clone();
        Some((
            options.report_start_s as i64,
            options.report_step_s as i64,
        ))
    } else {
        None
    };
    let series = extract_series(&store, run_id, &key, attribute, grid)?;
    let csv = series_csv(attribute, &series);

    if let Some(path) = output {
        std::fs::write(path, csv)?;
        println!(
            "✓ Exported {} data points to {}",
            series.len(),
            path.display()
        );
    } else {
        print!("{}", csv);
    }
    Ok(())
}
