// NetGather - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation
// 3. Dispatch to `collect`, `templates`, or `check-regex`

use clap::{Args, Parser, Subcommand, ValueEnum};
use netgather::app::collect::{CollectionManager, CollectionRequest};
use netgather::app::executor::ExecutorConfig;
use netgather::app::report::{Report, ReportOptions};
use netgather::app::session::Credentials;
use netgather::app::ssh::{SshConfig, SshSessionProvider};
use netgather::app::state::{CollectionState, TemplateContext};
use netgather::core::corpus::CorpusOptions;
use netgather::core::export::ExportFormat;
use netgather::core::filter::{self, FilterSpec};
use netgather::core::model::CollectionEvent;
use netgather::core::registry::{self, TemplateRegistry};
use netgather::core::table::{RowSet, TableFilter};
use netgather::core::targets;
use netgather::platform::config::{self, AppConfig, PlatformPaths};
use netgather::util::constants;
use netgather::util::error::{NetGatherError, Result};
use netgather::util::logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "netgather", version, about = "Run a show command on many devices and structure the output")]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Config file (defaults to the platform config directory).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command on every host and export the results.
    Collect(CollectArgs),

    /// List the template catalog or check whether a template matches.
    Templates(TemplatesArgs),

    /// Check that a filter or extraction regex compiles.
    CheckRegex {
        pattern: String,
    },
}

#[derive(Args, Debug)]
struct CollectArgs {
    /// Newline-delimited host list ('#' comments allowed).
    #[arg(long = "hosts")]
    hosts: PathBuf,

    /// Command to run on every host.
    #[arg(short = 'c', long = "command")]
    command: String,

    /// Login name. The password is read from NETGATHER_PASSWORD.
    #[arg(short = 'u', long = "username", default_value = "")]
    username: String,

    /// Target type used for template lookup (e.g. cisco_ios).
    #[arg(long = "device-type")]
    device_type: Option<String>,

    /// Concurrent sessions.
    #[arg(short = 'w', long = "workers")]
    workers: Option<usize>,

    /// Per-host timeout in seconds.
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Template directory or bundle (.zip).
    #[arg(long = "templates")]
    templates: Option<PathBuf>,

    /// Skip template parsing.
    #[arg(long = "no-templates")]
    no_templates: bool,

    /// Do not send the paging-disable command first.
    #[arg(long = "no-paging-disable")]
    no_paging_disable: bool,

    #[command(flatten)]
    filter: FilterArgs,

    #[command(flatten)]
    table_filter: TableFilterArgs,

    /// Named-group regex for the pattern tier.
    #[arg(long = "pattern", default_value = "")]
    pattern: String,

    /// Delimiter for the split tier ('whitespace' for runs of whitespace).
    #[arg(long = "split", default_value = "")]
    split: String,

    /// Maximum splits per line (0 = unlimited).
    #[arg(long = "maxsplit", default_value_t = 0)]
    maxsplit: usize,

    /// Keep a placeholder row for hosts that returned empty output.
    #[arg(long = "keep-empty")]
    keep_empty: bool,

    /// Output directory for exported files.
    #[arg(short = 'o', long = "out", default_value = ".")]
    out: PathBuf,

    #[arg(long = "format", value_enum, default_value_t = FormatArg::Csv)]
    format: FormatArg,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Keep hosts whose name contains this text.
    #[arg(long = "host-contains", default_value = "")]
    host_contains: String,

    /// Keep lines containing this text.
    #[arg(long = "include", default_value = "")]
    include: String,

    /// Drop lines containing this text.
    #[arg(long = "exclude", default_value = "")]
    exclude: String,

    /// Keep lines matching this regex.
    #[arg(long = "include-regex", default_value = "")]
    include_regex: String,

    /// Drop lines matching this regex.
    #[arg(long = "exclude-regex", default_value = "")]
    exclude_regex: String,
}

/// Filters over the best-available structured table.
#[derive(Args, Debug)]
struct TableFilterArgs {
    /// Keep structured rows whose host contains this text.
    #[arg(long = "row-host-contains", default_value = "")]
    row_host_contains: String,

    /// Column searched by --contains (any column when omitted).
    #[arg(long = "column")]
    column: Option<String>,

    /// Keep structured rows with a cell containing this text.
    #[arg(long = "contains", default_value = "")]
    contains: String,
}

#[derive(Args, Debug)]
struct TemplatesArgs {
    /// Template directory or bundle (.zip).
    #[arg(long = "templates")]
    templates: Option<PathBuf>,

    /// Target type to check (e.g. cisco_ios).
    #[arg(long = "platform")]
    platform: Option<String>,

    /// Command to check (e.g. "show ip interface brief").
    #[arg(long = "command")]
    command: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let paths = PlatformPaths::resolve();
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let (app_config, config_warnings) = config::load_config(&config_path);

    logging::init(cli.debug, app_config.log_level.as_deref());
    for warning in &config_warnings {
        tracing::warn!("{warning}");
        eprintln!("Warning: {warning}");
    }

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "NetGather starting"
    );

    let result = match cli.command {
        Command::Collect(args) => run_collect(args, &app_config, &paths),
        Command::Templates(args) => run_templates(args, &app_config, &paths),
        Command::CheckRegex { pattern } => run_check_regex(&pattern),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

// =============================================================================
// collect
// =============================================================================

/// `Ok(false)` means the run could not go ahead (e.g. no targets).
fn run_collect(args: CollectArgs, app_config: &AppConfig, paths: &PlatformPaths) -> Result<bool> {
    let text = std::fs::read_to_string(&args.hosts).map_err(|e| NetGatherError::Io {
        path: args.hosts.clone(),
        operation: "read target list",
        source: e,
    })?;
    let targets = targets::parse_targets(&text);
    if targets.is_empty() {
        eprintln!("No hosts found in '{}'.", args.hosts.display());
        return Ok(false);
    }
    if args.command.trim().is_empty() {
        eprintln!("The command to run is empty.");
        return Ok(false);
    }

    let device_type = args
        .device_type
        .clone()
        .unwrap_or_else(|| app_config.device_type.clone());
    let workers = clamp_workers(args.workers.unwrap_or(app_config.workers));
    let timeout = clamp_timeout(args.timeout.unwrap_or(app_config.timeout_secs));

    let template = if args.no_templates {
        None
    } else {
        let registry = open_registry(args.templates.as_deref(), app_config, paths);
        Some(TemplateContext {
            registry,
            device_type: device_type.clone(),
            command: args.command.clone(),
        })
    };

    let credentials = Credentials::new(
        args.username.clone(),
        std::env::var(constants::PASSWORD_ENV_VAR).ok(),
    );
    let provider = Arc::new(SshSessionProvider::new(SshConfig {
        program: app_config.ssh_program.clone(),
        sshpass_program: app_config.sshpass_program.clone(),
        port: app_config.ssh_port,
        extra_args: app_config.ssh_extra_args.clone(),
    }));

    let request = CollectionRequest {
        targets,
        command: args.command.clone(),
        credentials,
        executor: ExecutorConfig {
            workers,
            timeout: Duration::from_secs(timeout),
            device_type,
            disable_paging: app_config.disable_paging && !args.no_paging_disable,
        },
    };

    let mut state = CollectionState::new(
        CorpusOptions {
            keep_empty: args.keep_empty,
        },
        template,
    );
    let mut manager = CollectionManager::new();
    manager.start(provider, request);

    while !state.is_finished() {
        match manager.next_event(Duration::from_millis(250)) {
            Some(event) => {
                if let CollectionEvent::TargetCompleted {
                    ref result,
                    completed,
                    total,
                } = event
                {
                    let status = match result.failure_reason() {
                        Some(failure) => failure.kind.label(),
                        None => "ok",
                    };
                    eprintln!("[{completed}/{total}] {} {status}", result.target);
                }
                state.apply(event);
            }
            None if manager.is_done() => {
                for event in manager.poll_events() {
                    state.apply(event);
                }
                break;
            }
            None => {}
        }
    }

    if let Some(ref error) = state.error {
        eprintln!("Collection failed: {error}");
        return Ok(false);
    }

    let options = ReportOptions {
        filter: FilterSpec {
            target_contains: args.filter.host_contains,
            include_text: args.filter.include,
            exclude_text: args.filter.exclude,
            include_regex: args.filter.include_regex,
            exclude_regex: args.filter.exclude_regex,
        },
        table_filter: TableFilter {
            host_contains: args.table_filter.row_host_contains,
            column: args.table_filter.column,
            contains: args.table_filter.contains,
        },
        pattern: args.pattern,
        split_delimiter: args.split,
        maxsplit: args.maxsplit,
    };
    for regex in [&options.filter.include_regex, &options.filter.exclude_regex] {
        if let Err(e) = filter::validate_regex(regex) {
            eprintln!("Warning: {e}; filter stage ignored");
        }
    }

    let report = Report::build(&state, &options);
    let written = report.write(&args.out, args.format.into())?;

    print_summary(&state, &report);
    println!();
    for path in &written {
        println!("Wrote {}", path.display());
    }
    println!();
    print_table(&report.best_row_set());
    Ok(true)
}

fn clamp_workers(requested: usize) -> usize {
    let clamped = requested.clamp(constants::MIN_WORKERS, constants::MAX_WORKERS);
    if clamped != requested {
        tracing::warn!(requested, clamped, "Worker count out of range");
    }
    clamped
}

fn clamp_timeout(requested: u64) -> u64 {
    let clamped = requested.clamp(constants::MIN_TIMEOUT_SECS, constants::MAX_TIMEOUT_SECS);
    if clamped != requested {
        tracing::warn!(requested, clamped, "Timeout out of range");
    }
    clamped
}

/// Activate the first template source that is given: CLI, config, then the
/// platform data directory. A source that fails to load is reported and the
/// run continues without templates.
fn open_registry(cli_path: Option<&Path>, app_config: &AppConfig, paths: &PlatformPaths) -> TemplateRegistry {
    let registry = TemplateRegistry::new();
    let source = cli_path
        .map(Path::to_path_buf)
        .or_else(|| app_config.template_dir.clone())
        .or_else(|| paths.default_template_dir());

    let Some(source) = source else {
        tracing::info!("No template directory configured");
        return registry;
    };
    if let Err(e) = registry.load_bundle(&source) {
        tracing::warn!(source = %source.display(), error = %e, "Template source not loaded");
        eprintln!("Warning: {e}. Continuing without templates.");
    }
    registry
}

fn print_summary(state: &CollectionState, report: &Report) {
    let Some(ref summary) = state.summary else {
        return;
    };
    println!("Hosts processed:   {}", summary.total_targets);
    println!("Outputs collected: {}", summary.succeeded);
    println!("Failures:          {}", summary.failed());
    for (kind, count) in &summary.failures_by_kind {
        println!("  {:<22} {count}", kind.label());
    }
    println!("Lines (all):       {}", summary.total_lines);
    println!("Lines (filtered):  {}", report.filtered_lines.len());
    for outcome in &report.outcomes {
        match &outcome.reason {
            Some(reason) if outcome.is_empty() => {
                println!("{:<19}0 ({reason})", format!("{}:", outcome.tier.label()))
            }
            _ => println!("{:<19}{}", format!("{}:", outcome.tier.label()), outcome.rows.len()),
        }
    }
    println!("Elapsed:           {:.1}s", summary.duration.as_secs_f64());

    if !report.failures.is_empty() {
        println!();
        println!("Per-host issues:");
        for row in &report.failures.rows {
            let cell = |i: usize| row.get(i).cloned().flatten().unwrap_or_default();
            println!("  {:<24} {}", cell(0), cell(2));
        }
    }
}

/// Print the first rows of a row-set as a plain aligned table.
fn print_table(set: &RowSet) {
    println!("{} ({} rows)", set.kind.label(), set.len());
    if set.is_empty() {
        return;
    }
    for line in aligned_preview(set) {
        println!("{line}");
    }
    let shown = set.len().min(constants::PREVIEW_ROWS);
    if set.len() > shown {
        println!("... {} more", set.len() - shown);
    }
}

/// Header plus the first preview rows, padded to per-column widths
/// counted in characters.
fn aligned_preview(set: &RowSet) -> Vec<String> {
    let shown: Vec<&Vec<Option<String>>> = set.rows.iter().take(constants::PREVIEW_ROWS).collect();
    let widths: Vec<usize> = set
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            shown
                .iter()
                .filter_map(|row| row.get(i).and_then(|c| c.as_deref()))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<w$}", w = *width))
            .collect::<Vec<_>>()
            .join("  ")
    };
    let mut lines = vec![line(set.columns.iter().map(String::as_str).collect())];
    lines.extend(
        shown
            .iter()
            .map(|row| line(row.iter().map(|c| c.as_deref().unwrap_or("")).collect())),
    );
    lines
}

// =============================================================================
// templates
// =============================================================================

fn run_templates(args: TemplatesArgs, app_config: &AppConfig, paths: &PlatformPaths) -> Result<bool> {
    let registry = open_registry(args.templates.as_deref(), app_config, paths);
    let Some(dir) = registry.active_dir() else {
        eprintln!("No template directory is active.");
        return Ok(false);
    };
    println!("Template directory: {}", dir.display());

    let catalog = registry.catalog()?;
    println!("{} template files", catalog.len());
    for entry in &catalog {
        println!(
            "  {:<48} {:<16} {:<36} {}",
            entry.template_file, entry.platform, entry.command, entry.folder
        );
    }

    if let (Some(platform), Some(command)) = (args.platform, args.command) {
        println!();
        match registry.lookup(&platform, &command) {
            Ok(resolved) => println!(
                "Template for platform='{}', command='{}': {}",
                resolved.platform,
                resolved.command,
                resolved.path.display()
            ),
            Err(reason) => {
                println!(
                    "No template: {reason} (platform resolved as '{}')",
                    registry::resolve_platform(&platform)
                );
                return Ok(false);
            }
        }
    }
    Ok(true)
}

// =============================================================================
// check-regex
// =============================================================================

fn run_check_regex(pattern: &str) -> Result<bool> {
    match filter::validate_regex(pattern) {
        Ok(Some(regex)) => {
            let names: Vec<&str> = regex.capture_names().flatten().collect();
            if names.is_empty() {
                println!("OK (no named groups; usable as a filter, not as an extraction pattern)");
            } else {
                println!("OK (named groups: {})", names.join(", "));
            }
            Ok(true)
        }
        Ok(None) => {
            println!("Empty pattern");
            Ok(false)
        }
        Err(e) => {
            println!("{e}");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netgather::core::table::RowSetKind;

    #[test]
    fn test_preview_aligns_non_ascii_cells() {
        let set = RowSet {
            kind: RowSetKind::Template,
            columns: vec!["host".into(), "descr".into(), "status".into()],
            rows: vec![
                vec![Some("r1".into()), Some("Zürich uplink".into()), Some("up".into())],
                vec![Some("r2".into()), Some("plain uplink".into()), None],
            ],
        };
        assert_eq!(
            aligned_preview(&set),
            vec![
                "host  descr          status",
                "r1    Zürich uplink  up    ",
                "r2    plain uplink         ",
            ]
        );
    }
}
