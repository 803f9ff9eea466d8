//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use image_reaper::core::config::Config;
use image_reaper::daemon::loop_main::{DaemonArgs, ReaperDaemon};
use image_reaper::runtime::docker::DockerRuntime;
use image_reaper::sweep::scheduler::{PassOutcome, PassReport, SweepScheduler};

/// Image Reaper — removes container images left unreferenced by any container.
#[derive(Debug, Parser)]
#[command(
    name = "imgr",
    author,
    version,
    about = "Image Reaper - Unused Container Image Cleanup",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the cleanup daemon.
    Daemon(DaemonCliArgs),
    /// Run a single cleanup pass and exit.
    Sweep(SweepArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Flags that override the corresponding config values for this invocation.
#[derive(Debug, Clone, Args, Serialize, Default)]
struct OverrideArgs {
    /// Container runtime endpoint (e.g. unix:///var/run/docker.sock; an
    /// empty value selects the client library's local defaults).
    #[arg(long, value_name = "HOST")]
    host: Option<String>,
    /// Seconds between cleanup passes.
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,
    /// Grace period before deletion, in seconds.
    #[arg(long, value_name = "SECONDS")]
    grace: Option<u64>,
    /// Image to exempt from cleanup (`repo` or `repo:tag`; repeatable).
    #[arg(long = "lock", value_name = "IMAGE")]
    locked: Vec<String>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct DaemonCliArgs {
    #[command(flatten)]
    overrides: OverrideArgs,
    /// Optional pidfile path for non-service usage.
    #[arg(long, value_name = "PATH")]
    pidfile: Option<PathBuf>,
    /// Systemd watchdog timeout in seconds (0 reads WATCHDOG_USEC).
    #[arg(long, default_value_t = 0, value_name = "SECONDS")]
    watchdog_sec: u64,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct SweepArgs {
    #[command(flatten)]
    overrides: OverrideArgs,
    /// Skip the grace period (sets it to zero for this pass).
    #[arg(long)]
    no_grace: bool,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand, Serialize)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
    /// Reset to generated defaults.
    Reset,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Daemon(args) => run_daemon(cli, args),
        Command::Sweep(args) => run_sweep(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli, overrides: &OverrideArgs) -> Result<Config, CliError> {
    let mut config =
        Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))?;

    if let Some(host) = &overrides.host {
        config.runtime.host.clone_from(host);
    }
    if let Some(interval) = overrides.interval {
        config.sweep.interval_secs = interval;
    }
    if let Some(grace) = overrides.grace {
        config.sweep.grace_secs = grace;
    }
    if !overrides.locked.is_empty() {
        config.sweep.locked_images = overrides.locked.join(",");
    }

    config
        .validate()
        .map_err(|e| CliError::User(format!("invalid config: {e}")))?;
    Ok(config)
}

fn run_daemon(cli: &Cli, args: &DaemonCliArgs) -> Result<(), CliError> {
    let config = load_config(cli, &args.overrides)?;

    let daemon_args = DaemonArgs {
        foreground: true,
        pidfile: args.pidfile.clone(),
        watchdog_sec: args.watchdog_sec,
    };

    let mut daemon = ReaperDaemon::init(config, &daemon_args)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    daemon.run().map_err(|e| CliError::Runtime(e.to_string()))
}

fn run_sweep(cli: &Cli, args: &SweepArgs) -> Result<(), CliError> {
    let mut config = load_config(cli, &args.overrides)?;
    if args.no_grace {
        config.sweep.grace_secs = 0;
    }

    if cli.verbose {
        eprintln!(
            "[IMR-SWEEP] host={} interval={}s grace={}s locked=[{}]",
            config.runtime.host,
            config.sweep.interval_secs,
            config.sweep.grace_secs,
            config.sweep.locked_images,
        );
    }

    let runtime = DockerRuntime::connect(&config.runtime.host, config.runtime.connect_timeout_secs)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let mut scheduler = SweepScheduler::one_shot(&runtime, config.sweep.clone(), None);
    match scheduler.run_once() {
        PassOutcome::Completed(report) => {
            match output_mode(cli) {
                OutputMode::Human => {
                    if !cli.quiet {
                        println!("{}", render_sweep_summary(&report));
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "sweep",
                        "examined": report.examined,
                        "removed": report.removed,
                        "failed": report.failed,
                        "duration_ms": report.duration.as_millis() as u64,
                    });
                    write_json_line(&payload)?;
                }
            }
            if report.failed > 0 {
                return Err(CliError::Partial(format!(
                    "{} of {} removals failed",
                    report.failed,
                    report.removed + report.failed,
                )));
            }
            Ok(())
        }
        PassOutcome::Retry { phase, .. } => Err(CliError::Runtime(format!(
            "sweep aborted during {phase}; is the runtime healthy?"
        ))),
        PassOutcome::Interrupted => Err(CliError::Runtime("sweep interrupted".to_string())),
    }
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())
                .map_err(|e| CliError::Runtime(e.to_string()))?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    let payload = json!({
                        "command": "config show",
                        "config": value,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config
                    .stable_hash()
                    .map_err(|e| CliError::Runtime(e.to_string()))?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        if !cli.quiet {
                            println!("{}", "Configuration is valid.".green());
                            if cli.verbose {
                                println!("  Source: {}", config.paths.config_file.display());
                                println!("  Hash: {hash}");
                            }
                        }
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("{}", format!("Configuration is INVALID: {e}").red());
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
        Some(ConfigCommand::Reset) => {
            let defaults = Config::default();
            let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CliError::Runtime(format!("create config dir: {e}")))?;
            }

            let toml_str = toml::to_string_pretty(&defaults)
                .map_err(|e| CliError::Runtime(format!("serialize default config: {e}")))?;
            std::fs::write(&config_path, &toml_str)
                .map_err(|e| CliError::Runtime(format!("write config: {e}")))?;

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("Reset config to defaults: {}", config_path.display());
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config reset",
                        "path": config_path.to_string_lossy(),
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("imgr {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "imgr",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn render_sweep_summary(report: &PassReport) -> String {
    let removed = report.removed.to_string().green();
    let failed = if report.failed > 0 {
        report.failed.to_string().red()
    } else {
        report.failed.to_string().normal()
    };
    format!(
        "Swept {} images: {} removed, {} failed ({:.1}s).",
        report.examined,
        removed,
        failed,
        report.duration.as_secs_f64(),
    )
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("IMR_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

// ──────────────────── tests ────────────────────
