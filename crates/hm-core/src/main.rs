//! hpcmail - maintenance notice recipients
//!
//! The main entry point, handling:
//! - Agent mode (`snapshot`): encode the local process table to stdout
//! - Recipient resolution against a user directory
//! - Notice plans and bulk recipient lists for the external mailer

use clap::{Args, Parser, Subcommand};
use hm_common::{format_error_human, Error, OutputFormat, StructuredError};
use hm_core::collect::{collect_local, collect_snapshot, invoking_user, HostTarget};
use hm_core::config::{load_config, Config, ConfigOptions};
use hm_core::directory::{load_directory, KeyField};
use hm_core::exit_codes::ExitCode;
use hm_core::logging::{generate_run_id, init_logging, LogConfig, LogLevel};
use hm_core::notice::{bulk_recipients, NoticePlan, PlanOptions};
use hm_core::resolve::{resolve, ProcessDetail, Resolution};
use hm_core::snapshot;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing::{debug, info, info_span, warn};

/// hpcmail - find who to notify about host maintenance
#[derive(Parser)]
#[command(name = "hpcmail")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (default: $HPCMAIL_CONFIG, then ~/.config/hpcmail/hpcmail.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent mode: write the encoded local process snapshot to stdout
    #[command(hide = true)]
    Snapshot,

    /// Resolve recipients and print the notice plan
    Recipients(RecipientsArgs),

    /// Print the comma-joined recipient list for a single bulk message
    List(TargetArgs),

    /// Print version information
    Version,
}

/// Where to look and whom to consider
#[derive(Args, Debug)]
struct TargetArgs {
    /// Host to check processes on (default: this host)
    #[arg(long, short = 'H')]
    host: Option<String>,

    /// ssh identity file for connecting to HOST
    #[arg(long, short = 'I')]
    identity: Option<PathBuf>,

    /// Launcher prefix for the remote agent (e.g. "sudo -n")
    #[arg(long)]
    interpreter: Option<String>,

    /// User directory file (JSON)
    #[arg(long, short = 'D')]
    directory: Option<PathBuf>,

    /// Directory field that users are matched on
    #[arg(long, value_enum)]
    key_field: Option<KeyField>,

    /// Use every address of each user instead of the preferred one
    #[arg(long, short = 'm')]
    multiple: bool,

    /// Account excluded from snapshot-derived recipients (default: the invoking user)
    #[arg(long)]
    invoker: Option<String>,

    /// Users to notify; if omitted, everyone with a process on HOST
    users: Vec<String>,
}

#[derive(Args, Debug)]
struct RecipientsArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// One notice per user instead of a single bulk message
    #[arg(long, short = 'i')]
    individual: bool,

    /// Include each user's running processes in their notice
    #[arg(long, short = 'p', requires = "individual")]
    processes: bool,
}

fn main() {
    let cli = Cli::parse();

    // Agent stderr is relayed to the controller; keep it to bare warnings.
    let agent = matches!(cli.command, Commands::Snapshot);
    let base_level = if agent { LogLevel::Warn } else { LogLevel::Info };
    let mut log_config =
        LogConfig::from_env(base_level).with_verbosity(cli.global.verbose, cli.global.quiet);
    log_config.timestamps = !agent;
    init_logging(&log_config);

    let run_id = generate_run_id();
    let _span = info_span!("run", run_id = %run_id).entered();

    let result = match &cli.command {
        Commands::Snapshot => run_snapshot(),
        Commands::Recipients(args) => run_recipients(&cli.global, args),
        Commands::List(args) => run_list(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            Ok(ExitCode::Clean)
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(err) => {
            report_error(&cli.global, &err);
            ExitCode::from(&err)
        }
    };

    debug!(exit_code = %exit_code, "done");
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_snapshot() -> Result<ExitCode, Error> {
    let snap = collect_local()?;
    let frame = snapshot::encode(&snap)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&frame)?;
    stdout.flush()?;

    debug!(
        process_count = snap.len(),
        bytes = frame.len(),
        "snapshot written"
    );
    Ok(ExitCode::Clean)
}

fn run_recipients(global: &GlobalOpts, args: &RecipientsArgs) -> Result<ExitCode, Error> {
    let config = load(global)?;
    let detail = if args.processes {
        ProcessDetail::Include
    } else {
        ProcessDetail::Omit
    };
    let (resolution, host) = resolve_target(&config, &args.target, detail)?;
    let policy = config.addresses.policy(args.target.multiple);

    let plan = if args.individual {
        let options = PlanOptions {
            policy,
            include_processes: args.processes,
            max_command_tokens: config.notice.max_command_tokens,
        };
        NoticePlan::individual(&resolution, host.as_deref(), &options)
    } else {
        NoticePlan::bulk(&resolution, host.as_deref(), &policy)
    };

    match global.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Md => print!("{}", plan.to_markdown()),
    }

    Ok(outcome(&resolution))
}

fn run_list(global: &GlobalOpts, args: &TargetArgs) -> Result<ExitCode, Error> {
    let config = load(global)?;
    let (resolution, _) = resolve_target(&config, args, ProcessDetail::Omit)?;
    let policy = config.addresses.policy(args.multiple);

    println!("{}", bulk_recipients(&resolution, &policy));
    Ok(outcome(&resolution))
}

fn print_version(global: &GlobalOpts) {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    match global.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "name": "hpcmail",
                "package": name,
                "version": version,
                "snapshot_format": snapshot::FORMAT_VERSION,
            })
        ),
        OutputFormat::Md => println!("hpcmail {} (snapshot format v{})", version, snapshot::FORMAT_VERSION),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn load(global: &GlobalOpts) -> Result<Config, Error> {
    let resolved = load_config(&ConfigOptions {
        config_path: global.config.clone(),
    })?;
    Ok(resolved.config)
}

/// Collect (when needed), load the directory, and resolve.
fn resolve_target(
    config: &Config,
    args: &TargetArgs,
    detail: ProcessDetail,
) -> Result<(Resolution, Option<String>), Error> {
    let directory_path = args
        .directory
        .clone()
        .or_else(|| config.directory.path.clone())
        .ok_or_else(|| {
            Error::Config("no user directory: pass --directory or set [directory] path".to_string())
        })?;
    let key_field = args.key_field.unwrap_or(config.directory.key_field);
    let directory = load_directory(&directory_path, key_field)?;

    let invoker = match &args.invoker {
        Some(name) => name.clone(),
        None => invoking_user().unwrap_or_else(|| {
            warn!("cannot determine invoking user; nobody is excluded");
            String::new()
        }),
    };

    let needs_snapshot = detail == ProcessDetail::Include || args.users.is_empty();
    let snapshot = if needs_snapshot {
        let target = match &args.host {
            Some(host) => HostTarget::new(host.clone(), args.identity.clone()),
            None => HostTarget::local(),
        };
        let mut remote = config.remote.clone();
        if let Some(interpreter) = &args.interpreter {
            remote.interpreter = Some(interpreter.clone());
        }
        info!(host = %target.address, local = target.is_local, "collecting process snapshot");
        Some(collect_snapshot(&target, &remote)?)
    } else {
        None
    };

    let resolution = resolve(snapshot.as_ref(), &directory, &args.users, &invoker, detail);
    let host = snapshot.map(|s| s.host);
    Ok((resolution, host))
}

fn outcome(resolution: &Resolution) -> ExitCode {
    for unknown in &resolution.unknown_users {
        let err = Error::UnknownUser {
            username: unknown.username.clone(),
        };
        warn!(code = err.code(), error = %err, "skipping recipient");
    }

    if !resolution.unknown_users.is_empty() {
        ExitCode::PartialUnknown
    } else if resolution.is_empty() {
        ExitCode::NothingToDo
    } else {
        ExitCode::Clean
    }
}

fn report_error(global: &GlobalOpts, err: &Error) {
    match global.format {
        OutputFormat::Json => eprintln!("{}", StructuredError::from(err).to_json()),
        OutputFormat::Md => eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal())),
    }
}
