//! stack-ledger: track provisioned cloud resources and tear them down safely
//!
//! Every command works on one stack's state file. Registry failures are
//! classified through the error engine, logged to the stack's error log,
//! and mapped to the process exit status.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use stack_ledger::command::CleanupCommand;
use stack_ledger::config::{ConfigError, ENV_ACCOUNT, ENV_REGION, ENV_STACK, StackConfig};
use stack_ledger::error::{DeploymentError, ErrorCode, ErrorState, ThrowSpec};
use stack_ledger::registry::{Registration, Resource, SortBy, TransitionPolicy};
use stack_ledger::report::IncidentReport;
use stack_ledger::rollback::{DeploymentPhase, rollback};
use stack_ledger::session::Session;
use stack_ledger::teardown::{CleanupResult, TeardownReport, teardown_all};
use stack_ledger::{RegistryError, cleanup_script};
use stack_ledger_common::{ResourceStatus, generate_tags};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stack-ledger")]
#[command(about = "Resource lifecycle registry and teardown for cloud stacks")]
#[command(version)]
struct Args {
    /// JSON config file
    #[arg(long, global = true, env = "STACK_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Stack name
    #[arg(long, global = true, env = ENV_STACK)]
    stack: Option<String>,

    /// Region
    #[arg(long, global = true, env = ENV_REGION)]
    region: Option<String>,

    /// Cloud account id, shown in reports
    #[arg(long, global = true, env = ENV_ACCOUNT)]
    account: Option<String>,

    /// State file (default: per-stack data directory)
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Reject status transitions the lifecycle table does not allow
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tracked resources
    List {
        /// Only resources of this type
        #[arg(long = "type")]
        resource_type: Option<String>,

        /// Only resources in this status
        #[arg(long)]
        status: Option<ResourceStatus>,

        /// Sort order (timestamp, id, status)
        #[arg(long, default_value = "timestamp")]
        sort_by: SortBy,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Register a resource (or overwrite an existing one)
    Register {
        /// Resource type, e.g. instance, volume, vpc
        resource_type: String,

        /// Provider id
        id: String,

        /// Metadata as a JSON document
        #[arg(long, default_value = "{}")]
        metadata: String,

        /// Id of a resource this one depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        /// Shell line that deletes the resource
        #[arg(long)]
        cleanup: Option<String>,

        /// Extra tags as a JSON object of strings
        #[arg(long)]
        tags: Option<String>,
    },

    /// Change a resource's lifecycle status
    Status {
        id: String,

        status: ResourceStatus,

        /// Why the status changed
        #[arg(long)]
        reason: Option<String>,
    },

    /// Stop tracking a resource
    Unregister {
        id: String,

        /// Remove even if live resources depend on it
        #[arg(long)]
        force: bool,
    },

    /// Print the teardown order
    Plan {
        /// Order by dependencies instead of type priority alone
        #[arg(long)]
        topological: bool,
    },

    /// Write a standalone shell script that deletes everything
    CleanupScript {
        #[arg(short, long, default_value = "cleanup.sh")]
        output: PathBuf,
    },

    /// Tear down every tracked resource
    Teardown {
        /// Actually run cleanup commands (default is dry-run)
        #[arg(long)]
        execute: bool,
    },

    /// Roll back a deployment that reached PHASE
    Rollback {
        /// network, security, compute, load-balancer, storage, application
        #[arg(long)]
        phase: DeploymentPhase,
    },

    /// Print the tags a new resource of this stack would get
    Tags {
        /// Extra tags as a JSON object of strings
        #[arg(long)]
        additional: Option<String>,
    },

    /// Summarize recorded errors
    Report,
}

fn main() {
    if let Err(e) = run() {
        print_error(&e);
        std::process::exit(exit_status(&e));
    }
}

/// Exit status for a failed run: the error category, or 1 for anything else
fn exit_status(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<DeploymentError>()
        .map(|err| i32::from(err.exit_status()))
        .unwrap_or(1)
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    match e.downcast_ref::<DeploymentError>() {
        Some(err) => {
            let _ = writeln!(stderr, "\n{}", err.record().console_line());
        }
        None => {
            let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");
        }
    }

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // no session yet, so config errors get a throwaway error state
    let config = load_config(&args).map_err(|e| ErrorState::new().throw(&e))?;
    let mut session = Session::open(config)?;

    match args.command {
        Command::List {
            resource_type,
            status,
            sort_by,
            limit,
            format,
        } => handle_list(&mut session, resource_type, status, sort_by, limit, format)?,

        Command::Register {
            resource_type,
            id,
            metadata,
            depends_on,
            cleanup,
            tags,
        } => {
            let metadata: serde_json::Value = match serde_json::from_str(&metadata) {
                Ok(value) => value,
                Err(e) => {
                    return Err(session
                        .throw(
                            ThrowSpec::new(ErrorCode::INVALID_PARAMETER)
                                .message(format!("--metadata is not valid JSON: {e}")),
                        )
                        .into());
                }
            };

            let mut registration = Registration::new(&resource_type, &id)
                .metadata(metadata)
                .dependencies(depends_on)
                .tags(generate_tags(&session.config.identity(), tags.as_deref()));
            if let Some(line) = cleanup {
                registration = registration.cleanup_command(CleanupCommand::shell(line));
            }

            let result = session.registry.register(registration);
            check(&mut session, result)?;
            println!("Registered {resource_type} {id}");
        }

        Command::Status { id, status, reason } => {
            let result = session.registry.update_status(&id, status, reason.as_deref());
            check(&mut session, result)?;
            println!("{id} -> {status}");
        }

        Command::Unregister { id, force } => {
            let result = session.registry.unregister(&id, force);
            check(&mut session, result)?;
            println!("Unregistered {id}");
        }

        Command::Plan { topological } => {
            let plan = if topological {
                session.registry.generate_topological_plan()
            } else {
                session.registry.generate_cleanup_plan()
            };
            if plan.is_empty() {
                println!("No tracked resources");
            }
            for (step, id) in plan.iter().enumerate() {
                let resource_type = session
                    .registry
                    .get(id)
                    .map(|r| r.resource_type.as_str())
                    .unwrap_or("?");
                println!("{:>3}. {resource_type} {id}", step + 1);
            }
        }

        Command::CleanupScript { output } => {
            cleanup_script::write(&session.registry, &output)?;
            println!(
                "Wrote {} ({} resources)",
                output.display(),
                session.registry.len()
            );
        }

        Command::Teardown { execute } => handle_teardown(&mut session, execute)?,

        Command::Rollback { phase } => {
            let runner = session.runner();
            let report = rollback(&mut session.registry, phase, &runner);
            for phase_report in &report.phases {
                println!("Phase {}:", phase_report.phase);
                print_teardown(&phase_report.teardown);
            }
            finish_teardown(&mut session, &report.combined(), "Rollback")?;
        }

        Command::Tags { additional } => {
            let tags = generate_tags(&session.config.identity(), additional.as_deref());
            println!("{}", serde_json::to_string_pretty(&tags)?);
        }

        Command::Report => {
            let records = session.error_log()?.read_all()?;
            let report = IncidentReport::from_history(&records, session.environment());
            print!("{}", report.render());
        }
    }

    Ok(())
}

/// Defaults, then the config file and environment, then flags
fn load_config(args: &Args) -> Result<StackConfig, ConfigError> {
    let mut config = StackConfig::resolve(args.config.as_deref())?;

    if let Some(stack) = &args.stack {
        config.stack_name = stack.clone();
    }
    if let Some(region) = &args.region {
        config.region = region.clone();
    }
    if let Some(account) = &args.account {
        config.account = Some(account.clone());
    }
    if let Some(path) = &args.state_file {
        config.state_path = Some(path.clone());
    }
    if args.strict {
        config.transition_policy = TransitionPolicy::Strict;
    }

    config.validate()?;
    Ok(config)
}

/// Classify a registry failure through the error engine
fn check<T>(session: &mut Session, result: Result<T, RegistryError>) -> Result<T> {
    result.map_err(|e| session.throw(&e).into())
}

fn handle_list(
    session: &mut Session,
    resource_type: Option<String>,
    status: Option<ResourceStatus>,
    sort_by: SortBy,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let resources: Vec<&Resource> = match &resource_type {
        Some(resource_type) => {
            let result = session
                .registry
                .query(resource_type, status, sort_by, limit);
            let ids = check(session, result)?;
            ids.iter().filter_map(|id| session.registry.get(id)).collect()
        }
        None => session
            .registry
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .take(limit.unwrap_or(usize::MAX))
            .collect(),
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&resources)?);
        return Ok(());
    }

    if resources.is_empty() {
        println!("No tracked resources");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Type"),
            Cell::new("ID"),
            Cell::new("Status"),
            Cell::new("Depends on"),
            Cell::new("Created"),
        ]);

    for resource in &resources {
        let dependencies: Vec<&str> = resource.dependencies.iter().map(String::as_str).collect();
        table.add_row(vec![
            Cell::new(&resource.resource_type),
            Cell::new(&resource.id),
            Cell::new(resource.status),
            Cell::new(dependencies.join(", ")),
            Cell::new(resource.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!("{table}");
    println!("\nTotal: {} resources", resources.len());
    Ok(())
}

fn handle_teardown(session: &mut Session, execute: bool) -> Result<()> {
    let plan = session.registry.generate_topological_plan();
    if plan.is_empty() {
        println!("No tracked resources");
        return Ok(());
    }

    if !execute {
        println!("Would tear down {} resources:", plan.len());
        for id in &plan {
            if let Some(resource) = session.registry.get(id) {
                let command = resource
                    .cleanup_command
                    .as_ref()
                    .map(|c| c.render())
                    .unwrap_or_else(|| "(no cleanup command)".to_string());
                println!("  {} {} [{}]: {command}", resource.resource_type, id, resource.status);
            }
        }
        println!("\nRun with --execute to actually delete resources");
        return Ok(());
    }

    info!(resources = plan.len(), "Tearing down stack");
    let runner = session.runner();
    let report = teardown_all(&mut session.registry, &plan, &runner);
    print_teardown(&report);
    finish_teardown(session, &report, "Teardown")
}

fn print_teardown(report: &TeardownReport) {
    for step in &report.steps {
        let outcome = match step.result {
            CleanupResult::Deleted => "deleted".to_string(),
            CleanupResult::AlreadyDeleted => "already deleted".to_string(),
            CleanupResult::Skipped => "skipped (no cleanup command)".to_string(),
            CleanupResult::Failed => format!(
                "FAILED: {}",
                step.error.as_deref().unwrap_or("unknown error")
            ),
        };
        println!("  {} {}: {outcome}", step.resource_type, step.id);
    }
}

/// Summarize a teardown and fail the run if any step failed
fn finish_teardown(session: &mut Session, report: &TeardownReport, what: &str) -> Result<()> {
    println!(
        "\n{what} summary: {} deleted, {} already deleted, {} skipped, {} failed",
        report.count(CleanupResult::Deleted),
        report.count(CleanupResult::AlreadyDeleted),
        report.count(CleanupResult::Skipped),
        report.count(CleanupResult::Failed),
    );

    if report.is_clean() {
        return Ok(());
    }

    let failed: Vec<&str> = report.failed().map(|s| s.id.as_str()).collect();
    Err(session
        .throw(
            ThrowSpec::new(ErrorCode::ROLLBACK_FAILED)
                .message(format!("{what} left resources behind: {}", failed.join(", "))),
        )
        .into())
}
