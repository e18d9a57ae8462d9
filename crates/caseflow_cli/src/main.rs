//! Operator entry point for CaseFlow.
//!
//! # Responsibility
//! - Bootstrap the database and the first super admin.
//! - Inspect stage rules and cases without a server.
//!
//! # Invariants
//! - Every command loads `CoreConfig` and initializes logging before touching storage.
//! - Case commands run as an authenticated user, never as an implicit admin.

use caseflow_core::db::migrations::schema_version;
use caseflow_core::{
    core_version, init_logging, open_db, Actor, AuthService, Case, CaseFilter, CaseService,
    CaseStage, CoreConfig, NewUser, Role, ServiceContext, UserService, ALL_STAGES,
};
use clap::{Args, Parser, Subcommand};
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "caseflow", version, about = "Expropriation case tracking operator tool")]
struct Cli {
    /// JSON config file. `CASEFLOW_*` environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and apply migrations.
    Init,
    /// Provision a super admin account.
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Print the workflow stages in order.
    Stages,
    /// Check whether a stage transition is allowed.
    CheckTransition { from: String, to: String },
    #[command(subcommand)]
    Cases(CasesCommand),
}

#[derive(Debug, Subcommand)]
enum CasesCommand {
    List {
        #[command(flatten)]
        login: Login,
        #[arg(long)]
        stage: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Show {
        #[command(flatten)]
        login: Login,
        /// Case number, e.g. `EXP-2024-0001`.
        case_number: String,
    },
}

#[derive(Debug, Args)]
struct Login {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = CoreConfig::load(cli.config.as_deref())?;
    init_logging(&config.log_level, &config.log_dir.to_string_lossy())?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        core_version()
    );

    match cli.command {
        Command::Init => {
            let conn = open_db(&config.database_path)?;
            println!(
                "database ready at {} (schema v{})",
                config.database_path.display(),
                schema_version(&conn)?
            );
        }
        Command::CreateAdmin {
            email,
            password,
            first_name,
            last_name,
        } => {
            let conn = open_db(&config.database_path)?;
            let ctx = ServiceContext::new(&conn, &config);
            let user = UserService::new(ctx).provision_super_admin(NewUser {
                email,
                password,
                first_name,
                last_name,
                role: Role::SuperAdmin,
                department_id: None,
            })?;
            println!("created super admin {} ({})", user.email, user.id);
        }
        Command::Stages => {
            for stage in ALL_STAGES {
                let progress = stage
                    .progress_percent()
                    .map(|percent| format!("{percent}%"))
                    .unwrap_or_else(|| "-".to_string());
                println!("{:>2} {:<22} {progress}", stage.index() + 1, stage.as_str());
            }
        }
        Command::CheckTransition { from, to } => {
            let from = parse_stage(&from)?;
            let to = parse_stage(&to)?;
            if from.can_transition_to(to) {
                println!("{from} -> {to}: allowed");
            } else {
                let targets: Vec<&str> = from
                    .allowed_targets()
                    .into_iter()
                    .map(CaseStage::as_str)
                    .collect();
                println!("{from} -> {to}: not allowed (allowed: {})", targets.join(", "));
            }
        }
        Command::Cases(command) => {
            let conn = open_db(&config.database_path)?;
            run_cases(&conn, &config, command)?;
        }
    }
    Ok(())
}

fn run_cases(conn: &Connection, config: &CoreConfig, command: CasesCommand) -> CliResult<()> {
    let ctx = ServiceContext::new(conn, config);
    match command {
        CasesCommand::List {
            login,
            stage,
            search,
            limit,
            offset,
        } => {
            let stage = stage.as_deref().map(parse_stage).transpose()?;
            with_actor(ctx, &login, |actor| {
                let page = CaseService::new(ctx).list_cases(
                    actor,
                    CaseFilter {
                        stage,
                        search,
                        limit,
                        offset,
                        ..CaseFilter::default()
                    },
                )?;
                for case in &page.items {
                    println!(
                        "{:<16} {:<22} {:<12} {}",
                        case.case_number,
                        case.current_stage.as_str(),
                        case.status.as_str(),
                        case.title
                    );
                }
                println!(
                    "showing {} of {} (offset {})",
                    page.items.len(),
                    page.total,
                    page.offset
                );
                Ok(())
            })
        }
        CasesCommand::Show { login, case_number } => with_actor(ctx, &login, |actor| {
            let service = CaseService::new(ctx);
            let case = service.get_by_number(actor, &case_number)?;
            print_case(&case);
            for change in service.stage_history(actor, case.id)? {
                println!(
                    "  {} {} -> {}",
                    change.changed_at, change.from_stage, change.to_stage
                );
            }
            Ok(())
        }),
    }
}

/// Runs `body` inside a short-lived session for `login`.
fn with_actor(
    ctx: ServiceContext<'_>,
    login: &Login,
    body: impl FnOnce(&Actor) -> CliResult<()>,
) -> CliResult<()> {
    let auth = AuthService::new(ctx);
    let outcome = auth.login(&login.email, &login.password)?;
    let result = auth
        .authenticate(&outcome.token)
        .map_err(Box::<dyn Error>::from)
        .and_then(|actor| body(&actor));
    auth.logout(&outcome.token)?;
    result
}

fn print_case(case: &Case) {
    println!("{} {}", case.case_number, case.title);
    println!("  stage:    {}", case.current_stage);
    println!("  status:   {}", case.status.as_str());
    println!("  priority: {}", case.priority.as_str());
    println!("  address:  {}", case.property_address);
    if let Some(percent) = case.current_stage.progress_percent() {
        println!("  progress: {percent}%");
    }
}

fn parse_stage(value: &str) -> CliResult<CaseStage> {
    CaseStage::parse(value).ok_or_else(|| format!("unknown stage `{value}`").into())
}
