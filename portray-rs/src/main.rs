use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use portray::commands::{self, GuardOptions};
use portray::guard::{FileRoleStore, Requirement, User};
use portray::tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Inspect PortRay grants and roles
#[derive(Parser)]
#[command(name = "portray", version, about)]
struct Cli {
    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t, env = "PORTRAY_LOG_FORMAT")]
    log_format: TracingFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show how grant strings are decoded
    Decode {
        #[arg(required = true)]
        grants: Vec<String>,
    },

    /// Check whether a user meets a requirement such as `ports:terminals:write`
    Check {
        #[command(flatten)]
        guard: GuardArgs,
        #[command(flatten)]
        user: UserArgs,
        requirement: String,
    },

    /// Show per-level flags for scopes such as `ports` or `ports:terminals`
    Levels {
        #[command(flatten)]
        guard: GuardArgs,
        #[command(flatten)]
        user: UserArgs,
        #[arg(required = true)]
        scopes: Vec<String>,
    },

    /// Check every stored grant against the strict grammar
    Validate {
        #[arg(long, env = "PORTRAY_ROLES")]
        roles: PathBuf,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Decode { .. } => "decode",
            Command::Check { .. } => "check",
            Command::Levels { .. } => "levels",
            Command::Validate { .. } => "validate",
        }
    }
}

#[derive(Args)]
struct GuardArgs {
    /// JSON settings file
    #[arg(long, env = "PORTRAY_SETTINGS")]
    settings: Option<PathBuf>,

    /// Role file, overriding the one in settings
    #[arg(long, env = "PORTRAY_ROLES")]
    roles: Option<PathBuf>,

    /// Reserved role that bypasses grant checks
    #[arg(long)]
    admin_role: Option<String>,

    /// Let higher levels imply lower ones
    #[arg(long)]
    hierarchical: bool,
}

impl From<GuardArgs> for GuardOptions {
    fn from(args: GuardArgs) -> Self {
        Self {
            settings: args.settings,
            roles: args.roles,
            admin_role: args.admin_role,
            hierarchical: args.hierarchical,
        }
    }
}

#[derive(Args)]
struct UserArgs {
    #[arg(long, default_value = "cli")]
    user: String,

    /// Role whose grants apply
    #[arg(long)]
    role: Option<String>,

    /// Treat the user as a system administrator
    #[arg(long)]
    admin: bool,
}

impl From<UserArgs> for User {
    fn from(args: UserArgs) -> Self {
        User {
            id: args.user,
            email: None,
            role: args.role,
            is_system_admin: args.admin,
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Decode { grants } => {
            let reports: Vec<_> = grants.iter().map(|g| commands::decode(g)).collect();
            print_json(&reports)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check {
            guard,
            user,
            requirement,
        } => {
            let requirement: Requirement = requirement
                .parse()
                .with_context(|| format!("Invalid requirement '{requirement}'"))?;
            let guard = commands::open_guard(&guard.into())?;
            let report = commands::check(&guard, &user.into(), &requirement)?;
            print_json(&report)?;
            guard.flush_audit();
            Ok(if report.allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Levels {
            guard,
            user,
            scopes,
        } => {
            let scopes = scopes
                .iter()
                .map(|s| commands::parse_scope(s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let guard = commands::open_guard(&guard.into())?;
            print_json(&commands::levels(&guard, &user.into(), &scopes)?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { roles } => {
            let store = FileRoleStore::new(&roles)
                .with_context(|| format!("Failed to open role file {}", roles.display()))?;
            let report = commands::validate(&store)?;
            print_json(&report)?;
            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_subscriber_with_config(TracingConfig::from_verbosity(cli.verbose, cli.log_format));

    #[cfg(feature = "tracing")]
    tracing::debug!(command = cli.command.name(), "Running command");

    run(cli.command)
}
