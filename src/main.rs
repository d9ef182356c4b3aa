use anyhow::Result;
use clap::Parser;
use fleetrepo::commands::{self, config::Config};
use fleetrepo::context::OperationContext;
use std::path::PathBuf;

/// fleetrepo - package version repository
///
/// Keeps every version of a package side by side under one root directory and
/// switches between them through the `stable` and `experiment` links.
///
/// Examples:
///   fleetrepo create agent 7.50.0 ./agent-7.50.0    # First stable version
///   fleetrepo set-experiment agent 7.51.0 ./agent-7.51.0
///   fleetrepo promote agent                           # Experiment becomes stable
#[derive(Parser, Debug)]
#[command(author, version = env!("FLEETREPO_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Packages root directory (overrides defaults; also via FLEETREPO_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "FLEETREPO_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub packages_root: Option<PathBuf>,

    /// Program run before a version directory of PACKAGE is removed; the
    /// directory is kept unless it exits successfully
    #[arg(long = "hook", value_name = "PACKAGE=PROGRAM", global = true)]
    pub hooks: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a directory as the first stable version of a package
    Create(VersionArgs),

    /// Show the stable and experiment versions of a package
    State(PackageArgs),

    /// Show the state of every package
    List,

    /// Install a directory as the experiment version of a package
    SetExperiment(VersionArgs),

    /// Make the experiment version the stable one
    Promote(PackageArgs),

    /// Drop the experiment and go back to the stable version
    DeleteExperiment(PackageArgs),

    /// Remove a package and all of its versions
    Delete(PackageArgs),

    /// Remove versions no longer referenced by a link
    Cleanup(PackageArgs),

    /// Print the directory of the stable (or experiment) version
    Path(PathArgs),
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    /// Package name
    pub package: String,
}

#[derive(clap::Args, Debug)]
pub struct VersionArgs {
    /// Package name
    pub package: String,

    /// Version name, used as the directory name inside the repository
    pub version: String,

    /// Directory holding the version files; it is moved, not copied
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Package name
    pub package: String,

    /// Print the experiment directory instead
    #[arg(long)]
    pub experiment: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = Config::new(
        fleetrepo::runtime::RealRuntime,
        cli.packages_root,
        &cli.hooks,
    )?;
    let ctx = OperationContext::new();

    match cli.command {
        Commands::Create(args) => {
            commands::create(&config, &ctx, &args.package, &args.version, &args.source)?
        }
        Commands::State(args) => commands::state(&config, &args.package)?,
        Commands::List => commands::list(&config)?,
        Commands::SetExperiment(args) => {
            commands::set_experiment(&config, &ctx, &args.package, &args.version, &args.source)?
        }
        Commands::Promote(args) => commands::promote(&config, &ctx, &args.package)?,
        Commands::DeleteExperiment(args) => {
            commands::delete_experiment(&config, &ctx, &args.package)?
        }
        Commands::Delete(args) => commands::delete(&config, &ctx, &args.package)?,
        Commands::Cleanup(args) => commands::cleanup(&config, &ctx, &args.package)?,
        Commands::Path(args) => commands::path(&config, &args.package, args.experiment)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_create_parsing() {
        let cli =
            Cli::try_parse_from(["fleetrepo", "create", "agent", "7.50.0", "/tmp/agent"]).unwrap();
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.package, "agent");
                assert_eq!(args.version, "7.50.0");
                assert_eq!(args.source, PathBuf::from("/tmp/agent"));
            }
            _ => panic!("Expected Create command"),
        }
        assert_eq!(cli.packages_root, None);
        assert!(cli.hooks.is_empty());
    }

    #[test]
    fn test_cli_set_experiment_parsing() {
        let cli = Cli::try_parse_from([
            "fleetrepo",
            "set-experiment",
            "agent",
            "7.51.0",
            "/tmp/next",
        ])
        .unwrap();
        match cli.command {
            Commands::SetExperiment(args) => {
                assert_eq!(args.version, "7.51.0");
            }
            _ => panic!("Expected SetExperiment command"),
        }
    }

    #[test]
    fn test_cli_global_root_parsing() {
        let cli = Cli::try_parse_from(["fleetrepo", "--root", "/tmp", "list"]).unwrap();
        assert_eq!(cli.packages_root, Some(PathBuf::from("/tmp")));

        let cli = Cli::try_parse_from(["fleetrepo", "state", "agent", "-r", "/srv"]).unwrap();
        assert_eq!(cli.packages_root, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn test_cli_hooks_parsing() {
        let cli = Cli::try_parse_from([
            "fleetrepo",
            "--hook",
            "agent=/bin/true",
            "cleanup",
            "agent",
            "--hook",
            "installer=/bin/false",
        ])
        .unwrap();
        assert_eq!(cli.hooks, vec!["agent=/bin/true", "installer=/bin/false"]);
    }

    #[test]
    fn test_cli_path_parsing() {
        let cli = Cli::try_parse_from(["fleetrepo", "path", "agent", "--experiment"]).unwrap();
        match cli.command {
            Commands::Path(args) => {
                assert_eq!(args.package, "agent");
                assert!(args.experiment);
            }
            _ => panic!("Expected Path command"),
        }
    }

    #[test]
    fn test_cli_missing_arguments_fail() {
        assert!(Cli::try_parse_from(["fleetrepo", "agent"]).is_err());
        assert!(Cli::try_parse_from(["fleetrepo", "create", "agent"]).is_err());
        assert!(Cli::try_parse_from(["fleetrepo", "promote"]).is_err());
    }
}
