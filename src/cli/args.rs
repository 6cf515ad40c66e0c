//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Binsmith - On-demand Go binaries
///
/// Resolves, cross-compiles and caches binaries for Go packages hosted
/// on GitHub.
#[derive(Parser, Debug)]
#[command(name = "binsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BINSMITH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain a binary, building it if it isn't cached yet
    Fetch(FetchArgs),

    /// Show which version a package spec resolves to
    Resolve(ResolveArgs),

    /// List buildable os/arch targets
    Platforms,

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Package spec: owner/repo[/path][@version]
    pub spec: String,

    /// Target OS (defaults to general.default_os)
    #[arg(long)]
    pub os: Option<String>,

    /// Target architecture (defaults to general.default_arch)
    #[arg(long)]
    pub arch: Option<String>,

    /// Write the binary here (defaults to the binary name in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Package spec: owner/repo[/path][@version]
    pub spec: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_fetch() {
        let cli = Cli::try_parse_from([
            "binsmith", "fetch", "tj/triage@v1.0.0", "--os", "darwin", "-o", "/tmp/triage",
        ])
        .unwrap();
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.spec, "tj/triage@v1.0.0");
                assert_eq!(args.os.as_deref(), Some("darwin"));
                assert_eq!(args.arch, None);
                assert_eq!(args.output, Some(PathBuf::from("/tmp/triage")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::try_parse_from(["binsmith", "-vv", "platforms"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
