use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the dotfiles manager.
#[derive(Parser, Debug)]
#[command(
    name = "dotfiles",
    about = "Declarative dotfiles and developer-environment manager",
    version,
    after_help = "Tool commands: dotfiles <tool> <action>, e.g. `dotfiles stow link git`"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Configuration file (default: ~/.config/dotfiles/config.yaml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmations
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Disable coloured output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the status of every enabled tool
    Status,
    /// Bring every enabled tool to its declared state, in priority order
    Sync,
    /// Inspect the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information
    Version,
    /// Print a shell completion script
    Completion {
        /// Target shell
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Run an action on a single tool
    #[command(external_subcommand)]
    Tool(Vec<String>),
}

impl Command {
    /// Name used for the log file of this invocation.
    #[must_use]
    pub fn log_name(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::Sync => "sync",
            Self::Config(_) => "config",
            Self::Version => "version",
            Self::Completion { .. } => "completion",
            Self::Tool(args) => args.first().map_or("tool", String::as_str),
        }
    }
}

/// `config` subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Check the configuration and every enabled tool's preconditions
    Validate,
    /// Print the effective configuration as YAML
    Show,
}

/// Second-stage parser for `dotfiles <tool> <action>`.
///
/// The tool name is the binary name of this parser; it is resolved against
/// the registry after the configuration has been loaded.
#[derive(Parser, Debug)]
#[command(name = "tool")]
pub struct ToolCli {
    #[command(subcommand)]
    pub action: ToolAction,

    #[command(flatten)]
    pub global: GlobalOpts,
}

impl ToolCli {
    /// Parse `[tool, action, args...]`.
    ///
    /// # Errors
    ///
    /// Returns the clap error (which also covers `--help`).
    pub fn parse_args(args: &[String]) -> Result<(String, Self), clap::Error> {
        let tool = args.first().cloned().unwrap_or_default();
        let parsed = Self::try_parse_from(args)?;
        Ok((tool, parsed))
    }
}

/// Actions available on every tool, plus the symlink-farm aliases and the
/// bundle-file sub-verbs.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ToolAction {
    /// Show the tool's health and items
    Status,
    /// List the tool's items with their state
    List,
    /// Install the named items
    Install {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Update the named items (all when none are given)
    Update { items: Vec<String> },
    /// Remove the named items
    Remove {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Bring every enabled item to its declared state
    Sync,
    /// Link packages (stow)
    Link {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Unlink packages (stow)
    Unlink {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Unlink and link packages again (stow)
    Relink {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// List the packages of a category (homebrew)
    ListPackages { category: String },
    /// Install one package of a category (homebrew)
    InstallPackage { category: String, name: String },
    /// Show one package of a category (homebrew)
    StatusPackage { category: String, name: String },
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn tool_args(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
        ToolCli::command().debug_assert();
    }

    #[test]
    fn parse_status() {
        let cli = Cli::parse_from(["dotfiles", "status"]);
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn parse_sync_dry_run() {
        let cli = Cli::parse_from(["dotfiles", "--dry-run", "sync"]);
        assert!(cli.global.dry_run);
        assert!(matches!(cli.command, Command::Sync));
    }

    #[test]
    fn parse_dry_run_short() {
        let cli = Cli::parse_from(["dotfiles", "-d", "sync"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["dotfiles", "status", "-v", "--yes", "--no-color"]);
        assert!(cli.global.verbose);
        assert!(cli.global.yes);
        assert!(cli.global.no_color);
    }

    #[test]
    fn parse_config_override() {
        let cli = Cli::parse_from(["dotfiles", "--config", "/tmp/c.yaml", "config", "show"]);
        assert_eq!(cli.global.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Show)));
    }

    #[test]
    fn parse_config_validate() {
        let cli = Cli::parse_from(["dotfiles", "config", "validate"]);
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Validate)));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["dotfiles", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }

    #[test]
    fn parse_completion() {
        let cli = Cli::parse_from(["dotfiles", "completion", "zsh"]);
        assert!(matches!(
            cli.command,
            Command::Completion {
                shell: clap_complete::Shell::Zsh
            }
        ));
        assert!(Cli::try_parse_from(["dotfiles", "completion", "tcsh"]).is_err());
    }

    #[test]
    fn unknown_subcommand_is_a_tool_command() {
        let cli = Cli::parse_from(["dotfiles", "stow", "link", "git"]);
        assert!(
            matches!(
                &cli.command,
                Command::Tool(args) if args == &tool_args(&["stow", "link", "git"])
            ),
            "Expected Tool command, got {:?}",
            cli.command
        );
    }

    #[test]
    fn tool_cli_parses_actions() {
        let (tool, parsed) =
            ToolCli::parse_args(&tool_args(&["stow", "link", "git", "shell"])).unwrap();
        assert_eq!(tool, "stow");
        assert_eq!(
            parsed.action,
            ToolAction::Link {
                packages: vec!["git".into(), "shell".into()]
            }
        );

        let (_, parsed) = ToolCli::parse_args(&tool_args(&["npm", "update"])).unwrap();
        assert_eq!(parsed.action, ToolAction::Update { items: vec![] });

        let (_, parsed) = ToolCli::parse_args(&tool_args(&[
            "homebrew",
            "install-package",
            "core",
            "git",
        ]))
        .unwrap();
        assert_eq!(
            parsed.action,
            ToolAction::InstallPackage {
                category: "core".into(),
                name: "git".into()
            }
        );
    }

    #[test]
    fn tool_cli_requires_items_for_install_and_remove() {
        assert!(ToolCli::parse_args(&tool_args(&["npm", "install"])).is_err());
        assert!(ToolCli::parse_args(&tool_args(&["npm", "remove"])).is_err());
        assert!(ToolCli::parse_args(&tool_args(&["stow", "unlink"])).is_err());
    }

    #[test]
    fn tool_cli_accepts_trailing_global_flags() {
        let (_, parsed) =
            ToolCli::parse_args(&tool_args(&["stow", "link", "git", "--dry-run"])).unwrap();
        assert!(parsed.global.dry_run);
    }

    #[test]
    fn log_name_uses_tool() {
        let cli = Cli::parse_from(["dotfiles", "rsync", "sync"]);
        assert_eq!(cli.command.log_name(), "rsync");
    }
}
