use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use dotfiles_manager::cancel::CancellationToken;
use dotfiles_manager::cli::{Cli, Command, ConfigCommand, GlobalOpts, ToolCli};
use dotfiles_manager::commands::{self, CommandSetup};
use dotfiles_manager::config::Config;
use dotfiles_manager::logging::{self, ConsoleOptions, Logger};

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let cli = Cli::parse();

    let (global, tool) = match cli.command {
        Command::Tool(ref args) => match ToolCli::parse_args(args) {
            Ok((name, parsed)) => (merge(&cli.global, &parsed.global), Some((name, parsed))),
            Err(e) => e.exit(),
        },
        _ => (cli.global.clone(), None),
    };

    let log = Arc::new(Logger::new(cli.command.log_name()));
    match run(&cli.command, &global, tool, &log) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(
    command: &Command,
    global: &GlobalOpts,
    tool: Option<(String, ToolCli)>,
    log: &Arc<Logger>,
) -> Result<()> {
    if matches!(command, Command::Version) {
        commands::version::run()?;
        return Ok(());
    }
    if let Command::Completion { shell } = command {
        // Tool names come from the registry; a broken config falls back to defaults.
        let config = commands::load_config(global)
            .map_or_else(|_| Config::default(), |(config, _)| config);
        let setup = CommandSetup::init(config, Arc::clone(log), CancellationToken::new())?;
        commands::completion::run(*shell, &setup.registry.names());
        return Ok(());
    }

    let loaded = commands::load_config(global);
    logging::init_subscriber(
        &ConsoleOptions {
            level: loaded
                .as_ref()
                .map_or("info", |(c, _)| c.global.log_level.as_str()),
            verbose: loaded
                .as_ref()
                .map_or(global.verbose, |(c, _)| c.global.verbose),
            color: !global.no_color,
        },
        command.log_name(),
    );
    let (config, source) = loaded?;
    log.debug(&format!("config: {source}"));

    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.cancel()) {
        log.warn(&format!("cannot install Ctrl-C handler: {e}"));
    }

    match command {
        Command::Config(ConfigCommand::Show) => commands::config::show(&config),
        Command::Config(ConfigCommand::Validate) => {
            commands::config::validate(config, &source, log, cancel)
        }
        Command::Status => {
            commands::status::run(&CommandSetup::init(config, Arc::clone(log), cancel)?)
        }
        Command::Sync => commands::sync::run(&CommandSetup::init(config, Arc::clone(log), cancel)?),
        Command::Tool(_) => {
            let Some((name, parsed)) = tool else {
                anyhow::bail!("missing tool name");
            };
            let setup = CommandSetup::init(config, Arc::clone(log), cancel)?;
            commands::tool::run(&setup, &name, &parsed.action)
        }
        Command::Version | Command::Completion { .. } => Ok(()),
    }
}

/// Flags given after the tool action add to those given before it.
fn merge(outer: &GlobalOpts, inner: &GlobalOpts) -> GlobalOpts {
    GlobalOpts {
        config: inner.config.clone().or_else(|| outer.config.clone()),
        dry_run: outer.dry_run || inner.dry_run,
        verbose: outer.verbose || inner.verbose,
        yes: outer.yes || inner.yes,
        no_color: outer.no_color || inner.no_color,
    }
}
