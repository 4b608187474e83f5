//! Command: print a shell completion script.
use std::io;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::{Cli, ToolCli};

/// The full command tree: the fixed commands plus one subcommand per tool,
/// each carrying every tool action.
#[must_use]
pub fn command_tree(tool_names: &[String]) -> clap::Command {
    let actions: Vec<clap::Command> = ToolCli::command().get_subcommands().cloned().collect();
    tool_names.iter().fold(Cli::command(), |cmd, name| {
        cmd.subcommand(
            clap::Command::new(name.clone())
                .about(format!("Manage {name}"))
                .subcommand_required(true)
                .subcommands(actions.iter().cloned()),
        )
    })
}

/// Write the completion script for `shell` to `out`.
pub fn generate(shell: Shell, tool_names: &[String], out: &mut dyn io::Write) {
    let mut cmd = command_tree(tool_names);
    clap_complete::generate(shell, &mut cmd, "dotfiles", out);
}

/// Print the completion script for `shell` to stdout.
pub fn run(shell: Shell, tool_names: &[String]) {
    generate(shell, tool_names, &mut io::stdout().lock());
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["stow", "homebrew"].iter().map(ToString::to_string).collect()
    }

    #[test]
    fn tree_is_consistent() {
        command_tree(&names()).debug_assert();
    }

    #[test]
    fn tools_carry_every_action() {
        let tree = command_tree(&names());
        let stow = tree.find_subcommand("stow").unwrap();
        assert!(stow.find_subcommand("relink").is_some());
        assert!(stow.find_subcommand("install-package").is_some());
        assert!(tree.find_subcommand("npm").is_none());
    }

    #[test]
    fn bash_script_names_tools_and_actions() {
        let mut out = Vec::new();
        generate(Shell::Bash, &names(), &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("dotfiles"));
        assert!(script.contains("homebrew"));
        assert!(script.contains("list-packages"));
    }
}
