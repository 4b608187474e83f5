//! Dotfiles and developer-environment manager.
//!
//! A YAML configuration declares the desired state of a workstation; each
//! domain of that state is owned by one [`tools::Tool`]:
//!
//! - **stow**: a symlink farm from `packages/<name>` into a target directory
//! - **rsync**: mirrored directories
//! - **homebrew**: categorised `Brewfile` bundles
//! - **npm** / **uv**: global packages
//! - **apps**: ordered setup scripts
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: load, default and validate the YAML configuration
//! - **[`tools`]**: the tool contract, the registry and every reconciler
//! - **[`dispatch`]**: cross-tool status and sync passes
//! - **[`commands`]**: subcommand orchestration behind the [`cli`]
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod logging;
pub mod paths;
pub mod tools;
pub mod types;
