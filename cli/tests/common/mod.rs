// Shared helpers for integration tests.
//
// Provides a temporary dotfiles checkout and home directory, a fluent builder
// for the files and configuration each test needs, and a scripted executor
// so package-manager tools can be driven without spawning real binaries.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dotfiles_manager::cancel::CancellationToken;
use dotfiles_manager::commands::CommandSetup;
use dotfiles_manager::config::{Config, OrderedMap, StowConfig, TargetEntry};
use dotfiles_manager::error::ExecError;
use dotfiles_manager::exec::{ExecResult, Executor, LineSink, Stream, command_line};
use dotfiles_manager::logging::{Log, Logger};
use dotfiles_manager::tools::{Context, Tool};

/// Executor answering commands by longest matching command-line prefix.
///
/// Unmatched commands fail with exit code 127 and stderr `unexpected call`.
/// Every command line is recorded.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, ExecResult)>,
    on_path: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with success and `stdout`.
    pub fn on(mut self, prefix: &str, stdout: &str) -> Self {
        self.rules.push((
            prefix.to_string(),
            ExecResult {
                stdout: stdout.to_string(),
                stderr: String::new(),
                success: true,
                code: Some(0),
            },
        ));
        self
    }

    /// Report `programs` as present on PATH.
    pub fn with_which(mut self, programs: &[&str]) -> Self {
        self.on_path.extend(programs.iter().map(ToString::to_string));
        self
    }

    /// Every command line executed so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled {
                program: program.to_string(),
            });
        }
        let line = command_line(program, args);
        self.calls.lock().unwrap().push(line.clone());
        Ok(self
            .rules
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or_else(
                || ExecResult {
                    stdout: String::new(),
                    stderr: "unexpected call".to_string(),
                    success: false,
                    code: Some(127),
                },
                |(_, result)| result.clone(),
            ))
    }

    fn checked(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        let result = self.respond(cancel, program, args)?;
        if result.success {
            Ok(result)
        } else {
            Err(ExecError::Failed {
                label: command_line(program, args),
                code: result.code,
                stderr: result.stderr,
            })
        }
    }
}

impl Executor for ScriptedExecutor {
    fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        self.checked(cancel, program, args)
    }

    fn run_in(
        &self,
        cancel: &CancellationToken,
        _: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        self.checked(cancel, program, args)
    }

    fn run_unchecked(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        self.respond(cancel, program, args)
    }

    fn run_streaming(
        &self,
        cancel: &CancellationToken,
        _: &Path,
        program: &str,
        args: &[&str],
        sink: &dyn LineSink,
    ) -> Result<ExecResult, ExecError> {
        let result = self.checked(cancel, program, args)?;
        for line in result.stdout.lines() {
            sink.line(Stream::Stdout, line);
        }
        Ok(result)
    }

    fn which(&self, program: &str) -> bool {
        self.on_path.iter().any(|p| p == program)
    }
}

/// Configuration with every list emptied, rooted at `dotfiles`.
pub fn empty_config(dotfiles: &Path) -> Config {
    let mut config = Config::default();
    config.global.dotfiles_path = dotfiles.display().to_string();
    config.stow = StowConfig {
        packages: Vec::new(),
        ..StowConfig::default()
    };
    config.rsync.sources.clear();
    config.homebrew.categories = OrderedMap::new();
    config.npm.global_packages.clear();
    config.uv.global_packages.clear();
    config.apps = OrderedMap::new();
    config
}

/// An isolated dotfiles checkout and home directory backed by one
/// [`tempfile::TempDir`].
pub struct IntegrationTestContext {
    pub root: tempfile::TempDir,
    pub dotfiles: PathBuf,
    pub home: PathBuf,
    pub config: Config,
}

impl IntegrationTestContext {
    /// Build the registry against the system executor.
    pub fn setup(&self) -> CommandSetup {
        self.setup_with(Arc::new(dotfiles_manager::exec::SystemExecutor))
    }

    /// Build the registry against `executor`.
    pub fn setup_with(&self, executor: Arc<dyn Executor>) -> CommandSetup {
        CommandSetup::with_executor(
            self.config.clone(),
            &self.home,
            executor,
            Arc::new(Logger::with_log_file(None)),
            CancellationToken::new(),
        )
        .expect("command setup")
    }

    /// Look up a registered tool by name.
    pub fn tool(setup: &CommandSetup, name: &str) -> Arc<dyn Tool> {
        setup.registry.get(name).expect("tool registered")
    }

    /// A context that logs through the setup's logger.
    pub fn context(setup: &CommandSetup) -> Context {
        Context::new(Arc::clone(&setup.log) as Arc<dyn Log>, setup.cancel.clone())
    }

    pub fn home_path(&self, rel: &str) -> PathBuf {
        self.home.join(rel)
    }

    /// Every path under `dir` with its kind and file contents, sorted, for
    /// before/after comparisons.
    pub fn snapshot(dir: &Path) -> Vec<String> {
        let mut entries: Vec<String> = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .map(|entry| {
                let entry = entry.expect("walk entry");
                let kind = if entry.path_is_symlink() {
                    "link"
                } else if entry.file_type().is_dir() {
                    "dir"
                } else {
                    "file"
                };
                let rel = entry.path().strip_prefix(dir).expect("under dir");
                let content = if kind == "file" {
                    std::fs::read_to_string(entry.path()).unwrap_or_default()
                } else {
                    String::new()
                };
                format!("{kind} {} {content}", rel.display())
            })
            .collect();
        entries.sort();
        entries
    }
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    ctx: IntegrationTestContext,
}

impl TestContextBuilder {
    /// Begin with an empty checkout, an empty home and an empty config.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let dotfiles = root.path().join("dotfiles");
        let home = root.path().join("home");
        std::fs::create_dir_all(&dotfiles).expect("create dotfiles dir");
        std::fs::create_dir_all(&home).expect("create home dir");
        let config = empty_config(&dotfiles);
        Self {
            ctx: IntegrationTestContext {
                root,
                dotfiles,
                home,
                config,
            },
        }
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(path, content).expect("write file");
    }

    /// Write `packages/<package>/<rel>` in the checkout.
    pub fn with_package_file(self, package: &str, rel: &str, content: &str) -> Self {
        Self::write(
            &self.ctx.dotfiles.join("packages").join(package).join(rel),
            content,
        );
        self
    }

    /// Declare a stow package targeting `target`.
    pub fn with_stow_package(mut self, name: &str, target: &str) -> Self {
        let priority = i32::try_from(self.ctx.config.stow.packages.len()).unwrap_or(0) + 1;
        self.ctx
            .config
            .stow
            .packages
            .push(TargetEntry::new(name, target, priority));
        self
    }

    /// Write `<home>/<rel>`.
    pub fn with_home_file(self, rel: &str, content: &str) -> Self {
        Self::write(&self.ctx.home.join(rel), content);
        self
    }

    /// Write an executable script at `<dotfiles>/<rel>`.
    pub fn with_script(self, rel: &str, body: &str) -> Self {
        let path = self.ctx.dotfiles.join(rel);
        Self::write(&path, body);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod script");
        }
        self
    }

    /// Write any file at `<dotfiles>/<rel>`.
    pub fn with_dotfile(self, rel: &str, content: &str) -> Self {
        Self::write(&self.ctx.dotfiles.join(rel), content);
        self
    }

    /// Adjust the configuration.
    pub fn config(mut self, edit: impl FnOnce(&mut Config)) -> Self {
        edit(&mut self.ctx.config);
        self
    }

    /// Switch dry-run on.
    pub fn dry_run(self) -> Self {
        self.config(|c| c.global.dry_run = true)
    }

    /// Finish building and return the context.
    pub fn build(self) -> IntegrationTestContext {
        self.ctx
    }
}
