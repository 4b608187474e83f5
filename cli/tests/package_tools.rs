#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the bundle-file and global-package tools, driven
//! through a scripted executor so no package manager is spawned.

mod common;

use std::sync::Arc;

use common::*;
use dotfiles_manager::config::CategoryConfig;
use dotfiles_manager::error::ErrorKind;
use dotfiles_manager::tools;
use dotfiles_manager::types::ItemStatus;

const BREWFILE: &str = r#"brew "git"
cask "visual-studio-code"
mas "Xcode", id: 497799835
# comment
tap "homebrew/cask-fonts"
"#;

fn brew_probes() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .with_which(&["brew"])
        .on("brew list --formula", "git 2.44.0\n")
        .on("brew list --cask", "")
        .on("brew tap", "homebrew/cask-fonts\n")
}

fn homebrew_context(brewfile: &str) -> IntegrationTestContext {
    TestContextBuilder::new()
        .with_dotfile("homebrew/Brewfile", brewfile)
        .config(|c| {
            c.homebrew.categories.insert(
                "core",
                CategoryConfig {
                    enabled: true,
                    brewfile: "homebrew/Brewfile".to_string(),
                },
            );
        })
        .build()
}

// ---------------------------------------------------------------------------
// Bundle-file tool
// ---------------------------------------------------------------------------

/// Every declaration kind is parsed; comments are not items and `mas`
/// entries are never probed.
#[test]
fn bundle_category_items() {
    let ctx = homebrew_context(BREWFILE);
    let setup = ctx.setup_with(Arc::new(brew_probes()));
    let brew = IntegrationTestContext::tool(&setup, "homebrew");
    assert!(tools::supports_categories(brew.as_ref()));

    let items = tools::list_category_items(
        brew.as_ref(),
        &IntegrationTestContext::context(&setup),
        "core",
    )
    .unwrap();
    let kinds: Vec<&str> = items
        .iter()
        .map(|i| i.package_type.as_deref().unwrap())
        .collect();
    assert_eq!(kinds, vec!["brew", "cask", "mas", "tap"]);

    let mas = &items[2];
    assert_eq!(mas.name, "Xcode");
    assert!(!mas.installed);
    assert_eq!(mas.status, ItemStatus::Unknown);

    assert_eq!(items[0].status, ItemStatus::Installed);
    assert_eq!(items[0].version.as_deref(), Some("2.44.0"));
    assert_eq!(items[1].status, ItemStatus::NotInstalled);
    assert!(items[3].installed);
}

/// The category total counts `brew`, `cask` and `mas` lines only.
#[test]
fn bundle_package_count_excludes_taps_and_comments() {
    let brewfile = "\n# header\nbrew \"git\"\nbrew \"jq\" # json\n\ntap \"a/b\"\ncask \"iterm2\"\nmas \"Keynote\", id: 409183694\n";
    let ctx = homebrew_context(brewfile);
    let setup = ctx.setup_with(Arc::new(brew_probes()));
    let brew = IntegrationTestContext::tool(&setup, "homebrew");

    let status = brew.status(&IntegrationTestContext::context(&setup)).unwrap();
    let core = &status.items[0];
    assert_eq!(core.metadata["total"], 4);
    assert_eq!(core.metadata["installed"], 1);
    assert_eq!(core.status, ItemStatus::Partial);
    assert!(!core.installed);
}

/// Installing one item of a category uses the matching brew verb.
#[test]
fn install_category_item_uses_cask_verb() {
    let exec = Arc::new(
        brew_probes()
            .on("brew list --cask visual-studio-code", "")
            .on("brew install --cask visual-studio-code", ""),
    );
    let ctx = homebrew_context(BREWFILE);
    let setup = ctx.setup_with(Arc::clone(&exec) as _);
    let brew = IntegrationTestContext::tool(&setup, "homebrew");

    let result = tools::install_category_item(
        brew.as_ref(),
        &IntegrationTestContext::context(&setup),
        "core",
        "visual-studio-code",
    );
    assert!(result.success, "{:?}", result.errors());
    assert!(
        exec.calls()
            .iter()
            .any(|c| c == "brew install --cask visual-studio-code")
    );
}

/// Asking for an item the Brewfile does not declare fails with
/// `PackageNotFound` and spawns nothing.
#[test]
fn install_unknown_category_item() {
    let exec = Arc::new(brew_probes());
    let ctx = homebrew_context(BREWFILE);
    let setup = ctx.setup_with(Arc::clone(&exec) as _);
    let brew = IntegrationTestContext::tool(&setup, "homebrew");

    let result = tools::install_category_item(
        brew.as_ref(),
        &IntegrationTestContext::context(&setup),
        "core",
        "wget",
    );
    assert!(!result.success);
    assert_eq!(
        result.error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::PackageNotFound)
    );
    assert!(exec.calls().is_empty());
}

/// Tools without categories report `Unsupported`.
#[test]
fn category_calls_on_plain_tool_are_unsupported() {
    let ctx = TestContextBuilder::new().build();
    let setup = ctx.setup_with(Arc::new(ScriptedExecutor::new()));
    let npm = IntegrationTestContext::tool(&setup, "npm");
    assert!(!tools::supports_categories(npm.as_ref()));
    let err = tools::list_category_items(
        npm.as_ref(),
        &IntegrationTestContext::context(&setup),
        "core",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

// ---------------------------------------------------------------------------
// Global-package tools
// ---------------------------------------------------------------------------

/// With `auto_install` off, sync succeeds, says why, and runs no write verb.
#[test]
fn sync_with_auto_install_disabled() {
    let exec = Arc::new(ScriptedExecutor::new().with_which(&["npm", "node"]));
    let ctx = TestContextBuilder::new()
        .config(|c| {
            c.npm.auto_install = false;
            c.npm.global_packages = vec!["typescript".to_string()];
        })
        .build();
    let setup = ctx.setup_with(Arc::clone(&exec) as _);
    let npm = IntegrationTestContext::tool(&setup, "npm");

    let result = npm.sync(&IntegrationTestContext::context(&setup));
    assert!(result.success);
    let message = result.details["message"].as_str().unwrap();
    assert!(message.contains("disabled"), "{message}");
    assert!(
        exec.calls()
            .iter()
            .all(|c| !c.contains("install") && !c.contains("uninstall"))
    );
}

/// A name the pattern rejects never reaches the ecosystem CLI; valid names
/// in the same request still install.
#[test]
fn rejected_names_never_reach_the_cli() {
    let exec = Arc::new(
        ScriptedExecutor::new()
            .with_which(&["npm", "node"])
            .on("npm install -g", ""),
    );
    let ctx = TestContextBuilder::new()
        .config(|c| c.npm.global_packages = vec!["typescript".to_string()])
        .build();
    let setup = ctx.setup_with(Arc::clone(&exec) as _);
    let npm = IntegrationTestContext::tool(&setup, "npm");

    let bad = "Evil Name; rm -rf ~";
    let result = npm.install(
        &IntegrationTestContext::context(&setup),
        &[bad.to_string(), "typescript".to_string()],
    );
    assert!(!result.success);
    assert_eq!(
        result.error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::ValidationFailed)
    );
    let calls = exec.calls();
    assert!(calls.iter().all(|c| !c.contains("Evil")), "{calls:?}");
    assert!(calls.iter().any(|c| c == "npm install -g typescript"), "{calls:?}");
}

/// Validation reports a missing ecosystem CLI as `DependencyMissing`.
#[test]
fn validate_needs_the_ecosystem_cli() {
    let ctx = TestContextBuilder::new().build();
    let setup = ctx.setup_with(Arc::new(ScriptedExecutor::new().with_which(&["python3"])));
    let uv = IntegrationTestContext::tool(&setup, "uv");
    assert_eq!(uv.validate().unwrap_err().kind(), ErrorKind::DependencyMissing);

    let setup = ctx.setup_with(Arc::new(ScriptedExecutor::new().with_which(&["uv", "python3"])));
    let uv = IntegrationTestContext::tool(&setup, "uv");
    assert!(uv.validate().is_ok());
}
