#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the script runner, using real `bash` scripts.
#![cfg(unix)]

mod common;

use std::sync::Arc;

use common::*;
use dotfiles_manager::config::AppConfig;
use dotfiles_manager::error::ErrorKind;
use dotfiles_manager::types::ItemStatus;

fn record(step: &str) -> String {
    format!("#!/usr/bin/env bash\necho {step} >> order.log\n")
}

/// Two apps: `first` fails on its second script, `second` succeeds.
fn two_apps() -> TestContextBuilder {
    TestContextBuilder::new()
        .with_script("scripts/a1.sh", &record("a1"))
        .with_script("scripts/a2.sh", "#!/usr/bin/env bash\necho broken >&2\nexit 3\n")
        .with_script("scripts/a3.sh", &record("a3"))
        .with_script("scripts/b1.sh", &record("b1"))
        .config(|c| {
            c.apps.insert(
                "first",
                AppConfig::new(true, &["scripts/a1.sh", "scripts/a2.sh", "scripts/a3.sh"]),
            );
            c.apps.insert("second", AppConfig::new(true, &["scripts/b1.sh"]));
        })
}

fn order_log(ctx: &IntegrationTestContext) -> String {
    std::fs::read_to_string(ctx.dotfiles.join("order.log")).unwrap_or_default()
}

/// Scripts run in declaration order and an app stops at its first failure;
/// the next app still runs.
#[test]
fn scripts_run_in_order_and_stop_on_failure() {
    let ctx = two_apps().build();
    let setup = ctx.setup();
    let apps = IntegrationTestContext::tool(&setup, "apps");

    let result = apps.install(&IntegrationTestContext::context(&setup), &[]);
    assert!(!result.success);
    assert_eq!(order_log(&ctx), "a1\nb1\n");
    assert_eq!(result.modified, vec!["second"]);
    let errors = result.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("first: "), "{errors:?}");
    assert!(errors[0].contains("step 2"), "{errors:?}");
    assert_eq!(
        result.error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::OperationFailed)
    );
}

/// Dry run creates no process and writes nothing.
#[test]
fn dry_run_spawns_nothing() {
    let exec = Arc::new(ScriptedExecutor::new().with_which(&["bash"]));
    let ctx = two_apps().dry_run().build();
    let before = IntegrationTestContext::snapshot(ctx.root.path());
    let setup = ctx.setup_with(Arc::clone(&exec) as _);
    let apps = IntegrationTestContext::tool(&setup, "apps");
    let tctx = IntegrationTestContext::context(&setup);

    assert!(apps.install(&tctx, &[]).success);
    assert!(apps.update(&tctx, &[]).success);
    assert!(apps.sync(&tctx).success);
    assert!(exec.calls().is_empty());
    assert_eq!(IntegrationTestContext::snapshot(ctx.root.path()), before);
}

/// A named app runs alone.
#[test]
fn install_selected_app_only() {
    let ctx = two_apps().build();
    let setup = ctx.setup();
    let apps = IntegrationTestContext::tool(&setup, "apps");

    let result = apps.install(
        &IntegrationTestContext::context(&setup),
        &["second".to_string()],
    );
    assert!(result.success, "{:?}", result.errors());
    assert_eq!(order_log(&ctx), "b1\n");
}

/// Status flags apps whose scripts cannot run.
#[test]
fn status_reports_invalid_scripts() {
    let ctx = two_apps()
        .with_dotfile("scripts/plain.sh", "echo not executable\n")
        .config(|c| {
            c.apps
                .insert("broken", AppConfig::new(true, &["scripts/plain.sh"]));
            c.apps.insert("off", AppConfig::new(false, &["scripts/b1.sh"]));
        })
        .build();
    let setup = ctx.setup();
    let apps = IntegrationTestContext::tool(&setup, "apps");

    let status = apps.status(&IntegrationTestContext::context(&setup)).unwrap();
    assert!(!status.healthy);
    let by_name = |name: &str| status.items.iter().find(|i| i.name == name).unwrap();
    assert_eq!(by_name("first").status, ItemStatus::Ready);
    assert!(by_name("first").installed);
    assert_eq!(by_name("broken").status, ItemStatus::Error);
    assert!(
        by_name("broken")
            .error
            .as_deref()
            .unwrap()
            .contains("not executable")
    );
    assert_eq!(by_name("off").status, ItemStatus::Disabled);
}

/// Remove has nothing to undo and says so.
#[test]
fn remove_is_a_skipped_no_op() {
    let ctx = two_apps().build();
    let setup = ctx.setup();
    let apps = IntegrationTestContext::tool(&setup, "apps");
    let result = apps.remove(
        &IntegrationTestContext::context(&setup),
        &["first".to_string()],
    );
    assert!(result.success);
    assert!(result.details.contains_key("message"));
    assert!(order_log(&ctx).is_empty());
}
