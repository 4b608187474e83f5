use std::env;
use std::process::Command;

/// Version string baked into the binary as `DOTFILES_VERSION`.
///
/// An explicit `DOTFILES_VERSION` wins; otherwise the crate version is
/// suffixed with the short commit hash when built from a checkout.
fn version() -> Option<String> {
    if let Ok(explicit) = env::var("DOTFILES_VERSION") {
        return Some(explicit);
    }
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let commit = String::from_utf8(output.stdout).ok()?;
    let pkg = env::var("CARGO_PKG_VERSION").ok()?;
    Some(format!("{pkg}+{}", commit.trim()))
}

fn main() {
    println!("cargo:rerun-if-env-changed=DOTFILES_VERSION");
    println!("cargo:rerun-if-changed=../.git/HEAD");
    if let Some(version) = version() {
        println!("cargo:rustc-env=DOTFILES_VERSION={version}");
    }
}
