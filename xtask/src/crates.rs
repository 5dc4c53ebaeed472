use std::process::Command;

use anyhow::{Context, Result};

/// Members checked in isolation, innermost layer first. Each must build
/// without the crates above it.
const LAYERED_CRATES: &[&str] = &["outpost-domain", "outpost-core", "outpost-infra"];

/// Check that every layer compiles on its own.
pub fn check_layers() -> Result<()> {
    println!("Checking {} outpost crates in isolation...", LAYERED_CRATES.len());

    for (index, package) in LAYERED_CRATES.iter().enumerate() {
        println!("\n[{}/{}] cargo check -p {package} --all-targets", index + 1, LAYERED_CRATES.len());

        let status = Command::new("cargo")
            .args(["check", "-p", package, "--all-targets"])
            .status()
            .with_context(|| format!("Failed to run cargo check for '{package}'"))?;

        if !status.success() {
            anyhow::bail!("Crate '{package}' failed to compile on its own");
        }

        println!("✅ {package} compiled successfully");
    }

    println!("\n✅ All {} layers compile in isolation!", LAYERED_CRATES.len());

    Ok(())
}
