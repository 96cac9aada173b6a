// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=IMAGE_FILTERS_VERSION");

    // Packagers can pin the version instead of asking git
    let version = std::env::var("IMAGE_FILTERS_VERSION")
        .ok()
        .or_else(git_describe)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output with the leading `v` removed, e.g. "0.1.0-3-gabcdef1-dirty"
fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty", "--match", "v*"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if described.is_empty() {
        return None;
    }

    Some(
        described
            .strip_prefix('v')
            .map(str::to_string)
            .unwrap_or(described),
    )
}
