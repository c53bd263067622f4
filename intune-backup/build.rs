//! Embeds the source revision, build time and profile shown in the startup log

use std::process::Command;

const UNKNOWN: &str = "unknown";

/// `git describe` output, with a `-dirty` suffix for uncommitted changes
fn source_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8(output.stdout).ok()?;
    Some(revision.trim().to_owned()).filter(|r| !r.is_empty())
}

fn emit(key: &str, value: &str) {
    println!("cargo:rustc-env={}={}", key, value);
}

fn main() {
    let revision = source_revision().unwrap_or_else(|| UNKNOWN.to_owned());
    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_owned());

    emit("GIT_HASH", &revision);
    emit("BUILD_TIMESTAMP", &built_at);
    emit("BUILD_PROFILE", &profile);
}
