//! Build script for modsync
//! Stamps commit, build time, profile and target into the binary for `--version` and `/version`

use chrono::Utc;
use std::env;
use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}

fn main() {
    let git_hash = git_short_hash().unwrap_or_else(|| "unknown".to_string());
    let build_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=MODSYNC_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=MODSYNC_BUILD_TIME={}", build_time);
    println!("cargo:rustc-env=MODSYNC_BUILD_PROFILE={}", profile);
    println!("cargo:rustc-env=MODSYNC_BUILD_TARGET={}", target);

    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}
