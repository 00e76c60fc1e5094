use std::process::Command;

fn main() {
    println!("cargo:rustc-env=GIT_COMMIT={}", git_commit());
    println!(
        "cargo:rustc-env=BUILD_DATE={}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );

    if std::path::Path::new(".git/HEAD").exists() {
        println!("cargo:rerun-if-changed=.git/HEAD");
    }
}

/// Short commit hash, preferring the CI-provided SHA over the local checkout.
fn git_commit() -> String {
    if let Ok(sha) = std::env::var("GITHUB_SHA")
        && sha.len() >= 7
    {
        return sha[..7].to_string();
    }

    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
