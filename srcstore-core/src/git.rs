//! Commit detection for the working directory

use std::path::Path;
use std::process::Command;

/// HEAD commit of the repository containing `dir`, or None when `dir` is
/// not inside a git work tree or git is unavailable.
pub fn head_commit_id(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        tracing::debug!(dir = %dir.display(), "git rev-parse HEAD failed");
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}
