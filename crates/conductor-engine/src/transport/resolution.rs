//! Executable resolution for stdio providers.
//!
//! Desktop hosts are often launched without a login-shell PATH, so after
//! `which` fails we probe the usual package-manager install locations.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve a command name to an absolute path.
///
/// Order: explicit path as given, PATH lookup, then well-known install
/// directories. Returns `None` when the executable cannot be found.
pub fn resolve_command_path(command: &str) -> Option<PathBuf> {
    let as_path = Path::new(command);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    if let Ok(path) = which::which(command) {
        return Some(path);
    }
    #[cfg(windows)]
    for ext in ["exe", "cmd"] {
        if let Ok(path) = which::which(format!("{command}.{ext}")) {
            return Some(path);
        }
    }

    for dir in well_known_dirs() {
        let candidate = dir.join(command);
        if candidate.is_file() {
            debug!(command, path = %candidate.display(), "resolved outside PATH");
            return Some(candidate);
        }
    }

    None
}

fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".local/bin"));
        dirs.push(home.join(".cargo/bin"));
        dirs.push(home.join(".bun/bin"));
        dirs.push(home.join(".npm-global/bin"));
        dirs.push(home.join(".volta/bin"));
    }
    dirs.push(PathBuf::from("/usr/local/bin"));
    dirs.push(PathBuf::from("/opt/homebrew/bin"));
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_from_path() {
        assert!(resolve_command_path("sh").is_some());
    }

    #[test]
    fn test_unknown_command() {
        assert!(resolve_command_path("definitely-not-a-real-command-xyz").is_none());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        assert!(resolve_command_path("/bin/sh").is_some());
        assert!(resolve_command_path("/nonexistent/dir/tool").is_none());
    }
}
