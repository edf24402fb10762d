//! External tool discovery
//!
//! ffmpeg and ffprobe are resolved once per call site: an explicit override
//! path wins, then `$PATH` lookup through `which`.

use crate::errors::{Result, ToolError};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FFMPEG_ENV: &str = "VID_UNIQ_FFMPEG";
pub const FFPROBE_ENV: &str = "VID_UNIQ_FFPROBE";

/// Resolve a tool binary, preferring `override_path` when it points at a file.
pub fn resolve_tool(name: &str, override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            debug!(tool = name, path = %path.display(), "Using tool override");
            return Ok(path.to_path_buf());
        }
        return Err(ToolError::ToolNotFound(format!(
            "{} override does not exist: {}",
            name,
            path.display()
        )));
    }

    which::which(name).map_err(|_| {
        ToolError::ToolNotFound(format!(
            "{} not found in PATH. Install ffmpeg or set {}",
            name,
            if name == "ffprobe" { FFPROBE_ENV } else { FFMPEG_ENV }
        ))
    })
}

/// Override path from the environment, if set and non-empty.
pub fn env_override(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub fn find_ffmpeg() -> Result<PathBuf> {
    resolve_tool("ffmpeg", env_override(FFMPEG_ENV).as_deref())
}

pub fn find_ffprobe() -> Result<PathBuf> {
    resolve_tool("ffprobe", env_override(FFPROBE_ENV).as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_override_is_reported() {
        let err = resolve_tool("ffmpeg", Some(Path::new("/definitely/not/here/ffmpeg")))
            .unwrap_err();
        assert!(matches!(err, ToolError::ToolNotFound(_)));
        assert!(err.to_string().contains("override"));
    }

    #[test]
    fn test_existing_override_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_tool("ffmpeg", Some(file.path())).unwrap();
        assert_eq!(resolved, file.path());
    }

    #[test]
    fn test_unknown_tool_not_found() {
        let err = resolve_tool("vid-uniq-no-such-tool-xyz", None).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
