use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("FFprobe failed: {0}")]
    FFprobeError(String),

    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;
