//! Batch Processing Module
//!
//! Input collection for multi-source runs and a running tally of
//! per-item outcomes.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v"];

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Files under `dir` with one of `extensions`, sorted by path.
pub fn collect_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Expand a mix of files and directories into a flat list of video files.
pub fn expand_inputs(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    inputs
        .iter()
        .flat_map(|input| {
            if input.is_dir() {
                collect_files(input, VIDEO_EXTENSIONS, recursive)
            } else {
                vec![input.clone()]
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn merge(&mut self, other: BatchResult) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_result_mixed() {
        let mut result = BatchResult::new();
        result.success();
        result.success();
        result.fail(PathBuf::from("V03.mp4"), "Error".to_string());

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].1, "Error");
        assert_eq!(result.total, result.succeeded + result.failed);
    }

    #[test]
    fn test_success_rate() {
        let cases = [(10, 0, 100.0), (5, 5, 50.0), (3, 1, 75.0), (0, 10, 0.0)];
        for (ok, bad, expected) in cases {
            let mut result = BatchResult::new();
            for _ in 0..ok {
                result.success();
            }
            for i in 0..bad {
                result.fail(PathBuf::from(format!("V{:02}.mp4", i)), "E".to_string());
            }
            assert!(
                (result.success_rate() - expected).abs() < 0.001,
                "{}ok/{}bad expected {}%, got {}%",
                ok,
                bad,
                expected,
                result.success_rate()
            );
        }
        assert!((BatchResult::new().success_rate() - 100.0).abs() < 0.001);
    }

    #[test]
    fn test_merge() {
        let mut a = BatchResult::new();
        a.success();
        let mut b = BatchResult::new();
        b.fail(PathBuf::from("x.mp4"), "E".to_string());
        a.merge(b);
        assert_eq!((a.total, a.succeeded, a.failed), (2, 1, 1));
        assert_eq!(a.errors.len(), 1);
    }

    #[test]
    fn test_collect_files_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.MP4"), "").unwrap();
        std::fs::write(dir.path().join("a.mov"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.mkv"), "").unwrap();

        let flat = collect_files(dir.path(), VIDEO_EXTENSIONS, false);
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mov", "b.MP4"]);

        let deep = collect_files(dir.path(), VIDEO_EXTENSIONS, true);
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_expand_inputs_keeps_plain_files() {
        let inputs = vec![PathBuf::from("/some/clip.mp4")];
        assert_eq!(expand_inputs(&inputs, true), inputs);
    }
}
