//! Perceptual fingerprints for near-duplicate detection.
//!
//! A video is reduced to at most [`SAMPLE_FRAMES`] frames taken one per
//! second, each scaled by ffmpeg to a 32x32 grayscale tile and hashed with a
//! 64-bit DCT hash. Two fingerprints are compared frame by frame; the
//! similarity is the share of frame pairs whose hashes lie within
//! [`FRAME_MATCH_DISTANCE`] bits of each other.
//!
//! When no frame can be decoded the fingerprint falls back to a BLAKE3
//! digest of the file bytes, which only ever matches an identical file.

use crate::errors::{Result, UniqError};
use crate::params::round_to;
use crate::platform::ReadinessReport;
use rayon::prelude::*;
use rustdct::DctPlanner;
use serde::{Deserialize, Serialize};
use shared_utils::ffmpeg_process::{format_ffmpeg_error, FfmpegProcess, WaitOutcome};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SAMPLE_FRAMES: usize = 8;
/// Side of the grayscale tile ffmpeg scales each sampled frame to.
pub const TILE_SIDE: usize = 32;
const LOW_FREQ_SIDE: usize = 8;
/// Hamming distance at or below which two frame hashes count as the same frame.
pub const FRAME_MATCH_DISTANCE: u32 = 8;
/// Comparisons at or above this percentage are too similar.
pub const SIMILARITY_THRESHOLD: f64 = 70.0;
/// Library matches above this percentage flag the file as a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 80.0;
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(60);

pub const LIBRARY_FILE: &str = "hashes.json";
pub const DEFAULT_LIBRARY_DIR: &str = "video_library";

/// 64-bit DCT hash of one grayscale tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHash(pub u64);

impl FrameHash {
    /// Hash a row-major `TILE_SIDE x TILE_SIDE` luma tile.
    ///
    /// Takes the 2D DCT-II, keeps the top-left 8x8 block of low frequencies
    /// and sets one bit per coefficient above the block's median.
    pub fn from_luma(tile: &[u8]) -> Self {
        debug_assert_eq!(tile.len(), TILE_SIDE * TILE_SIDE);
        let mut coeffs: Vec<f64> = tile.iter().map(|&p| f64::from(p)).collect();
        coeffs.resize(TILE_SIDE * TILE_SIDE, 0.0);

        let mut planner = DctPlanner::new();
        let dct = planner.plan_dct2(TILE_SIDE);
        let mut scratch = vec![0f64; TILE_SIDE];

        coeffs
            .chunks_exact_mut(TILE_SIDE)
            .for_each(|row| dct.process_dct2(row));
        transpose::transpose_inplace(&mut coeffs, &mut scratch, TILE_SIDE, TILE_SIDE);
        coeffs
            .chunks_exact_mut(TILE_SIDE)
            .for_each(|col| dct.process_dct2(col));
        transpose::transpose_inplace(&mut coeffs, &mut scratch, TILE_SIDE, TILE_SIDE);

        let low: Vec<f64> = coeffs
            .chunks_exact(TILE_SIDE)
            .take(LOW_FREQ_SIDE)
            .flat_map(|row| row[..LOW_FREQ_SIDE].iter().copied())
            .collect();

        let mut sorted = low.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

        let bits = low
            .iter()
            .fold(0u64, |acc, &c| (acc << 1) | u64::from(c > median));
        FrameHash(bits)
    }

    pub fn distance(self, other: FrameHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for FrameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Fingerprint of a whole video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoFingerprint {
    Frames(Vec<FrameHash>),
    /// BLAKE3 hex digest of the file bytes.
    File(String),
}

impl VideoFingerprint {
    /// Percentage in `0..=100`.
    pub fn similarity(&self, other: &VideoFingerprint) -> f64 {
        match (self, other) {
            (VideoFingerprint::Frames(a), VideoFingerprint::Frames(b))
                if a.len() == b.len() && !a.is_empty() =>
            {
                let matches = a
                    .iter()
                    .zip(b)
                    .filter(|(x, y)| x.distance(**y) <= FRAME_MATCH_DISTANCE)
                    .count();
                matches as f64 / a.len() as f64 * 100.0
            }
            (VideoFingerprint::File(a), VideoFingerprint::File(b)) if a == b => 100.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for VideoFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFingerprint::Frames(frames) => {
                for (i, h) in frames.iter().enumerate() {
                    if i > 0 {
                        f.write_str("_")?;
                    }
                    write!(f, "{}", h)?;
                }
                Ok(())
            }
            VideoFingerprint::File(digest) => f.write_str(digest),
        }
    }
}

impl FromStr for VideoFingerprint {
    type Err = UniqError;

    fn from_str(s: &str) -> Result<Self> {
        let is_hex =
            |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_hexdigit());
        if s.len() == 64 && is_hex(s) {
            return Ok(VideoFingerprint::File(s.to_ascii_lowercase()));
        }
        s.split('_')
            .map(|part| {
                if part.len() == 16 && is_hex(part) {
                    u64::from_str_radix(part, 16)
                        .map(FrameHash)
                        .map_err(|_| UniqError::InvalidFingerprint(s.to_string()))
                } else {
                    Err(UniqError::InvalidFingerprint(s.to_string()))
                }
            })
            .collect::<Result<Vec<_>>>()
            .map(VideoFingerprint::Frames)
    }
}

/// ffmpeg arguments that write up to eight 32x32 gray frames to stdout.
pub fn frame_sample_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-v".into(), "error".into(), "-i".into(), path.into()];
    for arg in [
        "-vf".to_string(),
        format!("fps=1,scale={}:{}", TILE_SIDE, TILE_SIDE),
        "-frames:v".to_string(),
        SAMPLE_FRAMES.to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "gray".to_string(),
        "pipe:1".to_string(),
    ] {
        args.push(arg.into());
    }
    args
}

/// Hash every complete tile in a raw gray frame stream.
pub fn hash_raw_frames(raw: &[u8]) -> Vec<FrameHash> {
    raw.chunks_exact(TILE_SIDE * TILE_SIDE)
        .take(SAMPLE_FRAMES)
        .map(FrameHash::from_luma)
        .collect()
}

fn sample_frames(ffmpeg: &Path, path: &Path) -> Result<Vec<FrameHash>> {
    let sampling_error = |detail: String| UniqError::FrameSampling {
        path: path.to_path_buf(),
        detail,
    };

    let mut cmd = Command::new(ffmpeg);
    cmd.args(frame_sample_args(path));
    let (outcome, raw) = FfmpegProcess::spawn_capturing_stdout(&mut cmd)
        .and_then(|p| p.wait_with_stdout(SAMPLE_TIMEOUT))
        .map_err(|e| sampling_error(format!("{:#}", e)))?;

    match outcome {
        WaitOutcome::Exited { status, .. } if status.success() => Ok(hash_raw_frames(&raw)),
        WaitOutcome::Exited { stderr, .. } => Err(sampling_error(format_ffmpeg_error(&stderr))),
        WaitOutcome::TimedOut { after, .. } => Err(sampling_error(format!(
            "frame sampling exceeded {}s",
            after.as_secs()
        ))),
    }
}

/// BLAKE3 hex digest of a file's contents.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint `path`, falling back to a file digest when no frame decodes.
pub fn fingerprint(ffmpeg: &Path, path: &Path) -> Result<VideoFingerprint> {
    if !path.is_file() {
        return Err(UniqError::SourceNotFound(path.to_path_buf()));
    }
    match sample_frames(ffmpeg, path) {
        Ok(frames) if !frames.is_empty() => {
            debug!(path = %path.display(), frames = frames.len(), "Frames fingerprinted");
            Ok(VideoFingerprint::Frames(frames))
        }
        Ok(_) => {
            warn!(path = %path.display(), "No frames decoded, using file digest");
            file_digest(path).map(VideoFingerprint::File)
        }
        Err(e) => {
            warn!(error = %e, "Frame sampling failed, using file digest");
            file_digest(path).map(VideoFingerprint::File)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    DistinctEnough,
    TooSimilar,
}

impl Verdict {
    pub fn from_similarity(percent: f64) -> Self {
        if percent < SIMILARITY_THRESHOLD {
            Verdict::DistinctEnough
        } else {
            Verdict::TooSimilar
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::DistinctEnough => "Sufficiently different",
            Verdict::TooSimilar => "Too similar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub first: PathBuf,
    pub second: PathBuf,
    /// Rounded to one decimal place.
    pub similarity_percent: f64,
    pub verdict: Verdict,
    pub first_hash: String,
    pub second_hash: String,
}

impl Comparison {
    pub fn between(
        first: (&Path, &VideoFingerprint),
        second: (&Path, &VideoFingerprint),
    ) -> Self {
        let similarity = first.1.similarity(second.1);
        Self {
            first: first.0.to_path_buf(),
            second: second.0.to_path_buf(),
            similarity_percent: round_to(similarity, 1),
            verdict: Verdict::from_similarity(similarity),
            first_hash: first.1.to_string(),
            second_hash: second.1.to_string(),
        }
    }
}

pub fn compare_videos(ffmpeg: &Path, first: &Path, second: &Path) -> Result<Comparison> {
    let a = fingerprint(ffmpeg, first)?;
    let b = fingerprint(ffmpeg, second)?;
    Ok(Comparison::between((first, &a), (second, &b)))
}

/// Compare every pair of `paths`, fingerprinting each file once.
pub fn compare_all(ffmpeg: &Path, paths: &[PathBuf]) -> Result<Vec<Comparison>> {
    let prints = paths
        .par_iter()
        .map(|p| fingerprint(ffmpeg, p))
        .collect::<Result<Vec<_>>>()?;
    Ok(pairwise(paths, &prints))
}

fn pairwise(paths: &[PathBuf], prints: &[VideoFingerprint]) -> Vec<Comparison> {
    let mut out = Vec::new();
    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            out.push(Comparison::between(
                (&paths[i], &prints[i]),
                (&paths[j], &prints[j]),
            ));
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryScores {
    pub overall: u8,
    pub tiktok: u8,
    pub instagram: u8,
    pub youtube: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub path: String,
    pub scores: LibraryScores,
}

/// Fingerprints of previously checked files, kept as JSON keyed by
/// fingerprint string.
#[derive(Debug)]
pub struct HashLibrary {
    file: PathBuf,
    entries: BTreeMap<String, LibraryEntry>,
}

impl HashLibrary {
    /// Open (or create) the library under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let file = dir.join(LIBRARY_FILE);
        let entries = if file.exists() {
            serde_json::from_str(&fs::read_to_string(&file)?)?
        } else {
            fs::write(&file, "{}")?;
            BTreeMap::new()
        };
        Ok(Self { file, entries })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, fp: &VideoFingerprint) -> Option<&LibraryEntry> {
        self.entries.get(&fp.to_string())
    }

    /// Highest similarity between `fp` and any stored fingerprint.
    pub fn max_similarity(&self, fp: &VideoFingerprint) -> f64 {
        self.entries
            .keys()
            .filter_map(|key| match key.parse::<VideoFingerprint>() {
                Ok(stored) => Some(fp.similarity(&stored)),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable library key");
                    None
                }
            })
            .fold(0.0, f64::max)
    }

    /// Record `fp`, replacing any entry with the same fingerprint.
    pub fn insert(&mut self, fp: &VideoFingerprint, path: &Path, report: &ReadinessReport) {
        self.entries.insert(
            fp.to_string(),
            LibraryEntry {
                path: path.to_string_lossy().into_owned(),
                scores: LibraryScores::from(report),
            },
        );
    }

    pub fn save(&self) -> Result<()> {
        fs::write(&self.file, serde_json::to_string_pretty(&self.entries)?)?;
        info!(file = %self.file.display(), entries = self.entries.len(), "Hash library saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{assess, ProbeSummary};

    fn textured_tile() -> Vec<u8> {
        let mut tile = Vec::with_capacity(TILE_SIDE * TILE_SIDE);
        for y in 0..TILE_SIDE {
            for x in 0..TILE_SIDE {
                let (xf, yf) = (x as f64, y as f64);
                let v = 128.0
                    + 60.0 * (xf / 5.0).sin()
                    + 40.0 * (yf / 4.0).cos()
                    + 15.0 * ((xf + yf) / 3.0).sin();
                tile.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
        tile
    }

    fn frames(hashes: &[u64]) -> VideoFingerprint {
        VideoFingerprint::Frames(hashes.iter().copied().map(FrameHash).collect())
    }

    fn probe() -> ProbeSummary {
        ProbeSummary {
            duration: 30.0,
            width: 1080,
            height: 1920,
            codec: "h264".to_string(),
            frame_rate: 30.0,
            bit_rate: 2_000_000,
            has_audio: false,
        }
    }

    #[test]
    fn test_frame_hash_deterministic() {
        let tile = textured_tile();
        assert_eq!(FrameHash::from_luma(&tile), FrameHash::from_luma(&tile));
    }

    #[test]
    fn test_frame_hash_ignores_uniform_brightness_shift() {
        let tile = textured_tile();
        let brighter: Vec<u8> = tile.iter().map(|p| p.saturating_add(3)).collect();
        assert!(tile.iter().all(|&p| p <= 252));
        let d = FrameHash::from_luma(&tile).distance(FrameHash::from_luma(&brighter));
        assert!(d <= FRAME_MATCH_DISTANCE, "distance {}", d);
    }

    #[test]
    fn test_frame_hash_separates_inverted_frame() {
        let tile = textured_tile();
        let inverted: Vec<u8> = tile.iter().map(|p| 255 - p).collect();
        let d = FrameHash::from_luma(&tile).distance(FrameHash::from_luma(&inverted));
        assert!(d > 32, "distance {}", d);
    }

    #[test]
    fn test_frame_sample_args_pipe_gray_tiles() {
        let args: Vec<String> = frame_sample_args(Path::new("in.mp4"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[..4], ["-v", "error", "-i", "in.mp4"]);
        assert!(args.windows(2).any(|w| w == ["-vf", "fps=1,scale=32:32"]));
        assert!(args.windows(2).any(|w| w == ["-frames:v", "8"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "gray"]));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn test_hash_raw_frames_drops_partial_tile() {
        let tile = textured_tile();
        let mut raw = tile.repeat(3);
        raw.extend_from_slice(&tile[..100]);
        assert_eq!(hash_raw_frames(&raw).len(), 3);
        assert_eq!(hash_raw_frames(&tile.repeat(12)).len(), SAMPLE_FRAMES);
        assert!(hash_raw_frames(&[]).is_empty());
    }

    #[test]
    fn test_similarity_counts_matching_frames() {
        let a = frames(&[0, u64::MAX, 0xff, 0xf0f0]);
        // one frame within 8 bits, one far off
        let b = frames(&[0x3, 0, 0xff, 0xf0f0]);
        assert_eq!(a.similarity(&b), 75.0);
        assert_eq!(a.similarity(&a), 100.0);
    }

    #[test]
    fn test_similarity_length_mismatch_is_zero() {
        let a = frames(&[1, 2, 3]);
        let b = frames(&[1, 2]);
        assert_eq!(a.similarity(&b), 0.0);
        let file = VideoFingerprint::File("ab".repeat(32));
        assert_eq!(a.similarity(&file), 0.0);
        assert_eq!(file.similarity(&file.clone()), 100.0);
    }

    #[test]
    fn test_fingerprint_string_roundtrip() {
        let fp = frames(&[0x0123_4567_89ab_cdef, 1]);
        let s = fp.to_string();
        assert_eq!(s, "0123456789abcdef_0000000000000001");
        assert_eq!(s.parse::<VideoFingerprint>().unwrap(), fp);

        let digest = "a".repeat(64);
        assert_eq!(
            digest.parse::<VideoFingerprint>().unwrap(),
            VideoFingerprint::File(digest)
        );
        assert!("not-a-hash".parse::<VideoFingerprint>().is_err());
    }

    #[test]
    fn test_verdict_threshold() {
        assert_eq!(Verdict::from_similarity(69.9), Verdict::DistinctEnough);
        assert_eq!(Verdict::from_similarity(70.0), Verdict::TooSimilar);
    }

    #[test]
    fn test_pairwise_comparisons() {
        let paths: Vec<PathBuf> = ["a.mp4", "b.mp4", "c.mp4"].iter().map(PathBuf::from).collect();
        let prints = vec![
            frames(&[0, 0, 0]),
            frames(&[0, 0, u64::MAX]),
            frames(&[u64::MAX, u64::MAX, u64::MAX]),
        ];
        let cmp = pairwise(&paths, &prints);
        assert_eq!(cmp.len(), 3);
        assert_eq!(cmp[0].similarity_percent, 66.7);
        assert_eq!(cmp[0].verdict, Verdict::DistinctEnough);
        assert_eq!(cmp[1].similarity_percent, 0.0);
        assert_eq!(cmp[2].second, PathBuf::from("c.mp4"));
        assert_eq!(cmp[2].similarity_percent, 33.3);
    }

    #[test]
    fn test_file_digest_matches_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        let da = file_digest(&a).unwrap();
        assert_eq!(da.len(), 64);
        assert_eq!(da, file_digest(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_missing_source() {
        let err = fingerprint(Path::new("ffmpeg"), Path::new("/no/such/video.mp4")).unwrap_err();
        assert!(matches!(err, UniqError::SourceNotFound(_)));
    }

    #[test]
    fn test_fingerprint_falls_back_to_digest() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("clip.mp4");
        fs::write(&src, b"not really a video").unwrap();
        let fp = fingerprint(Path::new("/nonexistent/bin/ffmpeg"), &src).unwrap();
        assert_eq!(fp, VideoFingerprint::File(file_digest(&src).unwrap()));
    }

    #[test]
    fn test_library_persists_and_matches() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("library");
        let fp = frames(&[1, 2, 3, 4]);
        let report = assess(&probe(), 0.0);

        let mut lib = HashLibrary::open(&lib_dir).unwrap();
        assert!(lib.is_empty());
        assert!(lib_dir.join(LIBRARY_FILE).exists());
        assert_eq!(lib.max_similarity(&fp), 0.0);
        lib.insert(&fp, Path::new("V01.mp4"), &report);
        lib.save().unwrap();

        let lib = HashLibrary::open(&lib_dir).unwrap();
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.get(&fp).unwrap().path, "V01.mp4");
        assert_eq!(lib.get(&fp).unwrap().scores.overall, report.overall);
        assert_eq!(lib.max_similarity(&fp), 100.0);
        assert_eq!(lib.max_similarity(&frames(&[1, 2, u64::MAX, u64::MAX])), 50.0);
    }

    #[test]
    fn test_library_skips_unreadable_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(LIBRARY_FILE),
            r#"{"garbage": {"path": "x", "scores": {"overall": 1, "tiktok": 1, "instagram": 1, "youtube": 1}}}"#,
        )
        .unwrap();
        let lib = HashLibrary::open(dir.path()).unwrap();
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.max_similarity(&frames(&[1])), 0.0);
    }
}
