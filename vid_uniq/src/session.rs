//! Session orchestration: folder layout, dispatch, scoring and recording.

use crate::config::GenerationConfig;
use crate::dispatcher::{
    dispatch, remove_failed_outputs, BatchRequest, GenerationResult, MAX_VARIANTS,
};
use crate::encoder::VariantEncoder;
use crate::errors::{Result, UniqError};
use crate::intensity::IntensityTier;
use crate::scoring::{score, EvasionScore, ScoreTier};
use crate::store::{NewSession, NewVariation, TrackingStore};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use shared_utils::BatchResult;
use std::collections::HashSet;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const BULK_SUFFIX: &str = " - BULK";
const FOLDER_FORMAT: &str = "%Y-%m-%d_%Hh%Mm%S";

/// `2025-03-14_09h26m53`
pub fn session_folder_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    now.format(FOLDER_FORMAT).to_string()
}

/// `2025-03-14_09h26m53 - BULK`
pub fn bulk_folder_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("{}{}", session_folder_name(now), BULK_SUFFIX)
}

/// Create `root/name`, suffixing ` (2)`, ` (3)`, ... if it already exists.
pub fn create_unique_dir(root: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let mut candidate = root.join(name);
    let mut n = 2;
    while candidate.exists() {
        candidate = root.join(format!("{} ({})", name, n));
        n += 1;
    }
    fs::create_dir_all(&candidate)?;
    Ok(candidate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Generate,
    Bulk,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Generate => "generate",
            SessionMode::Bulk => "bulk",
        }
    }
}

/// A generation result with its score. Failed results carry no score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredVariant {
    #[serde(flatten)]
    pub result: GenerationResult,
    pub score: Option<EvasionScore>,
    pub tier: Option<ScoreTier>,
}

impl ScoredVariant {
    pub fn from_result(result: GenerationResult) -> Self {
        let evasion = result.success.then(|| score(&result.parameters));
        Self {
            score: evasion,
            tier: evasion.map(|s| s.tier()),
            result,
        }
    }

    pub fn name(&self) -> &str {
        &self.result.name
    }

    pub fn is_safe(&self) -> bool {
        self.tier == Some(ScoreTier::Safe)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Option<i64>,
    pub mode: SessionMode,
    pub source: PathBuf,
    pub folder: PathBuf,
    pub tier: IntensityTier,
    pub variants: Vec<ScoredVariant>,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Serialize)]
struct Manifest<'a> {
    source: &'a Path,
    folder: &'a Path,
    tier: IntensityTier,
    variants: Vec<&'a ScoredVariant>,
}

impl SessionReport {
    pub fn succeeded(&self) -> usize {
        self.variants.iter().filter(|v| v.result.success).count()
    }

    pub fn failed(&self) -> usize {
        self.variants.len() - self.succeeded()
    }

    pub fn safe_variants(&self) -> Vec<&ScoredVariant> {
        self.variants.iter().filter(|v| v.is_safe()).collect()
    }

    pub fn average_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .variants
            .iter()
            .filter_map(|v| v.score.map(|s| f64::from(s.total)))
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    pub fn to_batch_result(&self) -> BatchResult {
        let mut batch = BatchResult::new();
        for v in &self.variants {
            if v.result.success {
                batch.success();
            } else {
                batch.fail(
                    v.result.output_location.clone(),
                    v.result.error_detail.clone().unwrap_or_default(),
                );
            }
        }
        batch
    }

    /// Write the scored variants as JSON. Returns how many were written.
    pub fn export_manifest(&self, path: &Path, safe_only: bool) -> Result<usize> {
        let variants: Vec<&ScoredVariant> = if safe_only {
            self.safe_variants()
        } else {
            self.variants.iter().collect()
        };
        let written = variants.len();
        let manifest = Manifest {
            source: &self.source,
            folder: &self.folder,
            tier: self.tier,
            variants,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        info!(path = %path.display(), variants = written, safe_only, "Manifest written");
        Ok(written)
    }
}

/// What a session runs with.
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    pub config: &'a GenerationConfig,
    pub encoder: &'a dyn VariantEncoder,
    pub store: Option<&'a TrackingStore>,
}

/// Run one batch into `request.output_dir`, score it and record it.
///
/// A tracking-store failure is logged and leaves `session_id` empty; the
/// generated files are kept either way.
pub fn run_session<F>(
    ctx: &SessionContext<'_>,
    mode: SessionMode,
    request: &BatchRequest,
    on_progress: F,
) -> Result<SessionReport>
where
    F: Fn(usize, usize) + Sync,
{
    if !request.source.is_file() {
        return Err(UniqError::SourceNotFound(request.source.clone()));
    }

    let start = Instant::now();
    let results = dispatch(request, ctx.config, ctx.encoder, on_progress)?;
    remove_failed_outputs(&results);

    let variants: Vec<ScoredVariant> = results
        .into_iter()
        .map(ScoredVariant::from_result)
        .collect();
    let mut report = SessionReport {
        session_id: None,
        mode,
        source: request.source.clone(),
        folder: request.output_dir.clone(),
        tier: ctx.config.tier,
        variants,
        elapsed: start.elapsed(),
    };

    if let Some(store) = ctx.store {
        match record(store, &report) {
            Ok(id) => report.session_id = Some(id),
            Err(e) => warn!(error = %e, "Could not record session in tracking store"),
        }
    }

    info!(
        source = %report.source.display(),
        folder = %report.folder.display(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        safe = report.safe_variants().len(),
        "Session finished"
    );
    Ok(report)
}

fn record(store: &TrackingStore, report: &SessionReport) -> Result<i64> {
    let folder_name = folder_label(&report.folder);
    let source = report.source.to_string_lossy();
    let session_id = store.save_session(&NewSession {
        mode: report.mode.as_str(),
        source: &source,
        intensity: report.tier,
        folder_name: &folder_name,
        num_variations: report.variants.len(),
    })?;
    for v in report.variants.iter().filter(|v| v.result.success) {
        store.save_variation(
            session_id,
            &NewVariation {
                name: &v.result.name,
                output_path: &v.result.output_location,
                uniqueness_score: v.score.map(|s| s.total),
                parameters: &v.result.parameters,
            },
        )?;
    }
    Ok(session_id)
}

/// Last one or two path components, e.g. `2025-03-14_09h26m53 - BULK/clip`.
fn folder_label(folder: &Path) -> String {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match folder.parent().and_then(Path::file_name) {
        Some(parent) if parent.to_string_lossy().ends_with(BULK_SUFFIX) => {
            format!("{}/{}", parent.to_string_lossy(), name)
        }
        _ => name,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub folder: PathBuf,
    pub sessions: Vec<SessionReport>,
    /// Sources that could not be processed, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

impl BulkReport {
    pub fn to_batch_result(&self) -> BatchResult {
        let mut batch = BatchResult::new();
        for s in &self.sessions {
            batch.merge(s.to_batch_result());
        }
        for (path, reason) in &self.skipped {
            batch.fail(path.clone(), reason.clone());
        }
        batch
    }
}

/// Run one session per source under a single `... - BULK` folder.
///
/// Each source gets its own sub-folder named after its file stem.
/// `on_progress` sees `(completed, total)` across all sources.
pub fn run_bulk<F>(
    ctx: &SessionContext<'_>,
    sources: &[PathBuf],
    bulk_dir: &Path,
    count: usize,
    seed: Option<u64>,
    on_progress: F,
) -> Result<BulkReport>
where
    F: Fn(usize, usize) + Sync,
{
    let total = sources.len() * count;
    let mut report = BulkReport {
        folder: bulk_dir.to_path_buf(),
        sessions: Vec::with_capacity(sources.len()),
        skipped: Vec::new(),
    };
    let mut used_stems = HashSet::new();

    for (i, source) in sources.iter().enumerate() {
        let stem = unique_stem(source, &mut used_stems);
        let request = BatchRequest::new(source.clone(), bulk_dir.join(&stem), count)
            .with_seed(seed.map(|s| s.wrapping_add((i * MAX_VARIANTS) as u64)));
        let base = i * count;

        match run_session(ctx, SessionMode::Bulk, &request, |done, _| {
            on_progress(base + done, total)
        }) {
            Ok(session) => report.sessions.push(session),
            Err(e @ UniqError::InvalidCount { .. }) => return Err(e),
            Err(e) => {
                warn!(source = %source.display(), error = %e, "Skipping source");
                on_progress(base + count, total);
                report.skipped.push((source.clone(), e.to_string()));
            }
        }
    }
    Ok(report)
}

fn unique_stem(source: &Path, used: &mut HashSet<String>) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "source".to_string());
    let mut candidate = stem.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}_{}", stem, n);
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EncodeFailure;
    use crate::pipeline::EncodeJob;
    use chrono::{Local, Utc};

    /// Writes a placeholder output, failing on the listed indices.
    struct TouchEncoder {
        fail_at: Vec<usize>,
    }

    impl VariantEncoder for TouchEncoder {
        fn encode(&self, job: &EncodeJob) -> std::result::Result<(), EncodeFailure> {
            fs::write(&job.output, b"partial").map_err(|e| EncodeFailure::Spawn(e.to_string()))?;
            if self.fail_at.contains(&job.index) {
                return Err(EncodeFailure::Exit {
                    code: Some(1),
                    stderr: "Conversion failed!".to_string(),
                });
            }
            Ok(())
        }
    }

    fn source_in(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, b"not really a video").unwrap();
        p
    }

    #[test]
    fn test_folder_names() {
        let t = Utc.with_ymd_and_hms(2025, 3, 4, 9, 6, 5).unwrap();
        assert_eq!(session_folder_name(&t), "2025-03-04_09h06m05");
        assert_eq!(bulk_folder_name(&t), "2025-03-04_09h06m05 - BULK");
        assert_eq!(session_folder_name(&Local::now()).len(), 19);
    }

    #[test]
    fn test_create_unique_dir() {
        let dir = tempfile::tempdir().unwrap();
        let a = create_unique_dir(dir.path(), "s").unwrap();
        let b = create_unique_dir(dir.path(), "s").unwrap();
        assert_eq!(a, dir.path().join("s"));
        assert_eq!(b, dir.path().join("s (2)"));
        assert!(b.is_dir());
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = GenerationConfig::default();
        let enc = TouchEncoder { fail_at: vec![] };
        let ctx = SessionContext {
            config: &config,
            encoder: &enc,
            store: None,
        };
        let req = BatchRequest::new(dir.path().join("nope.mp4"), dir.path().join("out"), 2);
        let err = run_session(&ctx, SessionMode::Generate, &req, |_, _| {}).unwrap_err();
        assert!(matches!(err, UniqError::SourceNotFound(_)));
    }

    #[test]
    fn test_session_scores_records_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_in(dir.path(), "clip.mp4");
        let store = TrackingStore::open(dir.path().join("t.db")).unwrap();
        let config = GenerationConfig::default();
        let enc = TouchEncoder { fail_at: vec![1] };
        let ctx = SessionContext {
            config: &config,
            encoder: &enc,
            store: Some(&store),
        };
        let out = create_unique_dir(dir.path(), "2025-01-01_00h00m00").unwrap();
        let req = BatchRequest::new(source, out.clone(), 3).with_seed(Some(9));

        let report = run_session(&ctx, SessionMode::Generate, &req, |_, _| {}).unwrap();

        assert_eq!(report.variants.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(report.variants[1].score.is_none());
        assert!(report.variants[0].score.is_some());
        assert!(!out.join("V02.mp4").exists());
        assert!(out.join("V01.mp4").exists());

        let id = report.session_id.unwrap();
        let session = store.session(id).unwrap().unwrap();
        assert_eq!(session.folder_name.as_deref(), Some("2025-01-01_00h00m00"));
        assert_eq!(session.num_variations, 3);
        let rows = store.session_variations(id).unwrap();
        assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["V01", "V03"]);

        let batch = report.to_batch_result();
        assert_eq!(batch.succeeded, 2);
        assert_eq!(batch.failed, 1);
    }

    #[test]
    fn test_manifest_export_safe_only() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_in(dir.path(), "clip.mp4");
        let config = GenerationConfig::new(IntensityTier::High);
        let enc = TouchEncoder { fail_at: vec![] };
        let ctx = SessionContext {
            config: &config,
            encoder: &enc,
            store: None,
        };
        let req = BatchRequest::new(source, dir.path().join("out"), 4).with_seed(Some(1));
        let report = run_session(&ctx, SessionMode::Generate, &req, |_, _| {}).unwrap();

        let all_path = dir.path().join("m").join("all.json");
        assert_eq!(report.export_manifest(&all_path, false).unwrap(), 4);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&all_path).unwrap()).unwrap();
        assert_eq!(json["variants"].as_array().unwrap().len(), 4);
        assert_eq!(json["tier"], "high");
        assert!(json["variants"][0]["parameters"]["noise_amplitude"].is_number());

        let safe_path = dir.path().join("safe.json");
        let safe = report.export_manifest(&safe_path, true).unwrap();
        assert_eq!(safe, report.safe_variants().len());
    }

    #[test]
    fn test_bulk_layout_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let a = source_in(dir.path(), "alpha.mp4");
        let b = source_in(dir.path(), "alpha.mov");
        let missing = dir.path().join("gone.mp4");
        let config = GenerationConfig::default();
        let enc = TouchEncoder { fail_at: vec![] };
        let ctx = SessionContext {
            config: &config,
            encoder: &enc,
            store: None,
        };
        let bulk = create_unique_dir(dir.path(), "2025-01-01_00h00m00 - BULK").unwrap();
        let last = std::sync::atomic::AtomicUsize::new(0);

        let report = run_bulk(&ctx, &[a, missing, b], &bulk, 2, Some(5), |done, total| {
            assert_eq!(total, 6);
            last.fetch_max(done, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(report.sessions.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert!(bulk.join("alpha").join("V01.mp4").exists());
        assert!(bulk.join("alpha_2").join("V02.mp4").exists());
        assert_eq!(last.load(std::sync::atomic::Ordering::SeqCst), 6);
        assert_eq!(
            folder_label(&report.sessions[0].folder),
            "2025-01-01_00h00m00 - BULK/alpha"
        );
        let batch = report.to_batch_result();
        assert_eq!(batch.total, 5);
        assert_eq!(batch.failed, 1);
    }
}
