//! Bounded fan-out of one batch across a worker pool.
//!
//! Each task samples its own parameters, builds its own pipeline and owns
//! its own output path. Failures come back as data; the only error this
//! module returns is for a request that could never be valid.

use crate::config::GenerationConfig;
use crate::encoder::VariantEncoder;
use crate::errors::{Result, UniqError};
use crate::metadata::MetadataTags;
use crate::params::TransformationParameters;
use crate::pipeline::EncodeJob;
use crate::sampler::ParameterSampler;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};

/// Two-digit naming caps a batch at 99 variants.
pub const MAX_VARIANTS: usize = 99;
pub const DEFAULT_STEM_PREFIX: &str = "V";

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub count: usize,
    pub stem_prefix: String,
    /// Task `i` is seeded with `seed + i` when set
    pub seed: Option<u64>,
}

impl BatchRequest {
    pub fn new(source: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, count: usize) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            count,
            stem_prefix: DEFAULT_STEM_PREFIX.to_string(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_stem_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stem_prefix = prefix.into();
        self
    }

    /// `V01`, `V02`, ... for index 0, 1, ...
    pub fn variant_name(&self, index: usize) -> String {
        format!("{}{:02}", self.stem_prefix, index + 1)
    }

    pub fn output_path(&self, index: usize, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.variant_name(index), extension))
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 || self.count > MAX_VARIANTS {
            return Err(UniqError::InvalidCount {
                count: self.count,
                max: MAX_VARIANTS,
            });
        }
        Ok(())
    }
}

/// Outcome of one generation attempt.
///
/// `error_detail` is present exactly when `success` is false. Parameters
/// are kept for failed attempts too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub index: usize,
    pub name: String,
    pub success: bool,
    pub output_location: PathBuf,
    pub parameters: TransformationParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataTags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl GenerationResult {
    pub fn succeeded(job: EncodeJob) -> Self {
        Self {
            index: job.index,
            name: job.name,
            success: true,
            output_location: job.output,
            parameters: job.params,
            metadata: job.metadata,
            error_detail: None,
        }
    }

    /// An empty detail is replaced so a failure always explains itself.
    pub fn failed(job: EncodeJob, detail: impl Into<String>) -> Self {
        let mut detail = detail.into();
        if detail.trim().is_empty() {
            detail = "Encoding failed without diagnostic output".to_string();
        }
        Self {
            index: job.index,
            name: job.name,
            success: false,
            output_location: job.output,
            parameters: job.params,
            metadata: job.metadata,
            error_detail: Some(detail),
        }
    }
}

/// Generate `request.count` variants of `request.source`.
///
/// Runs on a dedicated pool of `min(max_workers, count)` threads and
/// returns one result per requested index, in index order. `on_progress`
/// receives `(completed, total)` after every task.
pub fn dispatch<F>(
    request: &BatchRequest,
    config: &GenerationConfig,
    encoder: &dyn VariantEncoder,
    on_progress: F,
) -> Result<Vec<GenerationResult>>
where
    F: Fn(usize, usize) + Sync,
{
    request.validate()?;
    std::fs::create_dir_all(&request.output_dir)?;

    let total = request.count;
    let workers = config.max_workers.clamp(1, total);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("vid-uniq-worker-{}", i))
        .build()?;

    info!(
        source = %request.source.display(),
        count = total,
        workers,
        tier = %config.tier,
        seed = ?request.seed,
        "Dispatching batch"
    );

    let start = Instant::now();
    let completed = AtomicUsize::new(0);

    let results: Vec<GenerationResult> = pool.install(|| {
        (0..total)
            .into_par_iter()
            .map(|index| {
                let result = run_task(request, config, encoder, index);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                on_progress(done, total);
                result
            })
            .collect()
    });

    let succeeded = results.iter().filter(|r| r.success).count();
    info!(
        succeeded,
        failed = total - succeeded,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Batch complete"
    );
    Ok(results)
}

fn task_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(index as u64)),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

fn run_task(
    request: &BatchRequest,
    config: &GenerationConfig,
    encoder: &dyn VariantEncoder,
    index: usize,
) -> GenerationResult {
    let mut rng = task_rng(request.seed, index);
    let params = ParameterSampler::sample(config, &mut rng);
    let metadata = config
        .enabled
        .metadata
        .then(|| MetadataTags::random(&mut rng));

    let job = EncodeJob::new(
        index,
        request.variant_name(index),
        request.source.clone(),
        request.output_path(index, &config.encoder.extension),
        params,
        metadata,
        &config.encoder,
    );

    match panic::catch_unwind(AssertUnwindSafe(|| encoder.encode(&job))) {
        Ok(Ok(())) => GenerationResult::succeeded(job),
        Ok(Err(failure)) => {
            warn!(variant = %job.name, error = %failure, "Variant failed");
            let detail = failure.detail();
            GenerationResult::failed(job, detail)
        }
        Err(_) => {
            error!(variant = %job.name, "Encoder panicked");
            GenerationResult::failed(job, "Encoder panicked while processing this variant")
        }
    }
}

/// Remove outputs left behind by failed attempts.
pub fn remove_failed_outputs(results: &[GenerationResult]) {
    for r in results.iter().filter(|r| !r.success) {
        if r.output_location.exists() {
            if let Err(e) = std::fs::remove_file(&r.output_location) {
                warn!(
                    path = %r.output_location.display(),
                    error = %e,
                    "Could not remove partial output"
                );
            }
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::errors::EncodeFailure;
    use proptest::prelude::*;
    use std::thread;
    use std::time::Duration;

    struct JitterEncoder {
        delays: Vec<u64>,
    }

    impl VariantEncoder for JitterEncoder {
        fn encode(&self, job: &EncodeJob) -> std::result::Result<(), EncodeFailure> {
            thread::sleep(Duration::from_millis(self.delays[job.index]));
            Ok(())
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_order_preserved_under_varied_latency(
            delays in proptest::collection::vec(0u64..12, 2..10),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let count = delays.len();
            let enc = JitterEncoder { delays };
            let req = BatchRequest::new("in.mp4", dir.path(), count);
            let results = dispatch(&req, &GenerationConfig::default(), &enc, |_, _| {}).unwrap();
            prop_assert_eq!(results.len(), count);
            for (i, r) in results.iter().enumerate() {
                prop_assert_eq!(r.index, i);
                prop_assert_eq!(&r.name, &req.variant_name(i));
            }
        }
    }
}
