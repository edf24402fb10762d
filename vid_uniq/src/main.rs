use anyhow::{bail, Context};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::{
    create_progress_bar, expand_inputs, find_ffmpeg, find_ffprobe, format_bytes,
    print_simple_summary, print_summary_report,
};
use vid_uniq::config::DEFAULT_MAX_WORKERS;
use vid_uniq::processing::DEFAULT_CLIP_SECS;
use vid_uniq::similarity::DEFAULT_LIBRARY_DIR;
use vid_uniq::store::{DB_ENV, DEFAULT_DB_FILE};
use vid_uniq::{
    bulk_folder_name, check_against_library, check_file, compare_all, create_unique_dir,
    preview_score, run_bulk, run_session, session_folder_name, AspectRatio, BatchRequest,
    EnabledCategories, FfmpegEncoder, GenerationConfig, HashLibrary, IntensityTier,
    PlatformProfile, RiskLevel, ScoreBreakdown, ScoreTier, SessionContext, SessionMode,
    SessionReport, TrackingStore, TransformationParameters, Verdict, VideoProcessor,
    MAX_VARIANTS,
};

#[derive(Parser)]
#[command(name = "vid-uniq")]
#[command(version, about = "Generate bit-distinct variants of a short video", long_about = None)]
struct Cli {
    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GenerationArgs {
    /// Number of variants per source (1-99)
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,
    /// Intensity tier: low, medium or high
    #[arg(short, long, default_value = "medium")]
    intensity: String,
    /// Category to switch off (repeatable)
    #[arg(long = "disable", value_name = "CATEGORY")]
    disable: Vec<String>,
    /// Root directory for session folders
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    workers: usize,
    /// Per-variant encoder time limit in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,
    /// Seed for reproducible parameter draws
    #[arg(long)]
    seed: Option<u64>,
    /// Write a JSON manifest of the scored variants
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Only include safe variants in the manifest
    #[arg(long)]
    safe_only: bool,
    /// Do not record the session in the tracking store
    #[arg(long)]
    no_track: bool,
    #[command(flatten)]
    db: DbArgs,
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct DbArgs {
    /// Tracking store path (default: $VID_UNIQ_DB or ./vid_uniq.db)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
}

impl DbArgs {
    fn path(&self) -> PathBuf {
        self.db
            .clone()
            .or_else(|| std::env::var_os(DB_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }

    fn open(&self) -> anyhow::Result<TrackingStore> {
        let path = self.path();
        TrackingStore::open(&path)
            .with_context(|| format!("Failed to open tracking store {}", path.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate variants of one source video
    Generate {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[command(flatten)]
        args: GenerationArgs,
    },

    /// Generate variants for several sources under one BULK folder
    Bulk {
        /// Files or directories (directories are scanned for videos)
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        recursive: bool,
        #[command(flatten)]
        args: GenerationArgs,
    },

    /// Score a saved parameter set
    Score {
        #[arg(value_name = "PARAMS_JSON")]
        params: PathBuf,
    },

    /// Typical score for a set of enabled categories
    Preview {
        #[arg(long = "disable", value_name = "CATEGORY")]
        disable: Vec<String>,
    },

    /// Show intensity tier ranges
    Presets,

    /// List recorded sessions
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long)]
        mode: Option<String>,
        /// Also list each session's variants
        #[arg(long)]
        variants: bool,
        #[command(flatten)]
        db: DbArgs,
    },

    /// Aggregate statistics from the tracking store
    Stats {
        #[command(flatten)]
        db: DbArgs,
    },

    /// Probe a file and rate platform readiness
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Hash library used for duplicate detection
        #[arg(long, value_name = "DIR", default_value = DEFAULT_LIBRARY_DIR)]
        library: PathBuf,
        /// Skip fingerprinting and the library comparison
        #[arg(long)]
        no_library: bool,
        /// Add the file to the library after checking
        #[arg(long)]
        add: bool,
    },

    /// Compare videos pairwise by perceptual fingerprint
    Compare {
        #[arg(value_name = "FILE", num_args = 2.., required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Letterbox a video onto a platform canvas (1080x1920)
    Resize {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// tiktok, instagram_reels or youtube_shorts
        #[arg(short, long, default_value = "tiktok")]
        platform: PlatformProfile,
    },

    /// Full-height center crop to an aspect ratio
    Crop {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = "9:16")]
        ratio: AspectRatio,
    },

    /// Cut a video into fixed-length clips
    Split {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(short, long, default_value = "clips")]
        output_dir: PathBuf,
        /// Clip length in seconds
        #[arg(long, default_value_t = DEFAULT_CLIP_SECS)]
        clip_secs: f64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging("vid_uniq", LogConfig::default().with_stderr(cli.verbose)) {
        eprintln!("⚠️  Logging unavailable: {:#}", e);
    }

    match cli.command {
        Commands::Generate { input, args } => cmd_generate(&input, &args),
        Commands::Bulk {
            inputs,
            recursive,
            args,
        } => cmd_bulk(&inputs, recursive, &args),
        Commands::Score { params } => cmd_score(&params),
        Commands::Preview { disable } => {
            let enabled = EnabledCategories::with_disabled(&disable)?;
            let preview = preview_score(&enabled);
            println!(
                "🔮 Preview score: {}/100 ({})",
                preview,
                tier_label(ScoreTier::from_score(preview))
            );
            let off = enabled.disabled();
            if !off.is_empty() {
                let names: Vec<_> = off.iter().map(|c| c.name()).collect();
                println!("   Disabled: {}", names.join(", "));
            }
            Ok(())
        }
        Commands::Presets => {
            print_presets();
            Ok(())
        }
        Commands::History {
            limit,
            mode,
            variants,
            db,
        } => cmd_history(&db, limit, mode.as_deref(), variants),
        Commands::Stats { db } => cmd_stats(&db),
        Commands::Check {
            file,
            json,
            library,
            no_library,
            add,
        } => {
            let library = (!no_library).then_some(library.as_path());
            cmd_check(&file, json, library, add)
        }
        Commands::Compare { files, json } => cmd_compare(&files, json),
        Commands::Resize {
            input,
            output,
            platform,
        } => {
            processor()?.resize_for_platform(&input, &output, platform)?;
            println!("✅ {} → {} ({})", input.display(), output.display(), platform);
            Ok(())
        }
        Commands::Crop {
            input,
            output,
            ratio,
        } => {
            processor()?.smart_crop(&input, &output, ratio)?;
            println!("✅ {} → {} ({})", input.display(), output.display(), ratio);
            Ok(())
        }
        Commands::Split {
            input,
            output_dir,
            clip_secs,
        } => {
            let clips = processor()?.split_into_clips(&input, &output_dir, clip_secs)?;
            println!("✂️  {} clips in {}", clips.len(), output_dir.display());
            for clip in &clips {
                println!("   {}", clip.display());
            }
            Ok(())
        }
    }
}

fn processor() -> anyhow::Result<VideoProcessor> {
    Ok(VideoProcessor::new(find_ffmpeg()?, find_ffprobe()?))
}

fn build_config(args: &GenerationArgs) -> anyhow::Result<GenerationConfig> {
    if args.count == 0 || args.count > MAX_VARIANTS {
        bail!("--count must be between 1 and {}", MAX_VARIANTS);
    }
    let enabled = EnabledCategories::with_disabled(&args.disable)?;
    Ok(GenerationConfig::new(IntensityTier::parse_or_default(&args.intensity))
        .with_enabled(enabled)
        .with_max_workers(args.workers)
        .with_timeout(Duration::from_secs(args.timeout)))
}

fn open_store(args: &GenerationArgs) -> Option<TrackingStore> {
    if args.no_track {
        return None;
    }
    match args.db.open() {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Tracking disabled for this run");
            None
        }
    }
}

fn cmd_generate(input: &Path, args: &GenerationArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;
    if !input.is_file() {
        bail!("Input file not found: {}", input.display());
    }
    let encoder = FfmpegEncoder::new(find_ffmpeg()?, config.timeout);
    let store = open_store(args);
    let ctx = SessionContext {
        config: &config,
        encoder: &encoder,
        store: store.as_ref(),
    };

    let folder = create_unique_dir(&args.output, &session_folder_name(&Local::now()))?;
    info!("🎬 Generating {} variants ({})", args.count, config.tier);
    info!("   Source: {}", input.display());
    info!("   Folder: {}", folder.display());

    let request = BatchRequest::new(input, folder, args.count).with_seed(args.seed);
    let pb = create_progress_bar(args.count as u64, "Variants", args.quiet);
    let start = Instant::now();
    let report = run_session(&ctx, SessionMode::Generate, &request, |done, _| {
        pb.set_position(done as u64)
    })?;
    pb.finish_and_clear();

    if !args.quiet {
        print_variants(&report);
    }
    finish(&report.to_batch_result(), start.elapsed(), "Generation", args.quiet);
    write_manifest(&report, args)?;
    Ok(())
}

fn cmd_bulk(inputs: &[PathBuf], recursive: bool, args: &GenerationArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;
    let sources = expand_inputs(inputs, recursive);
    if sources.is_empty() {
        bail!("No video files found in the given inputs");
    }
    let encoder = FfmpegEncoder::new(find_ffmpeg()?, config.timeout);
    let store = open_store(args);
    let ctx = SessionContext {
        config: &config,
        encoder: &encoder,
        store: store.as_ref(),
    };

    let bulk_dir = create_unique_dir(&args.output, &bulk_folder_name(&Local::now()))?;
    info!("📦 Bulk run: {} sources × {} variants ({})", sources.len(), args.count, config.tier);
    info!("   Folder: {}", bulk_dir.display());

    let total = (sources.len() * args.count) as u64;
    let pb = create_progress_bar(total, "Bulk", args.quiet);
    let start = Instant::now();
    let report = run_bulk(&ctx, &sources, &bulk_dir, args.count, args.seed, |done, _| {
        pb.set_position(done as u64)
    })?;
    pb.finish_and_clear();

    if !args.quiet {
        for session in &report.sessions {
            print_variants(session);
        }
    }
    finish(&report.to_batch_result(), start.elapsed(), "Bulk Generation", args.quiet);

    if let Some(base) = &args.manifest {
        for session in &report.sessions {
            let stem = session
                .folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let path = base.with_file_name(format!(
                "{}_{}",
                stem,
                base.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ));
            session.export_manifest(&path, args.safe_only)?;
        }
    }
    Ok(())
}

fn finish(batch: &shared_utils::BatchResult, elapsed: Duration, label: &str, quiet: bool) {
    if quiet {
        print_simple_summary(batch);
    } else {
        print_summary_report(batch, elapsed, label);
    }
}

fn write_manifest(report: &SessionReport, args: &GenerationArgs) -> anyhow::Result<()> {
    if let Some(path) = &args.manifest {
        let n = report
            .export_manifest(path, args.safe_only)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        println!("📝 Manifest: {} ({} variants)", path.display(), n);
    }
    Ok(())
}

fn tier_label(tier: ScoreTier) -> String {
    match tier {
        ScoreTier::Safe => style("SAFE").green().bold().to_string(),
        ScoreTier::Moderate => style("MODERATE").yellow().bold().to_string(),
        ScoreTier::Risk => style("RISK").red().bold().to_string(),
    }
}

fn risk_label(risk: RiskLevel) -> String {
    let text = risk.as_str().to_uppercase();
    match risk {
        RiskLevel::Low => style(text).green().to_string(),
        RiskLevel::Medium => style(text).yellow().to_string(),
        RiskLevel::High => style(text).red().to_string(),
        RiskLevel::Critical => style(text).red().bold().to_string(),
    }
}

fn print_variants(report: &SessionReport) {
    println!("\n📁 {}", report.folder.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for v in &report.variants {
        match (v.score, v.tier) {
            (Some(score), Some(tier)) => {
                let size = std::fs::metadata(&v.result.output_location)
                    .map(|m| format_bytes(m.len()))
                    .unwrap_or_else(|_| "?".to_string());
                println!(
                    "  {}  {:>3}/100  {}  {}",
                    v.name(),
                    score.total,
                    tier_label(tier),
                    size
                );
            }
            _ => println!(
                "  {}  {}",
                v.name(),
                style(shared_utils::format_ffmpeg_error(
                    v.result.error_detail.as_deref().unwrap_or("")
                ))
                .red()
            ),
        }
    }
    if let Some(avg) = report.average_score() {
        println!("  Average: {:.1}/100 • Safe: {}", avg, report.safe_variants().len());
    }
}

fn cmd_score(path: &Path) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let params = TransformationParameters::from_json(&json)
        .with_context(|| format!("{} is not a parameter set", path.display()))?;
    let breakdown = ScoreBreakdown::of(&params);
    let total = breakdown.total();

    println!("\n🎯 Evasion Score Breakdown");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (label, points) in breakdown.rows() {
        println!("  {:<16} {:>6.2}", label, points);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  {:<16} {:>6}  {}", "total", total.total, tier_label(total.tier()));
    Ok(())
}

fn print_presets() {
    println!("\n⚙️  Intensity Presets");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  {:<7} {:<12} {:>5} {:>6} {:>6} {:<12} {:>6} {:>6} {:>5}",
        "tier", "speed", "hue", "crop%", "noise", "zoom", "pitch", "fps±", "flip"
    );
    for tier in IntensityTier::ALL {
        let p = tier.preset();
        println!(
            "  {:<7} {:<12} {:>5} {:>6} {:>6} {:<12} {:>6} {:>6} {:>5}",
            tier.as_str(),
            format!("{}-{}", p.speed.start(), p.speed.end()),
            format!("±{}", p.hue_max),
            p.crop_max_percent,
            p.noise_max,
            format!("{}-{}", p.zoom.start(), p.zoom.end()),
            format!("±{}", p.pitch_max),
            p.frame_rate_jitter,
            p.flip_probability,
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

fn cmd_history(
    db: &DbArgs,
    limit: usize,
    mode: Option<&str>,
    variants: bool,
) -> anyhow::Result<()> {
    let store = db.open()?;
    let sessions = store.recent_sessions(limit, mode)?;
    if sessions.is_empty() {
        println!("No sessions recorded in {}", store.path().display());
        return Ok(());
    }
    println!("\n📜 Sessions ({})", store.path().display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for s in &sessions {
        println!(
            "  #{:<4} {}  {:<8} {:<6} {:>2} variants  {}",
            s.id,
            s.created_at,
            s.mode,
            s.intensity,
            s.num_variations,
            s.folder_name.as_deref().unwrap_or("-")
        );
        if variants {
            for v in store.session_variations(s.id)? {
                let score = v
                    .uniqueness_score
                    .map(|x| format!("{:.0}", x))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "        {}  {:>3}  {}",
                    v.name,
                    score,
                    v.output_path.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn cmd_stats(db: &DbArgs) -> anyhow::Result<()> {
    let store = db.open()?;
    let a = store.analytics()?;
    println!("\n📊 Tracking Statistics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Sessions:        {}", a.total_sessions);
    println!("  Variants:        {}", a.total_variations);
    println!("  Average score:   {:.1}", a.avg_uniqueness);
    println!("  Safe (≥60):      {}", a.safe_count);
    if !a.sessions_by_mode.is_empty() {
        println!("\n  By mode:");
        for (mode, n) in &a.sessions_by_mode {
            println!("    {:<10} {}", mode, n);
        }
    }
    println!("\n  Score distribution:");
    for bucket in vid_uniq::store::SCORE_BUCKETS {
        let n = a.score_distribution.get(bucket).copied().unwrap_or(0);
        println!("    {:<8} {}", bucket, n);
    }
    Ok(())
}

fn cmd_check(file: &Path, json: bool, library: Option<&Path>, add: bool) -> anyhow::Result<()> {
    let ffprobe = find_ffprobe()?;
    let report = match library {
        Some(dir) => {
            let mut lib = HashLibrary::open(dir)
                .with_context(|| format!("Failed to open hash library {}", dir.display()))?;
            check_against_library(&ffprobe, &find_ffmpeg()?, file, &mut lib, add)
        }
        None => check_file(&ffprobe, file),
    }
    .with_context(|| format!("Failed to check {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let p = &report.probe;
    println!("\n🔍 Platform Readiness");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📁 File: {}", file.display());
    println!(
        "📐 {}x{} {} @ {:.2} fps, {:.1}s",
        p.width, p.height, p.codec, p.frame_rate, p.duration
    );
    println!("🎵 Audio: {}", if p.has_audio { "yes" } else { "no" });
    if library.is_some() {
        println!("🧬 Library match: {:.1}%", report.library_similarity);
        if report.duplicate_found {
            println!("   {}", style("Duplicate of a library video").red().bold());
        }
    }
    println!();
    for s in &report.platforms {
        println!("  {:<16} {:>3}/100  {}", s.platform.name(), s.score, risk_label(s.risk));
        for issue in &s.issues {
            println!("     ⚠️  {}", issue);
        }
        for fix in &s.recommendations {
            println!("     💡 {}", fix);
        }
    }
    println!();
    println!("⭐ Overall: {}/100 ({})", report.overall, risk_label(report.overall_risk()));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

fn cmd_compare(files: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let comparisons = compare_all(&find_ffmpeg()?, files)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&comparisons)?);
        return Ok(());
    }

    println!("\n🧬 Similarity");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for c in &comparisons {
        let verdict = match c.verdict {
            Verdict::DistinctEnough => style(c.verdict.label()).green().to_string(),
            Verdict::TooSimilar => style(c.verdict.label()).red().bold().to_string(),
        };
        println!(
            "  {:>5.1}%  {}  {} ↔ {}",
            c.similarity_percent,
            verdict,
            c.first.display(),
            c.second.display()
        );
    }
    let similar = comparisons
        .iter()
        .filter(|c| c.verdict == Verdict::TooSimilar)
        .count();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  {} pairs, {} too similar", comparisons.len(), similar);
    Ok(())
}
