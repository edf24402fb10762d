//! Report Module
//!
//! Summary box printed at the end of a generation run.

use crate::batch::BatchResult;
use crate::progress::format_duration;
use console::style;
use std::time::Duration;

pub fn print_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) {
    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  📊 {:<53}║", format!("{} Summary", operation_name));
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  🎬 Variants requested:  {:>10}                      ║", result.total);
    println!("║  ✅ Succeeded:           {:>10}                      ║", result.succeeded);
    println!("║  ❌ Failed:              {:>10}                      ║", result.failed);
    println!("║  📈 Success Rate:        {:>9.1}%                      ║", result.success_rate());
    println!(
        "║  ⏱️  Total Time:          {:>10}                      ║",
        format_duration(duration)
    );
    if result.total > 0 {
        let avg_time = duration.as_secs_f64() / result.total as f64;
        println!("║  ⏱️  Avg Time/Variant:    {:>9.2}s                      ║", avg_time);
    }
    println!("╚══════════════════════════════════════════════════════════╝");

    if !result.errors.is_empty() {
        println!();
        println!("{}", style("❌ Errors encountered:").red().bold());
        for (path, error) in &result.errors {
            println!("   {} → {}", path.display(), first_line(error));
        }
    }
}

pub fn print_simple_summary(result: &BatchResult) {
    println!(
        "\n✅ Complete: {} succeeded, {} failed (total: {})",
        result.succeeded, result.failed, result.total
    );
}

// ffmpeg diagnostics are multi-line; the summary shows the last meaningful one
fn first_line(error: &str) -> String {
    crate::ffmpeg_process::format_ffmpeg_error(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_print_summary_report_no_panic() {
        let mut result = BatchResult::new();
        result.success();
        result.fail(PathBuf::from("V02.mp4"), "line one\nError: bad filter\n".to_string());
        print_summary_report(&result, Duration::from_secs(10), "Test");
    }

    #[test]
    fn test_print_summary_report_empty() {
        print_summary_report(&BatchResult::new(), Duration::from_secs(1), "Test");
        print_simple_summary(&BatchResult::new());
    }

    #[test]
    fn test_first_line_picks_error() {
        assert_eq!(first_line("a\nError: bad filter\nb"), "Error: bad filter");
    }
}
