//! `Config::verbose`-gated collection reporting, in the teacher's own
//! convention of a boolean flag gating direct `eprintln!` calls at
//! collection boundaries rather than a `log`/`tracing` dependency.

use crate::sweep::SweepStats;

/// Print a one-line report after a collection, if `verbose` is set.
pub fn report_collection(label: &str, verbose: bool, roots: usize, stats: &SweepStats, ratio: f64) {
    if !verbose {
        return;
    }
    eprintln!(
        "comet: {label}: {} roots, {} live, {} swept, {:.1}% available",
        roots,
        stats.live,
        stats.swept,
        ratio * 100.0
    );
}
