//! Command-line interface definition.
//!
//! Flag conflicts are encoded in the derive so clap rejects nonsensical
//! combinations before a run starts: at most one of `-u`, `-d`, `-D` may
//! be given, and `-D` cannot be combined with `-b` because the summary
//! needs a complete run.

use clap::Parser;

/// Detect duplicate files by content checksum.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dupes",
    version,
    about = "Detect duplicate files by content checksum",
    long_about = "Reads file paths from stdin (one per line) and looks for duplicates by\n\
                  computing the SHA-1 checksum of each file. If <DIR> is given, files are\n\
                  read from that directory instead, recursively with -R.\n\n\
                  By default nothing is printed to stdout; pick one of -u, -d, or -D.\n\
                  The exit status is non-zero if any duplicates or errors were seen.",
    after_help = "EXAMPLES:\n    \
        find photos -type f | dupes -u 2>/dev/null\n    \
        dupes -R -L -D photos > dupes.yaml\n    \
        dupes -R -d photos | xargs rm --"
)]
pub struct CliArgs {
    /// Directory to evaluate; reads paths from stdin when absent
    #[arg(value_name = "DIR")]
    pub dir: Option<String>,

    /// Print each file with a previously-unseen checksum to stdout
    #[arg(short = 'u', conflicts_with_all = ["dup", "all_dup"])]
    pub uniq: bool,

    /// Print each file with a previously-seen checksum to stdout
    #[arg(short = 'd', conflicts_with = "all_dup")]
    pub dup: bool,

    /// Print a summary of duplicate files grouped by checksum after all
    /// files have been evaluated
    #[arg(short = 'D')]
    pub all_dup: bool,

    /// Read files from <DIR> recursively
    #[arg(short = 'R')]
    pub recursive: bool,

    /// Follow symbolic links
    #[arg(short = 'L')]
    pub follow_symlinks: bool,

    /// Stop at the first error instead of continuing
    #[arg(short = 'e')]
    pub exit_on_error: bool,

    /// Stop at the first file with a previously-seen checksum
    #[arg(short = 'b', conflicts_with = "all_dup")]
    pub exit_on_dup: bool,

    /// Number of worker threads; defaults to the logical CPU count
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Verbose logging to stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
