mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{export_json, export_rankings_csv};
pub use progress::RunProgress;
pub use styling::{dim, magenta_bold};
pub use summary::{print_leaderboard, print_pipelines, print_repository_health, print_run_summary};

/// Prints the `contriblens` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🏆 contriblens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Contributor analytics for version-control metadata")
    );
}
