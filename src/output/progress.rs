use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_red, bright_yellow};

/// Spinner shown while a pipeline runs
pub struct RunProgress {
    pb: ProgressBar,
    pipeline: String,
}

impl RunProgress {
    pub fn start(pipeline: &str) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Pipeline").underlined());
        let pb = create_spinner(bright_yellow(format!("Running '{pipeline}'")).to_string());
        Self {
            pb,
            pipeline: pipeline.to_string(),
        }
    }

    pub fn finish(self, stages_completed: usize) {
        self.pb.finish_with_message(
            bright_green(format!(
                "'{}' finished, {stages_completed} stages completed ✓",
                self.pipeline
            ))
            .to_string(),
        );
        eprintln!();
    }

    pub fn fail(self) {
        self.pb
            .abandon_with_message(bright_red(format!("'{}' aborted ✗", self.pipeline)).to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
