//! Progress reporting for the training loop.
//!
//! The trainer reports one [`MergeEvent`] per completed merge. What happens
//! with it (a progress bar, a callback, nothing at all) never changes the
//! training result.

use indicatif::{ProgressBar, ProgressStyle, style::TemplateError};

use crate::types::{Token, TokenFreq, TokenPair};

/// One completed merge iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeEvent {
    /// 0-based iteration index.
    pub index: usize,
    /// Number of merges requested.
    pub total: usize,
    /// Pair that was merged.
    pub pair: TokenPair,
    /// ID minted for the pair.
    pub token: Token,
    /// Occurrences of the pair when it was selected.
    pub count: TokenFreq,
}

/// Receiver of training progress.
pub trait ProgressSink {
    /// Called synchronously after every merge.
    fn on_merge(&mut self, event: &MergeEvent);

    /// Called once when training stops, whether all merges were made or the
    /// corpus ran out of pairs.
    fn on_finish(&mut self) {}
}

/// Sink that discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_merge(&mut self, _event: &MergeEvent) {}
}

impl ProgressSink for ProgressBar {
    fn on_merge(&mut self, event: &MergeEvent) {
        self.set_length(event.total as u64);
        self.set_position(event.index as u64 + 1);
    }

    fn on_finish(&mut self) {
        self.finish();
    }
}

/// Creates a styled progress bar with elapsed time, a fixed-width message label, and position/total counters.
///
/// # Arguments
///
/// * `size` - The total number of steps the progress bar represents.
/// * `msg` - The message label displayed alongside the progress bar.
///
/// # Errors
///
/// Returns a [`TemplateError`] if the progress bar style template is invalid.
pub fn progress_bar(size: u64, msg: impl Into<String>) -> Result<ProgressBar, TemplateError> {
    let style =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {msg:<30!} {wide_bar} {pos}/{len}")?;

    let pb = ProgressBar::new(size);
    pb.set_style(style);
    pb.set_message(msg.into());
    pb.enable_steady_tick(std::time::Duration::from_secs(1));

    Ok(pb)
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn event(index: usize, total: usize) -> MergeEvent {
        MergeEvent {
            index,
            total,
            pair: TokenPair(97, 97),
            token: 256 + index,
            count: 4,
        }
    }

    #[test]
    fn test_progress_bar_tracks_merges() {
        let mut pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        pb.on_merge(&event(0, 10));
        pb.on_merge(&event(1, 10));

        assert_eq!(pb.length(), Some(10));
        assert_eq!(pb.position(), 2);

        pb.on_finish();
        assert!(pb.is_finished());
    }

    #[test]
    fn test_progress_bar_template_is_valid() {
        let pb = progress_bar(5, "Merging pairs").expect("template should parse");
        pb.set_draw_target(ProgressDrawTarget::hidden());
        assert_eq!(pb.length(), Some(5));
        pb.finish_and_clear();
    }

    #[test]
    fn test_no_progress_accepts_events() {
        let mut sink = NoProgress;
        sink.on_merge(&event(0, 1));
        sink.on_finish();
    }
}
