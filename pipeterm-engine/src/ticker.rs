//! Animation ticker

use pipeterm_core::domain::pipeline::PipelineCollection;

/// Advances the spinner frame of every running pipeline
///
/// Returns how many pipelines moved. Frames are display-only and never
/// persisted, so callers don't save afterwards.
pub fn advance_frames(pipelines: &mut PipelineCollection) -> usize {
    pipelines
        .iter_mut()
        .map(|pipeline| pipeline.advance_frame())
        .filter(|moved| *moved)
        .count()
}
