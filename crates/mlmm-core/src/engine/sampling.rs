use super::config::ConfigError;
use super::context::Context;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

pub use crate::core::io::traits::FrameSink;

/// How many frames to write and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub steps_per_frame: u64,
    pub frames: usize,
    /// Write the starting positions before the first integration step.
    pub write_initial_frame: bool,
}

impl SamplingPlan {
    pub fn new(steps_per_frame: u64, frames: usize) -> Self {
        Self {
            steps_per_frame,
            frames,
            write_initial_frame: false,
        }
    }

    pub fn with_initial_frame(mut self, write: bool) -> Self {
        self.write_initial_frame = write;
        self
    }

    /// Frames in the finished trajectory.
    pub fn total_frames(&self) -> usize {
        self.frames + usize::from(self.write_initial_frame)
    }

    pub fn total_steps(&self) -> u64 {
        self.steps_per_frame * self.frames as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingSummary {
    pub frames_written: usize,
    pub steps_taken: u64,
    pub final_potential_energy: f64,
    pub final_temperature: f64,
}

/// Runs `plan.frames` rounds of "advance `steps_per_frame` steps, then write a frame".
///
/// `cancel` is checked before every round. A cancelled run returns
/// [`EngineError::Cancelled`]; the frames already written stay in `sink`, which the
/// caller still owns and closes.
#[instrument(skip_all, name = "sampling", fields(frames = plan.frames, steps_per_frame = plan.steps_per_frame))]
pub fn run<S: FrameSink>(
    context: &mut Context,
    sink: &mut S,
    plan: &SamplingPlan,
    reporter: &ProgressReporter,
    cancel: &AtomicBool,
) -> Result<SamplingSummary, EngineError> {
    if plan.steps_per_frame == 0 {
        return Err(EngineError::Config {
            source: ConfigError::InvalidParameter {
                name: "steps-per-frame",
                message: "must be at least 1".to_string(),
            },
        });
    }

    let start_step = context.current_step();
    let mut written = 0usize;
    reporter.report(Progress::TaskStart {
        total: plan.total_frames() as u64,
    });

    if plan.write_initial_frame {
        write_frame(context, sink, &mut written, reporter)?;
    }

    for _ in 0..plan.frames {
        if cancel.load(Ordering::Relaxed) {
            warn!(frames = written, "Sampling cancelled");
            reporter.report(Progress::TaskFinish);
            return Err(EngineError::Cancelled { frames: written });
        }
        context.step(plan.steps_per_frame)?;
        write_frame(context, sink, &mut written, reporter)?;
    }
    reporter.report(Progress::TaskFinish);

    let summary = SamplingSummary {
        frames_written: written,
        steps_taken: context.current_step() - start_step,
        final_potential_energy: context.potential_energy(),
        final_temperature: context.temperature(),
    };
    info!(
        frames = summary.frames_written,
        steps = summary.steps_taken,
        potential_energy = summary.final_potential_energy,
        temperature = summary.final_temperature,
        "Sampling complete"
    );
    Ok(summary)
}

fn write_frame<S: FrameSink>(
    context: &Context,
    sink: &mut S,
    written: &mut usize,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    sink.write_frame(context.positions(), context.periodic_box())
        .map_err(|e| EngineError::FrameWrite {
            frame: *written,
            message: e.to_string(),
        })?;

    let potential_energy = context.potential_energy();
    let temperature = context.temperature();
    debug!(
        frame = *written,
        step = context.current_step(),
        potential_energy,
        temperature,
        "Wrote frame"
    );
    reporter.report(Progress::Frame {
        index: *written,
        step: context.current_step(),
        potential_energy,
        temperature,
    });
    reporter.report(Progress::TaskIncrement);
    *written += 1;
    Ok(())
}
