//! Pre-recorded command buffers.

pub use super::*;

use bytemuck::{Pod, Zeroable};
use std::{fmt, sync::Arc};

/// Per-submission constants visible to every pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub frame_index: u64,
    pub seed: u64,
}

/// A compute dispatch recorded into a [`CommandBuffer`].
pub trait ComputePass: Send + Sync {
    fn label(&self) -> &str;

    fn dispatch(
        &self,
        constants: &PushConstants,
    ) -> Result<()>;
}

/// An immutable sequence of passes, recorded once and resubmitted every frame.
#[derive(Clone, Default)]
pub struct CommandBuffer {
    label: String,
    passes: Vec<Arc<dyn ComputePass>>,
}

impl CommandBuffer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            passes: Vec::new(),
        }
    }

    /// Appends a pass.
    pub fn record(
        mut self,
        pass: Arc<dyn ComputePass>,
    ) -> Self {
        self.passes.push(pass);
        self
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn execute(
        &self,
        constants: &PushConstants,
    ) -> Result<()> {
        for pass in &self.passes {
            log::trace!(
                target: "nrc_renderer::graphics",
                "dispatch > {} > {} (frame {})",
                self.label,
                pass.label(),
                constants.frame_index,
            );
            pass.dispatch(constants)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("label", &self.label)
            .field(
                "passes",
                &self.passes.iter().map(|pass| pass.label()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
