//! Merge all buffer partitions into one.

use crate::document::{Buffer, Document};
use crate::error::StepError;
use crate::pipeline::TransformStep;

/// Moves every accessor into buffer 0 so the document fits a single GLB binary chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unpartition;

impl TransformStep for Unpartition {
    fn name(&self) -> &'static str {
        "unpartition"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        if doc.buffers.len() > 1 {
            log::debug!("Merging {} buffers", doc.buffers.len());
        }
        for accessor in &mut doc.accessors {
            accessor.buffer = 0;
        }
        if doc.buffers.is_empty() {
            doc.buffers.push(Buffer::default());
        }
        doc.buffers.truncate(1);
        doc.buffers[0].uri = None;
        Ok(())
    }
}
