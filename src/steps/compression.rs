//! Request `EXT_meshopt_compression` for the written geometry.

use crate::document::{Document, GeometryCompression};
use crate::error::StepError;
use crate::pipeline::TransformStep;

/// Geometry is encoded when the document is written; this step only records the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshoptCompression;

impl TransformStep for MeshoptCompression {
    fn name(&self) -> &'static str {
        "meshopt"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        doc.geometry_compression = Some(GeometryCompression::Meshopt);
        Ok(())
    }
}
