//! Mark mostly-zero accessors for sparse storage.

use crate::document::Document;
use crate::error::StepError;
use crate::pipeline::TransformStep;

/// Default fraction of non-zero elements below which an accessor is stored sparse.
pub const DEFAULT_SPARSE_RATIO: f32 = 1.0 / 3.0;

#[derive(Debug, Clone, Copy)]
pub struct Sparse {
    pub ratio: f32,
}

impl Default for Sparse {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_SPARSE_RATIO,
        }
    }
}

impl TransformStep for Sparse {
    fn name(&self) -> &'static str {
        "sparse"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let mut marked = 0;
        for accessor in &mut doc.accessors {
            let count = accessor.count();
            if count == 0 {
                continue;
            }
            let sparse = (accessor.non_zero_count() as f32) < self.ratio * count as f32;
            if sparse && !accessor.sparse {
                marked += 1;
            }
            accessor.sparse = sparse;
        }
        log::debug!("{} accessors marked sparse", marked);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Accessor, ElementType};

    #[test]
    fn test_marks_mostly_zero_accessors() {
        let mut doc = Document::new();
        let mut offsets = vec![0.0; 30];
        offsets[4] = 0.5;
        let morph = doc.add_accessor(Accessor::new(ElementType::Vec3, offsets));
        let dense = doc.add_accessor(Accessor::new(ElementType::Scalar, vec![1.0, 2.0, 0.0]));
        let empty = doc.add_accessor(Accessor::new(ElementType::Scalar, Vec::new()));

        Sparse::default().apply(&mut doc).unwrap();

        assert!(doc.accessors[morph].sparse);
        assert!(!doc.accessors[dense].sparse);
        assert!(!doc.accessors[empty].sparse);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut doc = Document::new();
        // Exactly one third non-zero.
        let id = doc.add_accessor(Accessor::new(ElementType::Scalar, vec![1.0, 0.0, 0.0]));
        Sparse::default().apply(&mut doc).unwrap();
        assert!(!doc.accessors[id].sparse);
    }
}
