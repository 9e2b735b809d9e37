//! Remove redundant animation keyframes.

use crate::document::{AnimationPath, Document, Interpolation};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use glam::Quat;

/// Default per-component tolerance.
pub const DEFAULT_RESAMPLE_TOLERANCE: f32 = 1e-4;

/// Drops keyframes of LINEAR and STEP samplers that interpolation already
/// reproduces within `tolerance`. The first and last keyframes are always
/// kept. CUBICSPLINE samplers are not touched.
#[derive(Debug, Clone, Copy)]
pub struct Resample {
    pub tolerance: f32,
}

impl Default for Resample {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_RESAMPLE_TOLERANCE,
        }
    }
}

impl TransformStep for Resample {
    fn name(&self) -> &'static str {
        "resample"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let mut removed = 0;
        for a in 0..doc.animations.len() {
            for s in 0..doc.animations[a].samplers.len() {
                let animation = &doc.animations[a];
                let sampler = &animation.samplers[s];
                if sampler.interpolation == Interpolation::CubicSpline {
                    continue;
                }
                let rotation = animation
                    .channels
                    .iter()
                    .any(|c| c.sampler == s && c.path == AnimationPath::Rotation);

                let input = &doc.accessors[sampler.input];
                let output = &doc.accessors[sampler.output];
                let keyframes = input.count();
                if keyframes < 3 || output.count() % keyframes != 0 {
                    continue;
                }
                // Elements per keyframe (morph weights have one per target).
                let group = output.count() / keyframes;
                let times: Vec<f32> = (0..keyframes).map(|i| input.element_normalized(i)[0]).collect();
                let values: Vec<Vec<f32>> = (0..keyframes)
                    .map(|k| {
                        (k * group..(k + 1) * group)
                            .flat_map(|e| output.element_normalized(e))
                            .collect()
                    })
                    .collect();

                let kept = keep_keyframes(
                    &times,
                    &values,
                    sampler.interpolation,
                    rotation && output.components() == 4,
                    self.tolerance,
                );
                if kept.len() == keyframes {
                    continue;
                }
                removed += keyframes - kept.len();

                let output_order: Vec<u32> = kept
                    .iter()
                    .flat_map(|&k| (k * group..(k + 1) * group).map(|e| e as u32))
                    .collect();
                let input_order: Vec<u32> = kept.iter().map(|&k| k as u32).collect();
                let new_input = input.gather(&input_order);
                let new_output = output.gather(&output_order);

                let input_id = doc.add_accessor(new_input);
                let output_id = doc.add_accessor(new_output);
                let sampler = &mut doc.animations[a].samplers[s];
                sampler.input = input_id;
                sampler.output = output_id;
            }
        }
        if removed > 0 {
            log::debug!("Removed {} redundant keyframes", removed);
        }
        Ok(())
    }
}

/// Indices of the keyframes to keep.
fn keep_keyframes(
    times: &[f32],
    values: &[Vec<f32>],
    interpolation: Interpolation,
    slerp: bool,
    tolerance: f32,
) -> Vec<usize> {
    let last = times.len() - 1;
    let mut kept = vec![0];
    for i in 1..last {
        let previous = *kept.last().unwrap_or(&0);
        let keep = match interpolation {
            Interpolation::Step => !within(&values[i], &values[previous], tolerance),
            _ => {
                let (t0, t1) = (times[previous], times[i + 1]);
                if t1 <= t0 {
                    true
                } else {
                    let t = (times[i] - t0) / (t1 - t0);
                    let expected = interpolate(&values[previous], &values[i + 1], t, slerp);
                    !within(&values[i], &expected, tolerance)
                }
            }
        };
        if keep {
            kept.push(i);
        }
    }
    kept.push(last);
    kept
}

fn interpolate(a: &[f32], b: &[f32], t: f32, slerp: bool) -> Vec<f32> {
    if slerp {
        let qa = Quat::from_slice(a).normalize();
        let qb = Quat::from_slice(b).normalize();
        return qa.slerp(qb, t).to_array().to_vec();
    }
    a.iter().zip(b).map(|(x, y)| x + (y - x) * t).collect()
}

fn within(a: &[f32], b: &[f32], tolerance: f32) -> bool {
    let direct = a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance);
    // q and -q are the same rotation.
    direct || (a.len() == 4 && a.iter().zip(b).all(|(x, y)| (x + y).abs() <= tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Accessor, Animation, AnimationChannel, AnimationSampler, ElementType};
    use crate::testing;

    fn animate(doc: &mut Document, times: Vec<f32>, values: Vec<f32>, path: AnimationPath, interpolation: Interpolation) {
        let element = if path == AnimationPath::Rotation {
            ElementType::Vec4
        } else {
            ElementType::Vec3
        };
        let input = doc.add_accessor(Accessor::new(ElementType::Scalar, times));
        let output = doc.add_accessor(Accessor::new(element, values));
        doc.animations.push(Animation {
            name: None,
            channels: vec![AnimationChannel { sampler: 0, node: 0, path }],
            samplers: vec![AnimationSampler {
                input,
                output,
                interpolation,
            }],
        });
    }

    fn keyframe_count(doc: &Document) -> usize {
        doc.accessors[doc.animations[0].samplers[0].input].count()
    }

    #[test]
    fn test_linear_midpoints_removed() {
        let mut doc = testing::triangle_document();
        animate(
            &mut doc,
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            AnimationPath::Translation,
            Interpolation::Linear,
        );
        Resample::default().apply(&mut doc).unwrap();

        let sampler = &doc.animations[0].samplers[0];
        assert_eq!(doc.accessors[sampler.input].values, vec![0.0, 3.0, 4.0]);
        assert_eq!(doc.accessors[sampler.output].element(1), &[3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_step_keeps_changes_only() {
        let mut doc = testing::triangle_document();
        animate(
            &mut doc,
            vec![0.0, 1.0, 2.0, 3.0],
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0],
            AnimationPath::Scale,
            Interpolation::Step,
        );
        Resample::default().apply(&mut doc).unwrap();
        assert_eq!(doc.accessors[doc.animations[0].samplers[0].input].values, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rotation_uses_slerp() {
        let mut doc = testing::triangle_document();
        let half = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let full = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let mut values = Vec::new();
        for q in [Quat::IDENTITY, half, full] {
            values.extend_from_slice(&q.to_array());
        }
        animate(
            &mut doc,
            vec![0.0, 0.5, 1.0],
            values,
            AnimationPath::Rotation,
            Interpolation::Linear,
        );
        Resample::default().apply(&mut doc).unwrap();
        assert_eq!(keyframe_count(&doc), 2);
    }

    #[test]
    fn test_varying_keyframes_kept() {
        let mut doc = testing::triangle_document();
        animate(
            &mut doc,
            vec![0.0, 1.0, 2.0],
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            AnimationPath::Translation,
            Interpolation::Linear,
        );
        Resample::default().apply(&mut doc).unwrap();
        assert_eq!(keyframe_count(&doc), 3);
    }
}
