//! Typed attribute storage.

use gltf_json as json;

/// Number of components per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ElementType {
    pub fn components(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 => 4,
            ElementType::Mat2 => 4,
            ElementType::Mat3 => 9,
            ElementType::Mat4 => 16,
        }
    }

    pub fn from_json(type_: json::accessor::Type) -> Self {
        match type_ {
            json::accessor::Type::Scalar => ElementType::Scalar,
            json::accessor::Type::Vec2 => ElementType::Vec2,
            json::accessor::Type::Vec3 => ElementType::Vec3,
            json::accessor::Type::Vec4 => ElementType::Vec4,
            json::accessor::Type::Mat2 => ElementType::Mat2,
            json::accessor::Type::Mat3 => ElementType::Mat3,
            json::accessor::Type::Mat4 => ElementType::Mat4,
        }
    }

    pub fn to_json(self) -> json::accessor::Type {
        match self {
            ElementType::Scalar => json::accessor::Type::Scalar,
            ElementType::Vec2 => json::accessor::Type::Vec2,
            ElementType::Vec3 => json::accessor::Type::Vec3,
            ElementType::Vec4 => json::accessor::Type::Vec4,
            ElementType::Mat2 => json::accessor::Type::Mat2,
            ElementType::Mat3 => json::accessor::Type::Mat3,
            ElementType::Mat4 => json::accessor::Type::Mat4,
        }
    }
}

/// Storage type of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    /// Size in bytes.
    pub fn size(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::U32 | ComponentType::F32 => 4,
        }
    }

    pub fn from_json(component: json::accessor::ComponentType) -> Self {
        match component {
            json::accessor::ComponentType::I8 => ComponentType::I8,
            json::accessor::ComponentType::U8 => ComponentType::U8,
            json::accessor::ComponentType::I16 => ComponentType::I16,
            json::accessor::ComponentType::U16 => ComponentType::U16,
            json::accessor::ComponentType::U32 => ComponentType::U32,
            json::accessor::ComponentType::F32 => ComponentType::F32,
        }
    }

    pub fn to_json(self) -> json::accessor::ComponentType {
        match self {
            ComponentType::I8 => json::accessor::ComponentType::I8,
            ComponentType::U8 => json::accessor::ComponentType::U8,
            ComponentType::I16 => json::accessor::ComponentType::I16,
            ComponentType::U16 => json::accessor::ComponentType::U16,
            ComponentType::U32 => json::accessor::ComponentType::U32,
            ComponentType::F32 => json::accessor::ComponentType::F32,
        }
    }

    /// Decode one little-endian component. `bytes` must hold at least `size()` bytes.
    pub fn read(self, bytes: &[u8]) -> f64 {
        match self {
            ComponentType::I8 => bytes[0] as i8 as f64,
            ComponentType::U8 => bytes[0] as f64,
            ComponentType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ComponentType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ComponentType::U32 => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            ComponentType::F32 => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
        }
    }

    /// Encode one component, little-endian.
    pub fn write(self, value: f32, out: &mut Vec<u8>) {
        match self {
            ComponentType::I8 => out.push(value.round() as i8 as u8),
            ComponentType::U8 => out.push(value.round() as u8),
            ComponentType::I16 => out.extend_from_slice(&(value.round() as i16).to_le_bytes()),
            ComponentType::U16 => out.extend_from_slice(&(value.round() as u16).to_le_bytes()),
            ComponentType::U32 => out.extend_from_slice(&(value.round() as u32).to_le_bytes()),
            ComponentType::F32 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    /// Map a stored integer to [-1, 1] / [0, 1] per the normalized-integer rules.
    pub fn denormalize(self, value: f32) -> f32 {
        match self {
            ComponentType::I8 => (value / 127.0).max(-1.0),
            ComponentType::U8 => value / 255.0,
            ComponentType::I16 => (value / 32767.0).max(-1.0),
            ComponentType::U16 => value / 65535.0,
            ComponentType::U32 => value / u32::MAX as f32,
            ComponentType::F32 => value,
        }
    }
}

/// A typed array of elements.
///
/// Values hold the stored component values (not denormalized), flattened
/// element by element. Every non-index component type is exact in `f32`;
/// primitive indices are kept separately as `u32`.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub name: Option<String>,
    pub element_type: ElementType,
    pub component_type: ComponentType,
    pub normalized: bool,
    pub values: Vec<f32>,
    /// Write as a sparse accessor.
    pub sparse: bool,
    /// Buffer partition the data belongs to.
    pub buffer: usize,
}

impl Accessor {
    /// Create a float accessor.
    pub fn new(element_type: ElementType, values: Vec<f32>) -> Self {
        Self {
            name: None,
            element_type,
            component_type: ComponentType::F32,
            normalized: false,
            values,
            sparse: false,
            buffer: 0,
        }
    }

    pub fn components(&self) -> usize {
        self.element_type.components()
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.values.len() / self.components()
    }

    /// Stored values of one element.
    pub fn element(&self, index: usize) -> &[f32] {
        let n = self.components();
        &self.values[index * n..(index + 1) * n]
    }

    /// Element values with normalization applied.
    pub fn element_normalized(&self, index: usize) -> Vec<f32> {
        let element = self.element(index);
        if self.normalized {
            element
                .iter()
                .map(|v| self.component_type.denormalize(*v))
                .collect()
        } else {
            element.to_vec()
        }
    }

    /// Element size in bytes, without padding.
    pub fn element_size(&self) -> usize {
        self.components() * self.component_type.size()
    }

    /// New accessor with the same layout whose elements are taken from `order`.
    pub fn gather(&self, order: &[u32]) -> Accessor {
        let n = self.components();
        let mut values = Vec::with_capacity(order.len() * n);
        for &i in order {
            values.extend_from_slice(self.element(i as usize));
        }
        Accessor {
            name: self.name.clone(),
            element_type: self.element_type,
            component_type: self.component_type,
            normalized: self.normalized,
            values,
            sparse: false,
            buffer: self.buffer,
        }
    }

    /// Per-component minimum and maximum.
    pub fn bounds(&self) -> Option<(Vec<f32>, Vec<f32>)> {
        let n = self.components();
        if self.values.is_empty() {
            return None;
        }
        let mut min = vec![f32::INFINITY; n];
        let mut max = vec![f32::NEG_INFINITY; n];
        for element in self.values.chunks_exact(n) {
            for (c, v) in element.iter().enumerate() {
                min[c] = min[c].min(*v);
                max[c] = max[c].max(*v);
            }
        }
        Some((min, max))
    }

    /// Number of elements with at least one non-zero component.
    pub fn non_zero_count(&self) -> usize {
        self.values
            .chunks_exact(self.components())
            .filter(|e| e.iter().any(|v| *v != 0.0))
            .count()
    }

    /// Hashable identity of layout plus value bits.
    pub fn content_key(&self) -> (ElementType, ComponentType, bool, bool, Vec<u32>) {
        (
            self.element_type,
            self.component_type,
            self.normalized,
            self.sparse,
            self.values.iter().map(|v| v.to_bits()).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_element() {
        let acc = Accessor::new(ElementType::Vec3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.element(1), &[3.0, 4.0, 5.0]);
        assert_eq!(acc.element_size(), 12);
    }

    #[test]
    fn test_gather_reorders_elements() {
        let acc = Accessor::new(ElementType::Vec2, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        let gathered = acc.gather(&[2, 0, 2]);
        assert_eq!(gathered.values, vec![2.0, 2.0, 0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_denormalize() {
        let mut acc = Accessor::new(ElementType::Vec4, vec![255.0, 0.0, 51.0, 255.0]);
        acc.component_type = ComponentType::U8;
        acc.normalized = true;
        assert_eq!(acc.element_normalized(0), vec![1.0, 0.0, 0.2, 1.0]);

        assert_eq!(ComponentType::I8.denormalize(-128.0), -1.0);
        assert_eq!(ComponentType::I16.denormalize(32767.0), 1.0);
    }

    #[test]
    fn test_read_write_components() {
        let mut out = Vec::new();
        ComponentType::I16.write(-2.0, &mut out);
        ComponentType::F32.write(1.5, &mut out);
        assert_eq!(ComponentType::I16.read(&out[0..2]), -2.0);
        assert_eq!(ComponentType::F32.read(&out[2..6]), 1.5);
    }

    #[test]
    fn test_bounds_and_non_zero() {
        let acc = Accessor::new(ElementType::Vec2, vec![0.0, 0.0, -1.0, 2.0, 0.0, 0.0]);
        let (min, max) = acc.bounds().unwrap();
        assert_eq!(min, vec![-1.0, 0.0]);
        assert_eq!(max, vec![0.0, 2.0]);
        assert_eq!(acc.non_zero_count(), 1);
    }

    #[test]
    fn test_content_key_distinguishes_negative_zero() {
        let a = Accessor::new(ElementType::Scalar, vec![0.0]);
        let b = Accessor::new(ElementType::Scalar, vec![-0.0]);
        assert_ne!(a.content_key(), b.content_key());
        assert_eq!(a.content_key(), a.clone().content_key());
    }
}
