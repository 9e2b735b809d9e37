//! `EXT_meshopt_compression` bitstreams via the meshoptimizer codec.
//!
//! Triangle lists go through the safe `meshopt` index codec. The vertex
//! encoders are generic over a vertex type while buffer views have arbitrary
//! strides, and index sequences have no safe wrapper, so those two use the
//! raw entry points.

use meshopt::ffi;

/// Compression mode of a buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Attributes,
    Triangles,
    Indices,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Attributes => "ATTRIBUTES",
            Mode::Triangles => "TRIANGLES",
            Mode::Indices => "INDICES",
        }
    }

    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "ATTRIBUTES" => Some(Mode::Attributes),
            "TRIANGLES" => Some(Mode::Triangles),
            "INDICES" => Some(Mode::Indices),
            _ => None,
        }
    }
}

fn check_stride(stride: usize) -> Result<(), String> {
    if stride == 0 || stride % 4 != 0 || stride > 256 {
        return Err(format!("unsupported vertex stride {}", stride));
    }
    Ok(())
}

/// Encode `count` elements of `stride` bytes.
pub fn encode_vertices(data: &[u8], count: usize, stride: usize) -> Result<Vec<u8>, String> {
    check_stride(stride)?;
    if data.len() != count * stride {
        return Err(format!("expected {} bytes, got {}", count * stride, data.len()));
    }
    #[allow(unsafe_code)]
    let encoded = unsafe {
        let bound = ffi::meshopt_encodeVertexBufferBound(count, stride);
        let mut buffer = vec![0u8; bound];
        let size = ffi::meshopt_encodeVertexBuffer(
            buffer.as_mut_ptr(),
            buffer.len(),
            data.as_ptr().cast(),
            count,
            stride,
        );
        buffer.truncate(size);
        buffer
    };
    if encoded.is_empty() && count > 0 {
        return Err("vertex encoder produced no output".to_string());
    }
    Ok(encoded)
}

/// Encode a triangle list.
pub fn encode_triangles(indices: &[u32], vertex_count: usize) -> Result<Vec<u8>, String> {
    if indices.len() % 3 != 0 {
        return Err(format!("{} indices do not form triangles", indices.len()));
    }
    let encoded = meshopt::encode_index_buffer(indices, vertex_count).map_err(|e| e.to_string())?;
    if encoded.is_empty() && !indices.is_empty() {
        return Err("index encoder produced no output".to_string());
    }
    Ok(encoded)
}

/// Encode an arbitrary index sequence (points, lines, strips).
pub fn encode_index_sequence(indices: &[u32], vertex_count: usize) -> Result<Vec<u8>, String> {
    #[allow(unsafe_code)]
    let encoded = unsafe {
        let bound = ffi::meshopt_encodeIndexSequenceBound(indices.len(), vertex_count);
        let mut buffer = vec![0u8; bound];
        let size = ffi::meshopt_encodeIndexSequence(
            buffer.as_mut_ptr(),
            buffer.len(),
            indices.as_ptr(),
            indices.len(),
        );
        buffer.truncate(size);
        buffer
    };
    if encoded.is_empty() && !indices.is_empty() {
        return Err("index sequence encoder produced no output".to_string());
    }
    Ok(encoded)
}

/// Decode a compressed view into `count * stride` bytes.
pub fn decode(mode: Mode, source: &[u8], count: usize, stride: usize) -> Result<Vec<u8>, String> {
    let len = count
        .checked_mul(stride)
        .ok_or_else(|| format!("{} elements of {} bytes overflow", count, stride))?;
    if mode != Mode::Attributes && stride != 2 && stride != 4 {
        return Err(format!("unsupported index size {}", stride));
    }
    match mode {
        Mode::Attributes => {
            check_stride(stride)?;
            let mut out = vec![0u8; len];
            #[allow(unsafe_code)]
            let status = unsafe {
                ffi::meshopt_decodeVertexBuffer(
                    out.as_mut_ptr().cast(),
                    count,
                    stride,
                    source.as_ptr(),
                    source.len(),
                )
            };
            check_status(mode, status)?;
            Ok(out)
        }
        Mode::Triangles => {
            if count % 3 != 0 {
                return Err(format!("{} indices do not form triangles", count));
            }
            let corrupt = |e: meshopt::Error| format!("{} stream is corrupt ({})", mode.as_str(), e);
            if stride == 2 {
                let indices = meshopt::decode_index_buffer::<u16>(source, count).map_err(corrupt)?;
                Ok(bytemuck::cast_slice::<_, u8>(&indices).to_vec())
            } else {
                let indices = meshopt::decode_index_buffer::<u32>(source, count).map_err(corrupt)?;
                Ok(bytemuck::cast_slice::<_, u8>(&indices).to_vec())
            }
        }
        Mode::Indices => {
            let mut out = vec![0u8; len];
            #[allow(unsafe_code)]
            let status = unsafe {
                ffi::meshopt_decodeIndexSequence(
                    out.as_mut_ptr().cast(),
                    count,
                    stride,
                    source.as_ptr(),
                    source.len(),
                )
            };
            check_status(mode, status)?;
            Ok(out)
        }
    }
}

fn check_status(mode: Mode, status: i32) -> Result<(), String> {
    if status != 0 {
        return Err(format!("{} stream is corrupt (code {})", mode.as_str(), status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertices_survive_encoding() {
        let values: Vec<f32> = (0..60).map(|i| i as f32 * 0.25).collect();
        let bytes: Vec<u8> = bytemuck::cast_slice(&values).to_vec();
        let encoded = encode_vertices(&bytes, 20, 12).unwrap();
        let decoded = decode(Mode::Attributes, &encoded, 20, 12).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn test_triangles_survive_encoding() {
        let indices: Vec<u32> = vec![0, 1, 2, 2, 1, 3, 3, 1, 4];
        let encoded = encode_triangles(&indices, 5).unwrap();
        let decoded = decode(Mode::Triangles, &encoded, indices.len(), 4).unwrap();
        let decoded: Vec<u32> = decoded
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        // Triangles may be rotated but keep their winding
        for (a, b) in decoded.chunks(3).zip(indices.chunks(3)) {
            let rotations = [[b[0], b[1], b[2]], [b[1], b[2], b[0]], [b[2], b[0], b[1]]];
            assert!(rotations.iter().any(|r| r == a));
        }
    }

    #[test]
    fn test_bad_stride_and_corrupt_input() {
        assert!(encode_vertices(&[0; 6], 1, 6).is_err());
        assert!(decode(Mode::Attributes, &[0xff; 3], 4, 12).is_err());
        assert!(encode_triangles(&[0, 1], 2).is_err());
        assert!(decode(Mode::Triangles, &[0xff; 4], 3, 2).is_err());
    }

    #[test]
    fn test_short_triangles_decode() {
        let indices: Vec<u32> = vec![0, 1, 2, 1, 3, 2];
        let encoded = encode_triangles(&indices, 4).unwrap();
        let decoded = decode(Mode::Triangles, &encoded, indices.len(), 2).unwrap();
        assert_eq!(decoded.len(), indices.len() * 2);
        let decoded: Vec<u32> = decoded
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
            .collect();
        let mut sorted = decoded.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 1, 2, 2, 3]);
    }

    #[test]
    fn test_overflowing_size_is_rejected() {
        assert!(decode(Mode::Indices, &[0; 8], usize::MAX, 4).is_err());
        assert!(decode(Mode::Attributes, &[0; 8], usize::MAX / 2, 12).is_err());
    }
}
