//! GLB container framing.

use crate::error::{LoadError, SerializeError};

const MAGIC: &[u8; 4] = b"glTF";
const VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F534A;
const CHUNK_BIN: u32 = 0x004E4942;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// True if `data` starts with the GLB magic.
pub fn is_glb(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..4] == MAGIC
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, LoadError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| LoadError::Glb(format!("truncated at byte {}", offset)))
}

/// Split a GLB into its JSON chunk and optional BIN chunk.
pub fn parse(data: &[u8]) -> Result<(&[u8], Option<&[u8]>), LoadError> {
    if !is_glb(data) {
        return Err(LoadError::Glb("missing glTF magic".to_string()));
    }
    let version = read_u32(data, 4)?;
    if version != VERSION {
        return Err(LoadError::Glb(format!("unsupported version {}", version)));
    }
    let length = (read_u32(data, 8)? as usize).min(data.len());

    let mut offset = HEADER_LEN;
    let mut json = None;
    let mut bin = None;
    while offset + CHUNK_HEADER_LEN <= length {
        let chunk_len = read_u32(data, offset)? as usize;
        let chunk_type = read_u32(data, offset + 4)?;
        let start = offset + CHUNK_HEADER_LEN;
        let chunk = data
            .get(start..start.saturating_add(chunk_len))
            .filter(|_| start + chunk_len <= length)
            .ok_or_else(|| LoadError::Glb(format!("chunk at byte {} overruns the file", offset)))?;
        match chunk_type {
            CHUNK_JSON if json.is_none() => json = Some(chunk),
            CHUNK_BIN if bin.is_none() => bin = Some(chunk),
            // Unknown chunks are skipped.
            _ => {}
        }
        offset = start + chunk_len;
    }

    let json = json.ok_or_else(|| LoadError::Glb("missing JSON chunk".to_string()))?;
    Ok((json, bin))
}

/// Assemble a GLB from a JSON document and binary payload.
pub fn assemble(json: &[u8], bin: &[u8]) -> Result<Vec<u8>, SerializeError> {
    // Pad JSON with spaces and BIN with zeros to 4-byte alignment
    let json_padding = (4 - (json.len() % 4)) % 4;
    let padded_json_len = json.len() + json_padding;
    let bin_padding = (4 - (bin.len() % 4)) % 4;
    let padded_bin_len = bin.len() + bin_padding;

    let mut total_size = HEADER_LEN + CHUNK_HEADER_LEN + padded_json_len;
    if !bin.is_empty() {
        total_size += CHUNK_HEADER_LEN + padded_bin_len;
    }
    if total_size > u32::MAX as usize {
        return Err(SerializeError::TooLarge(total_size));
    }

    let mut glb = Vec::with_capacity(total_size);

    glb.extend_from_slice(MAGIC);
    glb.extend_from_slice(&VERSION.to_le_bytes());
    glb.extend_from_slice(&(total_size as u32).to_le_bytes());

    glb.extend_from_slice(&(padded_json_len as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(json);
    glb.extend(std::iter::repeat(0x20u8).take(json_padding));

    if !bin.is_empty() {
        glb.extend_from_slice(&(padded_bin_len as u32).to_le_bytes());
        glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(bin);
        glb.extend(std::iter::repeat(0u8).take(bin_padding));
    }

    Ok(glb)
}
