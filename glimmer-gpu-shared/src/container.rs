//! Binary scene container framing.
//!
//! A container is a 12-byte header followed by exactly two chunks: the
//! structured metadata (JSON) first, then the binary payload. Parsing never
//! copies: the returned [`Container`] borrows both chunk payloads from the
//! input buffer.

use std::ops::Range;

use crate::document::Document;
use crate::error::{Result, SceneError};

/// `glTF` read as a little-endian u32.
pub const CONTAINER_MAGIC: u32 = 0x4654_6C67;
pub const CONTAINER_VERSION: u32 = 2;
/// `JSON` read as a little-endian u32.
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// `BIN\0` read as a little-endian u32.
pub const CHUNK_BIN: u32 = 0x004E_4942;

pub const HEADER_LEN: usize = 12;
pub const CHUNK_HEADER_LEN: usize = 8;

/// File header (12 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: u32,
    pub version: u32,
    pub total_length: u32,
}

/// Chunk header (8 bytes) preceding every chunk payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub length: u32,
    pub tag: u32,
}

/// A validated container whose chunk payloads borrow the source bytes.
#[derive(Clone, Copy, Debug)]
pub struct Container<'a> {
    pub header: ContainerHeader,
    pub json: &'a [u8],
    pub bin: &'a [u8],
    json_offset: usize,
    bin_offset: usize,
}

impl<'a> Container<'a> {
    /// Byte range of the metadata chunk payload within the source buffer.
    pub fn json_range(&self) -> Range<usize> {
        self.json_offset..self.json_offset + self.json.len()
    }

    /// Byte range of the binary payload within the source buffer.
    pub fn bin_range(&self) -> Range<usize> {
        self.bin_offset..self.bin_offset + self.bin.len()
    }

    /// Metadata chunk as text, without the trailing space/NUL padding.
    pub fn json_text(&self) -> Result<&'a str> {
        let end = self
            .json
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1);
        std::str::from_utf8(&self.json[..end])
            .map_err(|e| SceneError::MalformedMetadata(format!("metadata chunk is not UTF-8: {e}")))
    }

    /// Decode and validate the metadata chunk.
    pub fn document(&self) -> Result<Document> {
        Document::from_json(self.json_text()?)
    }
}

// ── Cursor-based reader ──

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn read_chunk_header(&mut self) -> Option<ChunkHeader> {
        let length = self.read_u32()?;
        let tag = self.read_u32()?;
        Some(ChunkHeader { length, tag })
    }

    fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        if end <= self.data.len() {
            let slice = &self.data[self.pos..end];
            self.pos = end;
            Some(slice)
        } else {
            None
        }
    }
}

/// Render a chunk tag for error messages (`JSON`, `BIN`, or hex).
fn tag_name(tag: u32) -> String {
    let bytes = tag.to_le_bytes();
    let trimmed: Vec<u8> = bytes.iter().copied().take_while(|&b| b != 0).collect();
    if !trimmed.is_empty() && trimmed.iter().all(|b| b.is_ascii_graphic()) {
        String::from_utf8_lossy(&trimmed).into_owned()
    } else {
        format!("{tag:#010x}")
    }
}

/// Parse and validate the 12-byte header.
pub fn parse_header(data: &[u8]) -> Result<ContainerHeader> {
    let mut c = Cursor::new(data);
    let (Some(magic), Some(version), Some(total_length)) = (c.read_u32(), c.read_u32(), c.read_u32())
    else {
        return Err(SceneError::InvalidContainer(format!(
            "header needs {HEADER_LEN} bytes, got {}",
            data.len()
        )));
    };
    if magic != CONTAINER_MAGIC {
        return Err(SceneError::InvalidContainer(format!("bad magic {magic:#010x}")));
    }
    if (total_length as usize) < HEADER_LEN || total_length as usize > data.len() {
        return Err(SceneError::InvalidContainer(format!(
            "declared length {total_length} does not fit {} available bytes",
            data.len()
        )));
    }
    Ok(ContainerHeader { magic, version, total_length })
}

/// Read one chunk, returning its payload offset (relative to the cursor data) and bytes.
fn read_chunk<'a>(c: &mut Cursor<'a>, expected: u32) -> Result<(usize, &'a [u8])> {
    if c.remaining() == 0 {
        return Err(SceneError::UnsupportedContainer(format!("missing {} chunk", tag_name(expected))));
    }
    let ChunkHeader { length, tag } = c
        .read_chunk_header()
        .ok_or_else(|| SceneError::InvalidContainer("truncated chunk header".into()))?;
    if tag != expected {
        return Err(SceneError::UnsupportedContainer(format!(
            "expected {} chunk, found {}",
            tag_name(expected),
            tag_name(tag)
        )));
    }
    let offset = c.pos;
    let payload = c.read_bytes(length as usize).ok_or_else(|| {
        SceneError::InvalidContainer(format!(
            "{} chunk of {length} bytes runs past the end of the container",
            tag_name(tag)
        ))
    })?;
    Ok((offset, payload))
}

/// Validate the container framing and split it into its two chunks.
///
/// Bytes past the header's declared total length are ignored.
pub fn parse_container(data: &[u8]) -> Result<Container<'_>> {
    let header = parse_header(data)?;
    let data = &data[..header.total_length as usize];
    if header.version != CONTAINER_VERSION {
        log::warn!("container version {} (expected {CONTAINER_VERSION})", header.version);
    }

    let mut c = Cursor::new(data);
    c.pos = HEADER_LEN;
    let (json_offset, json) = read_chunk(&mut c, CHUNK_JSON)?;
    let (bin_offset, bin) = read_chunk(&mut c, CHUNK_BIN)?;
    if c.remaining() > 0 {
        return Err(SceneError::UnsupportedContainer(format!(
            "{} unexpected bytes after the BIN chunk",
            c.remaining()
        )));
    }

    Ok(Container { header, json, bin, json_offset, bin_offset })
}

/// Parse a container and decode its metadata.
pub fn parse(data: &[u8]) -> Result<(Document, Container<'_>)> {
    let container = parse_container(data)?;
    let document = container.document()?;
    Ok((document, container))
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Serialize a two-chunk container.
///
/// The metadata chunk is padded with spaces and the binary chunk with zeros
/// so both payloads stay 4-byte aligned.
pub fn write_container(json: &[u8], bin: &[u8]) -> Vec<u8> {
    let json_len = padded_len(json.len());
    let bin_len = padded_len(bin.len());
    let total = HEADER_LEN + 2 * CHUNK_HEADER_LEN + json_len + bin_len;

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&CONTAINER_MAGIC.to_le_bytes());
    buf.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    buf.extend_from_slice(&(total as u32).to_le_bytes());

    buf.extend_from_slice(&(json_len as u32).to_le_bytes());
    buf.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    buf.extend_from_slice(json);
    buf.resize(buf.len() + json_len - json.len(), b' ');

    buf.extend_from_slice(&(bin_len as u32).to_le_bytes());
    buf.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    buf.extend_from_slice(bin);
    buf.resize(buf.len() + bin_len - bin.len(), 0);

    buf
}
