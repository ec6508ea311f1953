//! contracted.bin format - one finished hierarchy
//!
//! Format (little-endian):
//!
//! Header (24 bytes):
//!   magic:        u32 = 0x43484442  // "CHDB"
//!   version:      u16 = 1
//!   mode:         u8                // 0 = vertex-based, 1 = edge-based
//!   reserved:     u8
//!   cap:          u32               // inner sequence bound
//!   vertex_count: u32
//!   edge_count:   u64
//!
//! Body:
//!   levels: [vertex_count]u32
//!   edges:  [edge_count]Edge
//!
//! Edge:
//!   from:   u32
//!   to:     u32
//!   weight: f32
//!   flags:  u8   // bit0 = shortcut, bit1 = restricted, bit2 = superseded
//!   original: base_edge u32
//!   shortcut: via u32, children [2]u32,
//!             seq1_len u32, seq1 [seq1_len]u32,
//!             seq2_len u32, seq2 [seq2_len]u32
//!
//! Footer (16 bytes):
//!   body_crc64:    u64
//!   file_crc64:    u64
//!
//! The up/down topology is rebuilt from levels and edges on load.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::crc::{self, ChecksumWriter};
use super::le::Cursor;
use crate::contracted::{ContractedDb, ContractionMode};
use crate::error::{Error, Result};
use crate::graph::{DirectedEdge, EdgeKind};

const MAGIC: u32 = 0x43484442; // "CHDB"
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 24; // 4 + 2 + 1 + 1 + 4 + 4 + 8

const FLAG_SHORTCUT: u8 = 1;
const FLAG_RESTRICTED: u8 = 1 << 1;
const FLAG_SUPERSEDED: u8 = 1 << 2;

struct Header {
    mode: ContractionMode,
    cap: u32,
    vertex_count: u32,
    edge_count: u64,
}

fn parse_header(data: &[u8], path: &Path) -> Result<Header> {
    let mut cursor = Cursor::new(data.get(..HEADER_SIZE).ok_or_else(|| {
        Error::corrupt(format!("{}: file too small for header", path.display()))
    })?);
    let magic = cursor.u32()?;
    if magic != MAGIC {
        return Err(Error::corrupt(format!(
            "invalid magic in {}: expected 0x{MAGIC:08x}, got 0x{magic:08x}",
            path.display()
        )));
    }
    let version = cursor.u16()?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion {
            format: "contracted",
            found: version as u32,
            supported: VERSION as u32,
        });
    }
    let mode = match cursor.u8()? {
        0 => ContractionMode::VertexBased,
        1 => ContractionMode::EdgeBased,
        other => {
            return Err(Error::corrupt(format!(
                "{}: unknown contraction mode {other}",
                path.display()
            )))
        }
    };
    let _reserved = cursor.u8()?;
    Ok(Header {
        mode,
        cap: cursor.u32()?,
        vertex_count: cursor.u32()?,
        edge_count: cursor.u64()?,
    })
}

fn encode_edge(buf: &mut Vec<u8>, edge: &DirectedEdge) -> Result<()> {
    let mut flags = 0u8;
    if edge.is_shortcut() {
        flags |= FLAG_SHORTCUT;
    }
    if edge.restricted {
        flags |= FLAG_RESTRICTED;
    }
    if edge.superseded {
        flags |= FLAG_SUPERSEDED;
    }

    buf.extend_from_slice(&edge.from.to_le_bytes());
    buf.extend_from_slice(&edge.to.to_le_bytes());
    buf.extend_from_slice(&edge.weight.to_le_bytes());
    buf.push(flags);
    match &edge.kind {
        EdgeKind::Original { base_edge } => buf.extend_from_slice(&base_edge.to_le_bytes()),
        EdgeKind::Shortcut {
            via,
            children,
            seq1,
            seq2,
        } => {
            buf.extend_from_slice(&via.to_le_bytes());
            buf.extend_from_slice(&children[0].to_le_bytes());
            buf.extend_from_slice(&children[1].to_le_bytes());
            for seq in [seq1, seq2] {
                let len = u32::try_from(seq.len())
                    .map_err(|_| Error::invalid_operation("inner sequence too long"))?;
                buf.extend_from_slice(&len.to_le_bytes());
                for v in seq {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
    }
    Ok(())
}

fn decode_edge(cursor: &mut Cursor<'_>) -> Result<DirectedEdge> {
    let from = cursor.u32()?;
    let to = cursor.u32()?;
    let weight = cursor.f32()?;
    let flags = cursor.u8()?;
    let kind = if flags & FLAG_SHORTCUT != 0 {
        let via = cursor.u32()?;
        let children = [cursor.u32()?, cursor.u32()?];
        let len = cursor.u32()? as usize;
        let seq1 = cursor.u32_vec(len)?;
        let len = cursor.u32()? as usize;
        let seq2 = cursor.u32_vec(len)?;
        EdgeKind::Shortcut {
            via,
            children,
            seq1,
            seq2,
        }
    } else {
        EdgeKind::Original {
            base_edge: cursor.u32()?,
        }
    };
    Ok(DirectedEdge {
        from,
        to,
        weight,
        kind,
        restricted: flags & FLAG_RESTRICTED != 0,
        superseded: flags & FLAG_SUPERSEDED != 0,
    })
}

pub struct ContractedDbFile;

impl ContractedDbFile {
    pub fn write<P: AsRef<Path>>(path: P, db: &ContractedDb) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        Self::write_to(writer, db)?;
        Ok(())
    }

    /// Serialize into any writer; returns the writer after the footer
    pub fn write_to<W: Write>(writer: W, db: &ContractedDb) -> Result<W> {
        let cap = u32::try_from(db.cap()).map_err(|_| Error::invalid_operation("sequence cap too large"))?;
        let mode: u8 = match db.mode() {
            ContractionMode::VertexBased => 0,
            ContractionMode::EdgeBased => 1,
        };

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.push(mode);
        header.push(0);
        header.extend_from_slice(&cap.to_le_bytes());
        header.extend_from_slice(&db.vertex_count().to_le_bytes());
        header.extend_from_slice(&(db.edges().len() as u64).to_le_bytes());
        debug_assert_eq!(header.len(), HEADER_SIZE);

        let mut writer = ChecksumWriter::new(writer);
        writer.write_header(&header)?;
        super::le::write_u32_slice(&mut writer, db.levels())?;

        let mut buf = Vec::with_capacity(64);
        for edge in db.edges() {
            buf.clear();
            encode_edge(&mut buf, edge)?;
            writer.write_all(&buf)?;
        }
        Ok(writer.finish()?)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<ContractedDb> {
        let data = std::fs::read(path.as_ref())?;
        Self::read_from(&data, path.as_ref())
    }

    fn read_from(data: &[u8], path: &Path) -> Result<ContractedDb> {
        let header = parse_header(data, path)?;
        let body = crc::verify_footer(data, HEADER_SIZE, &path.display().to_string())?;

        let mut cursor = Cursor::new(body);
        let levels = cursor.u32_vec(header.vertex_count as usize)?;
        let edge_count = usize::try_from(header.edge_count)
            .map_err(|_| Error::corrupt(format!("{}: edge count too large", path.display())))?;
        // every edge takes at least 17 bytes
        if edge_count > cursor.remaining() / 17 {
            return Err(Error::corrupt(format!(
                "{}: {edge_count} edges cannot fit in {} bytes",
                path.display(),
                cursor.remaining()
            )));
        }
        let mut edges = Vec::with_capacity(edge_count);
        for _ in 0..edge_count {
            edges.push(decode_edge(&mut cursor)?);
        }
        if cursor.remaining() != 0 {
            return Err(Error::corrupt(format!(
                "{}: {} trailing body bytes",
                path.display(),
                cursor.remaining()
            )));
        }

        for (id, edge) in edges.iter().enumerate() {
            if edge.from >= header.vertex_count || edge.to >= header.vertex_count {
                return Err(Error::corrupt(format!(
                    "{}: edge {id} references a vertex outside 0..{}",
                    path.display(),
                    header.vertex_count
                )));
            }
            if let EdgeKind::Shortcut { children, .. } = &edge.kind {
                if children.iter().any(|&c| c as usize >= edge_count) {
                    return Err(Error::corrupt(format!(
                        "{}: shortcut {id} references a missing child",
                        path.display()
                    )));
                }
            }
        }

        Ok(ContractedDb::new(header.mode, header.cap as usize, levels, edges))
    }

    /// Check header, checksums and that the body decodes
    pub fn verify<P: AsRef<Path>>(path: P) -> Result<()> {
        let db = Self::read(path.as_ref())?;
        tracing::debug!(
            path = %path.as_ref().display(),
            vertices = db.vertex_count(),
            edges = db.edges().len(),
            shortcuts = db.shortcut_count(),
            "contracted file verified"
        );
        Ok(())
    }
}
