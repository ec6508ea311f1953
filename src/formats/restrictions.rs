//! restrictions.bin format - one restrictions db
//!
//! Format (little-endian):
//!
//! Header (28 bytes):
//!   magic:             u32 = 0x52535452  // "RSTR"
//!   version:           u16 = 1
//!   flags:             u16               // bit0 = has complex restrictions
//!   hash_count:        u32
//!   restriction_count: u64
//!   index_len:         u32
//!   restrictions_len:  u32
//!
//! Body:
//!   hashes:       [2 * hash_count]u32
//!   index:        [index_len]u32
//!   restrictions: [restrictions_len]u32
//!
//! Footer (16 bytes):
//!   body_crc64:    u64
//!   file_crc64:    u64

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::crc::{self, ChecksumWriter};
use super::le::{self, Cursor};
use crate::error::{Error, Result};
use crate::restrictions::RestrictionsDb;

const MAGIC: u32 = 0x52535452; // "RSTR"
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 28; // 4 + 2 + 2 + 4 + 8 + 4 + 4
const FLAG_COMPLEX: u16 = 1;

struct Header {
    flags: u16,
    hash_count: u32,
    restriction_count: u64,
    index_len: u32,
    restrictions_len: u32,
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
            format: "restrictions",
            found: version as u32,
            supported: VERSION as u32,
        });
    }
    Ok(Header {
        flags: cursor.u16()?,
        hash_count: cursor.u32()?,
        restriction_count: cursor.u64()?,
        index_len: cursor.u32()?,
        restrictions_len: cursor.u32()?,
    })
}

pub struct RestrictionsFile;

impl RestrictionsFile {
    pub fn write<P: AsRef<Path>>(path: P, db: &RestrictionsDb) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        Self::write_to(writer, db)?;
        Ok(())
    }

    /// Serialize into any writer; returns the writer after the footer
    pub fn write_to<W: Write>(writer: W, db: &RestrictionsDb) -> Result<W> {
        let (hashes, index, restrictions) = db.raw_parts();
        let index_len = u32::try_from(index.len())
            .map_err(|_| Error::invalid_operation("restriction index too large"))?;
        let restrictions_len = u32::try_from(restrictions.len())
            .map_err(|_| Error::invalid_operation("restriction arena too large"))?;
        let flags = if db.has_complex_restrictions() { FLAG_COMPLEX } else { 0 };

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&flags.to_le_bytes());
        header.extend_from_slice(&(db.hash_count() as u32).to_le_bytes());
        header.extend_from_slice(&db.len().to_le_bytes());
        header.extend_from_slice(&index_len.to_le_bytes());
        header.extend_from_slice(&restrictions_len.to_le_bytes());
        debug_assert_eq!(header.len(), HEADER_SIZE);

        let mut writer = ChecksumWriter::new(writer);
        writer.write_header(&header)?;
        le::write_u32_slice(&mut writer, hashes)?;
        le::write_u32_slice(&mut writer, index)?;
        le::write_u32_slice(&mut writer, restrictions)?;
        Ok(writer.finish()?)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<RestrictionsDb> {
        let data = std::fs::read(path.as_ref())?;
        Self::read_from(&data, path.as_ref())
    }

    fn read_from(data: &[u8], path: &Path) -> Result<RestrictionsDb> {
        let header = parse_header(data, path)?;
        let body = crc::verify_footer(data, HEADER_SIZE, &path.display().to_string())?;

        let hash_count = header.hash_count as usize;
        let expected = (hash_count * 2 + header.index_len as usize + header.restrictions_len as usize) * 4;
        if body.len() != expected {
            return Err(Error::corrupt(format!(
                "size mismatch in {}: expected {expected} body bytes, got {}",
                path.display(),
                body.len()
            )));
        }

        let mut cursor = Cursor::new(body);
        let hashes = cursor.u32_vec(hash_count * 2)?;
        let index = cursor.u32_vec(header.index_len as usize)?;
        let restrictions = cursor.u32_vec(header.restrictions_len as usize)?;

        let db = RestrictionsDb::from_raw_parts(
            hash_count,
            hashes,
            index,
            restrictions,
            header.restriction_count,
        )?;
        if db.has_complex_restrictions() != (header.flags & FLAG_COMPLEX != 0) {
            return Err(Error::corrupt(format!(
                "{}: complex-restriction flag does not match content",
                path.display()
            )));
        }
        Ok(db)
    }

    /// Check magic, version, sizes and both checksums
    pub fn verify<P: AsRef<Path>>(path: P) -> Result<()> {
        let data = std::fs::read(path.as_ref())?;
        let header = parse_header(&data, path.as_ref())?;
        let body = crc::verify_footer(&data, HEADER_SIZE, &path.as_ref().display().to_string())?;
        let expected = (header.hash_count as usize * 2
            + header.index_len as usize
            + header.restrictions_len as usize)
            * 4;
        if body.len() != expected {
            return Err(Error::corrupt(format!(
                "size mismatch in {}: expected {expected} body bytes, got {}",
                path.as_ref().display(),
                body.len()
            )));
        }
        tracing::debug!(
            path = %path.as_ref().display(),
            restrictions = header.restriction_count,
            bytes = data.len(),
            "restrictions file verified"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RestrictionsDb {
        let mut db = RestrictionsDb::new(64);
        db.add(&[1, 2, 3]).unwrap();
        db.add(&[7]).unwrap();
        db.add(&[3, 65]).unwrap();
        db
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restrictions.bin");
        let db = sample();
        RestrictionsFile::write(&path, &db).unwrap();
        RestrictionsFile::verify(&path).unwrap();

        let restored = RestrictionsFile::read(&path).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.hash_count(), 64);
        assert!(restored.has_complex_restrictions());
        for v in [1, 2, 3, 7, 65] {
            let a: Vec<&[u32]> = db.restrictions_for(v).collect();
            let b: Vec<&[u32]> = restored.restrictions_for(v).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_restored_db_accepts_more_restrictions() {
        let bytes = RestrictionsFile::write_to(Vec::new(), &sample()).unwrap();
        let mut restored = RestrictionsFile::read_from(&bytes, Path::new("mem")).unwrap();
        restored.add(&[3, 4]).unwrap();
        assert_eq!(restored.restrictions_for(3).count(), 3);
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = RestrictionsFile::write_to(Vec::new(), &sample()).unwrap();
        let at = HEADER_SIZE + 4;
        bytes[at] ^= 0x55;
        assert!(matches!(
            RestrictionsFile::read_from(&bytes, Path::new("mem")),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let bytes = RestrictionsFile::write_to(Vec::new(), &sample()).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            RestrictionsFile::read_from(&bad_magic, Path::new("mem")),
            Err(Error::Corrupt(_))
        ));

        let mut bad_version = bytes;
        bad_version[4] = 9;
        assert!(matches!(
            RestrictionsFile::read_from(&bad_version, Path::new("mem")),
            Err(Error::UnsupportedVersion { found: 9, .. })
        ));
    }
}
