//! CRC-64-ISO checksums and the body/file footer shared by all files

use std::io::{self, Write};

use crc::{Crc, CRC_64_GO_ISO};

use crate::error::{Error, Result};

/// CRC-64-ISO algorithm
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Footer size: body_crc64 + file_crc64
pub const FOOTER_SIZE: usize = 16;

/// Compute CRC-64 checksum for a byte slice
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Incremental CRC-64 digest
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer that keeps the body and file checksums while writing.
///
/// Bytes written through [`write_header`](Self::write_header) only count
/// towards the file checksum; everything written through `Write` counts
/// towards both.
pub struct ChecksumWriter<W: Write> {
    inner: W,
    body: Digest,
    file: Digest,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            body: Digest::new(),
            file: Digest::new(),
        }
    }

    pub fn write_header(&mut self, header: &[u8]) -> io::Result<()> {
        self.file.update(header);
        self.inner.write_all(header)
    }

    /// Write the footer and hand back the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        let body_crc64 = self.body.finalize();
        let file_crc64 = self.file.finalize();
        self.inner.write_all(&body_crc64.to_le_bytes())?;
        self.inner.write_all(&file_crc64.to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.body.update(&buf[..n]);
        self.file.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Check both footer checksums of a file held in memory and return the
/// body slice.
pub fn verify_footer<'a>(data: &'a [u8], header_size: usize, what: &str) -> Result<&'a [u8]> {
    if data.len() < header_size + FOOTER_SIZE {
        return Err(Error::corrupt(format!(
            "{what}: file too small ({} bytes)",
            data.len()
        )));
    }
    let footer_at = data.len() - FOOTER_SIZE;
    let body = &data[header_size..footer_at];
    let mut stored = [0u8; 8];
    stored.copy_from_slice(&data[footer_at..footer_at + 8]);
    let body_crc64 = u64::from_le_bytes(stored);
    stored.copy_from_slice(&data[footer_at + 8..]);
    let file_crc64 = u64::from_le_bytes(stored);

    let actual_body = checksum(body);
    if actual_body != body_crc64 {
        return Err(Error::corrupt(format!(
            "{what}: body CRC mismatch: expected 0x{body_crc64:016x}, got 0x{actual_body:016x}"
        )));
    }
    let actual_file = checksum(&data[..footer_at]);
    if actual_file != file_crc64 {
        return Err(Error::corrupt(format!(
            "{what}: file CRC mismatch: expected 0x{file_crc64:016x}, got 0x{actual_file:016x}"
        )));
    }
    Ok(body)
}
