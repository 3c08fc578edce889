//! full_ranks_<category>.rnk - persisted ranking artifact
//!
//! Format (little-endian):
//!
//! Header:
//!   magic:             u32 = 0x524E4B47  // "RNKG"
//!   version:           u16 = 1
//!   reserved:          u16 = 0
//!   graph_fingerprint: u64
//!   n_nodes:           u64
//!   category_len:      u16
//!   category:          [category_len]u8  // UTF-8
//!   n_active:          u32
//!   active:            [n_active]u32     // ascending facility ids
//!
//! Body (n_nodes records, graph order):
//!   node_id: i64
//!   len:     u32
//!   ids:     [len]u32                    // nearest first
//!
//! Footer (16 bytes):
//!   body_crc64: u64
//!   file_crc64: u64   // header + body
//!
//! No timestamps: writing the same ranking twice yields identical bytes.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use refuge_common::{Error, FacilityId, Result};

use super::crc::Footer;
use crate::ranking::Ranking;

const MAGIC: u32 = 0x524E4B47; // "RNKG"
const VERSION: u16 = 1;

pub struct RankingFile;

impl RankingFile {
    /// Serialize a ranking to bytes (header + body + footer)
    pub fn encode(ranking: &Ranking) -> Result<Vec<u8>> {
        let category = ranking.category().as_bytes();
        let category_len = u16::try_from(category.len()).map_err(|_| {
            Error::InvalidInput(format!("category name too long: {}", ranking.category()))
        })?;

        let active = ranking.active_facilities();
        let mut header = Vec::with_capacity(32 + category.len() + 4 * active.len());
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // reserved
        header.extend_from_slice(&ranking.graph_fingerprint().to_le_bytes());
        header.extend_from_slice(&(ranking.node_count() as u64).to_le_bytes());
        header.extend_from_slice(&category_len.to_le_bytes());
        header.extend_from_slice(category);
        header.extend_from_slice(&(active.len() as u32).to_le_bytes());
        for id in active {
            header.extend_from_slice(&id.0.to_le_bytes());
        }

        let mut body = Vec::new();
        for (node, ids) in ranking.iter() {
            body.extend_from_slice(&node.to_le_bytes());
            body.extend_from_slice(&(ids.len() as u32).to_le_bytes());
            for id in ids {
                body.extend_from_slice(&id.0.to_le_bytes());
            }
        }

        let footer = Footer::seal(&header, &body);
        let mut out = header;
        out.extend_from_slice(&body);
        out.extend_from_slice(&footer.to_bytes());
        Ok(out)
    }

    /// Parse bytes produced by [`RankingFile::encode`], verifying both checksums
    pub fn decode(bytes: &[u8]) -> Result<Ranking> {
        let (content, footer) = Footer::split(bytes)?;
        let mut cur = Cursor::new(content);
        let magic = cur.u32()?;
        if magic != MAGIC {
            return Err(Error::CorruptArtifact(format!(
                "invalid magic: expected 0x{MAGIC:08x}, got 0x{magic:08x}"
            )));
        }
        let version = cur.u16()?;
        if version != VERSION {
            return Err(Error::CorruptArtifact(format!("unsupported version {version}")));
        }
        let _reserved = cur.u16()?;
        let graph_fingerprint = cur.u64()?;
        let n_nodes = cur.u64()? as usize;
        let category_len = cur.u16()? as usize;
        let category = std::str::from_utf8(cur.take(category_len)?)
            .map_err(|e| Error::CorruptArtifact(format!("category is not UTF-8: {e}")))?
            .to_string();
        let n_active = cur.u32()? as usize;
        let mut active = Vec::with_capacity(n_active.min(content.len() / 4));
        for _ in 0..n_active {
            active.push(FacilityId(cur.u32()?));
        }

        footer.verify_body(cur.rest())?;

        let mut nodes = Vec::with_capacity(n_nodes.min(content.len() / 12));
        let mut ranks = Vec::with_capacity(nodes.capacity());
        for _ in 0..n_nodes {
            nodes.push(cur.i64()?);
            let len = cur.u32()? as usize;
            let mut ids = Vec::with_capacity(len.min(n_active));
            for _ in 0..len {
                ids.push(FacilityId(cur.u32()?));
            }
            ranks.push(ids);
        }
        if !cur.rest().is_empty() {
            return Err(Error::CorruptArtifact(format!(
                "{} trailing bytes after body",
                cur.rest().len()
            )));
        }

        Ranking::new(category, graph_fingerprint, active, nodes, ranks)
            .map_err(|e| Error::CorruptArtifact(e.to_string()))
    }

    /// Write atomically: `<path>.tmp` then rename; the temp file never outlives a failure
    pub fn write<P: AsRef<Path>>(path: P, ranking: &Ranking) -> Result<()> {
        let path = path.as_ref();
        let bytes = Self::encode(ranking)?;

        let guard = TempFile::new(path.with_extension("rnk.tmp"));
        {
            let mut writer = BufWriter::new(File::create(guard.path())?);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(guard.path(), path)?;
        guard.commit();
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Ranking> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::decode(&bytes)
    }
}

fn truncated<E>(_: E) -> Error {
    Error::CorruptArtifact("truncated".to_string())
}

/// Removes the file on drop unless committed
struct TempFile {
    path: PathBuf,
    committed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::CorruptArtifact("truncated".to_string()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().map_err(truncated)?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().map_err(truncated)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().map_err(truncated)?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().map_err(truncated)?))
    }
}
