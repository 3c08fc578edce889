//! CRC-64 for artifact footers and graph fingerprints

use crc::{Crc, CRC_64_GO_ISO};
use refuge_common::{Error, NodeId, Result};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

pub const FOOTER_SIZE: usize = 16;

pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Trailing checksums of an artifact: body alone, then header + body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub body_crc64: u64,
    pub file_crc64: u64,
}

impl Footer {
    pub fn seal(header: &[u8], body: &[u8]) -> Self {
        let mut file = CRC64.digest();
        file.update(header);
        file.update(body);
        Self {
            body_crc64: checksum(body),
            file_crc64: file.finalize(),
        }
    }

    pub fn to_bytes(self) -> [u8; FOOTER_SIZE] {
        let mut out = [0u8; FOOTER_SIZE];
        out[..8].copy_from_slice(&self.body_crc64.to_le_bytes());
        out[8..].copy_from_slice(&self.file_crc64.to_le_bytes());
        out
    }

    /// Split `bytes` into content and footer, checking the whole-file CRC
    pub fn split(bytes: &[u8]) -> Result<(&[u8], Self)> {
        if bytes.len() < FOOTER_SIZE {
            return Err(Error::CorruptArtifact("file shorter than footer".to_string()));
        }
        let (content, raw) = bytes.split_at(bytes.len() - FOOTER_SIZE);
        let mut body = [0u8; 8];
        let mut file = [0u8; 8];
        body.copy_from_slice(&raw[..8]);
        file.copy_from_slice(&raw[8..]);
        let footer = Self {
            body_crc64: u64::from_le_bytes(body),
            file_crc64: u64::from_le_bytes(file),
        };

        if checksum(content) != footer.file_crc64 {
            return Err(Error::CorruptArtifact("file checksum mismatch".to_string()));
        }
        Ok((content, footer))
    }

    pub fn verify_body(&self, body: &[u8]) -> Result<()> {
        if checksum(body) != self.body_crc64 {
            return Err(Error::CorruptArtifact("body checksum mismatch".to_string()));
        }
        Ok(())
    }
}

/// Running CRC over a graph's node ids and weighted edges
pub struct GraphFingerprint {
    digest: crc::Digest<'static, u64>,
}

impl GraphFingerprint {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn node(&mut self, id: NodeId) {
        self.digest.update(&id.to_le_bytes());
    }

    pub fn edge(&mut self, u: NodeId, v: NodeId, weight: f64) {
        self.digest.update(&u.to_le_bytes());
        self.digest.update(&v.to_le_bytes());
        self.digest.update(&weight.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for GraphFingerprint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::RankingFile;
    use crate::ranking::Ranking;
    use refuge_common::FacilityId;

    fn artifact() -> Vec<u8> {
        let ranking = Ranking::new(
            "tsunami",
            0xfeed,
            vec![FacilityId(4), FacilityId(9)],
            vec![10, 20],
            vec![vec![FacilityId(4), FacilityId(9)], vec![FacilityId(9)]],
        )
        .unwrap();
        RankingFile::encode(&ranking).unwrap()
    }

    #[test]
    fn artifact_footer_covers_header_and_body() {
        let bytes = artifact();
        let (content, footer) = Footer::split(&bytes).unwrap();
        assert_eq!(footer.to_bytes(), bytes[content.len()..]);
        assert_eq!(footer.file_crc64, checksum(content));

        // two nodes of (id, len, ids) at the end of the content
        let body_len = (8 + 4 + 2 * 4) + (8 + 4 + 4);
        let (header, body) = content.split_at(content.len() - body_len);
        assert_eq!(Footer::seal(header, body), footer);
        assert!(footer.verify_body(body).is_ok());
        assert!(footer.verify_body(&body[1..]).is_err());
    }

    #[test]
    fn flipped_bit_or_short_file_is_rejected() {
        let mut bytes = artifact();
        bytes[6] ^= 0x01;
        assert!(matches!(
            Footer::split(&bytes),
            Err(Error::CorruptArtifact(_))
        ));
        assert!(matches!(
            Footer::split(&bytes[..FOOTER_SIZE - 1]),
            Err(Error::CorruptArtifact(_))
        ));
    }

    #[test]
    fn fingerprint_tracks_weights() {
        let edge = |w: f64| {
            let mut fp = GraphFingerprint::new();
            fp.node(1);
            fp.node(2);
            fp.edge(1, 2, w);
            fp.finish()
        };
        assert_eq!(edge(1.5), edge(1.5));
        assert_ne!(edge(1.5), edge(2.5));
    }
}
