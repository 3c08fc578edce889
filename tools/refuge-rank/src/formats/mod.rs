//! Binary file formats

pub mod crc;
pub mod ranking_file;

pub use ranking_file::RankingFile;
