//! Binary catalog snapshot reader/writer
//!
//! A snapshot is a [`SnapshotHeader`] followed by the bincode-encoded
//! [`CatalogTables`], optionally LZ4 compressed. Reading is all or nothing:
//! the header, body length, checksum and table counts are checked and the
//! catalog is fully validated before anything is returned.

use super::{Catalog, CatalogTables};
use crate::error::{EngineError, Result};
use crate::header::{SnapshotHeader, FLAG_LZ4, HEADER_SIZE};
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

pub struct SnapshotReader;

impl SnapshotReader {
    /// Read and validate a snapshot file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Catalog> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(EngineError::Truncated {
                expected: HEADER_SIZE as u64,
                found: len,
            });
        }

        // SAFETY: the map is read-only and dropped before this function
        // returns; every table is copied out during deserialization
        let map = unsafe { Mmap::map(&file)? };
        let catalog = Self::from_bytes(&map)?;

        info!(
            "Loaded catalog snapshot {} ({} items, {} colors)",
            path.display(),
            catalog.items().len(),
            catalog.colors().len()
        );
        Ok(catalog)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Catalog> {
        let header = SnapshotHeader::from_bytes(bytes)?;
        header.validate()?;

        let body = &bytes[HEADER_SIZE..];
        if body.len() as u64 != header.body_len {
            return Err(EngineError::Truncated {
                expected: header.body_len,
                found: body.len() as u64,
            });
        }

        let crc = crc32fast::hash(body);
        if crc != header.body_crc32 {
            return Err(EngineError::ChecksumMismatch {
                expected: header.body_crc32,
                found: crc,
            });
        }

        let tables: CatalogTables = if header.is_compressed() {
            let raw = lz4_flex::decompress_size_prepended(body)?;
            bincode::deserialize(&raw)?
        } else {
            bincode::deserialize(body)?
        };

        let counts = [
            ("item types", header.item_type_count, tables.item_types.len()),
            ("categories", header.category_count, tables.categories.len()),
            ("colors", header.color_count, tables.colors.len()),
            ("items", header.item_count, tables.items.len()),
        ];
        for (what, expected, found) in counts {
            if expected as usize != found {
                return Err(EngineError::Corrupt(format!(
                    "header announces {} {}, body holds {}",
                    expected, what, found
                )));
            }
        }

        Catalog::from_tables(tables)
    }
}

pub struct SnapshotWriter {
    compress: bool,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        SnapshotWriter { compress: true }
    }

    pub fn compress(mut self, yes: bool) -> Self {
        self.compress = yes;
        self
    }

    pub fn to_bytes(&self, catalog: &Catalog) -> Result<Vec<u8>> {
        let tables = catalog.tables();
        let raw = bincode::serialize(tables)?;
        let body = if self.compress {
            lz4_flex::compress_prepend_size(&raw)
        } else {
            raw
        };

        let mut header = SnapshotHeader::new();
        if self.compress {
            header.flags |= FLAG_LZ4;
        }
        header.item_type_count = tables.item_types.len() as u32;
        header.category_count = tables.categories.len() as u32;
        header.color_count = tables.colors.len() as u32;
        header.item_count = tables.items.len() as u32;
        header.body_len = body.len() as u64;
        header.body_crc32 = crc32fast::hash(&body);
        header.created_at = chrono::Utc::now().timestamp();

        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn write<P: AsRef<Path>>(&self, path: P, catalog: &Catalog) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(catalog)?;

        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        debug!("Wrote catalog snapshot {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new()
    }
}
