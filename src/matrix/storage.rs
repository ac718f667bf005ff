//! Memory-mapped matrix artifacts on disk.
//!
//! This module persists an [`EmbeddingMatrix`] as a single binary artifact
//! and reads it back through a memory map. Writes are atomic: the artifact
//! is assembled in a temporary file next to the target and renamed over it,
//! so a reader never observes a partial write.
//!
//! # Artifact format
//!
//! - Header (16 bytes): magic, version, dimension, row count
//! - ID table: row count u32 values in little-endian, row order
//! - Title matrix: contiguous f32 rows in little-endian
//! - Abstract matrix: contiguous f32 rows in little-endian

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::matrix::{EmbeddingMatrix, MatrixBuilder};
use crate::types::{MatrixError, PaperId, VectorDimension};

/// Current artifact format version.
const ARTIFACT_VERSION: u32 = 1;

/// Size of the artifact header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes identifying paper matrix artifacts.
const MAGIC_BYTES: &[u8; 4] = b"PMAT";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Number of bytes per paper ID (u32).
const BYTES_PER_ID: usize = 4;

/// Errors specific to matrix artifact operations.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid artifact format: {0}")]
    InvalidFormat(String),

    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
}

/// A matrix artifact at a fixed path.
///
/// Stateless besides the path; `save` and `load` round-trip a full
/// [`EmbeddingMatrix`].
#[derive(Debug, Clone)]
pub struct MatrixArtifact {
    path: PathBuf,
}

impl MatrixArtifact {
    /// Creates a handle for the artifact at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the artifact exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the size of the artifact file in bytes.
    pub fn file_size(&self) -> Result<u64, io::Error> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Writes the matrix atomically.
    ///
    /// The artifact is assembled in a temporary file in the same directory
    /// and renamed over the target path once fully written.
    pub fn save(&self, matrix: &EmbeddingMatrix) -> Result<(), ArtifactError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let tmp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            write_header(&mut writer, matrix.dimension(), matrix.len())?;

            for id in matrix.ids() {
                writer.write_all(&id.to_bytes())?;
            }
            for row in matrix.titles().iter_rows() {
                write_f32_row(&mut writer, row)?;
            }
            for row in matrix.abstracts().iter_rows() {
                write_f32_row(&mut writer, row)?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(&self.path)
            .map_err(|e| ArtifactError::Io(e.error))?;
        Ok(())
    }

    /// Reads the matrix back through a memory map.
    ///
    /// Validates magic, version, and the size the header implies before
    /// touching any row data, and verifies the id bookkeeping afterwards.
    pub fn load(&self) -> Result<EmbeddingMatrix, ArtifactError> {
        if !self.path.exists() {
            return Err(ArtifactError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Matrix artifact not found: {:?}", self.path),
            )));
        }

        let file = File::open(&self.path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let (version, dimension, count) = read_header(&mmap)?;
        if version != ARTIFACT_VERSION {
            return Err(MatrixError::VersionMismatch {
                expected: ARTIFACT_VERSION,
                actual: version,
            }
            .into());
        }

        let dim = dimension.get();
        let expected =
            HEADER_SIZE + count * BYTES_PER_ID + 2 * count * dim * BYTES_PER_F32;
        if mmap.len() < expected {
            return Err(ArtifactError::InvalidFormat(format!(
                "artifact truncated: {} bytes, header implies {expected}",
                mmap.len()
            )));
        }

        let ids_start = HEADER_SIZE;
        let titles_start = ids_start + count * BYTES_PER_ID;
        let abstracts_start = titles_start + count * dim * BYTES_PER_F32;

        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let offset = ids_start + i * BYTES_PER_ID;
            let bytes = [
                mmap[offset],
                mmap[offset + 1],
                mmap[offset + 2],
                mmap[offset + 3],
            ];
            let id = PaperId::from_bytes(bytes).ok_or_else(|| {
                ArtifactError::InvalidFormat(format!("zero paper ID at row {i}"))
            })?;
            ids.push(id);
        }

        let mut builder = MatrixBuilder::with_capacity(dimension, count);
        for (i, id) in ids.iter().enumerate() {
            let title = read_f32_row(&mmap, titles_start + i * dim * BYTES_PER_F32, dim);
            let abstract_row =
                read_f32_row(&mmap, abstracts_start + i * dim * BYTES_PER_F32, dim);
            builder.push(*id, &title, &abstract_row)?;
        }

        let matrix = builder.finish();
        matrix.check_consistency()?;
        Ok(matrix)
    }
}

fn write_header<W: Write>(
    writer: &mut W,
    dimension: VectorDimension,
    count: usize,
) -> Result<(), io::Error> {
    writer.write_all(MAGIC_BYTES)?;
    writer.write_all(&ARTIFACT_VERSION.to_le_bytes())?;
    writer.write_all(&(dimension.get() as u32).to_le_bytes())?;
    writer.write_all(&(count as u32).to_le_bytes())?;
    Ok(())
}

fn read_header(mmap: &Mmap) -> Result<(u32, VectorDimension, usize), ArtifactError> {
    if mmap.len() < HEADER_SIZE {
        return Err(ArtifactError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }

    if &mmap[0..4] != MAGIC_BYTES {
        return Err(ArtifactError::InvalidFormat(
            "Invalid magic bytes".to_string(),
        ));
    }

    let version = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);
    let dim_value = u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]);
    let dimension = VectorDimension::new(dim_value as usize)?;
    let count = u32::from_le_bytes([mmap[12], mmap[13], mmap[14], mmap[15]]) as usize;

    Ok((version, dimension, count))
}

fn write_f32_row<W: Write>(writer: &mut W, row: &[f32]) -> Result<(), io::Error> {
    for &value in row {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

fn read_f32_row(mmap: &Mmap, offset: usize, dim: usize) -> Vec<f32> {
    let mut row = Vec::with_capacity(dim);
    for i in 0..dim {
        let o = offset + i * BYTES_PER_F32;
        row.push(f32::from_le_bytes([
            mmap[o],
            mmap[o + 1],
            mmap[o + 2],
            mmap[o + 3],
        ]));
    }
    row
}
