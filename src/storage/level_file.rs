//! Level file writer and readers.
//!
//! Every level file starts with a `u16` coordinate count, written with the
//! first block. Records above level 0 carry the children trailer of
//! [`Centre`].
//!
//! Raw format: fixed-size records back to back, so a cluster is addressed by
//! the byte offset of its first member and its member count.
//!
//! Compressed format: one block per cluster. A block is an arithmetic-coded
//! array of the member coordinates in column-major order (every first
//! coordinate, then every second one, ...), quantized with step `q`, followed
//! on levels above 0 by one `i64 + i32` children trailer per member. A
//! cluster is addressed by the byte offset of its block.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flstream_codec::{ArithCoder, ArithCoderConfig};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::centre::{CHILDREN_INFO_LEN, Centre};
use crate::error::{ClusterError, ClusterResult};
use crate::vertex::Vertex;

/// Size of the file header.
pub const HEADER_LEN: u64 = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum LevelFormat {
    /// Fixed-size `f64` records.
    #[default]
    Raw,
    /// Quantized, arithmetic-coded cluster blocks.
    Compressed {
        quantization: f64,
        coder: ArithCoderConfig,
    },
}

impl LevelFormat {
    /// Compressed format with the default coder parameters.
    pub fn compressed(quantization: f64) -> Self {
        LevelFormat::Compressed {
            quantization,
            coder: ArithCoderConfig::default(),
        }
    }

    pub fn validate(&self) -> ClusterResult<()> {
        match self {
            LevelFormat::Raw => Ok(()),
            LevelFormat::Compressed {
                quantization,
                coder,
            } => {
                if !(quantization.is_finite() && *quantization > 0.0) {
                    return Err(ClusterError::Configuration(format!(
                        "quantization step must be positive and finite, got {}",
                        quantization
                    )));
                }
                coder.validate()?;
                Ok(())
            }
        }
    }
}

/// Append-only writer of one level file. Dropping it without
/// [`LevelWriter::finish`] still flushes, but errors are lost.
#[derive(Debug)]
pub struct LevelWriter {
    path: PathBuf,
    out: BufWriter<File>,
    format: LevelFormat,
    coder: Option<ArithCoder>,
    with_children: bool,
    dimension: Option<usize>,
    position: u64,
    records: usize,
}

impl LevelWriter {
    /// Creates (truncates) the file at `path`. `with_children` is set for
    /// every level above 0.
    pub fn create(
        path: impl AsRef<Path>,
        format: LevelFormat,
        with_children: bool,
    ) -> ClusterResult<Self> {
        format.validate()?;
        let coder = match format {
            LevelFormat::Raw => None,
            LevelFormat::Compressed { coder, .. } => Some(ArithCoder::new(coder)?),
        };
        let path = path.as_ref().to_path_buf();
        let out = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            out,
            format,
            coder,
            with_children,
            dimension: None,
            position: 0,
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn records(&self) -> usize {
        self.records
    }

    fn ensure_header(&mut self, dimension: usize) -> ClusterResult<()> {
        match self.dimension {
            Some(d) if d == dimension => Ok(()),
            Some(d) => Err(ClusterError::DimensionMismatch {
                expected: d,
                got: dimension,
            }),
            None => {
                let header = u16::try_from(dimension).map_err(|_| {
                    ClusterError::Configuration(format!(
                        "{} coordinates do not fit the level header",
                        dimension
                    ))
                })?;
                self.out.write_all(&header.to_le_bytes())?;
                self.position = HEADER_LEN;
                self.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    /// Writes the members of one cluster; returns the offset the cluster
    /// can be read back from.
    pub fn write_block(&mut self, members: &[&Centre]) -> ClusterResult<i64> {
        let Some(first) = members.first() else {
            return Ok(self.position as i64);
        };
        let dimension = first.vertex.dimension();
        self.ensure_header(dimension)?;
        for m in members {
            if m.vertex.dimension() != dimension {
                return Err(ClusterError::DimensionMismatch {
                    expected: dimension,
                    got: m.vertex.dimension(),
                });
            }
        }

        let start = self.position;
        match (self.format, &self.coder) {
            (LevelFormat::Compressed { quantization, .. }, Some(coder)) => {
                let n = members.len();
                let mut columns = Vec::with_capacity(n * dimension);
                for d in 0..dimension {
                    columns.extend(members.iter().map(|m| m.vertex.coords()[d]));
                }
                let mut written = coder.encode_doubles(&columns, quantization, &mut self.out)?;
                if self.with_children {
                    for m in members {
                        m.write_children_info(&mut self.out)?;
                        written += CHILDREN_INFO_LEN;
                    }
                }
                self.position += written as u64;
            }
            _ => {
                for m in members {
                    self.position += m.write_raw(&mut self.out, self.with_children)? as u64;
                }
            }
        }
        self.records += members.len();
        Ok(start as i64)
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> ClusterResult<()> {
        self.out.flush()?;
        debug!(
            "Closed {}: {} records, {} bytes",
            self.path.display(),
            self.records,
            self.position
        );
        Ok(())
    }
}

fn corrupt_on_eof(e: io::Error, path: &Path) -> ClusterError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ClusterError::CorruptLevelFile(format!("{} ends mid-record", path.display()))
    } else {
        ClusterError::Io(e)
    }
}

struct LevelReader {
    path: PathBuf,
    input: BufReader<File>,
    len: u64,
    dimension: usize,
}

impl LevelReader {
    /// `None` for a file that never received a block.
    fn open(path: &Path) -> ClusterResult<Option<Self>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(None);
        }
        let mut input = BufReader::new(file);
        let mut header = [0u8; 2];
        input
            .read_exact(&mut header)
            .map_err(|e| corrupt_on_eof(e, path))?;
        let dimension = usize::from(u16::from_le_bytes(header));
        if dimension == 0 {
            return Err(ClusterError::CorruptLevelFile(format!(
                "{} declares zero coordinates",
                path.display()
            )));
        }
        Ok(Some(Self {
            path: path.to_path_buf(),
            input,
            len,
            dimension,
        }))
    }

    fn at_end(&mut self) -> ClusterResult<bool> {
        Ok(self.input.stream_position()? >= self.len)
    }

    fn seek(&mut self, offset: i64) -> ClusterResult<()> {
        let offset = u64::try_from(offset)
            .ok()
            .filter(|&o| o >= HEADER_LEN && o <= self.len)
            .ok_or_else(|| {
                ClusterError::CorruptLevelFile(format!(
                    "offset {} outside {}",
                    offset,
                    self.path.display()
                ))
            })?;
        self.input.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read_raw(&mut self, count: usize, with_children: bool) -> ClusterResult<Vec<Centre>> {
        (0..count)
            .map(|_| {
                Centre::read_raw(&mut self.input, self.dimension, with_children)
                    .map_err(|e| corrupt_on_eof(e, &self.path))
            })
            .collect()
    }

    fn read_block(
        &mut self,
        coder: &ArithCoder,
        quantization: f64,
        with_children: bool,
    ) -> ClusterResult<Vec<Centre>> {
        let values = coder.decode_doubles(quantization, &mut self.input)?;
        if values.len() % self.dimension != 0 {
            return Err(ClusterError::CorruptLevelFile(format!(
                "block of {} values in {} is not a whole number of {}-dimensional points",
                values.len(),
                self.path.display(),
                self.dimension
            )));
        }
        let n = values.len() / self.dimension;
        let mut centres: Vec<Centre> = (0..n)
            .map(|i| {
                let coords = (0..self.dimension).map(|d| values[d * n + i]).collect();
                Centre::new(Vertex::new(coords))
            })
            .collect();
        if with_children {
            for c in &mut centres {
                let (start, count) = Centre::read_children_info(&mut self.input)
                    .map_err(|e| corrupt_on_eof(e, &self.path))?;
                c.children_file_start = start;
                c.children_count = count;
            }
        }
        Ok(centres)
    }
}

fn format_coder(format: LevelFormat) -> ClusterResult<Option<(ArithCoder, f64)>> {
    match format {
        LevelFormat::Raw => Ok(None),
        LevelFormat::Compressed {
            quantization,
            coder,
        } => Ok(Some((ArithCoder::new(coder)?, quantization))),
    }
}

/// Reads every record of a level file, in file order.
pub fn read_level(
    path: impl AsRef<Path>,
    format: LevelFormat,
    with_children: bool,
) -> ClusterResult<Vec<Centre>> {
    let path = path.as_ref();
    let Some(mut reader) = LevelReader::open(path)? else {
        return Ok(Vec::new());
    };

    match format_coder(format)? {
        None => {
            let record_len = Centre::record_len(reader.dimension, with_children) as u64;
            let body = reader.len - HEADER_LEN;
            if body % record_len != 0 {
                return Err(ClusterError::CorruptLevelFile(format!(
                    "{} holds {} bytes, not a multiple of the {} byte record",
                    path.display(),
                    body,
                    record_len
                )));
            }
            reader.read_raw((body / record_len) as usize, with_children)
        }
        Some((coder, quantization)) => {
            let mut centres = Vec::new();
            while !reader.at_end()? {
                centres.extend(reader.read_block(&coder, quantization, with_children)?);
            }
            Ok(centres)
        }
    }
}

/// Reads the `count` records of one cluster stored at `start`.
pub fn read_children(
    path: impl AsRef<Path>,
    format: LevelFormat,
    with_children: bool,
    start: i64,
    count: usize,
) -> ClusterResult<Vec<Centre>> {
    let path = path.as_ref();
    let Some(mut reader) = LevelReader::open(path)? else {
        return Err(ClusterError::CorruptLevelFile(format!(
            "{} is empty",
            path.display()
        )));
    };
    reader.seek(start)?;

    match format_coder(format)? {
        None => reader.read_raw(count, with_children),
        Some((coder, quantization)) => {
            let centres = reader.read_block(&coder, quantization, with_children)?;
            if centres.len() != count {
                return Err(ClusterError::CorruptLevelFile(format!(
                    "block at {} holds {} records, expected {}",
                    start,
                    centres.len(),
                    count
                )));
            }
            Ok(centres)
        }
    }
}
