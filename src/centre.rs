//! Hierarchy records.
//!
//! A [`Centre`] is a vertex plus a back-reference into the file of the level
//! below: `children_file_start` is where its members are stored there and
//! `children_count` how many there are. Raw points (level 0) have no
//! children and carry `-1`.
//!
//! Raw record layout, little endian: `f64[dim]`, followed on levels above 0
//! by `i64 children_file_start` and `i32 children_count`.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::vertex::Vertex;

/// Size of the children trailer of a record above level 0.
pub const CHILDREN_INFO_LEN: usize = 8 + 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centre {
    pub vertex: Vertex,
    pub children_file_start: i64,
    pub children_count: i32,
}

impl Centre {
    pub fn new(vertex: Vertex) -> Self {
        Self {
            vertex,
            children_file_start: -1,
            children_count: 0,
        }
    }

    pub fn has_children(&self) -> bool {
        self.children_file_start >= 0 && self.children_count > 0
    }

    /// Bytes taken by one raw record.
    pub fn record_len(dimension: usize, with_children: bool) -> usize {
        8 * dimension + if with_children { CHILDREN_INFO_LEN } else { 0 }
    }

    /// Writes one raw record; returns the number of bytes written.
    pub fn write_raw<W: Write>(&self, out: &mut W, with_children: bool) -> io::Result<usize> {
        for c in self.vertex.coords() {
            out.write_all(&c.to_le_bytes())?;
        }
        if with_children {
            self.write_children_info(out)?;
        }
        Ok(Self::record_len(self.vertex.dimension(), with_children))
    }

    pub fn write_children_info<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.children_file_start.to_le_bytes())?;
        out.write_all(&self.children_count.to_le_bytes())
    }

    /// Reads one raw record. Loaded centres have unit weight: files do not
    /// record the aggregated mass.
    pub fn read_raw<R: Read>(input: &mut R, dimension: usize, with_children: bool) -> io::Result<Self> {
        let mut coords = Vec::with_capacity(dimension);
        let mut word = [0u8; 8];
        for _ in 0..dimension {
            input.read_exact(&mut word)?;
            coords.push(f64::from_le_bytes(word));
        }
        let mut centre = Centre::new(Vertex::new(coords));
        if with_children {
            let (start, count) = Self::read_children_info(input)?;
            centre.children_file_start = start;
            centre.children_count = count;
        }
        Ok(centre)
    }

    pub fn read_children_info<R: Read>(input: &mut R) -> io::Result<(i64, i32)> {
        let mut start = [0u8; 8];
        let mut count = [0u8; 4];
        input.read_exact(&mut start)?;
        input.read_exact(&mut count)?;
        Ok((i64::from_le_bytes(start), i32::from_le_bytes(count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_raw_record_layout() {
        let mut c = Centre::new(Vertex::new(vec![1.0, -2.5, 3.25]));
        assert!(!c.has_children());
        c.children_file_start = 1234;
        c.children_count = 7;

        let mut buf = Vec::new();
        assert_eq!(c.write_raw(&mut buf, true).unwrap(), 36);
        assert_eq!(buf.len(), Centre::record_len(3, true));
        assert_eq!(&buf[24..32], &1234i64.to_le_bytes());

        let back = Centre::read_raw(&mut Cursor::new(&buf), 3, true).unwrap();
        assert_eq!(back.vertex.coords(), c.vertex.coords());
        assert_eq!(back.children_file_start, 1234);
        assert_eq!(back.children_count, 7);
        assert!(back.has_children());
    }

    #[test]
    fn test_coords_only_record() {
        let c = Centre::new(Vertex::new(vec![0.5, 0.25]));
        let mut buf = Vec::new();
        assert_eq!(c.write_raw(&mut buf, false).unwrap(), 16);
        let back = Centre::read_raw(&mut Cursor::new(&buf), 2, false).unwrap();
        assert_eq!(back.children_file_start, -1);
        assert!(Centre::read_raw(&mut Cursor::new(&buf[..10]), 2, false).is_err());
    }
}
