//! Input and output seams of the clusterers.
//!
//! A [`PointSource`] yields batches of coordinate vectors of any size; every
//! iterator over `Vec<Vec<f64>>` is one. A [`ClusterSink`] receives one
//! [`ClusterRecord`] per cluster of a finished clustering.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;

/// One cluster of a finished clustering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Vertex index of the facility.
    pub facility: usize,
    /// Vertex indices of the members, the facility included.
    pub members: Vec<usize>,
    /// Coordinates of the facility vertex, which stands for the cluster.
    pub centroid: Vec<f64>,
}

pub trait ClusterSink {
    fn accept(&mut self, record: ClusterRecord) -> ClusterResult<()>;
}

impl ClusterSink for Vec<ClusterRecord> {
    fn accept(&mut self, record: ClusterRecord) -> ClusterResult<()> {
        self.push(record);
        Ok(())
    }
}

/// Writes each record as one line of JSON.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ClusterSink for JsonLinesSink<W> {
    fn accept(&mut self, record: ClusterRecord) -> ClusterResult<()> {
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
}

/// Supplier of coordinate batches. `Ok(None)` ends the stream.
pub trait PointSource {
    fn next_batch(&mut self) -> ClusterResult<Option<Vec<Vec<f64>>>>;
}

impl<I> PointSource for I
where
    I: Iterator<Item = Vec<Vec<f64>>>,
{
    fn next_batch(&mut self) -> ClusterResult<Option<Vec<Vec<f64>>>> {
        Ok(self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.accept(ClusterRecord {
            facility: 2,
            members: vec![2, 0],
            centroid: vec![1.5, -1.0],
        })
        .unwrap();
        sink.accept(ClusterRecord {
            facility: 1,
            members: vec![1],
            centroid: vec![0.0, 0.0],
        })
        .unwrap();
        assert_eq!(sink.written(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ClusterRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.members, vec![2, 0]);
    }

    #[test]
    fn test_iterator_is_point_source() {
        let mut source = vec![vec![vec![0.0, 1.0]], vec![vec![2.0, 3.0], vec![4.0, 5.0]]].into_iter();
        assert_eq!(source.next_batch().unwrap().unwrap().len(), 1);
        assert_eq!(source.next_batch().unwrap().unwrap().len(), 2);
        assert!(source.next_batch().unwrap().is_none());
    }
}
