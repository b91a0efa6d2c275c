//! Definitions -- A tiny interface for the overlap-layout-consensus assembler.
//! The crates in this workspace exchange reads, alignments, and contigs through the plain, serde-serializable structures defined here.
//! The assembly graph itself lives in the `olcgraph` crate; this crate only describes data that crosses its boundary.

use serde::{Deserialize, Serialize};

/// The immutable, ordered collection of reads given to the assembler.
/// The index of a read in `raw_reads` is its identifier inside the graph.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ReadSet {
    pub input_file: String,
    pub raw_reads: Vec<RawRead>,
}

impl ReadSet {
    pub fn with_minimum_data(input_file: &str, seqs: Vec<(String, Vec<u8>)>) -> Self {
        let raw_reads = seqs
            .into_iter()
            .enumerate()
            .map(|(idx, (name, seq))| RawRead {
                name,
                desc: String::new(),
                id: idx as u64,
                seq: String::from_utf8_lossy(&seq).to_ascii_uppercase(),
            })
            .collect();
        Self {
            input_file: input_file.to_string(),
            raw_reads,
        }
    }
    /// Build a collection directly from sequences. Mainly for tests and small tools.
    pub fn from_seqs<T: AsRef<[u8]>>(seqs: &[T]) -> Self {
        let seqs: Vec<_> = seqs
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("read_{i}"), s.as_ref().to_vec()))
            .collect();
        Self::with_minimum_data("-", seqs)
    }
    pub fn len(&self) -> usize {
        self.raw_reads.len()
    }
    pub fn is_empty(&self) -> bool {
        self.raw_reads.is_empty()
    }
    pub fn seq(&self, idx: usize) -> &[u8] {
        self.raw_reads[idx].seq()
    }
    pub fn length(&self, idx: usize) -> usize {
        self.raw_reads[idx].seq.len()
    }
    pub fn name(&self, idx: usize) -> &str {
        &self.raw_reads[idx].name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRead {
    /// Name of the read. It is the `id` in the fasta/fastq file.
    pub name: String,
    pub desc: String,
    /// The id of the read. It is the position of the read in the input file.
    pub id: u64,
    /// Sequence. It is a string on an alphabet of A,C,G,T (N allowed).
    pub seq: String,
}

impl RawRead {
    pub fn seq(&self) -> &[u8] {
        self.seq.as_bytes()
    }
}

impl std::fmt::Display for RawRead {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {} {}\n{}", self.name, self.desc, self.id, self.seq)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Copy, Eq, PartialEq, Hash)]
pub enum Op {
    Match(usize),
    /// Deletion with respect to the reference.
    Del(usize),
    /// Insertion with respect to the reference.
    Ins(usize),
}

impl Op {
    pub fn len(&self) -> usize {
        match *self {
            Op::Match(l) | Op::Del(l) | Op::Ins(l) => l,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of reference bases spanned by the operations.
pub fn reference_length(ops: &[Op]) -> usize {
    ops.iter()
        .map(|op| match op {
            Op::Match(l) | Op::Del(l) => *l,
            Op::Ins(_) => 0,
        })
        .sum()
}

/// Number of read bases consumed by the operations.
pub fn query_length(ops: &[Op]) -> usize {
    ops.iter()
        .map(|op| match op {
            Op::Match(l) | Op::Ins(l) => *l,
            Op::Del(_) => 0,
        })
        .sum()
}

/// Merge adjacent operations of the same kind and drop empty ones.
pub fn compress_ops(ops: &[Op]) -> Vec<Op> {
    let mut merged: Vec<Op> = Vec::with_capacity(ops.len());
    for &op in ops.iter().filter(|op| !op.is_empty()) {
        match (merged.last_mut(), op) {
            (Some(Op::Match(l)), Op::Match(m)) => *l += m,
            (Some(Op::Del(l)), Op::Del(m)) => *l += m,
            (Some(Op::Ins(l)), Op::Ins(m)) => *l += m,
            _ => merged.push(op),
        }
    }
    merged
}

/// A polished sequence built from one layout path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contig {
    pub name: String,
    pub seq: String,
    /// ID of the reads on the layout path, in path order.
    pub reads: Vec<u64>,
}

impl Contig {
    pub fn seq(&self) -> &[u8] {
        self.seq.as_bytes()
    }
}

impl std::fmt::Display for Contig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, ">{} reads={}\n{}", self.name, self.reads.len(), self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn op_lengths() {
        let ops = vec![Op::Match(5), Op::Ins(2), Op::Match(3), Op::Del(4), Op::Match(1)];
        assert_eq!(reference_length(&ops), 13);
        assert_eq!(query_length(&ops), 11);
    }
    #[test]
    fn compress() {
        let ops = vec![Op::Match(2), Op::Match(3), Op::Ins(0), Op::Del(1), Op::Del(1)];
        assert_eq!(compress_ops(&ops), vec![Op::Match(5), Op::Del(2)]);
    }
    #[test]
    fn read_set_ids() {
        let reads = ReadSet::from_seqs(&[b"acgt".to_vec(), b"TTGA".to_vec()]);
        assert_eq!(reads.len(), 2);
        assert_eq!(reads.seq(0), b"ACGT");
        assert_eq!(reads.raw_reads[1].id, 1);
        assert_eq!(reads.length(1), 4);
    }
}
