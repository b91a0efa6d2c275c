//! Alignment of reads against a draft consensus.
//! The placement is voted by k-mers unique in both sequences, then refined by a banded
//! semi-global alignment.
use crate::config::ConsensusConfig;
use crate::hits::encode_kmers;
use bio::alignment::pairwise::banded;
use bio::alignment::AlignmentOperation;
use definitions::{compress_ops, query_length, reference_length, Op};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

const BAND_KMER: usize = 8;

/// A read aligned to a draft sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAlignment {
    pub read: usize,
    /// True if `seq` is the reverse complement of the read.
    pub reverse: bool,
    /// 0-based start on the draft.
    pub position: usize,
    pub ops: Vec<Op>,
    /// Characters of the read in the aligned orientation.
    pub seq: Vec<u8>,
}

impl ReadAlignment {
    pub fn end(&self) -> usize {
        self.position + reference_length(&self.ops)
    }
    /// Pairs of (draft position, read position) for every aligned base, and the indels.
    pub fn walk(&self) -> AlignmentWalk<'_> {
        AlignmentWalk {
            ops: &self.ops,
            op_idx: 0,
            in_op: 0,
            rpos: self.position,
            qpos: 0,
        }
    }
}

/// One step of an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignedBase {
    /// Draft position and read position.
    Match(usize, usize),
    /// Draft bases `[pos, pos + len)` missing from the read.
    Deletion(usize, usize),
    /// Read bases `[qpos, qpos + len)` inserted before draft position `pos`.
    Insertion(usize, usize, usize),
}

pub struct AlignmentWalk<'a> {
    ops: &'a [Op],
    op_idx: usize,
    in_op: usize,
    rpos: usize,
    qpos: usize,
}

impl<'a> Iterator for AlignmentWalk<'a> {
    type Item = AlignedBase;
    fn next(&mut self) -> Option<Self::Item> {
        let op = *self.ops.get(self.op_idx)?;
        match op {
            Op::Match(l) => {
                let item = AlignedBase::Match(self.rpos, self.qpos);
                self.rpos += 1;
                self.qpos += 1;
                self.in_op += 1;
                if self.in_op == l {
                    self.op_idx += 1;
                    self.in_op = 0;
                }
                Some(item)
            }
            Op::Del(l) => {
                let item = AlignedBase::Deletion(self.rpos, l);
                self.rpos += l;
                self.op_idx += 1;
                Some(item)
            }
            Op::Ins(l) => {
                let item = AlignedBase::Insertion(self.rpos, self.qpos, l);
                self.qpos += l;
                self.op_idx += 1;
                Some(item)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeededAligner {
    kmer_size: usize,
    min_seed_fraction: f64,
    band_width: usize,
}

impl SeededAligner {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            kmer_size: config.kmer_size,
            min_seed_fraction: config.min_seed_fraction,
            band_width: config.band_width,
        }
    }
    /// Align `read` to `reference`, seeding only with k-mers of `reference[window]`.
    /// Returns the 0-based start on the reference and the operations.
    pub fn align(
        &self,
        reference: &[u8],
        window: Range<usize>,
        read: &[u8],
    ) -> Option<(usize, Vec<Op>)> {
        let k = self.kmer_size;
        let window = window.start.min(reference.len())..window.end.min(reference.len());
        if read.len() < k || window.len() < k {
            return None;
        }
        let diagonal = self.seed_diagonal(reference, window, read)?;
        let band = self.band_width as i64;
        let start = (diagonal - band).clamp(0, reference.len() as i64) as usize;
        let end = (diagonal + read.len() as i64 + band).clamp(0, reference.len() as i64) as usize;
        if end <= start {
            return None;
        }
        let score = |a: u8, b: u8| if a == b { 1i32 } else { -1i32 };
        let mut aligner = banded::Aligner::new(-5, -1, score, BAND_KMER, self.band_width);
        let aln = aligner.semiglobal(read, &reference[start..end]);
        let mut ops = vec![];
        for op in aln.operations.iter() {
            match op {
                AlignmentOperation::Match | AlignmentOperation::Subst => ops.push(Op::Match(1)),
                AlignmentOperation::Del => ops.push(Op::Del(1)),
                AlignmentOperation::Ins => ops.push(Op::Ins(1)),
                AlignmentOperation::Xclip(l) => ops.push(Op::Ins(*l)),
                AlignmentOperation::Yclip(_) => {}
            }
        }
        let ops = compress_ops(&ops);
        if query_length(&ops) != read.len() || aln.score <= 0 {
            return None;
        }
        Some((start + aln.ystart, ops))
    }
    /// Most supported start of the read on the reference, if the unique seeds cover enough of the read.
    fn seed_diagonal(&self, reference: &[u8], window: Range<usize>, read: &[u8]) -> Option<i64> {
        let k = self.kmer_size;
        let offset = window.start;
        let mut in_reference: HashMap<u64, Option<usize>> = HashMap::new();
        for (pos, code) in encode_kmers(&reference[window], k) {
            in_reference
                .entry(code)
                .and_modify(|x| *x = None)
                .or_insert(Some(pos + offset));
        }
        let read_kmers = encode_kmers(read, k);
        let mut in_read: HashMap<u64, usize> = HashMap::new();
        for &(_, code) in read_kmers.iter() {
            *in_read.entry(code).or_default() += 1;
        }
        let mut seeds: Vec<(i64, usize)> = read_kmers
            .iter()
            .filter(|(_, code)| in_read[code] == 1)
            .filter_map(|&(qpos, code)| {
                let rpos = (*in_reference.get(&code)?)?;
                Some((rpos as i64 - qpos as i64, qpos))
            })
            .collect();
        if seeds.is_empty() {
            return None;
        }
        seeds.sort_unstable();
        // Densest range of diagonals no wider than the band.
        let band = self.band_width as i64;
        let (mut best, mut best_range) = (0, 0..0);
        let mut first = 0;
        for last in 0..seeds.len() {
            while band < seeds[last].0 - seeds[first].0 {
                first += 1;
            }
            if best < last + 1 - first {
                best = last + 1 - first;
                best_range = first..last + 1;
            }
        }
        let mut supporting: Vec<(i64, usize)> = seeds[best_range].to_vec();
        let diagonal = supporting[supporting.len() / 2].0;
        supporting.sort_unstable_by_key(|x| x.1);
        let (mut covered, mut until) = (0, 0);
        for &(_, qpos) in supporting.iter() {
            let start = qpos.max(until);
            if start < qpos + k {
                covered += qpos + k - start;
                until = qpos + k;
            }
        }
        let fraction = covered as f64 / read.len() as f64;
        trace!("SEED\t{}\t{}\t{:.3}", diagonal, supporting.len(), fraction);
        (self.min_seed_fraction <= fraction).then_some(diagonal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;
    fn random_seq(seed: u64, len: usize) -> Vec<u8> {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(seed);
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }
    fn aligner() -> SeededAligner {
        SeededAligner::new(&ConsensusConfig::default())
    }
    #[test]
    fn exact_read() {
        let reference = random_seq(1, 2_000);
        let read = reference[500..1_300].to_vec();
        let (pos, ops) = aligner().align(&reference, 0..2_000, &read).unwrap();
        assert_eq!(pos, 500);
        assert_eq!(ops, vec![Op::Match(800)]);
    }
    #[test]
    fn read_with_deletion() {
        let reference = random_seq(2, 2_000);
        let mut read = reference[500..800].to_vec();
        read.extend_from_slice(&reference[803..1_300]);
        let (pos, ops) = aligner().align(&reference, 500..1_300, &read).unwrap();
        assert_eq!(pos, 500);
        assert_eq!(reference_length(&ops), 800);
        assert_eq!(query_length(&ops), 797);
        assert_eq!(ops.iter().filter(|op| matches!(op, Op::Del(_))).count(), 1);
    }
    #[test]
    fn unrelated_read() {
        let reference = random_seq(3, 2_000);
        let read = random_seq(4, 800);
        assert!(aligner().align(&reference, 0..2_000, &read).is_none());
    }
    #[test]
    fn walk_over_alignment() {
        let aln = ReadAlignment {
            read: 0,
            reverse: false,
            position: 10,
            ops: vec![Op::Match(2), Op::Ins(1), Op::Match(1), Op::Del(2), Op::Match(1)],
            seq: b"ACGTA".to_vec(),
        };
        let steps: Vec<_> = aln.walk().collect();
        use AlignedBase::*;
        assert_eq!(
            steps,
            vec![
                Match(10, 0),
                Match(11, 1),
                Insertion(12, 2, 1),
                Match(12, 3),
                Deletion(13, 2),
                Match(15, 4)
            ]
        );
        assert_eq!(aln.end(), 16);
    }
}
