//! Pileup of read alignments over a draft sequence, and variant calls from it.
use crate::aligner::{AlignedBase, ReadAlignment};
use crate::config::ConsensusConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Minimum number of reads sharing an indel to mark an active segment.
pub const ACTIVE_MIN_READS: u32 = 2;
/// Minimum fraction of the coverage sharing an indel to mark an active segment.
pub const ACTIVE_MIN_FRACTION: f64 = 0.2;
/// Active segments closer than this are merged.
pub const ACTIVE_MERGE_DISTANCE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genotype {
    HomozygousAlt,
    Heterozygous,
    Undecided,
}

/// A variant against the draft. `position` is 1-based. Indels carry the preceding draft base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalledVariant {
    pub position: usize,
    pub reference: Vec<u8>,
    pub alternative: Vec<u8>,
    pub genotype: Genotype,
    pub depth: u32,
    pub alt_count: u32,
}

impl CalledVariant {
    pub fn snv(position: usize, reference: u8, alternative: u8, genotype: Genotype) -> Self {
        Self {
            position,
            reference: vec![reference],
            alternative: vec![alternative],
            genotype,
            depth: 0,
            alt_count: 0,
        }
    }
}

impl std::fmt::Display for CalledVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{:?}\t{}\t{}",
            self.position,
            String::from_utf8_lossy(&self.reference),
            String::from_utf8_lossy(&self.alternative),
            self.genotype,
            self.alt_count,
            self.depth
        )
    }
}

pub trait VariantCaller: Sync {
    fn call_variants(&self, draft: &[u8], alignments: &[ReadAlignment]) -> Vec<CalledVariant>;
}

pub fn b2i(b: u8) -> Option<usize> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

pub const BASES: [u8; 4] = *b"ACGT";

#[derive(Debug, Clone, Default)]
pub struct Column {
    pub m: [u32; 4],
    /// Reads with this base deleted.
    pub deleted: u32,
    /// Deletions starting here, by length.
    pub del: HashMap<usize, u32>,
    /// Insertions before this position, by inserted sequence.
    pub ins: HashMap<Vec<u8>, u32>,
}

impl Column {
    pub fn depth(&self) -> u32 {
        self.m.iter().sum::<u32>() + self.deleted
    }
}

/// Shift a deletion of `draft[pos..pos + len]` to its leftmost equivalent position.
pub fn left_align_deletion(draft: &[u8], mut pos: usize, len: usize) -> usize {
    while 0 < pos && draft[pos - 1] == draft[pos + len - 1] {
        pos -= 1;
    }
    pos
}

/// Shift an insertion of `seq` before `draft[pos]` to its leftmost equivalent position.
pub fn left_align_insertion(draft: &[u8], mut pos: usize, seq: &[u8]) -> (usize, Vec<u8>) {
    let mut seq = seq.to_vec();
    while 0 < pos && !seq.is_empty() && seq.last() == Some(&draft[pos - 1]) {
        seq.pop();
        seq.insert(0, draft[pos - 1]);
        pos -= 1;
    }
    (pos, seq)
}

#[derive(Debug, Clone)]
pub struct Pileup<'a> {
    draft: &'a [u8],
    column: Vec<Column>,
}

impl<'a> Pileup<'a> {
    pub fn new(draft: &'a [u8], alignments: &[ReadAlignment]) -> Self {
        let mut pileup = Self {
            draft,
            column: vec![Column::default(); draft.len()],
        };
        for aln in alignments {
            pileup.add(aln);
        }
        pileup
    }
    pub fn add(&mut self, aln: &ReadAlignment) {
        let len = self.draft.len();
        for step in aln.walk() {
            match step {
                AlignedBase::Match(r, q) if r < len => {
                    if let Some(b) = b2i(aln.seq[q]) {
                        self.column[r].m[b] += 1;
                    }
                }
                AlignedBase::Deletion(r, l) if r + l <= len => {
                    for column in self.column[r..r + l].iter_mut() {
                        column.deleted += 1;
                    }
                    let start = left_align_deletion(self.draft, r, l);
                    *self.column[start].del.entry(l).or_default() += 1;
                }
                AlignedBase::Insertion(r, q, l) if 0 < r && r < len => {
                    let (start, seq) = left_align_insertion(self.draft, r, &aln.seq[q..q + l]);
                    *self.column[start].ins.entry(seq).or_default() += 1;
                }
                _ => {}
            }
        }
    }
    pub fn len(&self) -> usize {
        self.column.len()
    }
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }
    pub fn column(&self, pos: usize) -> &Column {
        &self.column[pos]
    }
    /// Regions where enough reads share an indel, likely real variation rather than errors.
    pub fn active_segments(&self) -> Vec<Range<usize>> {
        let mut segments: Vec<Range<usize>> = vec![];
        for (pos, column) in self.column.iter().enumerate() {
            let depth = column.depth().max(1) as f64;
            let shared =
                |count: u32| ACTIVE_MIN_READS <= count && ACTIVE_MIN_FRACTION <= count as f64 / depth;
            for (&l, &count) in column.del.iter() {
                if shared(count) {
                    segments.push(pos..(pos + l).min(self.len()));
                }
            }
            if column.ins.values().any(|&count| shared(count)) {
                segments.push(pos.saturating_sub(1)..pos + 1);
            }
        }
        segments.sort_by_key(|r| (r.start, r.end));
        let mut merged: Vec<Range<usize>> = vec![];
        for segment in segments {
            match merged.last_mut() {
                Some(last) if segment.start <= last.end + ACTIVE_MERGE_DISTANCE => {
                    last.end = last.end.max(segment.end);
                }
                _ => merged.push(segment),
            }
        }
        merged
    }
}

/// Whether `pos` falls inside any of the sorted, disjoint segments.
pub fn in_segments(segments: &[Range<usize>], pos: usize) -> bool {
    let idx = segments.partition_point(|r| r.end <= pos);
    segments.get(idx).map(|r| r.contains(&pos)).unwrap_or(false)
}

#[derive(Debug, Clone, Copy)]
pub struct PileupVariantCaller {
    pub min_coverage: u32,
    pub homozygous_fraction: f64,
    pub heterozygous_fraction: f64,
}

impl PileupVariantCaller {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            min_coverage: config.min_variant_coverage,
            homozygous_fraction: config.homozygous_fraction,
            heterozygous_fraction: config.heterozygous_fraction,
        }
    }
    fn genotype(&self, alt_count: u32, depth: u32) -> Option<Genotype> {
        if depth == 0 || alt_count == 0 {
            return None;
        }
        let fraction = alt_count as f64 / depth as f64;
        if depth < self.min_coverage {
            (0.5 < fraction).then_some(Genotype::Undecided)
        } else if self.homozygous_fraction <= fraction {
            Some(Genotype::HomozygousAlt)
        } else if self.heterozygous_fraction <= fraction {
            Some(Genotype::Heterozygous)
        } else {
            None
        }
    }
}

impl VariantCaller for PileupVariantCaller {
    fn call_variants(&self, draft: &[u8], alignments: &[ReadAlignment]) -> Vec<CalledVariant> {
        let pileup = Pileup::new(draft, alignments);
        let mut variants = vec![];
        for (pos, column) in pileup.column.iter().enumerate() {
            let depth = column.depth();
            // Substitution.
            let reference = draft[pos];
            let best = (0..4)
                .filter(|&b| Some(b) != b2i(reference))
                .max_by_key(|&b| (column.m[b], std::cmp::Reverse(b)));
            if let Some(b) = best {
                if let Some(genotype) = self.genotype(column.m[b], depth) {
                    variants.push(CalledVariant {
                        position: pos + 1,
                        reference: vec![reference],
                        alternative: vec![BASES[b]],
                        genotype,
                        depth,
                        alt_count: column.m[b],
                    });
                }
            }
            if pos == 0 {
                continue;
            }
            let anchor = draft[pos - 1];
            // Deletion of draft[pos..pos + l].
            let deletion = column.del.iter().max_by_key(|&(&l, &c)| (c, std::cmp::Reverse(l)));
            if let Some((&l, &count)) = deletion {
                if let Some(genotype) = self.genotype(count, depth) {
                    variants.push(CalledVariant {
                        position: pos,
                        reference: draft[pos - 1..pos + l].to_vec(),
                        alternative: vec![anchor],
                        genotype,
                        depth,
                        alt_count: count,
                    });
                }
            }
            // Insertion before draft[pos].
            let insertion = column
                .ins
                .iter()
                .max_by(|(s1, c1), (s2, c2)| c1.cmp(c2).then(s2.cmp(s1)));
            if let Some((seq, &count)) = insertion {
                let depth = depth.max(pileup.column[pos - 1].depth());
                if let Some(genotype) = self.genotype(count, depth) {
                    let mut alternative = vec![anchor];
                    alternative.extend_from_slice(seq);
                    variants.push(CalledVariant {
                        position: pos,
                        reference: vec![anchor],
                        alternative,
                        genotype,
                        depth,
                        alt_count: count,
                    });
                }
            }
        }
        variants.sort_by_key(|v| v.position);
        debug!("VARIANTS\t{}\t{}", draft.len(), variants.len());
        variants
    }
}

/// Rewrite the draft with the homozygous alternative calls. Other calls, overlapping calls and
/// calls whose reference allele does not match the draft are ignored.
pub fn apply_variants(draft: &[u8], variants: &[CalledVariant]) -> Vec<u8> {
    let mut calls: Vec<&CalledVariant> = variants
        .iter()
        .filter(|v| v.genotype == Genotype::HomozygousAlt && 0 < v.position)
        .collect();
    calls.sort_by_key(|v| v.position);
    let mut polished = Vec::with_capacity(draft.len());
    let mut cursor = 0;
    for call in calls {
        let start = call.position - 1;
        let end = start + call.reference.len();
        if start < cursor || draft.len() < end {
            continue;
        }
        if draft[start..end] != call.reference[..] {
            warn!("Reference allele mismatch at {}", call);
            continue;
        }
        polished.extend_from_slice(&draft[cursor..start]);
        polished.extend_from_slice(&call.alternative);
        cursor = end;
    }
    polished.extend_from_slice(&draft[cursor..]);
    polished
}

#[cfg(test)]
mod tests {
    use super::*;
    use definitions::Op;
    fn aln(read: usize, position: usize, ops: Vec<Op>, seq: &[u8]) -> ReadAlignment {
        ReadAlignment {
            read,
            reverse: false,
            position,
            ops,
            seq: seq.to_vec(),
        }
    }
    #[test]
    fn apply_homozygous_call() {
        let draft = b"ACGTACGTTTTT";
        let hom = CalledVariant::snv(5, b'A', b'G', Genotype::HomozygousAlt);
        assert_eq!(apply_variants(draft, &[hom]), b"ACGTGCGTTTTT".to_vec());
        let het = CalledVariant::snv(5, b'A', b'G', Genotype::Heterozygous);
        assert_eq!(apply_variants(draft, &[het]), draft.to_vec());
        let undecided = CalledVariant::snv(5, b'A', b'G', Genotype::Undecided);
        assert_eq!(apply_variants(draft, &[undecided]), draft.to_vec());
    }
    #[test]
    fn apply_indels() {
        let draft = b"ACGTACGTTTTT";
        let del = CalledVariant {
            position: 2,
            reference: b"CGT".to_vec(),
            alternative: b"C".to_vec(),
            genotype: Genotype::HomozygousAlt,
            depth: 10,
            alt_count: 10,
        };
        let ins = CalledVariant {
            position: 6,
            reference: b"C".to_vec(),
            alternative: b"CAA".to_vec(),
            ..del.clone()
        };
        assert_eq!(apply_variants(draft, &[ins, del]), b"ACACAAGTTTTT".to_vec());
    }
    #[test]
    fn left_alignment() {
        // Deleting any T of the run gives the same sequence.
        assert_eq!(left_align_deletion(b"ACGTTTTA", 5, 1), 3);
        assert_eq!(left_align_deletion(b"ACACACG", 4, 2), 0);
        assert_eq!(left_align_insertion(b"ACGTTA", 5, b"T"), (3, b"T".to_vec()));
        assert_eq!(left_align_insertion(b"AACA", 3, b"AC"), (1, b"AC".to_vec()));
        assert_eq!(left_align_insertion(b"AACA", 3, b"CA"), (3, b"CA".to_vec()));
    }
    #[test]
    fn call_from_pileup() {
        let draft = b"ACGTACGTTTTTACGA";
        let mut alignments = vec![];
        for i in 0..4 {
            alignments.push(aln(i, 0, vec![Op::Match(16)], b"ACGTGCGTTTTTACGA"));
        }
        alignments.push(aln(4, 0, vec![Op::Match(16)], draft));
        // One T of the run deleted, left-aligned to the first T.
        for i in 5..8 {
            alignments.push(aln(
                i,
                0,
                vec![Op::Match(10), Op::Del(1), Op::Match(5)],
                b"ACGTGCGTTTTACGA",
            ));
        }
        let caller = PileupVariantCaller::new(&ConsensusConfig::default());
        let variants = caller.call_variants(draft, &alignments);
        let snv = variants.iter().find(|v| v.position == 5).unwrap();
        assert_eq!(snv.genotype, Genotype::HomozygousAlt);
        assert_eq!((snv.alt_count, snv.depth), (7, 8));
        let del = variants.iter().find(|v| v.reference.len() == 2).unwrap();
        assert_eq!(del.position, 7);
        assert_eq!(del.reference, b"GT".to_vec());
        assert_eq!(del.alternative, b"G".to_vec());
        assert_eq!(del.genotype, Genotype::Heterozygous);
        let polished = apply_variants(draft, &variants);
        assert_eq!(polished, b"ACGTGCGTTTTTACGA".to_vec());
        let pileup = Pileup::new(draft, &alignments);
        assert_eq!(pileup.active_segments(), vec![7..8]);
        assert!(in_segments(&pileup.active_segments(), 7));
        assert!(!in_segments(&pileup.active_segments(), 8));
    }
}
