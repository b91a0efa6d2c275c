//! Indel error correction of reads through the draft of the path they belong to.
//! Isolated indels of a read against the draft are undone, except inside active segments,
//! where enough reads share an indel for it to be real variation.
use crate::aligner::{AlignedBase, ReadAlignment};
use crate::config::AssemblyConfig;
use crate::consensus::PathAligner;
use crate::graph::AssemblyGraph;
use crate::layout::KruskalPath;
use crate::pileup::{in_segments, Pileup};
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionSummary {
    pub paths: usize,
    pub corrected_reads: usize,
    pub corrected_errors: usize,
    /// Reads reached from a second path, left as corrected by the first.
    pub skipped_reads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CorrectedRead {
    read: usize,
    seq: Vec<u8>,
    errors: usize,
}

/// Rewrite the read of `aln` in its aligned orientation: inserted bases are dropped and deleted
/// bases are copied from the draft, outside of the active segments.
pub fn correct_alignment(
    draft: &[u8],
    aln: &ReadAlignment,
    active: &[Range<usize>],
) -> (Vec<u8>, usize) {
    let mut corrected = Vec::with_capacity(aln.seq.len());
    let mut errors = 0;
    for step in aln.walk() {
        match step {
            AlignedBase::Match(_, qpos) => corrected.push(aln.seq[qpos]),
            AlignedBase::Insertion(pos, qpos, len) => {
                // Inserted before `pos`: active if either neighbour is.
                let is_active =
                    in_segments(active, pos) || (0 < pos && in_segments(active, pos - 1));
                if is_active {
                    corrected.extend_from_slice(&aln.seq[qpos..qpos + len]);
                } else {
                    errors += 1;
                }
            }
            AlignedBase::Deletion(pos, len) => {
                if (pos..pos + len).any(|p| in_segments(active, p)) {
                    continue;
                }
                let end = (pos + len).min(draft.len());
                corrected.extend_from_slice(&draft[pos.min(end)..end]);
                errors += 1;
            }
        }
    }
    (corrected, errors)
}

#[derive(Debug, Clone)]
pub struct IndelCorrector {
    config: AssemblyConfig,
}

impl IndelCorrector {
    pub fn new(config: &AssemblyConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
    /// Correct the reads of `graph` in place. The layout is computed on a sanitized copy,
    /// so the edges of `graph` are left untouched.
    pub fn correct(&self, graph: &mut AssemblyGraph) -> CorrectionSummary {
        let mut scratch = graph.subgraph(None);
        scratch.remove_chimeric_reads(&self.config.chimera);
        scratch.update_scores(&self.config);
        scratch.filter_embedded();
        scratch.build_layout(&KruskalPath { min_reads: 1 });
        self.correct_with_layout(&scratch, graph)
    }
    /// Correct the reads of `graph` through the paths stored in `layout`.
    pub fn correct_with_layout(
        &self,
        layout: &AssemblyGraph,
        graph: &mut AssemblyGraph,
    ) -> CorrectionSummary {
        let aligner = PathAligner::new(&self.config.consensus);
        let per_path: Vec<Vec<CorrectedRead>> = layout
            .paths()
            .par_iter()
            .map(|path| {
                let aligned = aligner.align_path(layout, path);
                let active = Pileup::new(&aligned.raw, &aligned.alignments).active_segments();
                debug!(
                    "CORRECTPATH\t{}\t{}\t{}",
                    aligned.raw.len(),
                    aligned.alignments.len(),
                    active.len()
                );
                aligned
                    .alignments
                    .iter()
                    .map(|aln| {
                        let (seq, errors) = correct_alignment(&aligned.raw, aln, &active);
                        let seq = match aln.reverse {
                            true => bio::alphabets::dna::revcomp(&seq),
                            false => seq,
                        };
                        CorrectedRead {
                            read: aln.read,
                            seq,
                            errors,
                        }
                    })
                    .collect()
            })
            .collect();
        let mut summary = CorrectionSummary {
            paths: per_path.len(),
            ..Default::default()
        };
        let mut corrected_by: HashMap<usize, usize> = HashMap::new();
        for (path_id, reads) in per_path.into_iter().enumerate() {
            for read in reads {
                if let Some(first) = corrected_by.get(&read.read) {
                    warn!(
                        "Read {} already corrected by path {}. Skipped in path {}",
                        read.read, first, path_id
                    );
                    summary.skipped_reads += 1;
                    continue;
                }
                corrected_by.insert(read.read, path_id);
                summary.corrected_reads += 1;
                summary.corrected_errors += read.errors;
                graph.set_corrected_sequence(read.read, read.seq);
            }
        }
        info!(
            "CORRECTED\t{}\t{}\t{}",
            summary.corrected_reads, summary.corrected_errors, summary.skipped_reads
        );
        summary
    }
}
