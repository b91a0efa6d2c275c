//! Consensus of a layout path: stitch the oriented reads along the path, align the path reads and
//! their embedded reads back to the draft, and apply the homozygous alternative calls.
use crate::aligner::{ReadAlignment, SeededAligner};
use crate::config::ConsensusConfig;
use crate::graph::{AssemblyGraph, EdgeId, Vertex};
use crate::pileup::{apply_variants, Genotype, VariantCaller};
use definitions::Contig;
use rayon::prelude::*;

/// The draft of a path and the reads aligned to it.
#[derive(Debug, Clone, Default)]
pub struct PathAlignment {
    pub raw: Vec<u8>,
    /// Sorted by position.
    pub alignments: Vec<ReadAlignment>,
    /// Reads stitched into the draft, in path order.
    pub reads: Vec<usize>,
    pub total_reads: usize,
    pub unaligned_reads: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PathConsensus {
    pub raw: Vec<u8>,
    pub polished: Vec<u8>,
    pub reads: Vec<usize>,
    pub aligned_reads: usize,
    pub unaligned_reads: usize,
    pub applied_variants: usize,
}

fn oriented(graph: &AssemblyGraph, sequence: usize, reverse: bool) -> Vec<u8> {
    let seq = graph.sequence(sequence);
    match reverse {
        true => bio::alphabets::dna::revcomp(seq).to_ascii_uppercase(),
        false => seq.to_ascii_uppercase(),
    }
}

/// Builds the draft of a path and places the path reads and their embedded reads on it.
#[derive(Debug, Clone, Copy)]
pub struct PathAligner {
    aligner: SeededAligner,
}

impl PathAligner {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            aligner: SeededAligner::new(config),
        }
    }
    /// Stitch the reads of the path and align each of them, with every read embedded in it,
    /// to the draft. Panics if consecutive edges of the path do not share a vertex.
    ///
    /// The path must start with the same-sequence edge of its first read, as the paths of
    /// `layout` do. If it starts with an overlap edge instead, the first read is entered
    /// through its far end and is stitched reverse-complemented ahead of the next read.
    pub fn align_path(&self, graph: &AssemblyGraph, path: &[EdgeId]) -> PathAlignment {
        let mut result = PathAlignment::default();
        if path.len() == 1 {
            let seq = graph.edge(path[0]).vertex1.sequence;
            result.raw = graph.sequence(seq).to_vec();
            result.reads.push(seq);
            return result;
        }
        let mut last: Option<Vertex> = None;
        for (j, &id) in path.iter().enumerate() {
            let edge = graph.edge(id);
            let (prev, next) = if j == 0 {
                let next = match path.get(1).and_then(|&n| edge.shared_vertex(graph.edge(n))) {
                    Some(next) => next,
                    None => panic!("Inconsistency found in the first edge of a path: {}", edge),
                };
                match edge.vertex1 == next {
                    true => (edge.vertex2, next),
                    false => (edge.vertex1, next),
                }
            } else if last == Some(edge.vertex1) {
                (edge.vertex1, edge.vertex2)
            } else if last == Some(edge.vertex2) {
                (edge.vertex2, edge.vertex1)
            } else {
                panic!("Inconsistency found in a path at {}", edge);
            };
            if j == 0 {
                result.raw = oriented(graph, prev.sequence, !prev.is_start);
                result.reads.push(prev.sequence);
            }
            if prev.sequence != next.sequence {
                let seq = oriented(graph, next.sequence, !next.is_start);
                if edge.overlap < seq.len() {
                    result.raw.extend_from_slice(&seq[edge.overlap..]);
                    result.reads.push(next.sequence);
                } else {
                    warn!(
                        "Non embedded edge has overlap {} and length {}",
                        edge.overlap,
                        seq.len()
                    );
                }
            } else {
                self.align_with_embedded(graph, prev, &mut result);
            }
            last = Some(next);
        }
        result.alignments.sort_by_key(|a| (a.position, a.read));
        debug!(
            "PATHALN\t{}\t{}\t{}\t{}",
            result.raw.len(),
            result.total_reads,
            result.alignments.len(),
            result.unaligned_reads
        );
        result
    }
    /// Align the read of `entry` and the reads embedded in it to the tail of the draft.
    fn align_with_embedded(&self, graph: &AssemblyGraph, entry: Vertex, result: &mut PathAlignment) {
        let reverse = !entry.is_start;
        let host = entry.sequence;
        let read = oriented(graph, host, reverse);
        let window = result.raw.len().saturating_sub(read.len())..result.raw.len();
        let mut targets = vec![(host, reverse, read)];
        for embedded in graph.all_embedded(host).relations {
            let reverse_e = reverse != embedded.reverse;
            let seq = oriented(graph, embedded.sequence, reverse_e);
            targets.push((embedded.sequence, reverse_e, seq));
        }
        for (read, reverse, seq) in targets {
            result.total_reads += 1;
            match self.aligner.align(&result.raw, window.clone(), &seq) {
                Some((position, ops)) => result.alignments.push(ReadAlignment {
                    read,
                    reverse,
                    position,
                    ops,
                    seq,
                }),
                None => {
                    trace!("UNALIGNED\t{}\t{}", read, seq.len());
                    result.unaligned_reads += 1;
                }
            }
        }
    }
}

pub struct ConsensusBuilder<'a, V: VariantCaller> {
    paths: PathAligner,
    caller: &'a V,
}

impl<'a, V: VariantCaller> ConsensusBuilder<'a, V> {
    pub fn new(config: &ConsensusConfig, caller: &'a V) -> Self {
        Self {
            paths: PathAligner::new(config),
            caller,
        }
    }
    pub fn make_consensus(&self, graph: &AssemblyGraph, path: &[EdgeId]) -> PathConsensus {
        let aligned = self.paths.align_path(graph, path);
        if path.len() == 1 {
            return PathConsensus {
                polished: aligned.raw.clone(),
                raw: aligned.raw,
                reads: aligned.reads,
                ..Default::default()
            };
        }
        let variants = self.caller.call_variants(&aligned.raw, &aligned.alignments);
        let applied_variants = variants
            .iter()
            .filter(|v| v.genotype == Genotype::HomozygousAlt)
            .count();
        let polished = apply_variants(&aligned.raw, &variants);
        info!(
            "CONSENSUS\t{}\t{}\t{}\t{}\t{}",
            aligned.reads.len(),
            aligned.alignments.len(),
            aligned.unaligned_reads,
            variants.len(),
            applied_variants
        );
        PathConsensus {
            raw: aligned.raw,
            polished,
            reads: aligned.reads,
            aligned_reads: aligned.alignments.len(),
            unaligned_reads: aligned.unaligned_reads,
            applied_variants,
        }
    }
    /// One contig per stored path, computed in parallel.
    pub fn make_contigs(&self, graph: &AssemblyGraph) -> Vec<Contig> {
        graph
            .paths()
            .par_iter()
            .enumerate()
            .map(|(i, path)| {
                let consensus = self.make_consensus(graph, path);
                Contig {
                    name: format!("Contig_{}", i + 1),
                    seq: String::from_utf8_lossy(&consensus.polished).into_owned(),
                    reads: consensus
                        .reads
                        .iter()
                        .map(|&r| graph.reads().raw_reads[r].id)
                        .collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Embedding};
    use crate::pileup::PileupVariantCaller;
    use definitions::{Op, ReadSet};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;
    use std::sync::Arc;
    fn genome(seed: u64, len: usize) -> Vec<u8> {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(seed);
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }
    fn graph_of(reads: &[Vec<u8>]) -> AssemblyGraph {
        AssemblyGraph::new(Arc::new(ReadSet::from_seqs(reads)))
    }
    fn two_read_path(graph: &mut AssemblyGraph, v0: Vertex, v1: Vertex, overlap: usize) -> Vec<EdgeId> {
        let (l0, l1) = (
            graph.sequence_length(v0.sequence),
            graph.sequence_length(v1.sequence),
        );
        let e = graph.add_edge(Edge::new(v0, v1, overlap, l0, l1));
        let ss0 = graph.same_sequence_edge(v0.sequence).unwrap();
        let ss1 = graph.same_sequence_edge(v1.sequence).unwrap();
        vec![ss0, e, ss1]
    }
    #[test]
    fn stitch_two_reads() {
        let reads = vec![b"ACGTACGT".to_vec(), b"ACGTTTTT".to_vec()];
        let mut graph = graph_of(&reads);
        let path = two_read_path(&mut graph, Vertex::new(0, false), Vertex::new(1, true), 4);
        let aligned = PathAligner::new(&ConsensusConfig::default()).align_path(&graph, &path);
        assert_eq!(aligned.raw, b"ACGTACGTTTTT".to_vec());
        assert_eq!(aligned.reads, vec![0, 1]);
        // Too short to be seeded.
        assert_eq!(aligned.unaligned_reads, 2);
        let caller = PileupVariantCaller::new(&ConsensusConfig::default());
        let builder = ConsensusBuilder::new(&ConsensusConfig::default(), &caller);
        let consensus = builder.make_consensus(&graph, &path);
        assert_eq!(consensus.polished, b"ACGTACGTTTTT".to_vec());
    }
    #[test]
    fn path_must_start_with_a_read() {
        let reads = vec![b"AAAAACGT".to_vec(), b"ACGTTTTT".to_vec()];
        let mut graph = graph_of(&reads);
        let path = two_read_path(&mut graph, Vertex::new(0, false), Vertex::new(1, true), 4);
        let aligner = PathAligner::new(&ConsensusConfig::default());
        let aligned = aligner.align_path(&graph, &path);
        assert_eq!(aligned.raw, b"AAAAACGTTTTT".to_vec());
        // Without the leading same-sequence edge, read 0 is entered through its end.
        let aligned = aligner.align_path(&graph, &path[1..]);
        assert_eq!(aligned.raw, b"ACGTTTTTTTTT".to_vec());
        assert_eq!(aligned.reads, vec![0, 1]);
    }
    #[test]
    fn singleton_is_verbatim() {
        let reads = vec![b"ACGTNNACGGT".to_vec(), b"ACGTTTTT".to_vec()];
        let graph = graph_of(&reads);
        let caller = PileupVariantCaller::new(&ConsensusConfig::default());
        let builder = ConsensusBuilder::new(&ConsensusConfig::default(), &caller);
        let path = vec![graph.same_sequence_edge(0).unwrap()];
        let consensus = builder.make_consensus(&graph, &path);
        assert_eq!(consensus.polished, reads[0]);
        assert_eq!(consensus.reads, vec![0]);
    }
    #[test]
    fn reversed_reads_and_embedded() {
        let g = genome(21, 1_000);
        let reads = vec![
            g[..600].to_vec(),
            bio::alphabets::dna::revcomp(&g[400..]),
            g[100..400].to_vec(),
            bio::alphabets::dna::revcomp(&g[700..900]),
        ];
        let mut graph = graph_of(&reads);
        graph.add_embedded(Embedding::new(2, 300, false, 0, 600, (100, 400)));
        graph.add_embedded(Embedding::new(3, 200, false, 1, 600, (100, 300)));
        let path = two_read_path(&mut graph, Vertex::new(0, false), Vertex::new(1, false), 200);
        let aligned = PathAligner::new(&ConsensusConfig::default()).align_path(&graph, &path);
        assert_eq!(aligned.raw, g);
        assert_eq!(aligned.unaligned_reads, 0);
        let placed: Vec<_> = aligned
            .alignments
            .iter()
            .map(|a| (a.read, a.reverse, a.position))
            .collect();
        assert_eq!(
            placed,
            vec![(0, false, 0), (2, false, 100), (1, true, 400), (3, true, 700)]
        );
        assert!(aligned.alignments.iter().all(|a| a.ops.len() == 1));
        assert_eq!(aligned.alignments[0].ops, vec![Op::Match(600)]);
    }
    #[test]
    fn polishing_fixes_draft_error() {
        let g = genome(22, 1_000);
        let mut first = g[..600].to_vec();
        first[250] = match first[250] {
            b'A' => b'C',
            _ => b'A',
        };
        let mut reads = vec![first, bio::alphabets::dna::revcomp(&g[400..])];
        for _ in 0..4 {
            reads.push(g[150..400].to_vec());
        }
        let mut graph = graph_of(&reads);
        for i in 2..6 {
            graph.add_embedded(Embedding::new(i, 250, false, 0, 600, (150, 400)));
        }
        let path = two_read_path(&mut graph, Vertex::new(0, false), Vertex::new(1, false), 200);
        let caller = PileupVariantCaller::new(&ConsensusConfig::default());
        let builder = ConsensusBuilder::new(&ConsensusConfig::default(), &caller);
        let consensus = builder.make_consensus(&graph, &path);
        assert_ne!(consensus.raw, g);
        assert_eq!(consensus.polished, g);
        assert_eq!(consensus.applied_variants, 1);
        assert_eq!(consensus.aligned_reads, 6);
    }
    #[test]
    #[should_panic]
    fn broken_path_is_fatal() {
        let reads = vec![b"ACGTACGT".to_vec(), b"ACGTTTTT".to_vec()];
        let graph = graph_of(&reads);
        let path = vec![
            graph.same_sequence_edge(0).unwrap(),
            graph.same_sequence_edge(1).unwrap(),
        ];
        PathAligner::new(&ConsensusConfig::default()).align_path(&graph, &path);
    }
}
