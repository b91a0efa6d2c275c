//! Clustering of the reads of each layout path into haplotypes, by their alleles at the
//! heterozygous SNVs found in the pileup of the path.
use crate::aligner::{AlignedBase, ReadAlignment};
use crate::config::AssemblyConfig;
use crate::consensus::PathAligner;
use crate::error::Result;
use crate::graph::{AssemblyGraph, EdgeId};
use crate::pileup::{b2i, in_segments, Pileup};
use crate::task_pool::TaskPool;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Minimum number of reads carrying the minor allele.
pub const MIN_MINOR_COUNT: u32 = 5;
/// Paths with this many heterozygous SNVs or fewer are not phased.
pub const MIN_PHASING_SNVS: usize = 5;
/// Deadline of the clustering, per sequence in the graph.
pub const SECONDS_PER_SEQUENCE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeterozygousSnv {
    /// 0-based position on the draft.
    pub position: usize,
    pub reference: u8,
    /// The major and the minor allele, as indices of ACGT.
    pub alleles: (usize, usize),
    pub counts: (u32, u32),
}

/// SNVs outside the active segments where two alleles cover all reads but one,
/// one of them being the draft base.
pub fn heterozygous_snvs(pileup: &Pileup, draft: &[u8]) -> Vec<HeterozygousSnv> {
    let active = pileup.active_segments();
    let mut snvs = vec![];
    for (position, &reference) in draft.iter().enumerate() {
        if in_segments(&active, position) {
            continue;
        }
        let column = pileup.column(position);
        let depth = column.depth();
        let mut order: Vec<usize> = (0..4).collect();
        order.sort_by_key(|&b| (std::cmp::Reverse(column.m[b]), b));
        let (major, minor) = (order[0], order[1]);
        let counts = (column.m[major], column.m[minor]);
        if counts.0 + counts.1 + 1 < depth || counts.1 < MIN_MINOR_COUNT {
            continue;
        }
        let ref_idx = b2i(reference);
        if ref_idx != Some(major) && ref_idx != Some(minor) {
            continue;
        }
        snvs.push(HeterozygousSnv {
            position,
            reference,
            alleles: (major, minor),
            counts,
        });
    }
    snvs
}

/// Allele index of each read at each SNV, None if the read does not cover it.
fn read_alleles(aln: &ReadAlignment, snvs: &[HeterozygousSnv]) -> Vec<Option<usize>> {
    let index: HashMap<usize, usize> = snvs
        .iter()
        .enumerate()
        .map(|(i, snv)| (snv.position, i))
        .collect();
    let mut alleles = vec![None; snvs.len()];
    for step in aln.walk() {
        if let AlignedBase::Match(rpos, qpos) = step {
            if let Some(&i) = index.get(&rpos) {
                alleles[i] = b2i(aln.seq[qpos]);
            }
        }
    }
    alleles
}

#[derive(Debug, Clone, Default)]
struct Cluster {
    reads: Vec<usize>,
    votes: Vec<[u32; 4]>,
}

impl Cluster {
    fn new(num_snvs: usize) -> Self {
        Self {
            reads: vec![],
            votes: vec![[0; 4]; num_snvs],
        }
    }
    /// Number of SNVs where the read agrees with the majority, minus the disagreements.
    fn agreement(&self, alleles: &[Option<usize>]) -> i64 {
        self.votes
            .iter()
            .zip(alleles.iter())
            .filter_map(|(votes, allele)| {
                let allele = (*allele)?;
                let (best, count) = votes.iter().enumerate().max_by_key(|x| (x.1, 3 - x.0))?;
                (0 < *count).then_some(if best == allele { 1 } else { -1 })
            })
            .sum()
    }
    fn add(&mut self, read: usize, alleles: &[Option<usize>]) {
        self.reads.push(read);
        for (votes, allele) in self.votes.iter_mut().zip(alleles.iter()) {
            if let Some(allele) = allele {
                votes[*allele] += 1;
            }
        }
    }
}

/// Split the aligned reads into at most `ploidy` clusters by allele vote.
/// Reads covering no SNV join the first cluster.
pub fn phase_reads(
    alignments: &[ReadAlignment],
    snvs: &[HeterozygousSnv],
    ploidy: usize,
) -> Vec<Vec<usize>> {
    let mut reads: Vec<(usize, Vec<Option<usize>>)> = alignments
        .iter()
        .map(|aln| (aln.read, read_alleles(aln, snvs)))
        .collect();
    let called = |alleles: &[Option<usize>]| alleles.iter().filter(|a| a.is_some()).count();
    reads.sort_by_key(|(read, alleles)| (std::cmp::Reverse(called(alleles)), *read));
    let mut clusters: Vec<Cluster> = vec![];
    let mut uninformative = vec![];
    for (read, alleles) in reads {
        if called(&alleles) == 0 {
            uninformative.push(read);
            continue;
        }
        let best = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.agreement(&alleles), i))
            .max_by_key(|&(score, i)| (score, std::cmp::Reverse(i)));
        match best {
            Some((score, i)) if 0 < score || ploidy.max(1) <= clusters.len() => {
                clusters[i].add(read, &alleles)
            }
            _ => {
                let mut cluster = Cluster::new(snvs.len());
                cluster.add(read, &alleles);
                clusters.push(cluster);
            }
        }
    }
    let mut clusters: Vec<Vec<usize>> = clusters.into_iter().map(|c| c.reads).collect();
    match clusters.first_mut() {
        Some(first) => first.extend(uninformative),
        None => clusters.push(uninformative),
    }
    for cluster in clusters.iter_mut() {
        cluster.sort_unstable();
        cluster.dedup();
    }
    clusters.retain(|c| !c.is_empty());
    clusters.sort_by_key(|c| (std::cmp::Reverse(c.len()), c[0]));
    clusters
}

/// Merge the clusters of every path into `max(ploidy, 1)` haplotypes, largest clusters first.
pub fn merge_haplotypes(per_path: &[Vec<Vec<usize>>], ploidy: usize) -> Vec<Vec<usize>> {
    let ploidy = ploidy.max(1);
    let mut haplotypes: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); ploidy];
    for clusters in per_path {
        let mut clusters: Vec<&Vec<usize>> = clusters.iter().collect();
        clusters.sort_by_key(|c| std::cmp::Reverse(c.len()));
        for (i, cluster) in clusters.into_iter().enumerate() {
            haplotypes[i.min(ploidy - 1)].extend(cluster.iter().copied());
        }
    }
    haplotypes
        .into_iter()
        .map(|h| h.into_iter().collect())
        .collect()
}

#[derive(Debug, Clone)]
pub struct HaplotypeClusterer {
    aligner: PathAligner,
    ploidy: usize,
    threads: usize,
}

impl HaplotypeClusterer {
    pub fn new(config: &AssemblyConfig) -> Self {
        Self {
            aligner: PathAligner::new(&config.consensus),
            ploidy: config.layout.ploidy,
            threads: config.threads.max(1),
        }
    }
    /// Read clusters of one path.
    pub fn cluster_path(&self, graph: &AssemblyGraph, path: &[EdgeId]) -> Vec<Vec<usize>> {
        let aligned = self.aligner.align_path(graph, path);
        let pileup = Pileup::new(&aligned.raw, &aligned.alignments);
        let snvs = heterozygous_snvs(&pileup, &aligned.raw);
        debug!("HETSNV\t{}\t{}", aligned.raw.len(), snvs.len());
        let mut clusters = if MIN_PHASING_SNVS < snvs.len() {
            phase_reads(&aligned.alignments, &snvs, self.ploidy)
        } else {
            let mut reads: Vec<usize> = aligned.alignments.iter().map(|a| a.read).collect();
            reads.sort_unstable();
            vec![reads]
        };
        let clustered: BTreeSet<usize> = clusters.iter().flatten().copied().collect();
        let missing = aligned.reads.iter().filter(|r| !clustered.contains(r));
        if let Some(first) = clusters.first_mut() {
            first.extend(missing);
            first.sort_unstable();
            first.dedup();
        }
        clusters
    }
    /// Haplotypes of the whole graph, computed path by path on the task pool.
    pub fn cluster(&self, graph: &AssemblyGraph) -> Result<Vec<Vec<usize>>> {
        let timeout = Duration::from_secs(SECONDS_PER_SEQUENCE * graph.num_sequences() as u64);
        let pool = TaskPool::new(self.threads, timeout);
        let paths: Vec<&Vec<EdgeId>> = graph.paths().iter().collect();
        let per_path = pool.run(paths, |path| self.cluster_path(graph, path))?;
        let haplotypes = merge_haplotypes(&per_path, self.ploidy);
        let sizes: Vec<_> = haplotypes.iter().map(|h| format!("{}", h.len())).collect();
        info!("HAPLOTYPES\t{}\t{}", per_path.len(), sizes.join("\t"));
        Ok(haplotypes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Vertex};
    use definitions::{Op, ReadSet};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;
    use std::sync::Arc;
    const SNV_POSITIONS: [usize; 6] = [50, 100, 150, 200, 250, 280];
    fn genome(seed: u64, len: usize) -> Vec<u8> {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(seed);
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }
    fn alternative(base: u8) -> u8 {
        match base {
            b'A' => b'T',
            _ => b'A',
        }
    }
    fn two_haplotypes(draft: &[u8], positions: &[usize]) -> Vec<ReadAlignment> {
        (0..12)
            .map(|read| {
                let mut seq = draft.to_vec();
                if 6 <= read {
                    for &p in positions {
                        seq[p] = alternative(seq[p]);
                    }
                }
                ReadAlignment {
                    read,
                    reverse: false,
                    position: 0,
                    ops: vec![Op::Match(draft.len())],
                    seq,
                }
            })
            .collect()
    }
    #[test]
    fn detect_heterozygous_snvs() {
        let draft = genome(41, 300);
        let alns = two_haplotypes(&draft, &SNV_POSITIONS);
        let pileup = Pileup::new(&draft, &alns);
        let snvs = heterozygous_snvs(&pileup, &draft);
        let positions: Vec<_> = snvs.iter().map(|s| s.position).collect();
        assert_eq!(positions, SNV_POSITIONS.to_vec());
        assert!(snvs.iter().all(|s| s.counts == (6, 6)));
    }
    #[test]
    fn minor_allele_needs_support() {
        let draft = genome(42, 300);
        let mut alns = two_haplotypes(&draft, &SNV_POSITIONS);
        alns.truncate(10);
        let pileup = Pileup::new(&draft, &alns);
        assert!(heterozygous_snvs(&pileup, &draft).is_empty());
    }
    #[test]
    fn phase_two_haplotypes() {
        let draft = genome(43, 300);
        let alns = two_haplotypes(&draft, &SNV_POSITIONS);
        let pileup = Pileup::new(&draft, &alns);
        let snvs = heterozygous_snvs(&pileup, &draft);
        let clusters = phase_reads(&alns, &snvs, 2);
        assert_eq!(clusters, vec![(0..6).collect::<Vec<_>>(), (6..12).collect()]);
        let clusters = phase_reads(&alns, &snvs, 1);
        assert_eq!(clusters, vec![(0..12).collect::<Vec<_>>()]);
    }
    #[test]
    fn merge_into_ploidy_sets() {
        let per_path = vec![vec![vec![1, 2], vec![3]], vec![vec![4], vec![5, 6]]];
        assert_eq!(
            merge_haplotypes(&per_path, 2),
            vec![vec![1, 2, 5, 6], vec![3, 4]]
        );
        assert_eq!(merge_haplotypes(&per_path, 0), vec![vec![1, 2, 3, 4, 5, 6]]);
    }
    #[test]
    fn unphased_path_is_one_cluster() {
        let g = genome(44, 1_000);
        let reads = vec![g[..600].to_vec(), bio::alphabets::dna::revcomp(&g[400..])];
        let mut graph = AssemblyGraph::new(Arc::new(ReadSet::from_seqs(&reads)));
        let e = graph.add_edge(Edge::new(
            Vertex::new(0, false),
            Vertex::new(1, false),
            200,
            600,
            600,
        ));
        let path = vec![
            graph.same_sequence_edge(0).unwrap(),
            e,
            graph.same_sequence_edge(1).unwrap(),
        ];
        graph.add_path(path);
        let config = AssemblyConfig {
            layout: crate::config::LayoutConfig {
                ploidy: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let haplotypes = HaplotypeClusterer::new(&config).cluster(&graph).unwrap();
        assert_eq!(haplotypes, vec![vec![0, 1], vec![]]);
    }
}
