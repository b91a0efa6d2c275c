//! K-mer hits between reads and their clustering into coordinate-consistent groups.
//! [HitSource] and [ClusteringPrimitive] are the seams to the indexer; [KmerTable] and
//! [DiagonalClusterer] are the exact-match defaults.
use rayon::prelude::*;
use std::collections::HashMap;

/// A k-mer shared by a query (at `query_pos`) and a subject (at `subject_pos`).
/// `weight` is the inverse of the k-mer frequency in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmerHit {
    pub query_pos: usize,
    pub subject_pos: usize,
    pub weight: f64,
}

impl KmerHit {
    pub fn new(query_pos: usize, subject_pos: usize) -> Self {
        Self {
            query_pos,
            subject_pos,
            weight: 1f64,
        }
    }
    /// Start of the query on the subject implied by this hit.
    pub fn diagonal(&self) -> i64 {
        self.subject_pos as i64 - self.query_pos as i64
    }
}

/// Hits of one query, in one orientation, against every candidate subject.
#[derive(Debug, Clone, Default)]
pub struct QueryHits {
    /// Number of k-mers of the query, the hits it would have against itself.
    pub self_hits: usize,
    pub by_subject: HashMap<usize, Vec<KmerHit>>,
}

pub trait HitSource: Sync {
    fn kmer_length(&self) -> usize;
    /// `query` is the (possibly reverse-complemented) characters of read `query_idx`.
    fn hits(&self, query_idx: usize, query: &[u8]) -> QueryHits;
}

/// A group of hits consistent with a single placement of the query on the subject.
/// Query coordinates refer to the query in the orientation the hits were searched with.
#[derive(Debug, Clone)]
pub struct KmerHitCluster {
    pub subject_idx: usize,
    pub query_length: usize,
    pub subject_length: usize,
    pub query_predicted_start: usize,
    pub query_predicted_end: usize,
    pub query_evidence_start: usize,
    pub query_evidence_end: usize,
    /// Start of the query on the subject. Negative if the query starts before the subject.
    pub subject_predicted_start: i64,
    /// May exceed the subject length if the query extends past the subject end.
    pub subject_predicted_end: i64,
    pub subject_evidence_start: usize,
    pub subject_evidence_end: usize,
    pub num_different_kmers: usize,
    pub weighted_count: f64,
    pub overlap_sd: f64,
    pub kmer_length: usize,
    /// Sorted by query position, at most one hit per query position.
    pub hits: Vec<KmerHit>,
}

impl KmerHitCluster {
    /// Build the cluster summary from hits of one placement.
    pub fn summarize(
        subject_idx: usize,
        query_length: usize,
        subject_length: usize,
        kmer_length: usize,
        mut hits: Vec<KmerHit>,
    ) -> Option<Self> {
        if hits.is_empty() {
            return None;
        }
        let mut diagonals: Vec<i64> = hits.iter().map(|h| h.diagonal()).collect();
        diagonals.sort_unstable();
        let median = diagonals[diagonals.len() / 2];
        // One hit per query position, the one closest to the consensus placement.
        hits.sort_by_key(|h| (h.query_pos, (h.diagonal() - median).abs()));
        hits.dedup_by_key(|h| h.query_pos);
        let n = hits.len() as f64;
        let mean = hits.iter().map(|h| h.diagonal() as f64).sum::<f64>() / n;
        let var = hits
            .iter()
            .map(|h| (h.diagonal() as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        let (qlen, slen) = (query_length as i64, subject_length as i64);
        let subject_predicted_start = median;
        let subject_predicted_end = median + qlen;
        let query_predicted_start = (-median).clamp(0, qlen) as usize;
        let query_predicted_end = (slen - median).clamp(0, qlen) as usize;
        let query_evidence_start = hits
            .iter()
            .map(|h| h.query_pos.min(query_length))
            .min()
            .unwrap_or(0);
        let query_evidence_end = hits
            .iter()
            .map(|h| (h.query_pos + kmer_length).min(query_length))
            .max()
            .unwrap_or(0);
        let subject_evidence_start = hits
            .iter()
            .map(|h| h.subject_pos.min(subject_length))
            .min()
            .unwrap_or(0);
        let subject_evidence_end = hits
            .iter()
            .map(|h| (h.subject_pos + kmer_length).min(subject_length))
            .max()
            .unwrap_or(0);
        Some(Self {
            subject_idx,
            query_length,
            subject_length,
            query_predicted_start,
            query_predicted_end,
            query_evidence_start,
            query_evidence_end,
            subject_predicted_start,
            subject_predicted_end,
            subject_evidence_start,
            subject_evidence_end,
            num_different_kmers: hits.len(),
            weighted_count: hits.iter().map(|h| h.weight).sum(),
            overlap_sd: var.sqrt(),
            kmer_length,
            hits,
        })
    }
    /// Length of the subject interval covered by the predicted placement of the query.
    pub fn predicted_overlap(&self) -> usize {
        let start = self.subject_predicted_start.max(0);
        let end = self.subject_predicted_end.min(self.subject_length as i64);
        (end - start).max(0) as usize
    }
}

pub trait ClusteringPrimitive: Sync {
    fn cluster(
        &self,
        subject_idx: usize,
        query_length: usize,
        subject_length: usize,
        hits: &[KmerHit],
    ) -> Vec<KmerHitCluster>;
}

/// Groups hits whose diagonals are close to each other.
#[derive(Debug, Clone, Copy)]
pub struct DiagonalClusterer {
    pub kmer_length: usize,
    /// Largest gap between consecutive sorted diagonals inside a cluster.
    pub max_diagonal_gap: i64,
    pub min_hits: usize,
}

impl DiagonalClusterer {
    pub fn new(kmer_length: usize) -> Self {
        Self {
            kmer_length,
            max_diagonal_gap: 200,
            min_hits: 2,
        }
    }
}

impl ClusteringPrimitive for DiagonalClusterer {
    fn cluster(
        &self,
        subject_idx: usize,
        query_length: usize,
        subject_length: usize,
        hits: &[KmerHit],
    ) -> Vec<KmerHitCluster> {
        let mut hits = hits.to_vec();
        hits.sort_by_key(|h| (h.diagonal(), h.query_pos));
        let mut groups: Vec<Vec<KmerHit>> = vec![];
        for hit in hits {
            match groups.last_mut() {
                Some(group)
                    if hit.diagonal() - group.last().map(|h| h.diagonal()).unwrap_or(0)
                        <= self.max_diagonal_gap =>
                {
                    group.push(hit)
                }
                _ => groups.push(vec![hit]),
            }
        }
        groups
            .into_iter()
            .filter(|g| self.min_hits <= g.len())
            .filter_map(|g| {
                KmerHitCluster::summarize(
                    subject_idx,
                    query_length,
                    subject_length,
                    self.kmer_length,
                    g,
                )
            })
            .collect()
    }
}

const BASE2BIT: [u64; 256] = {
    let mut table = [4u64; 256];
    table[b'A' as usize] = 0;
    table[b'C' as usize] = 1;
    table[b'G' as usize] = 2;
    table[b'T' as usize] = 3;
    table[b'a' as usize] = 0;
    table[b'c' as usize] = 1;
    table[b'g' as usize] = 2;
    table[b't' as usize] = 3;
    table
};

/// 2-bit encoded k-mers of the sequence with their positions. K-mers with ambiguous bases are skipped.
pub fn encode_kmers(seq: &[u8], k: usize) -> Vec<(usize, u64)> {
    assert!(0 < k && k <= 32, "k-mer size {} is not supported", k);
    let mask = if k == 32 { u64::MAX } else { (1 << (2 * k)) - 1 };
    let mut kmers = Vec::with_capacity(seq.len());
    let (mut code, mut valid) = (0u64, 0usize);
    for (i, &b) in seq.iter().enumerate() {
        let bits = BASE2BIT[b as usize];
        if bits == 4 {
            valid = 0;
            code = 0;
            continue;
        }
        code = ((code << 2) | bits) & mask;
        valid += 1;
        if k <= valid {
            kmers.push((i + 1 - k, code));
        }
    }
    kmers
}

/// Exact k-mer index over all reads, forward strand.
#[derive(Debug, Clone)]
pub struct KmerTable {
    k: usize,
    /// K-mers occurring more often than this are ignored.
    max_occurrence: usize,
    index: HashMap<u64, Vec<(u32, u32)>>,
}

impl KmerTable {
    pub fn new<T: AsRef<[u8]> + Sync>(seqs: &[T], k: usize, max_occurrence: usize) -> Self {
        let kmers: Vec<Vec<(usize, u64)>> = seqs
            .par_iter()
            .map(|s| encode_kmers(s.as_ref(), k))
            .collect();
        let mut index: HashMap<u64, Vec<(u32, u32)>> = HashMap::new();
        for (read, kmers) in kmers.into_iter().enumerate() {
            for (pos, code) in kmers {
                index
                    .entry(code)
                    .or_default()
                    .push((read as u32, pos as u32));
            }
        }
        debug!("KMERTABLE\t{}\t{}", k, index.len());
        Self {
            k,
            max_occurrence,
            index,
        }
    }
}

impl HitSource for KmerTable {
    fn kmer_length(&self) -> usize {
        self.k
    }
    fn hits(&self, query_idx: usize, query: &[u8]) -> QueryHits {
        let kmers = encode_kmers(query, self.k);
        let mut hits = QueryHits {
            self_hits: kmers.len(),
            ..QueryHits::default()
        };
        for (query_pos, code) in kmers {
            let occs = match self.index.get(&code) {
                Some(occs) if occs.len() <= self.max_occurrence => occs,
                _ => continue,
            };
            let weight = 1f64 / occs.len() as f64;
            for &(read, subject_pos) in occs {
                let read = read as usize;
                if read == query_idx {
                    continue;
                }
                hits.by_subject.entry(read).or_default().push(KmerHit {
                    query_pos,
                    subject_pos: subject_pos as usize,
                    weight,
                });
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;
    fn random_seq(rng: &mut Xoroshiro128PlusPlus, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }
    #[test]
    fn kmer_encoding() {
        let kmers = encode_kmers(b"ACGTNACGTA", 3);
        let positions: Vec<_> = kmers.iter().map(|x| x.0).collect();
        assert_eq!(positions, vec![0, 1, 5, 6, 7]);
        assert_eq!(kmers[0].1, kmers[2].1);
        assert_eq!(kmers[0].1, 0b000110);
    }
    #[test]
    fn overlap_cluster() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(3);
        let genome = random_seq(&mut rng, 3_000);
        let reads = vec![genome[..2_000].to_vec(), genome[1_000..].to_vec()];
        let table = KmerTable::new(&reads, 15, 100);
        let hits = table.hits(1, &reads[1]);
        assert_eq!(hits.self_hits, 2_000 - 15 + 1);
        let to_zero = &hits.by_subject[&0];
        assert_eq!(to_zero.len(), 1_000 - 15 + 1);
        let clusterer = DiagonalClusterer::new(15);
        let clusters = clusterer.cluster(0, 2_000, 2_000, to_zero);
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.subject_predicted_start, 1_000);
        assert_eq!(c.subject_predicted_end, 3_000);
        assert_eq!(c.predicted_overlap(), 1_000);
        assert_eq!((c.query_predicted_start, c.query_predicted_end), (0, 1_000));
        assert_eq!((c.subject_evidence_start, c.subject_evidence_end), (1_000, 2_000));
        assert_eq!((c.query_evidence_start, c.query_evidence_end), (0, 1_000));
        assert_eq!(c.num_different_kmers, 986);
        assert_eq!(c.overlap_sd, 0f64);
    }
    #[test]
    fn evidence_stays_within_reads() {
        // Hits reported past the ends of both reads.
        let hits: Vec<_> = (0..5).map(|i| KmerHit::new(1_000 + i, 500 + i)).collect();
        let c = KmerHitCluster::summarize(0, 800, 400, 15, hits).unwrap();
        assert_eq!((c.query_evidence_start, c.query_evidence_end), (800, 800));
        assert_eq!((c.subject_evidence_start, c.subject_evidence_end), (400, 400));
    }
    #[test]
    fn distant_diagonals_are_split() {
        let mut hits: Vec<_> = (0..50).map(|i| KmerHit::new(i * 10, i * 10 + 100)).collect();
        hits.extend((0..20).map(|i| KmerHit::new(i * 10, i * 10 + 5_000)));
        hits.push(KmerHit::new(7, 9_000));
        let clusters = DiagonalClusterer::new(15).cluster(0, 1_000, 10_000, &hits);
        assert_eq!(clusters.len(), 2);
        let best = clusters.iter().max_by_key(|c| c.num_different_kmers).unwrap();
        assert_eq!(best.num_different_kmers, 50);
        assert_eq!(best.subject_predicted_start, 100);
    }
}
