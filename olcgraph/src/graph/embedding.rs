//! Resolution of transitive embeddings and selection of a single host per read.
use super::{AssemblyGraph, Embedding, EmbeddingId};
use std::collections::{HashMap, HashSet, VecDeque};

/// A read reached from two different hosts while resolving the embeddings of a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentConflict {
    pub sequence: usize,
    pub kept_host: usize,
    pub other_host: usize,
}

/// Every read embedded, directly or transitively, in `root`, with coordinates relative to the root.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedTree {
    pub root: usize,
    /// Sorted by start on the root.
    pub relations: Vec<Embedding>,
    pub conflicts: Vec<ParentConflict>,
}

/// Express `child`, given relative to its host, relative to the root of `parent`.
fn compose(parent: &Embedding, child: &Embedding) -> Embedding {
    let plen = parent.sequence_length;
    let mirror = |x: usize| plen.saturating_sub(x.min(plen));
    let (start, end, ev_start, ev_end) = if parent.reverse {
        (
            mirror(child.host_end),
            mirror(child.host_start),
            mirror(child.host_evidence_end),
            mirror(child.host_evidence_start),
        )
    } else {
        (
            child.host_start,
            child.host_end,
            child.host_evidence_start,
            child.host_evidence_end,
        )
    };
    let offset = parent.host_start;
    Embedding {
        host: parent.host,
        host_start: offset + start,
        host_end: offset + end,
        reverse: parent.reverse != child.reverse,
        host_evidence_start: offset + ev_start,
        host_evidence_end: offset + ev_end,
        host_length: parent.host_length,
        ..child.clone()
    }
}

impl AssemblyGraph {
    /// Breadth-first walk over the embedding forest below `root`.
    /// A read reachable through a second host is reported as a conflict and keeps its first host.
    pub fn all_embedded(&self, root: usize) -> EmbeddedTree {
        let mut resolved: HashMap<usize, Embedding> = HashMap::new();
        let mut direct_host: HashMap<usize, usize> = HashMap::new();
        let mut visited: HashSet<usize> = HashSet::new();
        visited.insert(root);
        let mut queue = VecDeque::new();
        queue.push_back(root);
        let mut conflicts = vec![];
        while let Some(host) = queue.pop_front() {
            for &id in self.embedded_by_host(host) {
                let embedded = self.embedding(id);
                let seq = embedded.sequence;
                if !visited.insert(seq) {
                    let kept_host = direct_host.get(&seq).copied().unwrap_or(root);
                    warn!(
                        "Read {} embedded in both {} and {} (root {})",
                        seq, kept_host, host, root
                    );
                    conflicts.push(ParentConflict {
                        sequence: seq,
                        kept_host,
                        other_host: host,
                    });
                    continue;
                }
                let relation = match resolved.get(&host) {
                    Some(parent) => compose(parent, embedded),
                    None => embedded.clone(),
                };
                resolved.insert(seq, relation);
                direct_host.insert(seq, host);
                queue.push_back(seq);
            }
        }
        let mut relations: Vec<_> = resolved.into_values().collect();
        relations.sort_by_key(|e| (e.host_start, e.sequence));
        EmbeddedTree {
            root,
            relations,
            conflicts,
        }
    }
    /// Keep, for every embedded read, only the relation to its best host (highest score, then
    /// lowest cost), then break cycles of hosts by dropping the weakest relation of each cycle.
    /// Returns the number of relations removed.
    pub fn filter_embedded(&mut self) -> usize {
        let better = |a: &Embedding, b: &Embedding| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.cost.cmp(&a.cost))
                .then(b.host.cmp(&a.host))
        };
        let mut sequences: Vec<usize> = self.embedded_by_sequence.keys().copied().collect();
        sequences.sort_unstable();
        let mut removed = 0;
        for &seq in sequences.iter() {
            let ids: Vec<EmbeddingId> = self.embedded_by_sequence(seq).to_vec();
            let best = ids
                .iter()
                .copied()
                .max_by(|&a, &b| better(self.embedding(a), self.embedding(b)));
            for id in ids.into_iter().filter(|&id| Some(id) != best) {
                self.remove_embedded(id);
                removed += 1;
            }
        }
        // Every read has at most one host now: follow the host chains.
        let host_of = |graph: &Self, seq: usize| -> Option<EmbeddingId> {
            graph.embedded_by_sequence(seq).first().copied()
        };
        let mut finished: HashSet<usize> = HashSet::new();
        for &seq in sequences.iter() {
            let mut chain: Vec<usize> = vec![];
            let mut current = seq;
            loop {
                if finished.contains(&current) {
                    break;
                }
                if let Some(pos) = chain.iter().position(|&s| s == current) {
                    let weakest = chain[pos..]
                        .iter()
                        .filter_map(|&s| host_of(self, s))
                        .min_by(|&a, &b| better(self.embedding(a), self.embedding(b)));
                    if let Some(id) = weakest {
                        debug!("EMBCYCLE\t{}", self.embedding(id));
                        self.remove_embedded(id);
                        removed += 1;
                    }
                    break;
                }
                chain.push(current);
                match host_of(self, current) {
                    Some(id) => current = self.embedding(id).host,
                    None => break,
                }
            }
            finished.extend(chain);
        }
        debug!("EMBFILTER\t{}", removed);
        removed
    }
}
