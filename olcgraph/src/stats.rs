use crate::graph::{AssemblyGraph, EdgeId};

pub trait Stats {
    fn stats<W: std::io::Write>(&self, wtr: W) -> std::io::Result<()>;
}

/// Length of the sequence spelled by a path: the first read, then the part of every next read
/// beyond its overlap.
pub fn path_length(graph: &AssemblyGraph, path: &[EdgeId]) -> usize {
    let mut length = 0;
    for (i, &id) in path.iter().enumerate() {
        let edge = graph.edge(id);
        if edge.is_same_sequence() {
            if i == 0 {
                length += graph.sequence_length(edge.vertex1.sequence);
            }
        } else if let Some(&next) = path.get(i + 1) {
            let next = graph.edge(next).vertex1.sequence;
            length += graph.sequence_length(next).saturating_sub(edge.overlap);
        }
    }
    length
}

/// N10, N20, ..., N90 of a set of lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NStatistics {
    pub count: usize,
    pub total: usize,
    pub n: [usize; 9],
}

impl NStatistics {
    pub fn new(mut lengths: Vec<usize>) -> Self {
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        let total: usize = lengths.iter().sum();
        let mut n = [0; 9];
        let (mut sum, mut k) = (0, 0);
        for &len in lengths.iter() {
            sum += len;
            while k < n.len() && total * (k + 1) <= sum * 10 {
                n[k] = len;
                k += 1;
            }
        }
        Self {
            count: lengths.len(),
            total,
            n,
        }
    }
    pub fn n50(&self) -> usize {
        self.n[4]
    }
}

/// N-statistics of the sequences spelled by the stored paths.
pub fn estimate_n_statistics(graph: &AssemblyGraph) -> NStatistics {
    let lengths: Vec<usize> = graph
        .paths()
        .iter()
        .map(|path| path_length(graph, path))
        .collect();
    NStatistics::new(lengths)
}

impl Stats for AssemblyGraph {
    fn stats<W: std::io::Write>(&self, mut wtr: W) -> std::io::Result<()> {
        let num_reads = self.num_sequences();
        let total: u64 = match num_reads {
            0 => 0,
            _ => self.cumulative_length(num_reads - 1),
        };
        writeln!(&mut wtr, "Reads")?;
        writeln!(
            &mut wtr,
            "# of Reads:{}\nTotal Length:{}\nMedian Length:{}",
            num_reads,
            total,
            self.median_length()
        )?;
        let degrees = self.vertex_degree_distribution();
        writeln!(&mut wtr, "Graph")?;
        writeln!(
            &mut wtr,
            "# of Vertices:{}\n# of Edges:{}\n# of Embedded:{}",
            self.vertices().len(),
            self.num_edges(),
            self.embedded_count()
        )?;
        writeln!(
            &mut wtr,
            "Mean Degree:{:.2}\nMax Degree:{}",
            degrees.average(),
            degrees.max_value()
        )?;
        if !self.paths().is_empty() {
            let nstats = estimate_n_statistics(self);
            writeln!(&mut wtr, "Paths")?;
            writeln!(
                &mut wtr,
                "# of Paths:{}\nTotal Length:{}\nN50:{}",
                nstats.count,
                nstats.total,
                nstats.n50()
            )?;
        }
        Ok(())
    }
}
