//! Disjoint sets over dense integer ids, with path compression and union by size.
#[derive(Debug, Clone, Default)]
pub struct FindUnion {
    /// If parents[i] == i, i is the representative of its set.
    parents: Vec<usize>,
    /// Valid only at representatives.
    sizes: Vec<usize>,
}

impl FindUnion {
    pub fn new(size: usize) -> Self {
        Self {
            parents: (0..size).collect(),
            sizes: vec![1; size],
        }
    }
    pub fn len(&self) -> usize {
        self.parents.len()
    }
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
    /// Representative of the set of `index`, or None if out of range.
    pub fn find(&mut self, index: usize) -> Option<usize> {
        if self.len() <= index {
            return None;
        }
        let mut root = index;
        while root != self.parents[root] {
            root = self.parents[root];
        }
        let mut current = index;
        while current != root {
            let next = self.parents[current];
            self.parents[current] = root;
            current = next;
        }
        Some(root)
    }
    /// Merge the sets of the two nodes. Returns Some(true) if they were different sets.
    pub fn unite(&mut self, node1: usize, node2: usize) -> Option<bool> {
        let (root1, root2) = (self.find(node1)?, self.find(node2)?);
        if root1 == root2 {
            return Some(false);
        }
        let (large, small) = match self.sizes[root1] < self.sizes[root2] {
            true => (root2, root1),
            false => (root1, root2),
        };
        self.parents[small] = large;
        self.sizes[large] += self.sizes[small];
        Some(true)
    }
    pub fn same(&mut self, node1: usize, node2: usize) -> Option<bool> {
        Some(self.find(node1)? == self.find(node2)?)
    }
    pub fn size(&mut self, node: usize) -> Option<usize> {
        let root = self.find(node)?;
        Some(self.sizes[root])
    }
    /// Members of every set, each sorted, sets ordered by their smallest member.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
        for i in 0..self.len() {
            if let Some(root) = self.find(i) {
                by_root.entry(root).or_default().push(i);
            }
        }
        let mut components: Vec<_> = by_root.into_values().collect();
        components.sort_by_key(|c| c[0]);
        components
    }
}
