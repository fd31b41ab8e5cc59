//! Disjoint-set forest with path compression and union by rank.

/// Partitions `0..len` into disjoint sets.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Creates `len` singleton sets.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    /// Adds a new singleton set and returns its element.
    pub fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns `true` if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Returns the representative of `x`'s set, compressing the path to it.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merges the sets of `a` and `b`, returning the new representative.
    pub fn unite(&mut self, a: usize, b: usize) -> usize {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => {
                self.parent[ra] = rb;
                rb
            }
            std::cmp::Ordering::Greater => {
                self.parent[rb] = ra;
                ra
            }
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
                ra
            }
        }
    }

    /// Returns `true` if `a` and `b` are in the same set.
    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn singletons_are_separate() {
        let mut uf = UnionFind::new(3);
        assert!(!uf.same(0, 1));
        assert_eq!(uf.find(2), 2);
    }

    #[test]
    fn unite_is_transitive() {
        let mut uf = UnionFind::new(5);
        uf.unite(0, 1);
        uf.unite(3, 4);
        uf.unite(1, 4);
        assert!(uf.same(0, 3));
        assert!(!uf.same(0, 2));
    }

    #[test]
    fn push_extends() {
        let mut uf = UnionFind::new(1);
        let b = uf.push();
        assert_eq!(b, 1);
        assert_eq!(uf.len(), 2);
        uf.unite(0, b);
        assert!(uf.same(0, 1));
    }

    #[test]
    fn long_chain_compresses() {
        let mut uf = UnionFind::new(1000);
        for i in 1..1000 {
            uf.unite(i - 1, i);
        }
        let root = uf.find(999);
        for i in 0..1000 {
            assert_eq!(uf.find(i), root);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Connectivity does not depend on the order edges are merged in.
        #[test]
        fn closure_independent_of_order(
            edges in proptest::collection::vec((0usize..24, 0usize..24), 0..40),
            seed in any::<u64>(),
        ) {
            let mut forward = UnionFind::new(24);
            for (a, b) in &edges {
                forward.unite(*a, *b);
            }
            let mut shuffled = edges.clone();
            let len = shuffled.len();
            if len > 1 {
                let mut s = seed;
                for i in (1..len).rev() {
                    s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    shuffled.swap(i, (s >> 33) as usize % (i + 1));
                }
            }
            let mut backward = UnionFind::new(24);
            for (a, b) in shuffled.iter().rev() {
                backward.unite(*b, *a);
            }
            for x in 0..24 {
                for y in 0..24 {
                    prop_assert_eq!(forward.same(x, y), backward.same(x, y));
                }
            }
        }
    }
}
