/// Union-Find (Disjoint Sets) over dense segment indices
///
/// Segments live in an arena (the input slice); sets are tracked by index, so
/// components never hold references to each other.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Create a new UnionFind with n singleton sets
    pub fn new(n: usize) -> Self {
        let parent = (0..n).collect();
        let rank = vec![0; n];
        UnionFind { parent, rank }
    }

    /// Add a new singleton set and return its element
    pub fn make_set(&mut self) -> usize {
        let element = self.parent.len();
        self.parent.push(element);
        self.rank.push(0);
        element
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Find the root of element x with path halving
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Union the sets containing x and y; returns false if they were already joined
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return false;
        }

        // Union by rank
        if self.rank[root_x] < self.rank[root_y] {
            self.parent[root_x] = root_y;
        } else if self.rank[root_x] > self.rank[root_y] {
            self.parent[root_y] = root_x;
        } else {
            self.parent[root_y] = root_x;
            self.rank[root_x] += 1;
        }
        true
    }

    /// Check if two elements are in the same set
    pub fn connected(&mut self, x: usize, y: usize) -> bool {
        self.find(x) == self.find(y)
    }

    /// Group the given elements by set, preserving the order they are listed in.
    /// Groups come back ordered by their first listed element.
    pub fn sets_of(&mut self, elements: &[usize]) -> Vec<Vec<usize>> {
        let mut root_to_group: std::collections::HashMap<usize, usize> =
            std::collections::HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for &element in elements {
            let root = self.find(element);
            let slot = *root_to_group.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(element);
        }

        groups
    }

    /// All sets, each sorted, ordered by smallest element
    pub fn get_sets(&mut self) -> Vec<Vec<usize>> {
        let all: Vec<usize> = (0..self.parent.len()).collect();
        self.sets_of(&all)
    }
}
