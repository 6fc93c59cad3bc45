//! Single-linkage hierarchical clustering of 2D points
//!
//! Cutting a single-linkage dendrogram at distance `t` gives the connected
//! components of the graph joining every pair of points at most `t` apart,
//! so clusters are built directly with a union-find over those pairs.

/// Disjoint-set forest with path halving and union by size.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}

/// Group `points` `(x, y)` into single-linkage clusters at `threshold`.
///
/// Each cluster lists member indices in ascending order; clusters are
/// ordered by their smallest member.
pub fn single_linkage(points: &[(f64, f64)], threshold: f64) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut uf = UnionFind::new(n);
    let t2 = threshold * threshold;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = points[i].0 - points[j].0;
            let dy = points[i].1 - points[j].1;
            if dx * dx + dy * dy <= t2 {
                uf.union(i, j);
            }
        }
    }

    let mut root_to_cluster = std::collections::HashMap::new();
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = uf.find(i);
        let idx = *root_to_cluster.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[idx].push(i);
    }
    clusters
}

/// Mean position of the selected points.
pub fn centroid(points: &[(f64, f64)], members: &[usize]) -> Option<(f64, f64)> {
    if members.is_empty() {
        return None;
    }
    let n = members.len() as f64;
    let (sx, sy) = members
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &i| (sx + points[i].0, sy + points[i].1));
    Some((sx / n, sy / n))
}

/// Root-mean-square distance of members from their centroid, per axis:
/// `sqrt((var_x + var_y) / 2)`.
pub fn spread(points: &[(f64, f64)], members: &[usize]) -> f64 {
    let Some((cx, cy)) = centroid(points, members) else {
        return 0.0;
    };
    let n = members.len() as f64;
    let ss = members.iter().fold(0.0, |acc, &i| {
        let (dx, dy) = (points[i].0 - cx, points[i].1 - cy);
        acc + dx * dx + dy * dy
    });
    (ss / (2.0 * n)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_chain_links_transitively() {
        // consecutive points 150 apart chain into one cluster at 200
        let points: Vec<(f64, f64)> = (0..5).map(|i| (i as f64 * 150.0, 0.0)).collect();
        let clusters = single_linkage(&points, 200.0);
        assert_eq!(clusters, vec![vec![0, 1, 2, 3, 4]]);
        assert_eq!(single_linkage(&points, 100.0).len(), 5);
    }

    #[test]
    fn test_two_groups_ordered_by_first_member() {
        let points = vec![(1000.0, 1000.0), (0.0, 0.0), (1010.0, 1000.0), (5.0, 5.0)];
        let clusters = single_linkage(&points, 50.0);
        assert_eq!(clusters, vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let points = vec![(0.0, 0.0), (200.0, 0.0)];
        assert_eq!(single_linkage(&points, 200.0).len(), 1);
    }

    #[test]
    fn test_centroid_and_spread() {
        let points = vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];
        let members = [0, 1, 2, 3];
        assert_eq!(centroid(&points, &members), Some((5.0, 5.0)));
        assert_relative_eq!(spread(&points, &members), 5.0);
        assert_eq!(spread(&points, &[]), 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(single_linkage(&[], 10.0).is_empty());
    }
}
