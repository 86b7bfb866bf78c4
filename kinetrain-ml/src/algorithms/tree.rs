//! CART decision tree classifier with Gini impurity.
//!
//! Nodes live in a flat vector; children are referenced by index. Leaves keep
//! the raw class counts of the samples that reached them so a forest can
//! average class probabilities across trees.

use crate::error::MlError;
use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Candidate features drawn at each split.
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        counts: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct Grower<'a, 'l, 'r, R: Rng> {
    features: ArrayView2<'a, f64>,
    labels: &'l [usize],
    n_classes: usize,
    params: TreeParams,
    rng: &'r mut R,
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Grow a tree over `samples`, a list of row indices that may repeat
    /// (bootstrap draws).
    pub fn fit<R: Rng>(
        features: ArrayView2<'_, f64>,
        labels: &[usize],
        samples: &[usize],
        n_classes: usize,
        params: TreeParams,
        rng: &mut R,
    ) -> Result<Self, MlError> {
        if samples.is_empty() {
            return Err(MlError::training("Cannot grow a tree on zero samples"));
        }
        if features.ncols() == 0 {
            return Err(MlError::training("Cannot grow a tree without features"));
        }
        let mut grower = Grower {
            features,
            labels,
            n_classes,
            params: TreeParams {
                max_features: params.max_features.clamp(1, features.ncols()),
                ..params
            },
            rng,
            nodes: Vec::new(),
        };
        grower.grow(samples.to_vec(), 0);
        Ok(Self {
            nodes: grower.nodes,
        })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], id: usize) -> usize {
            match &nodes[id] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    /// Class counts of the leaf a row lands in.
    pub fn leaf_counts(&self, row: ArrayView1<'_, f64>) -> &[usize] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                TreeNode::Leaf { counts } => return counts,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Verify child links and leaf widths after deserialization.
    pub fn check(&self, n_features: usize, n_classes: usize) -> Result<(), MlError> {
        if self.nodes.is_empty() {
            return Err(MlError::model("Tree has no nodes"));
        }
        for (id, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { counts } => {
                    if counts.len() != n_classes || counts.iter().all(|&c| c == 0) {
                        return Err(MlError::model(format!("Malformed leaf at node {id}")));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    // Children are always appended after their parent.
                    if *feature >= n_features
                        || !threshold.is_finite()
                        || *left <= id
                        || *right <= id
                        || *left >= self.nodes.len()
                        || *right >= self.nodes.len()
                    {
                        return Err(MlError::model(format!("Malformed split at node {id}")));
                    }
                }
            }
        }
        Ok(())
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

impl<R: Rng> Grower<'_, '_, '_, R> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in samples {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&samples);
        let id = self.nodes.len();
        let n = samples.len();

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure
            || depth_reached
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
        {
            self.nodes.push(TreeNode::Leaf { counts });
            return id;
        }

        let parent_impurity = gini(&counts, n);
        let Some(split) = self.best_split(&samples) else {
            self.nodes.push(TreeNode::Leaf { counts });
            return id;
        };
        if split.impurity > parent_impurity {
            self.nodes.push(TreeNode::Leaf { counts });
            return id;
        }

        // Placeholder until both children have ids.
        self.nodes.push(TreeNode::Leaf { counts });
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.features[[i, split.feature]] <= split.threshold);
        let left_id = self.grow(left, depth + 1);
        let right_id = self.grow(right, depth + 1);
        self.nodes[id] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<Candidate> {
        let n_features = self.features.ncols();
        let mut candidates =
            index::sample(&mut *self.rng, n_features, self.params.max_features).into_vec();
        candidates.sort_unstable();

        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<Candidate> = None;
        let mut sorted = samples.to_vec();

        for feature in candidates {
            let column = self.features.column(feature);
            sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut left = vec![0usize; self.n_classes];
            let mut right = self.class_counts(&sorted);
            for pos in 1..n {
                let moved = self.labels[sorted[pos - 1]];
                left[moved] += 1;
                right[moved] -= 1;

                let lo = column[sorted[pos - 1]];
                let hi = column[sorted[pos]];
                if lo >= hi || pos < min_leaf || n - pos < min_leaf {
                    continue;
                }
                let impurity = (pos as f64 * gini(&left, pos)
                    + (n - pos) as f64 * gini(&right, n - pos))
                    / n as f64;
                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    let mid = lo + (hi - lo) / 2.0;
                    // Rounding can push the midpoint onto `hi`.
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(Candidate {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best
    }
}
