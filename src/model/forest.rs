//! Random forest of CART decision trees for binary classification.
//!
//! Trees are grown to purity on bootstrap samples with Gini impurity and a
//! random subset of candidate features per split. Prediction averages the
//! leaf class-1 fractions of all trees (soft voting).

use serde::{Deserialize, Serialize};

use crate::ingest::types::FEATURE_COUNT;

/// One feature row.
pub type Sample = [f64; FEATURE_COUNT];

/// Linear congruential generator used for bootstrap and feature sampling.
///
/// Seeded explicitly so a given reference file always produces the same model.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    const MULTIPLIER: u64 = 6_364_136_223_846_793_005;
    const INCREMENT: u64 = 1_442_695_040_888_963_407;

    pub fn new(seed: u64) -> Self {
        let mut lcg = Self {
            state: seed ^ 0x5DEE_CE66_D1CE_4E5B,
        };
        lcg.next_u64();
        lcg
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        let x = self.state;
        // xorshift the output so low bits are usable for modulo
        (x ^ (x >> 29)) ^ (x >> 43)
    }

    /// Uniform-ish integer in `0..bound`. `bound` must be non-zero.
    pub fn next_below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }

    /// Shuffle a slice in place (Fisher-Yates).
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }
}

/// Forest hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Candidate features examined per split before settling
    pub max_features: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            // ceil(sqrt(3))
            max_features: 2,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// A node in a fitted tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionNode {
    Leaf {
        /// Fraction of training samples in this leaf labelled 1
        positive_fraction: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single CART tree stored as a flat node array, root at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<DecisionNode>,
}

/// Best split found for a node.
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows selected by `indices`.
    pub fn fit(
        samples: &[Sample],
        labels: &[bool],
        indices: Vec<usize>,
        params: &ForestParams,
        rng: &mut Lcg,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(samples, labels, indices, 0, params, rng);
        tree
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn depth_at(nodes: &[DecisionNode], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(DecisionNode::Split { left, right, .. }) => {
                    1 + depth_at(nodes, *left).max(depth_at(nodes, *right))
                }
                _ => 0,
            }
        }
        depth_at(&self.nodes, 0)
    }

    /// Fraction of class 1 in the leaf the sample lands in.
    pub fn predict_proba(&self, sample: &Sample) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(DecisionNode::Leaf { positive_fraction }) => return *positive_fraction,
                Some(DecisionNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if sample[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return 0.0,
            }
        }
    }

    fn grow(
        &mut self,
        samples: &[Sample],
        labels: &[bool],
        indices: Vec<usize>,
        depth: usize,
        params: &ForestParams,
        rng: &mut Lcg,
    ) -> usize {
        let node_idx = self.nodes.len();
        let positives = indices.iter().filter(|&&i| labels[i]).count();
        let positive_fraction = if indices.is_empty() {
            0.0
        } else {
            positives as f64 / indices.len() as f64
        };
        self.nodes.push(DecisionNode::Leaf { positive_fraction });

        let pure = positives == 0 || positives == indices.len();
        let depth_reached = params.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || indices.len() < params.min_samples_split {
            return node_idx;
        }

        let Some(split) = best_split(samples, labels, &indices, params.max_features, rng) else {
            return node_idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| samples[i][split.feature] <= split.threshold);

        let left = self.grow(samples, labels, left_rows, depth + 1, params, rng);
        let right = self.grow(samples, labels, right_rows, depth + 1, params, rng);
        self.nodes[node_idx] = DecisionNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }
}

/// Gini impurity of a node with `positives` out of `total` samples.
fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

/// Search candidate features in random order.
///
/// At least `max_features` features are examined; if none of them admits a
/// split (all values equal), the search continues through the remaining ones.
fn best_split(
    samples: &[Sample],
    labels: &[bool],
    indices: &[usize],
    max_features: usize,
    rng: &mut Lcg,
) -> Option<SplitCandidate> {
    let mut features: Vec<usize> = (0..FEATURE_COUNT).collect();
    rng.shuffle(&mut features);

    let total = indices.len();
    let total_positive = indices.iter().filter(|&&i| labels[i]).count();
    let mut best: Option<SplitCandidate> = None;

    for (examined, &feature) in features.iter().enumerate() {
        if examined >= max_features.max(1) && best.is_some() {
            break;
        }

        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| samples[a][feature].total_cmp(&samples[b][feature]));

        let mut left_positive = 0;
        for pos in 0..total - 1 {
            if labels[order[pos]] {
                left_positive += 1;
            }
            let here = samples[order[pos]][feature];
            let next = samples[order[pos + 1]][feature];
            if here == next {
                continue;
            }

            let left_total = pos + 1;
            let right_total = total - left_total;
            let impurity = (left_total as f64 * gini(left_positive, left_total)
                + right_total as f64 * gini(total_positive - left_positive, right_total))
                / total as f64;

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = here + (next - here) / 2.0;
                // midpoint can round up to `next` for adjacent floats
                if threshold >= next {
                    threshold = here;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}

/// Bagged ensemble of decision trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest. Callers validate that inputs are non-empty and finite.
    pub fn fit(samples: &[Sample], labels: &[bool], params: ForestParams) -> Self {
        let mut rng = Lcg::new(params.seed);
        let n = samples.len();

        let trees = (0..params.n_trees)
            .map(|_| {
                let mut tree_rng = Lcg::new(rng.next_u64());
                let indices: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| tree_rng.next_below(n)).collect()
                } else {
                    (0..n).collect()
                };
                DecisionTree::fit(samples, labels, indices, &params, &mut tree_rng)
            })
            .collect();

        Self { params, trees }
    }

    /// Mean class-1 probability across trees.
    pub fn predict_proba(&self, sample: &Sample) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(sample)).sum();
        sum / self.trees.len() as f64
    }

    /// Class 1 when strictly more than half of the probability mass says so.
    pub fn predict(&self, sample: &Sample) -> bool {
        self.predict_proba(sample) > 0.5
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Sample>, Vec<bool>) {
        let samples = vec![
            [10.0, 20.0, 50.0],
            [20.0, 21.0, 52.0],
            [30.0, 19.0, 48.0],
            [480.0, 34.0, 78.0],
            [500.0, 35.0, 80.0],
            [520.0, 36.0, 82.0],
        ];
        let labels = vec![false, false, false, true, true, true];
        (samples, labels)
    }

    #[test]
    fn test_lcg_is_deterministic() {
        let mut a = Lcg::new(42);
        let mut b = Lcg::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }

        let mut c = Lcg::new(7);
        for _ in 0..1000 {
            assert!(c.next_below(3) < 3);
        }
    }

    #[test]
    fn test_tree_fits_training_data() {
        let (samples, labels) = separable();
        let params = ForestParams::default();
        let mut rng = Lcg::new(1);
        let tree = DecisionTree::fit(&samples, &labels, (0..6).collect(), &params, &mut rng);

        assert!(tree.n_nodes() >= 3);
        assert_eq!(tree.depth(), 1);
        for (sample, &label) in samples.iter().zip(&labels) {
            assert_eq!(tree.predict_proba(sample) > 0.5, label);
        }
    }

    #[test]
    fn test_tree_on_constant_features_is_a_leaf() {
        let samples = vec![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        let labels = vec![false, true];
        let mut rng = Lcg::new(1);
        let tree = DecisionTree::fit(
            &samples,
            &labels,
            vec![0, 1],
            &ForestParams::default(),
            &mut rng,
        );

        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_proba(&[1.0, 1.0, 1.0]), 0.5);
    }

    #[test]
    fn test_forest_predicts_clusters() {
        let (samples, labels) = separable();
        let forest = RandomForest::fit(&samples, &labels, ForestParams::default());

        assert_eq!(forest.n_trees(), 100);
        assert!(forest.predict(&[490.0, 34.5, 79.0]));
        assert!(!forest.predict(&[15.0, 20.0, 49.0]));
    }

    #[test]
    fn test_forest_same_seed_same_model() {
        let (samples, labels) = separable();
        let a = RandomForest::fit(&samples, &labels, ForestParams::default());
        let b = RandomForest::fit(&samples, &labels, ForestParams::default());

        for sample in [[250.0, 27.0, 60.0], [100.0, 30.0, 70.0], [400.0, 22.0, 55.0]] {
            assert_eq!(a.predict_proba(&sample), b.predict_proba(&sample));
        }
    }

    #[test]
    fn test_forest_even_split_predicts_off() {
        // Identical features with opposite labels leave every tree at 0.5.
        let samples = vec![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        let labels = vec![false, true];
        let params = ForestParams {
            n_trees: 5,
            bootstrap: false,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&samples, &labels, params);

        assert_eq!(forest.predict_proba(&[1.0, 1.0, 1.0]), 0.5);
        assert!(!forest.predict(&[1.0, 1.0, 1.0]));
    }
}
