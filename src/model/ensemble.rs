use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{FeatureRow, ModelError, ModelResult, SegmentTimeModel};

/// A node of one regression tree. Split nodes carry a feature index and
/// threshold; leaves carry only a value.
#[derive(Debug, Clone, Deserialize)]
struct Node {
    #[serde(default)]
    feature: Option<usize>,
    #[serde(default)]
    threshold: f64,
    #[serde(default)]
    left: usize,
    #[serde(default)]
    right: usize,
    #[serde(default)]
    value: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn score(&self, features: &[f64]) -> ModelResult<f64> {
        let mut index = 0;
        // A well-formed tree terminates well before visiting every node.
        for _ in 0..=self.nodes.len() {
            let node = self
                .nodes
                .get(index)
                .ok_or(ModelError::NodeOutOfRange(index))?;
            let feature = match node.feature {
                None => return Ok(node.value),
                Some(feature) => feature,
            };
            let observed = features
                .get(feature)
                .ok_or(ModelError::FeatureOutOfRange(feature))?;
            index = if *observed < node.threshold {
                node.left
            } else {
                node.right
            };
        }
        Err(ModelError::NodeOutOfRange(index))
    }
}

/// Gradient-boosted tree ensemble, evaluated from a pre-trained artifact
/// exported to JSON. Scores are the base score plus the sum of every tree's
/// leaf value.
#[derive(Debug, Clone, Deserialize)]
pub struct GradientBoostedModel {
    base_score: f64,
    trees: Vec<Tree>,
}

impl GradientBoostedModel {
    pub fn from_file(path: &Path) -> ModelResult<GradientBoostedModel> {
        let data = fs::read_to_string(path)?;
        let model: GradientBoostedModel = serde_json::from_str(&data)?;
        log::info!("Loaded segment-time model with {} trees", model.trees.len());
        Ok(model)
    }
}

impl SegmentTimeModel for GradientBoostedModel {
    fn predict(&self, rows: &[FeatureRow]) -> ModelResult<Vec<f64>> {
        rows.iter()
            .map(|row| {
                let features = row.to_vector();
                let mut score = self.base_score;
                for tree in &self.trees {
                    score += tree.score(&features)?;
                }
                Ok(score)
            })
            .collect()
    }
}
