//! On-disk model artifacts: a standard scaler and a binary classifier, both
//! stored as JSON and loaded once at startup.

use crate::error::ArtifactError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Caller guarantees `x.len() == self.n_features()`.
    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(v, (m, s))| {
                let s = if *s == 0.0 { 1.0 } else { *s };
                (v - m) / s
            })
            .collect()
    }

    fn check(&self) -> Result<(), String> {
        if self.mean.is_empty() {
            return Err("scaler has no features".to_string());
        }
        if self.mean.len() != self.scale.len() {
            return Err(format!(
                "mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    Logistic(LogisticModel),
    Forest(ForestModel),
}

impl ClassifierArtifact {
    pub fn n_features(&self) -> usize {
        match self {
            ClassifierArtifact::Logistic(m) => m.coefficients.len(),
            ClassifierArtifact::Forest(m) => m.n_features,
        }
    }

    /// Probability of the positive (fraud) class for an already scaled vector.
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        match self {
            ClassifierArtifact::Logistic(m) => m.predict_proba(x),
            ClassifierArtifact::Forest(m) => m.predict_proba(x),
        }
    }

    fn check(&self) -> Result<(), String> {
        match self {
            ClassifierArtifact::Logistic(m) if m.coefficients.is_empty() => {
                Err("logistic model has no coefficients".to_string())
            }
            ClassifierArtifact::Logistic(_) => Ok(()),
            ClassifierArtifact::Forest(m) => m.check(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        let z: f64 = self.intercept + self.coefficients.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl ForestModel {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        sum / self.trees.len() as f64
    }

    fn check(&self) -> Result<(), String> {
        if self.n_features == 0 {
            return Err("forest has no features".to_string());
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("tree {} is empty", t));
            }
            for (n, node) in tree.nodes.iter().enumerate() {
                match node {
                    TreeNode::Split {
                        feature, left, right, ..
                    } => {
                        if *feature >= self.n_features {
                            return Err(format!("tree {} node {} splits on feature {}", t, n, feature));
                        }
                        // children must come after their parent so traversal terminates
                        if *left <= n || *right <= n || *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                            return Err(format!("tree {} node {} has invalid children", t, n));
                        }
                    }
                    TreeNode::Leaf { value } => {
                        if !(0.0..=1.0).contains(value) {
                            return Err(format!("tree {} leaf {} value {} outside [0,1]", t, n, value));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl DecisionTree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

pub fn load_scaler(path: impl AsRef<Path>) -> Result<StandardScaler, ArtifactError> {
    let path = path.as_ref();
    let scaler: StandardScaler = read_json(path)?;
    scaler.check().map_err(|reason| ArtifactError::Invalid {
        path: path.display().to_string(),
        reason,
    })?;
    Ok(scaler)
}

pub fn load_classifier(path: impl AsRef<Path>) -> Result<ClassifierArtifact, ArtifactError> {
    let path = path.as_ref();
    let model: ClassifierArtifact = read_json(path)?;
    model.check().map_err(|reason| ArtifactError::Invalid {
        path: path.display().to_string(),
        reason,
    })?;
    Ok(model)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(ArtifactError::Missing(display));
    }
    let bytes = std::fs::read(path).map_err(|e| ArtifactError::Unreadable {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Invalid {
        path: display,
        reason: e.to_string(),
    })
}
