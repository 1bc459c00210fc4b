use crate::error::{ArtifactError, FeatureShapeError};
use crate::model::artifacts::{load_classifier, load_scaler, ClassifierArtifact, StandardScaler};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub score: f64,
    pub prediction: i16,
}

/// A fitted scaler and classifier pair. Immutable once built.
#[derive(Debug, Clone)]
pub struct Predictor {
    scaler: StandardScaler,
    model: ClassifierArtifact,
}

impl Predictor {
    pub fn new(scaler: StandardScaler, model: ClassifierArtifact) -> Result<Self, ArtifactError> {
        if scaler.n_features() != model.n_features() {
            return Err(ArtifactError::DimensionMismatch {
                scaler: scaler.n_features(),
                model: model.n_features(),
            });
        }
        Ok(Self { scaler, model })
    }

    pub fn load(model_path: &str, scaler_path: &str) -> Result<Self, ArtifactError> {
        let model = load_classifier(model_path)?;
        let scaler = load_scaler(scaler_path)?;
        Self::new(scaler, model)
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    pub fn predict(&self, features: &[f64]) -> Result<Prediction, FeatureShapeError> {
        if features.len() != self.n_features() {
            return Err(FeatureShapeError {
                expected: self.n_features(),
                actual: features.len(),
            });
        }
        let scaled = self.scaler.transform(features);
        let raw = self.model.predict_proba(&scaled);
        let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
        Ok(Prediction {
            score,
            prediction: i16::from(score > 0.5),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifacts::LogisticModel;

    /// Constant-output model: sigmoid(intercept) regardless of input.
    fn constant(p: f64, n: usize) -> Predictor {
        let intercept = (p / (1.0 - p)).ln();
        Predictor::new(
            StandardScaler {
                mean: vec![0.0; n],
                scale: vec![1.0; n],
            },
            ClassifierArtifact::Logistic(LogisticModel {
                coefficients: vec![0.0; n],
                intercept,
            }),
        )
        .unwrap()
    }

    #[test]
    fn predicts_fraud_above_half() {
        let out = constant(0.8, 3).predict(&[0.1, 0.2, 0.3]).unwrap();
        assert!((out.score - 0.8).abs() < 1e-9);
        assert_eq!(out.prediction, 1);
    }

    #[test]
    fn exactly_half_is_not_fraud() {
        let out = constant(0.5, 3).predict(&[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(out.prediction, 0);
    }

    #[test]
    fn wrong_length_is_a_shape_error() {
        let err = constant(0.8, 3).predict(&[0.1, 0.2]).unwrap_err();
        assert_eq!(err, FeatureShapeError { expected: 3, actual: 2 });
    }

    #[test]
    fn scaler_and_model_must_agree() {
        let err = Predictor::new(
            StandardScaler {
                mean: vec![0.0; 2],
                scale: vec![1.0; 2],
            },
            ClassifierArtifact::Logistic(LogisticModel {
                coefficients: vec![0.0; 3],
                intercept: 0.0,
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ArtifactError::DimensionMismatch { scaler: 2, model: 3 }));
    }

    #[test]
    fn deterministic_for_same_input() {
        let p = constant(0.3, 3);
        assert_eq!(p.predict(&[1.0, 2.0, 3.0]), p.predict(&[1.0, 2.0, 3.0]));
    }
}
