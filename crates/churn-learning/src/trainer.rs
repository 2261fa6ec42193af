//! Stratified splitting and model fitting.
//!
//! [`ModelTrainer`] owns the train/test split and fits classifiers, recording
//! a [`TrainingRecord`] per model. [`Trainer::train_many`] keeps going past
//! individual failures: a model that errors (or panics) while fitting is
//! recorded with `success = false` and left out of the returned list.

use crate::classifier::Classifier;
use crate::error::{PipelineError, Result};
use ndarray::{Array2, Axis};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;
use tracing::{Span, debug, info, info_span, warn};

/// A feature matrix with aligned labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSet {
    pub x: Array2<f64>,
    pub y: Vec<u8>,
    pub feature_names: Vec<String>,
}

impl LabeledSet {
    pub fn new(x: Array2<f64>, y: Vec<u8>, feature_names: Vec<String>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::InvalidInput(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        Ok(Self {
            x,
            y,
            feature_names,
        })
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Fraction of positive labels.
    pub fn positive_rate(&self) -> f64 {
        if self.y.is_empty() {
            return 0.0;
        }
        self.y.iter().filter(|&&label| label == 1).count() as f64 / self.y.len() as f64
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: indices.iter().map(|&i| self.y[i]).collect(),
            feature_names: self.feature_names.clone(),
        }
    }
}

/// Disjoint train and test partitions of one labeled set.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: LabeledSet,
    pub test: LabeledSet,
    /// Source row of each train row, ascending.
    pub train_indices: Vec<usize>,
    /// Source row of each test row, ascending.
    pub test_indices: Vec<usize>,
}

/// Outcome of one model fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub training_time_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features_count: Option<usize>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub hyperparameters: serde_json::Value,
}

/// A classifier together with the feature order it was fit on.
pub struct TrainedModel {
    name: String,
    classifier: Box<dyn Classifier>,
    feature_names: Vec<String>,
    trained: bool,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("name", &self.name)
            .field("feature_names", &self.feature_names)
            .field("trained", &self.trained)
            .finish()
    }
}

impl TrainedModel {
    /// Wrap an unfitted classifier. Predictions fail until it is trained.
    pub fn new(classifier: Box<dyn Classifier>, feature_names: Vec<String>) -> Self {
        Self {
            name: classifier.name().to_string(),
            classifier,
            feature_names,
            trained: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<u8>> {
        self.ensure_trained()?;
        self.classifier.predict(x)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        self.ensure_trained()?;
        self.classifier.predict_proba(x)
    }

    /// Importance per feature name, in training column order. Empty when the
    /// classifier exposes none.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        match self.classifier.feature_importance() {
            Some(values) if values.len() == self.feature_names.len() => self
                .feature_names
                .iter()
                .cloned()
                .zip(values)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn ensure_trained(&self) -> Result<()> {
        if self.trained {
            Ok(())
        } else {
            Err(PipelineError::ModelNotTrained(self.name.clone()))
        }
    }
}

/// Splits data and fits classifiers.
pub trait Trainer: Send + Sync {
    /// Stratified, seeded train/test split.
    fn split(&self, data: &LabeledSet, test_fraction: f64, seed: u64) -> Result<Split>;

    /// Fit one classifier. The outcome is recorded before any error is returned.
    fn train_one(&self, classifier: Box<dyn Classifier>, data: &LabeledSet) -> Result<TrainedModel>;

    /// Fit every classifier, skipping failures. Output keeps submission order.
    ///
    /// Model names must be unique; a repeated name is rejected before any
    /// fit starts.
    fn train_many(
        &self,
        classifiers: Vec<Box<dyn Classifier>>,
        data: &LabeledSet,
    ) -> Result<Vec<TrainedModel>>;

    /// Records of every fit so far, one per model name.
    fn training_info(&self) -> Vec<(String, TrainingRecord)>;
}

/// Default [`Trainer`] with a bounded worker pool for [`Trainer::train_many`].
pub struct ModelTrainer {
    n_jobs: usize,
    span: Span,
    records: Mutex<Vec<(String, TrainingRecord)>>,
}

impl ModelTrainer {
    /// `n_jobs` workers for `train_many`; 0 uses every core.
    pub fn new(n_jobs: usize) -> Self {
        Self {
            n_jobs,
            span: info_span!("trainer"),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn record(&self, name: &str, record: TrainingRecord) {
        let mut records = self.records.lock();
        match records.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = record,
            None => records.push((name.to_string(), record)),
        }
    }

    /// Fit without recording.
    fn fit(
        &self,
        mut classifier: Box<dyn Classifier>,
        data: &LabeledSet,
    ) -> (TrainingRecord, Result<TrainedModel>) {
        let _guard = self.span.enter();
        let name = classifier.name().to_string();
        let hyperparameters = classifier.hyperparameters();
        info!("Training {} on {} samples", name, data.len());

        let start = Instant::now();
        let outcome = validate_training_input(data).and_then(|()| {
            classifier.fit(&data.x, &data.y).map_err(|e| match e {
                PipelineError::InvalidInput(_) => e,
                other => PipelineError::Training {
                    model: name.clone(),
                    reason: other.to_string(),
                },
            })
        });
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                info!("{} trained in {:.2}s", name, elapsed);
                let record = TrainingRecord {
                    training_time_secs: elapsed,
                    training_samples: Some(data.len()),
                    features_count: Some(data.x.ncols()),
                    success: true,
                    error: None,
                    hyperparameters,
                };
                let mut model = TrainedModel::new(classifier, data.feature_names.clone());
                model.trained = true;
                (record, Ok(model))
            }
            Err(e) => {
                warn!("{} training failed: {}", name, e);
                (failure_record(elapsed, &e, hyperparameters), Err(e))
            }
        }
    }
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Trainer for ModelTrainer {
    fn split(&self, data: &LabeledSet, test_fraction: f64, seed: u64) -> Result<Split> {
        let _guard = self.span.enter();
        stratified_split(data, test_fraction, seed)
    }

    fn train_one(&self, classifier: Box<dyn Classifier>, data: &LabeledSet) -> Result<TrainedModel> {
        let name = classifier.name().to_string();
        let (record, outcome) = self.fit(classifier, data);
        self.record(&name, record);
        outcome
    }

    fn train_many(
        &self,
        classifiers: Vec<Box<dyn Classifier>>,
        data: &LabeledSet,
    ) -> Result<Vec<TrainedModel>> {
        let names: Vec<String> = classifiers.iter().map(|c| c.name().to_string()).collect();
        if let Some(duplicate) = names
            .iter()
            .enumerate()
            .find_map(|(i, name)| names[..i].contains(name).then_some(name))
        {
            return Err(PipelineError::InvalidInput(format!(
                "model name '{}' submitted more than once",
                duplicate
            )));
        }
        let hyperparameters: Vec<serde_json::Value> =
            classifiers.iter().map(|c| c.hyperparameters()).collect();

        let run = |classifiers: Vec<Box<dyn Classifier>>| -> Vec<_> {
            classifiers
                .into_par_iter()
                .map(|classifier| catch_unwind(AssertUnwindSafe(|| self.fit(classifier, data))))
                .collect()
        };
        let outcomes = match rayon::ThreadPoolBuilder::new().num_threads(self.n_jobs).build() {
            Ok(pool) => pool.install(|| run(classifiers)),
            Err(e) => {
                warn!("Could not build training pool ({}), using the global pool", e);
                run(classifiers)
            }
        };

        let mut trained = Vec::with_capacity(outcomes.len());
        for ((name, params), outcome) in names.into_iter().zip(hyperparameters).zip(outcomes) {
            match outcome {
                Ok((record, result)) => {
                    self.record(&name, record);
                    if let Ok(model) = result {
                        trained.push(model);
                    }
                }
                Err(payload) => {
                    let err = PipelineError::Training {
                        model: name.clone(),
                        reason: format!("panicked: {}", panic_message(payload.as_ref())),
                    };
                    warn!("{}", err);
                    self.record(&name, failure_record(0.0, &err, params));
                }
            }
        }

        debug!("{} of {} models trained", trained.len(), self.records.lock().len());
        Ok(trained)
    }

    fn training_info(&self) -> Vec<(String, TrainingRecord)> {
        self.records.lock().clone()
    }
}

fn failure_record(elapsed: f64, err: &PipelineError, hyperparameters: serde_json::Value) -> TrainingRecord {
    TrainingRecord {
        training_time_secs: elapsed,
        training_samples: None,
        features_count: None,
        success: false,
        error: Some(err.to_string()),
        hyperparameters,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn validate_training_input(data: &LabeledSet) -> Result<()> {
    if data.is_empty() || data.x.nrows() == 0 || data.x.ncols() == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "training set is empty ({} rows, {} features)",
            data.x.nrows(),
            data.x.ncols()
        )));
    }
    if data.x.nrows() != data.y.len() {
        return Err(PipelineError::InvalidInput(format!(
            "{} feature rows but {} labels",
            data.x.nrows(),
            data.y.len()
        )));
    }
    Ok(())
}

/// Split `data` into train and test, preserving the class balance.
///
/// Each class is shuffled with `seed` and contributes
/// `round(class_size * test_fraction)` rows to the test set. Both partitions
/// keep the source row order.
pub fn stratified_split(data: &LabeledSet, test_fraction: f64, seed: u64) -> Result<Split> {
    validate_training_input(data)?;
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidInput(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::with_capacity(data.len());
    let mut test_indices = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = data
            .y
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);
        let n_test = (members.len() as f64 * test_fraction).round() as usize;
        test_indices.extend_from_slice(&members[..n_test]);
        train_indices.extend_from_slice(&members[n_test..]);
    }

    if train_indices.is_empty() || test_indices.is_empty() {
        return Err(PipelineError::InvalidInput(format!(
            "cannot split {} rows with test fraction {}",
            data.len(),
            test_fraction
        )));
    }

    train_indices.sort_unstable();
    test_indices.sort_unstable();
    debug!(
        "Split {} rows into {} train / {} test",
        data.len(),
        train_indices.len(),
        test_indices.len()
    );

    Ok(Split {
        train: data.select(&train_indices),
        test: data.select(&test_indices),
        train_indices,
        test_indices,
    })
}

static_assertions::assert_impl_all!(ModelTrainer: Send, Sync);
static_assertions::assert_impl_all!(TrainedModel: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LogisticRegression;
    use crate::config::LogisticParams;
    use pretty_assertions::assert_eq;

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn name(&self) -> &str {
            "Failing"
        }
        fn fit(&mut self, _x: &Array2<f64>, _y: &[u8]) -> Result<()> {
            Err(PipelineError::InvalidConfig("solver diverged".into()))
        }
        fn predict_proba(&self, _x: &Array2<f64>) -> Result<Vec<f64>> {
            Ok(Vec::new())
        }
        fn feature_importance(&self) -> Option<Vec<f64>> {
            None
        }
        fn hyperparameters(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    struct PanickingClassifier;

    impl Classifier for PanickingClassifier {
        fn name(&self) -> &str {
            "Panicking"
        }
        fn fit(&mut self, _x: &Array2<f64>, _y: &[u8]) -> Result<()> {
            panic!("index out of bounds");
        }
        fn predict_proba(&self, _x: &Array2<f64>) -> Result<Vec<f64>> {
            Ok(Vec::new())
        }
        fn feature_importance(&self) -> Option<Vec<f64>> {
            None
        }
        fn hyperparameters(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    fn labeled(n: usize, positive_every: usize) -> LabeledSet {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * (j + 1)) as f64 / n as f64);
        let y = (0..n).map(|i| u8::from(i % positive_every == 0)).collect();
        LabeledSet::new(x, y, vec!["a".into(), "b".into()]).unwrap()
    }

    fn logistic() -> Box<dyn Classifier> {
        Box::new(LogisticRegression::new(LogisticParams::default(), 42))
    }

    #[test]
    fn test_split_is_stratified_and_disjoint() {
        let data = labeled(1000, 4);
        let split = stratified_split(&data, 0.2, 42).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 1000);
        assert_eq!(split.test.len(), 200);
        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(&split.test_indices)
            .copied()
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);

        let p = data.positive_rate();
        assert!((split.train.positive_rate() - p).abs() < 0.01);
        assert!((split.test.positive_rate() - p).abs() < 0.01);
    }

    #[test]
    fn test_split_is_deterministic() {
        let data = labeled(100, 3);
        let a = stratified_split(&data, 0.3, 7).unwrap();
        let b = stratified_split(&data, 0.3, 7).unwrap();
        assert_eq!(a.test_indices, b.test_indices);
        let c = stratified_split(&data, 0.3, 8).unwrap();
        assert_ne!(a.test_indices, c.test_indices);
    }

    #[test]
    fn test_split_rejects_empty_and_mismatched() {
        let empty = LabeledSet {
            x: Array2::zeros((0, 0)),
            y: Vec::new(),
            feature_names: Vec::new(),
        };
        assert!(matches!(
            stratified_split(&empty, 0.2, 42),
            Err(PipelineError::InvalidInput(_))
        ));

        let mismatched = LabeledSet {
            x: Array2::zeros((3, 2)),
            y: vec![0, 1],
            feature_names: Vec::new(),
        };
        assert!(matches!(
            stratified_split(&mismatched, 0.2, 42),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(LabeledSet::new(Array2::zeros((3, 2)), vec![0], Vec::new()).is_err());
    }

    #[test]
    fn test_train_one_records_and_reraises() {
        let trainer = ModelTrainer::new(1);
        let data = labeled(50, 2);

        let model = trainer.train_one(logistic(), &data).unwrap();
        assert!(model.is_trained());
        assert_eq!(model.feature_names(), &["a".to_string(), "b".to_string()]);

        let err = trainer.train_one(Box::new(FailingClassifier), &data).unwrap_err();
        assert!(matches!(err, PipelineError::Training { ref model, .. } if model == "Failing"));

        let info = trainer.training_info();
        assert_eq!(info.len(), 2);
        assert!(info[0].1.success);
        assert_eq!(info[0].1.training_samples, Some(50));
        assert!(!info[1].1.success);
        assert!(info[1].1.error.as_deref().unwrap().contains("solver diverged"));
    }

    #[test]
    fn test_train_one_rejects_empty_input() {
        let trainer = ModelTrainer::default();
        let empty = LabeledSet {
            x: Array2::zeros((0, 0)),
            y: Vec::new(),
            feature_names: Vec::new(),
        };
        assert!(matches!(
            trainer.train_one(logistic(), &empty),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(!trainer.training_info()[0].1.success);
    }

    #[test]
    fn test_train_many_continues_past_failures() {
        let trainer = ModelTrainer::new(2);
        let data = labeled(60, 2);
        let models: Vec<Box<dyn Classifier>> =
            vec![Box::new(FailingClassifier), logistic(), Box::new(PanickingClassifier)];

        let trained = trainer.train_many(models, &data).unwrap();
        assert_eq!(trained.len(), 1);
        assert_eq!(trained[0].name(), "LogisticRegression");

        let info = trainer.training_info();
        let names: Vec<&str> = info.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Failing", "LogisticRegression", "Panicking"]);
        assert!(!info[0].1.success);
        assert!(info[1].1.success);
        assert!(!info[2].1.success);
        assert!(info[2].1.error.as_deref().unwrap().contains("index out of bounds"));
    }

    #[test]
    fn test_train_many_rejects_repeated_names() {
        let trainer = ModelTrainer::new(2);
        let data = labeled(60, 2);
        let models: Vec<Box<dyn Classifier>> = vec![logistic(), logistic()];

        let err = trainer.train_many(models, &data).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(err.to_string().contains("LogisticRegression"));
        assert!(trainer.training_info().is_empty());
    }

    #[test]
    fn test_untrained_model_refuses_predict() {
        let model = TrainedModel::new(logistic(), vec!["a".into()]);
        assert!(matches!(
            model.predict(&Array2::zeros((1, 1))),
            Err(PipelineError::ModelNotTrained(_))
        ));
        assert!(model.feature_importance().is_empty());
    }
}
