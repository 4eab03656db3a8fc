use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::artifact::{ArtifactStore, TrainableModel};
use crate::error::Result;
use crate::models::{
    Course, CourseStatistics, LearnerProfile, MetricsReport, ModelType, StudySessionRecord,
};
use crate::performance::{PerformanceModel, PerformancePrediction};
use crate::recommendation::{CourseRecommendation, RecommendationModel};
use crate::scheduling::{SchedulePrediction, SchedulingModel};

pub const MIN_TRAINING_SAMPLES: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainOutcome {
    pub success: bool,
    pub model_type: ModelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsReport>,
    pub training_samples: usize,
    pub trained_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub model_type: ModelType,
    pub is_trained: bool,
}

/// Owns one model per [`ModelType`] together with the store their artifacts
/// persist to.
pub struct ModelRegistry {
    scheduling: SchedulingModel,
    recommendation: RecommendationModel,
    performance: PerformanceModel,
    store: Box<dyn ArtifactStore>,
    min_training_samples: usize,
}

impl ModelRegistry {
    pub fn new(store: Box<dyn ArtifactStore>, min_training_samples: usize) -> Self {
        Self {
            scheduling: SchedulingModel::default(),
            recommendation: RecommendationModel::default(),
            performance: PerformanceModel::default(),
            store,
            min_training_samples,
        }
    }

    /// Builds a registry with every model restored from `store` where an
    /// artifact exists.
    pub fn load(store: Box<dyn ArtifactStore>, min_training_samples: usize) -> Self {
        let mut registry = Self::new(store, min_training_samples);
        for model_type in ModelType::ALL {
            registry.ensure_loaded(model_type);
        }
        registry
    }

    pub fn is_trained(&self, model_type: ModelType) -> bool {
        match model_type {
            ModelType::Scheduling => self.scheduling.is_trained(),
            ModelType::Recommendation => self.recommendation.is_trained(),
            ModelType::Performance => self.performance.is_trained(),
        }
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        ModelType::ALL
            .into_iter()
            .map(|model_type| ModelStatus {
                model_type,
                is_trained: self.is_trained(model_type),
            })
            .collect()
    }

    /// Retrains one model from scratch. Below the sample threshold nothing
    /// is trained and the outcome reports `success = false`.
    pub fn train(
        &mut self,
        model_type: ModelType,
        records: &[StudySessionRecord],
    ) -> Result<TrainOutcome> {
        let training_samples = records.len();
        if training_samples < self.min_training_samples {
            warn!(
                model_type = %model_type,
                samples = training_samples,
                minimum = self.min_training_samples,
                "insufficient training data"
            );
            return Ok(TrainOutcome {
                success: false,
                model_type,
                metrics: None,
                training_samples,
                trained_at: Utc::now(),
                message: Some(format!(
                    "Insufficient data: {training_samples} samples (minimum {} required)",
                    self.min_training_samples
                )),
            });
        }

        let store = self.store.as_ref();
        let metrics = match model_type {
            ModelType::Scheduling => retrain(&mut self.scheduling, store, records)?,
            ModelType::Recommendation => retrain(&mut self.recommendation, store, records)?,
            ModelType::Performance => retrain(&mut self.performance, store, records)?,
        };

        info!(
            model_type = %model_type,
            samples = training_samples,
            accuracy = metrics.accuracy,
            "training finished"
        );
        Ok(TrainOutcome {
            success: true,
            model_type,
            trained_at: metrics.trained_at,
            metrics: Some(metrics),
            training_samples,
            message: None,
        })
    }

    pub fn predict_schedule(
        &mut self,
        sessions: &[StudySessionRecord],
        hour: Option<u32>,
        weekday: Option<u32>,
    ) -> SchedulePrediction {
        self.ensure_loaded(ModelType::Scheduling);
        self.scheduling.predict(sessions, hour, weekday)
    }

    pub fn recommend(
        &mut self,
        learner: &LearnerProfile,
        courses: &[Course],
        limit: usize,
    ) -> Vec<CourseRecommendation> {
        self.ensure_loaded(ModelType::Recommendation);
        self.recommendation.recommend(learner, courses, limit)
    }

    pub fn predict_performance(
        &mut self,
        sessions: &[StudySessionRecord],
        course: Option<&CourseStatistics>,
    ) -> PerformancePrediction {
        self.ensure_loaded(ModelType::Performance);
        self.performance.predict(sessions, course)
    }

    /// Picks up an artifact written since this registry was built.
    fn ensure_loaded(&mut self, model_type: ModelType) {
        if self.is_trained(model_type) {
            return;
        }
        let store = self.store.as_ref();
        match model_type {
            ModelType::Scheduling => self.scheduling = SchedulingModel::load(store),
            ModelType::Recommendation => self.recommendation = RecommendationModel::load(store),
            ModelType::Performance => self.performance = PerformanceModel::load(store),
        }
    }
}

/// Trains a fresh model and swaps it in only when it came out trained. An
/// error, or a run that leaves the model untrained, keeps the previous
/// model serving.
fn retrain<M: TrainableModel>(
    slot: &mut M,
    store: &dyn ArtifactStore,
    records: &[StudySessionRecord],
) -> Result<MetricsReport> {
    let mut model = M::default();
    let metrics = model.train(records)?;

    if !model.is_trained() {
        warn!(model_type = %M::MODEL_TYPE, "training produced no model, keeping the previous one");
        return Ok(metrics);
    }

    if let Err(err) = model.save(store) {
        warn!(model_type = %M::MODEL_TYPE, error = %err, "failed to persist model artifact");
    }
    *slot = model;
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::memory::MemoryArtifactStore;
    use crate::source::synthetic_sessions;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(Box::new(MemoryArtifactStore::default()), MIN_TRAINING_SAMPLES)
    }

    #[test]
    fn below_threshold_is_reported_not_trained() {
        let mut registry = registry();
        let records = synthetic_sessions(49, 1);
        let outcome = registry.train(ModelType::Scheduling, &records).unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.training_samples, 49);
        assert!(outcome.metrics.is_none());
        assert_eq!(
            outcome.message.as_deref(),
            Some("Insufficient data: 49 samples (minimum 50 required)")
        );
        assert!(!registry.is_trained(ModelType::Scheduling));
    }

    #[test]
    fn threshold_sample_count_trains() {
        let mut registry = registry();
        let records = synthetic_sessions(50, 1);
        let outcome = registry.train(ModelType::Scheduling, &records).unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.training_samples, 50);
        let metrics = outcome.metrics.unwrap();
        assert_eq!(metrics.sample_count, 50);
        assert!((0.0..=1.0).contains(&metrics.accuracy));
        assert!(registry.is_trained(ModelType::Scheduling));
    }

    #[test]
    fn artifacts_survive_a_new_registry() {
        let store = std::sync::Arc::new(MemoryArtifactStore::default());

        struct Shared(std::sync::Arc<MemoryArtifactStore>);
        impl ArtifactStore for Shared {
            fn save(&self, model_type: ModelType, artifact: &serde_json::Value) -> Result<()> {
                self.0.save(model_type, artifact)
            }
            fn load(&self, model_type: ModelType) -> Result<Option<serde_json::Value>> {
                self.0.load(model_type)
            }
        }

        let records = synthetic_sessions(200, 3);
        let mut first = ModelRegistry::new(Box::new(Shared(store.clone())), MIN_TRAINING_SAMPLES);
        first.train(ModelType::Recommendation, &records).unwrap();
        assert!(store.contains(ModelType::Recommendation));

        let second = ModelRegistry::load(Box::new(Shared(store.clone())), MIN_TRAINING_SAMPLES);
        assert!(second.is_trained(ModelType::Recommendation));
        assert!(!second.is_trained(ModelType::Scheduling));
    }

    #[test]
    fn save_failure_does_not_fail_training() {
        let mut registry =
            ModelRegistry::new(Box::new(MemoryArtifactStore::failing()), MIN_TRAINING_SAMPLES);
        let outcome = registry
            .train(ModelType::Recommendation, &synthetic_sessions(80, 5))
            .unwrap();
        assert!(outcome.success);
        assert!(registry.is_trained(ModelType::Recommendation));
    }

    #[test]
    fn sparse_retrain_keeps_the_previous_performance_model() {
        let mut registry = registry();
        registry
            .train(ModelType::Performance, &synthetic_sessions(500, 42))
            .unwrap();
        assert!(registry.is_trained(ModelType::Performance));

        let few_users: Vec<StudySessionRecord> = synthetic_sessions(60, 7)
            .into_iter()
            .enumerate()
            .map(|(i, mut record)| {
                record.user_id = Some(format!("user-{}", i % 5));
                record
            })
            .collect();
        let outcome = registry.train(ModelType::Performance, &few_users).unwrap();

        assert_eq!(outcome.metrics.map(|m| m.accuracy), Some(0.0));
        assert!(registry.is_trained(ModelType::Performance));
        assert!(registry
            .status()
            .iter()
            .any(|status| status.model_type == ModelType::Performance && status.is_trained));
    }

    #[test]
    fn untrained_registry_serves_fallbacks() {
        let mut registry = registry();
        let prediction = registry.predict_schedule(&synthetic_sessions(10, 2), Some(9), Some(1));
        assert_eq!(prediction.confidence, SchedulePrediction::fallback().confidence);

        let performance = registry.predict_performance(&[], None);
        assert_eq!(
            performance.predicted_quiz_score,
            PerformancePrediction::fallback().predicted_quiz_score
        );
        assert!(registry.status().iter().all(|status| !status.is_trained));
    }
}
