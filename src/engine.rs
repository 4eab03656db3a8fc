use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::behavior::{self, BehaviorSummary};
use crate::error::Result;
use crate::models::{ModelType, StoredMetrics, TrainingDataStats};
use crate::performance::PerformancePrediction;
use crate::recommendation::CourseRecommendation;
use crate::registry::{ModelRegistry, TrainOutcome};
use crate::scheduling::SchedulePrediction;
use crate::source::DataSource;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TrainAllEntry {
    Trained(TrainOutcome),
    Failed { success: bool, error: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainAllReport {
    pub results: BTreeMap<ModelType, TrainAllEntry>,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatusReport {
    pub model_type: ModelType,
    pub is_trained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_metrics: Option<StoredMetrics>,
}

/// Wires the data source to the model registry. Training surfaces data
/// errors; prediction degrades to empty inputs and fallbacks.
pub struct Engine {
    data: Arc<dyn DataSource>,
    registry: ModelRegistry,
    background: JoinSet<()>,
}

impl Engine {
    pub fn new(data: Arc<dyn DataSource>, registry: ModelRegistry) -> Self {
        Self {
            data,
            registry,
            background: JoinSet::new(),
        }
    }

    /// Retrains one model, optionally on a single user's sessions.
    pub async fn train(
        &mut self,
        model_type: ModelType,
        user_id: Option<&str>,
    ) -> Result<TrainOutcome> {
        let records = self.data.fetch_training_data(model_type, user_id).await?;
        let outcome = self.registry.train(model_type, &records)?;

        if let Some(metrics) = outcome.metrics.clone() {
            let data = Arc::clone(&self.data);
            let samples = outcome.training_samples;
            self.background.spawn(async move {
                if let Err(err) = data.save_model_metrics(model_type, &metrics, samples).await {
                    warn!(model_type = %model_type, error = %err, "failed to store model metrics");
                }
            });
        }

        Ok(outcome)
    }

    /// Trains every model type in turn; one failure does not stop the rest.
    pub async fn train_all(&mut self) -> TrainAllReport {
        let mut results = BTreeMap::new();
        for model_type in ModelType::ALL {
            let entry = match self.train(model_type, None).await {
                Ok(outcome) => TrainAllEntry::Trained(outcome),
                Err(err) => {
                    error!(model_type = %model_type, error = %err, "training failed");
                    TrainAllEntry::Failed {
                        success: false,
                        error: err.to_string(),
                    }
                }
            };
            results.insert(model_type, entry);
        }

        TrainAllReport {
            results,
            trained_at: Utc::now(),
        }
    }

    pub async fn predict_schedule(
        &mut self,
        user_id: &str,
        hour: Option<u32>,
        weekday: Option<u32>,
    ) -> SchedulePrediction {
        let history = match self.data.get_user_study_history(user_id).await {
            Ok(history) => history,
            Err(err) => {
                warn!(user_id, error = %err, "study history unavailable");
                Vec::new()
            }
        };
        self.registry.predict_schedule(&history, hour, weekday)
    }

    pub async fn recommend_courses(
        &mut self,
        user_id: &str,
        limit: usize,
    ) -> Vec<CourseRecommendation> {
        let learner = match self.data.get_user_profile_and_history(user_id).await {
            Ok(learner) => learner,
            Err(err) => {
                warn!(user_id, error = %err, "learner profile unavailable");
                crate::models::LearnerProfile::new_user(user_id)
            }
        };
        let courses = match self.data.get_available_courses(user_id).await {
            Ok(courses) => courses,
            Err(err) => {
                warn!(user_id, error = %err, "course catalogue unavailable");
                Vec::new()
            }
        };
        if courses.is_empty() {
            return Vec::new();
        }
        self.registry.recommend(&learner, &courses, limit)
    }

    pub async fn predict_performance(
        &mut self,
        user_id: &str,
        course_id: Option<&str>,
    ) -> PerformancePrediction {
        let history = match self.data.get_user_study_history(user_id).await {
            Ok(history) => history,
            Err(err) => {
                warn!(user_id, error = %err, "study history unavailable");
                Vec::new()
            }
        };
        let course = match course_id {
            Some(course_id) => match self.data.get_course_statistics(course_id).await {
                Ok(course) => Some(course),
                Err(err) => {
                    warn!(course_id, error = %err, "course statistics unavailable");
                    None
                }
            },
            None => None,
        };
        self.registry.predict_performance(&history, course.as_ref())
    }

    /// Trained flags with the last stored metrics per model type.
    pub async fn status(&self) -> Vec<ModelStatusReport> {
        let stored = match self.data.get_all_model_metrics().await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "stored metrics unavailable");
                Vec::new()
            }
        };

        self.registry
            .status()
            .into_iter()
            .map(|status| ModelStatusReport {
                model_type: status.model_type,
                is_trained: status.is_trained,
                last_metrics: stored
                    .iter()
                    .filter(|metrics| metrics.model_type == status.model_type.as_str())
                    .max_by_key(|metrics| metrics.trained_at)
                    .cloned(),
            })
            .collect()
    }

    pub async fn model_metrics(&self, model_type: ModelType) -> Result<Option<StoredMetrics>> {
        self.data.get_model_metrics(model_type).await
    }

    pub async fn training_data_statistics(&self) -> Result<TrainingDataStats> {
        self.data.get_training_data_statistics().await
    }

    pub async fn analyze_user(&self, user_id: &str) -> Result<Option<BehaviorSummary>> {
        let history = self.data.get_user_study_history(user_id).await?;
        Ok(behavior::analyze(user_id, &history))
    }

    /// Waits for queued metrics writes.
    pub async fn flush(&mut self) {
        while let Some(joined) = self.background.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "background task aborted");
            }
        }
        info!("background work drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::memory::MemoryArtifactStore;
    use crate::error::EngineError;
    use crate::models::{
        Course, CourseStatistics, LearnerProfile, MetricsReport, StudySessionRecord,
    };
    use crate::registry::MIN_TRAINING_SAMPLES;
    use crate::source::{synthetic_sessions, SyntheticDataSource};
    use async_trait::async_trait;

    /// Serves fixed training data; every user-facing query fails.
    struct BrokenUpstream {
        training: Vec<StudySessionRecord>,
        fail_training_for: Option<ModelType>,
    }

    #[async_trait]
    impl DataSource for BrokenUpstream {
        async fn fetch_training_data(
            &self,
            model_type: ModelType,
            _user_id: Option<&str>,
        ) -> Result<Vec<StudySessionRecord>> {
            if self.fail_training_for == Some(model_type) {
                return Err(EngineError::UpstreamUnavailable("connection refused".into()));
            }
            Ok(self.training.clone())
        }

        async fn get_user_study_history(&self, _user_id: &str) -> Result<Vec<StudySessionRecord>> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }

        async fn get_user_profile_and_history(&self, _user_id: &str) -> Result<LearnerProfile> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }

        async fn get_available_courses(&self, _user_id: &str) -> Result<Vec<Course>> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }

        async fn get_course_statistics(&self, _course_id: &str) -> Result<CourseStatistics> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }

        async fn save_model_metrics(
            &self,
            _model_type: ModelType,
            _metrics: &MetricsReport,
            _training_samples: usize,
        ) -> Result<()> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }

        async fn get_model_metrics(&self, _model_type: ModelType) -> Result<Option<StoredMetrics>> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }

        async fn get_all_model_metrics(&self) -> Result<Vec<StoredMetrics>> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }

        async fn get_training_data_statistics(&self) -> Result<TrainingDataStats> {
            Err(EngineError::UpstreamUnavailable("connection refused".into()))
        }
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::new(Box::new(MemoryArtifactStore::default()), MIN_TRAINING_SAMPLES)
    }

    #[tokio::test]
    async fn train_all_on_synthetic_data_trains_every_model() {
        let data = Arc::new(SyntheticDataSource::new(42));
        let mut engine = Engine::new(data.clone(), registry());

        let report = engine.train_all().await;
        assert_eq!(report.results.len(), 3);
        for entry in report.results.values() {
            assert!(matches!(entry, TrainAllEntry::Trained(outcome) if outcome.success));
        }
        engine.flush().await;

        let status = engine.status().await;
        assert!(status.iter().all(|model| model.is_trained));
        assert!(status.iter().all(|model| model.last_metrics.is_some()));
    }

    #[tokio::test]
    async fn one_failing_model_does_not_stop_the_others() {
        let data = Arc::new(BrokenUpstream {
            training: synthetic_sessions(200, 9),
            fail_training_for: Some(ModelType::Recommendation),
        });
        let mut engine = Engine::new(data, registry());

        let report = engine.train_all().await;
        engine.flush().await;

        assert!(matches!(
            report.results.get(&ModelType::Recommendation),
            Some(TrainAllEntry::Failed { success: false, .. })
        ));
        assert!(matches!(
            report.results.get(&ModelType::Scheduling),
            Some(TrainAllEntry::Trained(outcome)) if outcome.success
        ));
        assert!(engine.registry.is_trained(ModelType::Scheduling));
        assert!(!engine.registry.is_trained(ModelType::Recommendation));
    }

    #[tokio::test]
    async fn single_train_propagates_upstream_errors() {
        let data = Arc::new(BrokenUpstream {
            training: Vec::new(),
            fail_training_for: Some(ModelType::Performance),
        });
        let mut engine = Engine::new(data, registry());
        let err = engine.train(ModelType::Performance, None).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn predictions_fall_back_when_upstream_is_down() {
        let data = Arc::new(BrokenUpstream {
            training: synthetic_sessions(300, 4),
            fail_training_for: None,
        });
        let mut engine = Engine::new(data, registry());
        engine.train_all().await;
        engine.flush().await;

        let schedule = engine.predict_schedule("u1", Some(10), Some(2)).await;
        assert_eq!(schedule.reasoning, SchedulePrediction::fallback().reasoning);

        assert!(engine.recommend_courses("u1", 5).await.is_empty());

        let performance = engine.predict_performance("u1", Some("c1")).await;
        assert_eq!(performance.predicted_completion_rate, 0.5);
        assert_eq!(performance.predicted_quiz_score, 65.0);

        assert!(engine.status().await.iter().all(|model| model.last_metrics.is_none()));
        assert!(engine.analyze_user("u1").await.is_err());
    }

    #[tokio::test]
    async fn training_for_one_user_uses_only_their_sessions() {
        let data = Arc::new(SyntheticDataSource::new(42));
        let mut engine = Engine::new(data, registry());

        let outcome = engine
            .train(ModelType::Scheduling, Some("synthetic-user-2"))
            .await
            .unwrap();
        assert_eq!(outcome.training_samples, 25);
        assert!(!outcome.success);
        assert!(!engine.registry.is_trained(ModelType::Scheduling));
        engine.flush().await;
    }

    #[tokio::test]
    async fn stored_metrics_are_readable_per_model() {
        let data = Arc::new(SyntheticDataSource::new(42));
        let mut engine = Engine::new(data, registry());
        assert!(engine.model_metrics(ModelType::Scheduling).await.unwrap().is_none());

        engine.train(ModelType::Scheduling, None).await.unwrap();
        engine.flush().await;

        let stored = engine
            .model_metrics(ModelType::Scheduling)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.model_type, "scheduling");
        assert_eq!(stored.training_samples, 500);
        assert!(engine.model_metrics(ModelType::Performance).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn data_statistics_pass_through_and_surface_errors() {
        let engine = Engine::new(Arc::new(SyntheticDataSource::new(42)), registry());
        let stats = engine.training_data_statistics().await.unwrap();
        assert_eq!(stats.study_sessions, 500);
        assert_eq!(stats.unique_users, 20);

        let broken = Engine::new(
            Arc::new(BrokenUpstream {
                training: Vec::new(),
                fail_training_for: None,
            }),
            registry(),
        );
        assert!(broken.training_data_statistics().await.is_err());
    }

    #[tokio::test]
    async fn trained_engine_serves_synthetic_learners() {
        let data = Arc::new(SyntheticDataSource::new(42));
        let mut engine = Engine::new(data, registry());
        engine.train_all().await;

        let schedule = engine.predict_schedule("synthetic-user-1", Some(10), Some(2)).await;
        assert!((0.0..=1.0).contains(&schedule.confidence));
        assert!(!schedule.optimal_hours.is_empty());

        let recommendations = engine.recommend_courses("synthetic-user-1", 3).await;
        assert!(recommendations.len() <= 3);
        assert!(recommendations
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));

        let performance = engine
            .predict_performance("synthetic-user-1", Some("synthetic-course-1"))
            .await;
        assert!((0.0..=1.0).contains(&performance.predicted_completion_rate));
        assert!((0.0..=100.0).contains(&performance.predicted_quiz_score));
        assert!(!performance.recommendations.is_empty());

        let summary = engine.analyze_user("synthetic-user-1").await.unwrap().unwrap();
        assert_eq!(summary.total_sessions, 25);
        engine.flush().await;
    }
}
