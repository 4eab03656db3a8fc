use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::models::{
    Course, CourseStatistics, LearnerPreferences, LearnerProfile, MetricsReport, ModelType,
    StoredMetrics, StudyMethod, StudySessionRecord, TrainingDataStats,
};

/// Data-access collaborator. Implementations report failures through
/// `Result`; callers decide whether to fail or fall back.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_training_data(
        &self,
        model_type: ModelType,
        user_id: Option<&str>,
    ) -> Result<Vec<StudySessionRecord>>;

    async fn get_user_study_history(&self, user_id: &str) -> Result<Vec<StudySessionRecord>>;

    async fn get_user_profile_and_history(&self, user_id: &str) -> Result<LearnerProfile>;

    async fn get_available_courses(&self, user_id: &str) -> Result<Vec<Course>>;

    async fn get_course_statistics(&self, course_id: &str) -> Result<CourseStatistics>;

    async fn save_model_metrics(
        &self,
        model_type: ModelType,
        metrics: &MetricsReport,
        training_samples: usize,
    ) -> Result<()>;

    async fn get_model_metrics(&self, model_type: ModelType) -> Result<Option<StoredMetrics>>;

    async fn get_all_model_metrics(&self) -> Result<Vec<StoredMetrics>>;

    async fn get_training_data_statistics(&self) -> Result<TrainingDataStats>;
}

pub const SYNTHETIC_SESSIONS: usize = 500;
pub const SYNTHETIC_SEED: u64 = 42;
const SYNTHETIC_USERS: usize = 20;
const SYNTHETIC_COURSES: usize = 10;
const CATEGORIES: [&str; 3] = ["programming", "mathematics", "languages"];
const LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];

/// Generates a reproducible corpus of study sessions for running without
/// a database.
pub fn synthetic_sessions(count: usize, seed: u64) -> Vec<StudySessionRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let today = Utc::now().date_naive();

    (0..count)
        .map(|i| {
            let method = *StudyMethod::ALL.choose(&mut rng).unwrap_or(&StudyMethod::Pomodoro);
            let hour: u32 = rng.gen_range(6..=23);
            let daytime = (8..=18).contains(&hour);

            let mut completed = rng.gen::<f64>() < if daytime { 0.7 } else { 0.4 };
            if method == StudyMethod::Pomodoro {
                completed = completed || rng.gen::<f64>() < 0.2;
            }

            let day = today - Duration::days(rng.gen_range(0..=30));
            let minute: u32 = rng.gen_range(0..60);
            let started_at = NaiveTime::from_hms_opt(hour, minute, 0)
                .map(|time| day.and_time(time).format("%Y-%m-%dT%H:%M:%S").to_string());
            let tab_switch_count = if completed {
                rng.gen_range(0..=3)
            } else {
                rng.gen_range(0..=10)
            };

            StudySessionRecord {
                user_id: Some(format!("synthetic-user-{}", i % SYNTHETIC_USERS)),
                course_id: Some(format!("synthetic-course-{}", i % SYNTHETIC_COURSES)),
                method: method.as_str().to_string(),
                duration_seconds: rng.gen_range(900..=5400) as f64,
                tab_switch_count,
                completed,
                started_at,
            }
        })
        .collect()
}

pub fn synthetic_courses() -> Vec<Course> {
    (0..SYNTHETIC_COURSES)
        .map(|i| Course {
            id: format!("synthetic-course-{i}"),
            title: format!("Synthetic Course {i}"),
            description: None,
            category: Some(CATEGORIES[i % CATEGORIES.len()].to_string()),
            difficulty: Some(LEVELS[i % LEVELS.len()].to_string()),
        })
        .collect()
}

/// Stable per-user preferences derived from the user id.
pub fn synthetic_preferences(user_id: &str) -> LearnerPreferences {
    let seed = user_id.bytes().map(usize::from).sum::<usize>();
    LearnerPreferences {
        skill_level: Some(LEVELS[seed % LEVELS.len()].to_string()),
        interests: vec![CATEGORIES[seed % CATEGORIES.len()].to_string()],
    }
}

/// In-process data source backed by [`synthetic_sessions`].
pub struct SyntheticDataSource {
    sessions: Vec<StudySessionRecord>,
    metrics: Mutex<HashMap<ModelType, StoredMetrics>>,
}

impl SyntheticDataSource {
    pub fn new(seed: u64) -> Self {
        Self::from_sessions(synthetic_sessions(SYNTHETIC_SESSIONS, seed))
    }

    pub fn from_sessions(sessions: Vec<StudySessionRecord>) -> Self {
        Self {
            sessions,
            metrics: Mutex::new(HashMap::new()),
        }
    }

    fn sessions_for(&self, user_id: &str) -> Vec<StudySessionRecord> {
        self.sessions
            .iter()
            .filter(|session| session.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect()
    }

    fn lock_metrics(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ModelType, StoredMetrics>>> {
        self.metrics
            .lock()
            .map_err(|_| EngineError::UpstreamUnavailable("metrics table poisoned".into()))
    }
}

#[async_trait]
impl DataSource for SyntheticDataSource {
    async fn fetch_training_data(
        &self,
        _model_type: ModelType,
        user_id: Option<&str>,
    ) -> Result<Vec<StudySessionRecord>> {
        Ok(match user_id {
            Some(user_id) => self.sessions_for(user_id),
            None => self.sessions.clone(),
        })
    }

    async fn get_user_study_history(&self, user_id: &str) -> Result<Vec<StudySessionRecord>> {
        Ok(self.sessions_for(user_id))
    }

    async fn get_user_profile_and_history(&self, user_id: &str) -> Result<LearnerProfile> {
        let history = self.sessions_for(user_id);
        let mut enrolled: Vec<String> = Vec::new();
        let mut completed: Vec<String> = Vec::new();
        for session in &history {
            let Some(course_id) = session.course_id.as_ref() else {
                continue;
            };
            if !enrolled.contains(course_id) {
                enrolled.push(course_id.clone());
            }
            if session.completed && !completed.contains(course_id) {
                completed.push(course_id.clone());
            }
        }

        Ok(LearnerProfile {
            id: user_id.to_string(),
            preferences: synthetic_preferences(user_id),
            completed_courses: completed,
            enrolled_courses: enrolled,
        })
    }

    async fn get_available_courses(&self, _user_id: &str) -> Result<Vec<Course>> {
        Ok(synthetic_courses())
    }

    async fn get_course_statistics(&self, course_id: &str) -> Result<CourseStatistics> {
        let sessions: Vec<&StudySessionRecord> = self
            .sessions
            .iter()
            .filter(|session| session.course_id.as_deref() == Some(course_id))
            .collect();
        let total = sessions.len() as i64;
        let completions = sessions.iter().filter(|session| session.completed).count() as i64;
        Ok(CourseStatistics {
            course_id: course_id.to_string(),
            total_enrollments: total,
            completions,
            completion_rate: if total > 0 {
                completions as f64 / total as f64
            } else {
                0.0
            },
        })
    }

    async fn save_model_metrics(
        &self,
        model_type: ModelType,
        metrics: &MetricsReport,
        training_samples: usize,
    ) -> Result<()> {
        let stored = StoredMetrics {
            model_type: model_type.as_str().to_string(),
            metrics: serde_json::to_value(metrics)?,
            training_samples: i32::try_from(training_samples).unwrap_or(i32::MAX),
            trained_at: metrics.trained_at,
        };
        self.lock_metrics()?.insert(model_type, stored);
        info!(model_type = %model_type, "saved metrics (synthetic)");
        Ok(())
    }

    async fn get_model_metrics(&self, model_type: ModelType) -> Result<Option<StoredMetrics>> {
        Ok(self.lock_metrics()?.get(&model_type).cloned())
    }

    async fn get_all_model_metrics(&self) -> Result<Vec<StoredMetrics>> {
        let mut all: Vec<StoredMetrics> = self.lock_metrics()?.values().cloned().collect();
        all.sort_by(|a, b| b.trained_at.cmp(&a.trained_at));
        Ok(all)
    }

    async fn get_training_data_statistics(&self) -> Result<TrainingDataStats> {
        let users: HashSet<&str> = self
            .sessions
            .iter()
            .filter_map(|session| session.user_id.as_deref())
            .collect();
        let enrollments: HashSet<(&str, &str)> = self
            .sessions
            .iter()
            .filter_map(|session| Some((session.user_id.as_deref()?, session.course_id.as_deref()?)))
            .collect();

        Ok(TrainingDataStats {
            study_sessions: self.sessions.len() as i64,
            learner_preferences: users.len() as i64,
            enrollments: enrollments.len() as i64,
            unique_users: users.len() as i64,
            unique_courses: SYNTHETIC_COURSES as i64,
        })
    }
}
