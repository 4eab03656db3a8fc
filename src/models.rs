use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const DEFAULT_DURATION_SECONDS: f64 = 1500.0;
pub const DEFAULT_HOUR: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Scheduling,
    Recommendation,
    Performance,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [
        ModelType::Scheduling,
        ModelType::Recommendation,
        ModelType::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Scheduling => "scheduling",
            ModelType::Recommendation => "recommendation",
            ModelType::Performance => "performance",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ModelType::ALL
            .into_iter()
            .find(|model_type| model_type.as_str() == value)
            .ok_or_else(|| EngineError::UnknownModelType(value.to_string()))
    }
}

/// The four canonical study methods, in enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StudyMethod {
    #[default]
    #[serde(rename = "pomodoro")]
    Pomodoro,
    #[serde(rename = "flowtime")]
    Flowtime,
    #[serde(rename = "blitz")]
    Blitz,
    #[serde(rename = "52_17")]
    FiftyTwoSeventeen,
}

impl StudyMethod {
    pub const ALL: [StudyMethod; 4] = [
        StudyMethod::Pomodoro,
        StudyMethod::Flowtime,
        StudyMethod::Blitz,
        StudyMethod::FiftyTwoSeventeen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMethod::Pomodoro => "pomodoro",
            StudyMethod::Flowtime => "flowtime",
            StudyMethod::Blitz => "blitz",
            StudyMethod::FiftyTwoSeventeen => "52_17",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        StudyMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == value)
    }

    /// Maps any raw method name onto a canonical method, falling back to the default.
    pub fn canonical(value: &str) -> Self {
        StudyMethod::parse(value).unwrap_or_default()
    }

    pub fn index(&self) -> usize {
        match self {
            StudyMethod::Pomodoro => 0,
            StudyMethod::Flowtime => 1,
            StudyMethod::Blitz => 2,
            StudyMethod::FiftyTwoSeventeen => 3,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StudyMethod::Pomodoro => "25-minute focused sessions with 5-minute breaks",
            StudyMethod::Flowtime => "flexible sessions based on natural focus flow",
            StudyMethod::Blitz => "short intense 15-minute sessions",
            StudyMethod::FiftyTwoSeventeen => "52-minute work sessions with 17-minute breaks",
        }
    }
}

impl fmt::Display for StudyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw study session as fetched from the datastore. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySessionRecord {
    pub user_id: Option<String>,
    pub course_id: Option<String>,
    pub method: String,
    pub duration_seconds: f64,
    pub tab_switch_count: u32,
    pub completed: bool,
    pub started_at: Option<String>,
}

impl Default for StudySessionRecord {
    fn default() -> Self {
        Self {
            user_id: None,
            course_id: None,
            method: StudyMethod::default().as_str().to_string(),
            duration_seconds: DEFAULT_DURATION_SECONDS,
            tab_switch_count: 0,
            completed: false,
            started_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub sample_count: usize,
    pub trained_at: DateTime<Utc>,
}

impl MetricsReport {
    pub fn zero(sample_count: usize) -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            sample_count,
            trained_at: Utc::now(),
        }
    }
}

/// Skill level assumed for learners who never stored preferences.
pub const DEFAULT_SKILL_LEVEL: &str = "beginner";

fn default_level() -> Option<String> {
    Some(DEFAULT_SKILL_LEVEL.to_string())
}

/// A stored `skill_level` of NULL stays `None`; only a missing preferences
/// row (or a missing key) falls back to [`DEFAULT_SKILL_LEVEL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerPreferences {
    #[serde(default = "default_level")]
    pub skill_level: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl Default for LearnerPreferences {
    fn default() -> Self {
        Self {
            skill_level: default_level(),
            interests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub id: String,
    #[serde(default)]
    pub preferences: LearnerPreferences,
    #[serde(default)]
    pub completed_courses: Vec<String>,
    #[serde(default)]
    pub enrolled_courses: Vec<String>,
}

impl LearnerProfile {
    pub fn new_user(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_level")]
    pub difficulty: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseStatistics {
    pub course_id: String,
    pub total_enrollments: i64,
    pub completions: i64,
    pub completion_rate: f64,
}

/// Row counts describing the data available for training.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingDataStats {
    pub study_sessions: i64,
    pub learner_preferences: i64,
    pub enrollments: i64,
    pub unique_users: i64,
    pub unique_courses: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMetrics {
    pub model_type: String,
    pub metrics: serde_json::Value,
    pub training_samples: i32,
    pub trained_at: DateTime<Utc>,
}
