use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{
    Course, CourseStatistics, LearnerPreferences, LearnerProfile, MetricsReport, ModelType,
    StoredMetrics, StudySessionRecord, TrainingDataStats, DEFAULT_DURATION_SECONDS,
};
use crate::source::{self, DataSource};

const TRAINING_LIMIT: i64 = 2000;
const RECOMMENDATION_LIMIT: i64 = 5000;
const HISTORY_LIMIT: i64 = 100;
const COURSE_LIMIT: i64 = 100;

const SESSION_COLUMNS: &str = "s.user_id, s.course_id, s.method_used, s.duration_seconds, \
     s.tab_switch_count, s.completed, \
     to_char(s.started_at AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS') AS started_at_iso";

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Loads the synthetic corpus: courses, learner preferences, enrollments
/// and sessions. Re-running is a no-op for rows already present.
pub async fn seed(pool: &PgPool) -> Result<usize> {
    for course in source::synthetic_courses() {
        sqlx::query(
            r#"
            INSERT INTO study_forecast.courses (id, title, description, category, difficulty)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title, category = EXCLUDED.category,
                difficulty = EXCLUDED.difficulty
            "#,
        )
        .bind(&course.id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(&course.category)
        .bind(&course.difficulty)
        .execute(pool)
        .await?;
    }

    let sessions = source::synthetic_sessions(source::SYNTHETIC_SESSIONS, source::SYNTHETIC_SEED);
    let mut enrollments: HashMap<(String, String), bool> = HashMap::new();
    let mut inserted = 0usize;

    for (index, session) in sessions.iter().enumerate() {
        let (Some(user_id), Some(course_id)) = (session.user_id.as_ref(), session.course_id.as_ref())
        else {
            continue;
        };
        if insert_session(pool, session, &format!("seed-{index:03}")).await? {
            inserted += 1;
        }

        let completed = enrollments
            .entry((user_id.clone(), course_id.clone()))
            .or_insert(false);
        *completed |= session.completed;
    }

    let mut users: Vec<&String> = enrollments.keys().map(|(user_id, _)| user_id).collect();
    users.sort();
    users.dedup();
    for user_id in users {
        let preferences = source::synthetic_preferences(user_id);
        sqlx::query(
            r#"
            INSERT INTO study_forecast.learner_preferences (user_id, skill_level, interests)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&preferences.skill_level)
        .bind(&preferences.interests)
        .execute(pool)
        .await?;
    }

    for ((user_id, course_id), completed) in &enrollments {
        sqlx::query(
            r#"
            INSERT INTO study_forecast.enrollments (id, user_id, course_id, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, course_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(course_id)
        .bind(if *completed { "completed" } else { "active" })
        .execute(pool)
        .await?;
    }

    info!(sessions = inserted, enrollments = enrollments.len(), "seed data loaded");
    Ok(inserted)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        user_id: String,
        course_id: Option<String>,
        method_used: Option<String>,
        duration_seconds: Option<i32>,
        tab_switch_count: Option<i32>,
        completed: bool,
        started_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO study_forecast.study_sessions
            (id, user_id, course_id, method_used, duration_seconds, tab_switch_count,
             completed, started_at, source_key)
            VALUES ($1, $2, $3, COALESCE($4, 'pomodoro'), $5, COALESCE($6, 0), $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.user_id)
        .bind(&row.course_id)
        .bind(&row.method_used)
        .bind(row.duration_seconds)
        .bind(row.tab_switch_count)
        .bind(row.completed)
        .bind(row.started_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Imports a JSON array of exported session objects. Keys may be camelCase
/// or snake_case; objects without a user are skipped.
pub async fn import_json(pool: &PgPool, json_path: &std::path::Path) -> Result<usize> {
    let raw = std::fs::read(json_path)?;
    let payload: serde_json::Value = serde_json::from_slice(&raw)?;
    let Some(items) = payload.as_array() else {
        return Err(EngineError::Store("expected a JSON array of sessions".into()));
    };

    let mut inserted = 0usize;
    let mut skipped = 0usize;
    for item in items {
        let record = StudySessionRecord::from_json(item);
        if record.user_id.is_none() {
            skipped += 1;
            continue;
        }
        let source_key = StudySessionRecord::source_key(item)
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        if insert_session(pool, &record, &source_key).await? {
            inserted += 1;
        }
    }

    if skipped > 0 {
        warn!(skipped, "sessions without a user were not imported");
    }
    Ok(inserted)
}

async fn insert_session(pool: &PgPool, session: &StudySessionRecord, source_key: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO study_forecast.study_sessions
        (id, user_id, course_id, method_used, duration_seconds, tab_switch_count,
         completed, started_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&session.user_id)
    .bind(&session.course_id)
    .bind(&session.method)
    .bind(session.duration_seconds.round() as i32)
    .bind(i32::try_from(session.tab_switch_count).unwrap_or(i32::MAX))
    .bind(session.completed)
    .bind(session.started_at_utc().unwrap_or_else(Utc::now))
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn session_from_row(row: &PgRow) -> Result<StudySessionRecord> {
    let defaults = StudySessionRecord::default();
    let duration: Option<i32> = row.try_get("duration_seconds")?;
    let tab_switches: Option<i32> = row.try_get("tab_switch_count")?;

    Ok(StudySessionRecord {
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
        method: row
            .try_get::<Option<String>, _>("method_used")?
            .unwrap_or(defaults.method),
        duration_seconds: duration.map(f64::from).unwrap_or(DEFAULT_DURATION_SECONDS),
        tab_switch_count: tab_switches
            .and_then(|count| u32::try_from(count).ok())
            .unwrap_or(0),
        completed: row.try_get::<Option<bool>, _>("completed")?.unwrap_or(false),
        started_at: row.try_get("started_at_iso")?,
    })
}

fn stored_metrics_from_row(row: &PgRow) -> Result<StoredMetrics> {
    Ok(StoredMetrics {
        model_type: row.try_get("model_type")?,
        metrics: row.try_get("metrics")?,
        training_samples: row.try_get("training_samples")?,
        trained_at: row.try_get("trained_at")?,
    })
}

pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_sessions(&self, user_id: Option<&str>, limit: i64) -> Result<Vec<StudySessionRecord>> {
        let mut query = format!("SELECT {SESSION_COLUMNS} FROM study_forecast.study_sessions s");
        if user_id.is_some() {
            query.push_str(" WHERE s.user_id = $2");
        }
        query.push_str(" ORDER BY s.started_at DESC LIMIT $1");

        let mut rows = sqlx::query(&query).bind(limit);
        if let Some(value) = user_id {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(session_from_row).collect()
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn fetch_training_data(
        &self,
        model_type: ModelType,
        user_id: Option<&str>,
    ) -> Result<Vec<StudySessionRecord>> {
        let limit = match model_type {
            ModelType::Recommendation => RECOMMENDATION_LIMIT,
            ModelType::Scheduling | ModelType::Performance => TRAINING_LIMIT,
        };
        let sessions = self.fetch_sessions(user_id, limit).await?;
        debug!(model_type = %model_type, rows = sessions.len(), "fetched training data");
        Ok(sessions)
    }

    async fn get_user_study_history(&self, user_id: &str) -> Result<Vec<StudySessionRecord>> {
        self.fetch_sessions(Some(user_id), HISTORY_LIMIT).await
    }

    async fn get_user_profile_and_history(&self, user_id: &str) -> Result<LearnerProfile> {
        let preferences = sqlx::query(
            "SELECT skill_level, interests FROM study_forecast.learner_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| -> Result<LearnerPreferences> {
            Ok(LearnerPreferences {
                skill_level: row.try_get("skill_level")?,
                interests: row.try_get("interests")?,
            })
        })
        .transpose()?
        .unwrap_or_default();

        let enrollments = sqlx::query(
            "SELECT course_id, status FROM study_forecast.enrollments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut completed_courses = Vec::new();
        let mut enrolled_courses = Vec::new();
        for row in enrollments {
            let course_id: String = row.try_get("course_id")?;
            let status: String = row.try_get("status")?;
            if status == "completed" {
                completed_courses.push(course_id.clone());
            }
            enrolled_courses.push(course_id);
        }

        Ok(LearnerProfile {
            id: user_id.to_string(),
            preferences,
            completed_courses,
            enrolled_courses,
        })
    }

    async fn get_available_courses(&self, _user_id: &str) -> Result<Vec<Course>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, category, difficulty
            FROM study_forecast.courses
            WHERE published
            ORDER BY created_at, id
            LIMIT $1
            "#,
        )
        .bind(COURSE_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut courses = Vec::new();
        for row in rows {
            courses.push(Course {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                category: row.try_get("category")?,
                difficulty: row.try_get("difficulty")?,
            });
        }
        Ok(courses)
    }

    async fn get_course_statistics(&self, course_id: &str) -> Result<CourseStatistics> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completions
            FROM study_forecast.enrollments
            WHERE course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let completions: i64 = row.try_get("completions")?;
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
        let training_samples = i32::try_from(training_samples)
            .map_err(|_| EngineError::Store(format!("sample count {training_samples} out of range")))?;

        sqlx::query(
            r#"
            INSERT INTO study_forecast.model_metrics
            (model_type, metrics, training_samples, trained_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (model_type) DO UPDATE
            SET metrics = EXCLUDED.metrics, training_samples = EXCLUDED.training_samples,
                trained_at = EXCLUDED.trained_at, updated_at = NOW()
            "#,
        )
        .bind(model_type.as_str())
        .bind(serde_json::to_value(metrics)?)
        .bind(training_samples)
        .bind(metrics.trained_at)
        .execute(&self.pool)
        .await?;

        info!(model_type = %model_type, "saved model metrics");
        Ok(())
    }

    async fn get_model_metrics(&self, model_type: ModelType) -> Result<Option<StoredMetrics>> {
        let row = sqlx::query(
            r#"
            SELECT model_type, metrics, training_samples, trained_at
            FROM study_forecast.model_metrics
            WHERE model_type = $1
            "#,
        )
        .bind(model_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(stored_metrics_from_row).transpose()
    }

    async fn get_all_model_metrics(&self) -> Result<Vec<StoredMetrics>> {
        let rows = sqlx::query(
            r#"
            SELECT model_type, metrics, training_samples, trained_at
            FROM study_forecast.model_metrics
            ORDER BY trained_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_metrics_from_row).collect()
    }

    async fn get_training_data_statistics(&self) -> Result<TrainingDataStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM study_forecast.study_sessions) AS study_sessions,
                (SELECT COUNT(*) FROM study_forecast.learner_preferences) AS learner_preferences,
                (SELECT COUNT(*) FROM study_forecast.enrollments) AS enrollments,
                (SELECT COUNT(DISTINCT user_id) FROM study_forecast.study_sessions) AS unique_users,
                (SELECT COUNT(*) FROM study_forecast.courses) AS unique_courses
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TrainingDataStats {
            study_sessions: row.try_get("study_sessions")?,
            learner_preferences: row.try_get("learner_preferences")?,
            enrollments: row.try_get("enrollments")?,
            unique_users: row.try_get("unique_users")?,
            unique_courses: row.try_get("unique_courses")?,
        })
    }
}
