//! Feature derivation shared by the three prediction models.
//!
//! Column order is part of the persisted model: the scaler and estimators
//! fitted on these rows are only valid for rows built the same way.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{StudyMethod, StudySessionRecord};
use crate::preprocessing::LabelEncoder;

pub const MIN_SESSIONS_PER_USER: usize = 3;

const MAX_DURATION_SECONDS: f64 = 7200.0;
const MAX_TAB_SWITCHES: f64 = 20.0;

/// `[hour, weekday, method, duration, tab switches, completed]`, each scaled to ~[0, 1].
pub fn scheduling_row(
    hour: u32,
    weekday: u32,
    method: StudyMethod,
    normalized_duration: f64,
    normalized_tab_switches: f64,
    completion: f64,
) -> Vec<f64> {
    vec![
        hour as f64 / 24.0,
        weekday as f64 / 7.0,
        method.index() as f64 / 4.0,
        normalized_duration,
        normalized_tab_switches,
        completion,
    ]
}

pub fn scheduling_features(records: &[StudySessionRecord]) -> Vec<Vec<f64>> {
    records
        .iter()
        .map(|record| {
            scheduling_row(
                record.hour(),
                record.weekday(),
                StudyMethod::canonical(&record.method),
                record.duration_seconds / MAX_DURATION_SECONDS,
                record.tab_switch_count as f64 / MAX_TAB_SWITCHES,
                if record.completed { 1.0 } else { 0.0 },
            )
        })
        .collect()
}

pub fn method_encoder() -> LabelEncoder {
    LabelEncoder::fit(StudyMethod::ALL.iter().map(StudyMethod::as_str))
}

pub fn scheduling_labels(records: &[StudySessionRecord], encoder: &LabelEncoder) -> Vec<usize> {
    records
        .iter()
        .map(|record| {
            let method = StudyMethod::canonical(&record.method);
            encoder.encode(method.as_str()).unwrap_or(0)
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let centre = mean(values);
    let variance = values.iter().map(|value| (value - centre).powi(2)).sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Per-user accumulation over a batch of sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAggregate {
    pub session_count: usize,
    pub mean_duration_seconds: f64,
    pub std_duration_seconds: f64,
    pub mean_tab_switches: f64,
    pub completion_rate: f64,
    pub distinct_methods: usize,
    pub hour_std: f64,
    pub uses_pomodoro: bool,
}

impl UserAggregate {
    pub fn from_sessions<'a, I>(sessions: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a StudySessionRecord>,
    {
        let mut durations = Vec::new();
        let mut tab_switches = Vec::new();
        let mut completed = Vec::new();
        let mut hours = Vec::new();
        let mut methods: Vec<&str> = Vec::new();

        for session in sessions {
            durations.push(session.duration_seconds);
            tab_switches.push(session.tab_switch_count as f64);
            completed.push(if session.completed { 1.0 } else { 0.0 });
            hours.push(session.hour() as f64);
            if !methods.contains(&session.method.as_str()) {
                methods.push(session.method.as_str());
            }
        }

        if durations.is_empty() {
            return None;
        }

        Some(Self {
            session_count: durations.len(),
            mean_duration_seconds: mean(&durations),
            std_duration_seconds: population_std(&durations),
            mean_tab_switches: mean(&tab_switches),
            completion_rate: mean(&completed),
            distinct_methods: methods.len(),
            hour_std: population_std(&hours),
            uses_pomodoro: methods.contains(&StudyMethod::Pomodoro.as_str()),
        })
    }

    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.mean_duration_seconds / 3600.0,
            self.std_duration_seconds / 3600.0,
            self.mean_tab_switches,
            self.completion_rate,
            self.distinct_methods as f64 / 4.0,
            self.hour_std,
            self.session_count as f64 / 100.0,
            if self.uses_pomodoro { 1.0 } else { 0.0 },
        ]
    }

    /// Synthetic quiz score derived from completion and focus, in [0, 100].
    pub fn quiz_score_label(&self) -> f64 {
        let focus = 1.0 - self.mean_tab_switches / 10.0;
        ((self.completion_rate * 0.6 + focus * 0.4) * 100.0).clamp(0.0, 100.0)
    }
}

/// Groups sessions by user id, keeping users in first-seen order.
/// Records without a user id are dropped.
pub fn group_by_user(records: &[StudySessionRecord]) -> Vec<(String, Vec<&StudySessionRecord>)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&StudySessionRecord>)> = Vec::new();

    for record in records {
        let Some(user_id) = record.user_id.as_deref() else {
            continue;
        };
        let position = *positions.entry(user_id).or_insert_with(|| {
            groups.push((user_id.to_string(), Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(record);
    }

    groups
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceDataset {
    pub features: Vec<Vec<f64>>,
    pub completion_labels: Vec<f64>,
    pub score_labels: Vec<f64>,
}

impl PerformanceDataset {
    pub fn user_count(&self) -> usize {
        self.features.len()
    }
}

/// One aggregate row per user with at least three sessions.
pub fn performance_dataset(records: &[StudySessionRecord]) -> PerformanceDataset {
    let mut dataset = PerformanceDataset::default();

    for (_, sessions) in group_by_user(records) {
        if sessions.len() < MIN_SESSIONS_PER_USER {
            continue;
        }
        let Some(aggregate) = UserAggregate::from_sessions(sessions) else {
            continue;
        };
        dataset.features.push(aggregate.feature_vector());
        dataset.completion_labels.push(aggregate.completion_rate);
        dataset.score_labels.push(aggregate.quiz_score_label());
    }

    dataset
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseTally {
    pub total: u64,
    pub completed: u64,
}

impl CourseTally {
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Lookup tables that make up the trained recommendation model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionTables {
    /// user -> course -> best interaction score (1.0 completed, 0.5 otherwise)
    pub user_courses: HashMap<String, HashMap<String, f64>>,
    pub course_tallies: HashMap<String, CourseTally>,
}

impl InteractionTables {
    pub fn build(records: &[StudySessionRecord]) -> Self {
        let mut tables = Self::default();

        for record in records {
            let (Some(user_id), Some(course_id)) =
                (record.user_id.as_deref(), record.course_id.as_deref())
            else {
                continue;
            };

            let score = if record.completed { 1.0 } else { 0.5 };
            let best = tables
                .user_courses
                .entry(user_id.to_string())
                .or_default()
                .entry(course_id.to_string())
                .or_insert(0.0);
            *best = f64::max(*best, score);

            let tally = tables
                .course_tallies
                .entry(course_id.to_string())
                .or_default();
            tally.total += 1;
            if record.completed {
                tally.completed += 1;
            }
        }

        tables
    }
}
