use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::TrainableModel;
use crate::error::Result;
use crate::estimator::{self, GradientBoostingRegressor, Regressor, RANDOM_SEED};
use crate::evaluation::{self, clamp_unit};
use crate::features::{self, UserAggregate};
use crate::models::{CourseStatistics, MetricsReport, ModelType, StudyMethod, StudySessionRecord};
use crate::preprocessing::StandardScaler;

pub const MIN_AGGREGATED_USERS: usize = 10;
const MAX_RECOMMENDATIONS: usize = 5;
const MIN_SESSIONS_FOR_HOUR_ADVICE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformancePrediction {
    pub predicted_completion_rate: f64,
    pub predicted_quiz_score: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}

impl PerformancePrediction {
    pub fn fallback() -> Self {
        Self {
            predicted_completion_rate: 0.5,
            predicted_quiz_score: 65.0,
            risk_level: RiskLevel::Medium,
            recommendations: vec![
                "Set a consistent study schedule".to_string(),
                "Start with shorter study sessions".to_string(),
                "Review material before quizzes".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedPerformance {
    completion_model: GradientBoostingRegressor,
    score_model: GradientBoostingRegressor,
    scaler: StandardScaler,
}

/// Two boosted regressors forecasting completion rate and quiz score from
/// a user's aggregate study behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceModel {
    fitted: Option<FittedPerformance>,
}

impl TrainableModel for PerformanceModel {
    const MODEL_TYPE: ModelType = ModelType::Performance;

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn train(&mut self, records: &[StudySessionRecord]) -> Result<MetricsReport> {
        info!(samples = records.len(), "training performance model");
        let dataset = features::performance_dataset(records);
        if dataset.user_count() < MIN_AGGREGATED_USERS {
            warn!(users = dataset.user_count(), "not enough aggregated user data");
            return Ok(MetricsReport::zero(records.len()));
        }

        let (train_idx, test_idx) = estimator::train_test_split(dataset.user_count(), 0.2, RANDOM_SEED);
        let x_train = estimator::take_rows(&dataset.features, &train_idx);
        let x_test = estimator::take_rows(&dataset.features, &test_idx);
        let completion_train = estimator::take_rows(&dataset.completion_labels, &train_idx);
        let completion_test = estimator::take_rows(&dataset.completion_labels, &test_idx);
        let score_train = estimator::take_rows(&dataset.score_labels, &train_idx);
        let score_test = estimator::take_rows(&dataset.score_labels, &test_idx);

        let scaler = StandardScaler::fit(&x_train)?;
        let x_train = scaler.transform(&x_train);
        let x_test = scaler.transform(&x_test);

        let mut completion_model = GradientBoostingRegressor::default();
        completion_model.fit(&x_train, &completion_train)?;
        let mut score_model = GradientBoostingRegressor::default();
        score_model.fit(&x_train, &score_train)?;

        let completion_predicted = completion_model.predict(&x_test);
        let score_predicted = score_model.predict(&x_test);
        let metrics = regression_metrics(
            &completion_test,
            &completion_predicted,
            &score_test,
            &score_predicted,
            records.len(),
        );
        info!(
            users = dataset.user_count(),
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            "performance model trained"
        );

        self.fitted = Some(FittedPerformance {
            completion_model,
            score_model,
            scaler,
        });
        Ok(metrics)
    }
}

/// Maps regression errors onto the shared metric names.
///
/// accuracy is `1 - MAE / (range + 0.001)` on completion, precision is R²,
/// recall is `1 - MAE / 100` on quiz score, and F1 blends the unclamped
/// accuracy with R².
fn regression_metrics(
    completion_truth: &[f64],
    completion_predicted: &[f64],
    score_truth: &[f64],
    score_predicted: &[f64],
    sample_count: usize,
) -> MetricsReport {
    let completion_mae = evaluation::mean_absolute_error(completion_truth, completion_predicted);
    let score_mae = evaluation::mean_absolute_error(score_truth, score_predicted);
    let r2 = evaluation::r2_score(completion_truth, completion_predicted);

    let max = completion_truth.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = completion_truth.iter().copied().fold(f64::INFINITY, f64::min);
    let range = if completion_truth.is_empty() { 0.0 } else { max - min };
    let accuracy = 1.0 - completion_mae / (range + 0.001);

    MetricsReport {
        accuracy: clamp_unit(accuracy),
        precision: clamp_unit(r2),
        recall: (1.0 - score_mae / 100.0).max(0.0),
        f1_score: clamp_unit((2.0 * accuracy * r2) / (accuracy + r2 + 0.001)),
        sample_count,
        trained_at: Utc::now(),
    }
}

impl PerformanceModel {
    pub fn predict(
        &self,
        sessions: &[StudySessionRecord],
        course: Option<&CourseStatistics>,
    ) -> PerformancePrediction {
        let Some(fitted) = self.fitted.as_ref() else {
            warn!("performance model untrained, using fallback");
            return PerformancePrediction::fallback();
        };
        let Some(aggregate) = UserAggregate::from_sessions(sessions) else {
            return PerformancePrediction::fallback();
        };
        if let Some(course) = course {
            debug!(
                course_id = %course.course_id,
                course_completion_rate = course.completion_rate,
                "predicting performance"
            );
        }

        let row = fitted.scaler.transform_row(&aggregate.feature_vector());
        let rows = [row];
        let completion_rate = fitted
            .completion_model
            .predict(&rows)
            .first()
            .copied()
            .map(clamp_unit)
            .unwrap_or(0.5);
        let quiz_score = fitted
            .score_model
            .predict(&rows)
            .first()
            .copied()
            .filter(|score| !score.is_nan())
            .map(|score| score.clamp(0.0, 100.0))
            .unwrap_or(65.0);

        PerformancePrediction {
            predicted_completion_rate: completion_rate,
            predicted_quiz_score: quiz_score,
            risk_level: risk_level(completion_rate, quiz_score, aggregate.mean_tab_switches),
            recommendations: recommendations(
                completion_rate,
                quiz_score,
                aggregate.mean_tab_switches,
                sessions,
            ),
        }
    }
}

pub fn risk_level(completion_rate: f64, quiz_score: f64, mean_tab_switches: f64) -> RiskLevel {
    let mut points = 0;

    if completion_rate < 0.5 {
        points += 2;
    } else if completion_rate < 0.7 {
        points += 1;
    }

    if quiz_score < 60.0 {
        points += 2;
    } else if quiz_score < 75.0 {
        points += 1;
    }

    if mean_tab_switches > 5.0 {
        points += 1;
    }

    if points >= 4 {
        RiskLevel::High
    } else if points >= 2 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn recommendations(
    completion_rate: f64,
    quiz_score: f64,
    mean_tab_switches: f64,
    sessions: &[StudySessionRecord],
) -> Vec<String> {
    let mut advice: Vec<&str> = Vec::new();

    if completion_rate < 0.6 {
        advice.push("Try shorter study sessions to improve completion rate");
        advice.push("Set specific goals before each study session");
    }

    if quiz_score < 70.0 {
        advice.push("Review material before taking quizzes");
        advice.push("Take notes during video lessons");
    }

    if mean_tab_switches > 5.0 {
        advice.push("Minimize distractions by closing unnecessary tabs");
        advice.push("Use website blockers during study sessions");
    }

    let uses_default_method = sessions
        .iter()
        .any(|session| session.method == StudyMethod::default().as_str());
    if !uses_default_method {
        advice.push("Try the Pomodoro technique for better focus");
    }

    if sessions.len() >= MIN_SESSIONS_FOR_HOUR_ADVICE {
        let hours: Vec<f64> = sessions
            .iter()
            .filter_map(|session| session.parsed_hour())
            .map(f64::from)
            .collect();
        if !hours.is_empty() {
            let average = hours.iter().sum::<f64>() / hours.len() as f64;
            if !(8.0..=22.0).contains(&average) {
                advice.push("Consider studying during daytime hours for better retention");
            }
        }
    }

    if advice.is_empty() {
        advice.push("Keep up the good work!");
        advice.push("Try challenging yourself with advanced courses");
    }

    advice
        .into_iter()
        .take(MAX_RECOMMENDATIONS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str, hour: u32, completed: bool, tab_switches: u32) -> StudySessionRecord {
        StudySessionRecord {
            user_id: Some(user.to_string()),
            course_id: Some("c1".to_string()),
            method: "pomodoro".to_string(),
            duration_seconds: 1500.0,
            tab_switch_count: tab_switches,
            completed,
            started_at: Some(format!("2026-03-04T{hour:02}:00:00Z")),
        }
    }

    fn focused_history(user: &str) -> Vec<StudySessionRecord> {
        (0..5).map(|i| session(user, 9 + i, true, 0)).collect()
    }

    fn training_corpus() -> Vec<StudySessionRecord> {
        let mut records = Vec::new();
        for user in 0..10 {
            records.extend(focused_history(&format!("focused-{user}")));
        }
        for user in 0..20u32 {
            for i in 0..5u32 {
                records.push(session(
                    &format!("mixed-{user}"),
                    9 + i,
                    i < user % 5,
                    (user + i) % 9,
                ));
            }
        }
        records
    }

    #[test]
    fn untrained_model_returns_the_fallback() {
        let prediction = PerformanceModel::default().predict(&focused_history("u1"), None);
        assert_eq!(prediction.predicted_completion_rate, 0.5);
        assert_eq!(prediction.predicted_quiz_score, 65.0);
        assert_eq!(prediction.risk_level, RiskLevel::Medium);
        assert_eq!(prediction.recommendations.len(), 3);
    }

    #[test]
    fn too_few_aggregated_users_yield_zero_metrics() {
        let mut records = Vec::new();
        for user in 0..9 {
            records.extend(focused_history(&format!("u{user}")));
        }
        records.extend((0..20).map(|i| session(&format!("sparse-{i}"), 10, true, 0)));

        let mut model = PerformanceModel::default();
        let metrics = model.train(&records).unwrap();
        assert!(!model.is_trained());
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
        assert_eq!(metrics.sample_count, records.len());
    }

    #[test]
    fn focused_learner_is_low_risk() {
        let mut model = PerformanceModel::default();
        let metrics = model.train(&training_corpus()).unwrap();
        assert!(model.is_trained());
        for value in [metrics.accuracy, metrics.precision, metrics.recall, metrics.f1_score] {
            assert!((0.0..=1.0).contains(&value));
        }

        let prediction = model.predict(&focused_history("newcomer"), None);
        assert!(prediction.predicted_completion_rate > 0.8);
        assert!((0.0..=100.0).contains(&prediction.predicted_quiz_score));
        assert_eq!(prediction.risk_level, RiskLevel::Low);
    }

    #[test]
    fn empty_history_returns_the_fallback() {
        let mut model = PerformanceModel::default();
        model.train(&training_corpus()).unwrap();
        let prediction = model.predict(&[], None);
        assert_eq!(prediction.predicted_quiz_score, 65.0);
    }

    #[test]
    fn risk_points_accumulate() {
        assert_eq!(risk_level(0.9, 90.0, 0.0), RiskLevel::Low);
        assert_eq!(risk_level(0.6, 70.0, 0.0), RiskLevel::Medium);
        assert_eq!(risk_level(0.4, 90.0, 6.0), RiskLevel::Medium);
        assert_eq!(risk_level(0.4, 50.0, 0.0), RiskLevel::High);
        assert_eq!(risk_level(0.6, 70.0, 6.0), RiskLevel::Medium);
        assert_eq!(risk_level(0.4, 70.0, 6.0), RiskLevel::High);
    }

    #[test]
    fn risk_never_drops_as_outcomes_worsen() {
        for tabs in [0.0, 6.0] {
            let mut previous = RiskLevel::Low;
            for step in 0..=20 {
                let completion = 1.0 - step as f64 * 0.05;
                let score = 100.0 - step as f64 * 5.0;
                let level = risk_level(completion, score, tabs);
                assert!(level >= previous);
                previous = level;
            }
        }
    }

    #[test]
    fn recommendations_are_capped_at_five() {
        let sessions: Vec<StudySessionRecord> = (0..6)
            .map(|_| StudySessionRecord {
                method: "blitz".to_string(),
                started_at: Some("2026-03-04T23:30:00Z".to_string()),
                ..StudySessionRecord::default()
            })
            .collect();
        let advice = recommendations(0.3, 40.0, 8.0, &sessions);
        assert_eq!(advice.len(), 5);
        assert_eq!(advice[0], "Try shorter study sessions to improve completion rate");
    }

    #[test]
    fn late_night_and_missing_pomodoro_are_flagged() {
        let sessions: Vec<StudySessionRecord> = (0..5)
            .map(|_| StudySessionRecord {
                method: "flowtime".to_string(),
                started_at: Some("2026-03-04T23:30:00Z".to_string()),
                ..StudySessionRecord::default()
            })
            .collect();
        let advice = recommendations(0.9, 90.0, 0.0, &sessions);
        assert_eq!(
            advice,
            vec![
                "Try the Pomodoro technique for better focus".to_string(),
                "Consider studying during daytime hours for better retention".to_string(),
            ]
        );
    }

    #[test]
    fn healthy_habits_get_encouragement() {
        let advice = recommendations(0.9, 90.0, 1.0, &focused_history("u1"));
        assert_eq!(
            advice,
            vec![
                "Keep up the good work!".to_string(),
                "Try challenging yourself with advanced courses".to_string(),
            ]
        );
    }
}
