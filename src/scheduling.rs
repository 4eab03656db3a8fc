use chrono::{Datelike, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::TrainableModel;
use crate::error::{EngineError, Result};
use crate::estimator::{self, Classifier, RandomForestClassifier, RANDOM_SEED};
use crate::evaluation;
use crate::features;
use crate::models::{MetricsReport, ModelType, StudyMethod, StudySessionRecord};
use crate::preprocessing::{LabelEncoder, StandardScaler};

pub const DEFAULT_OPTIMAL_HOURS: [u32; 6] = [9, 10, 11, 14, 15, 16];
const MIN_SESSIONS_PER_HOUR: usize = 3;
const MAX_OPTIMAL_HOURS: usize = 6;
// Neutral placeholders for the duration and tab-switch columns at query time.
const QUERY_DURATION: f64 = 0.5;
const QUERY_TAB_SWITCHES: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePrediction {
    pub recommended_method: StudyMethod,
    pub confidence: f64,
    pub optimal_hours: Vec<u32>,
    pub reasoning: String,
}

impl SchedulePrediction {
    pub fn fallback() -> Self {
        Self {
            recommended_method: StudyMethod::default(),
            confidence: 0.5,
            optimal_hours: DEFAULT_OPTIMAL_HOURS.to_vec(),
            reasoning: "Starting with the Pomodoro technique is recommended for new users. \
                        25-minute sessions help build focus gradually."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedScheduling {
    classifier: RandomForestClassifier,
    scaler: StandardScaler,
    encoder: LabelEncoder,
}

/// Random-forest model choosing a study method for a time slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulingModel {
    fitted: Option<FittedScheduling>,
}

impl TrainableModel for SchedulingModel {
    const MODEL_TYPE: ModelType = ModelType::Scheduling;

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn train(&mut self, records: &[StudySessionRecord]) -> Result<MetricsReport> {
        info!(samples = records.len(), "training scheduling model");
        if records.len() < 2 {
            return Err(EngineError::Training(
                "scheduling model needs at least two sessions".into(),
            ));
        }

        let encoder = features::method_encoder();
        let x = features::scheduling_features(records);
        let y = features::scheduling_labels(records, &encoder);

        let (train_idx, test_idx) = estimator::train_test_split(x.len(), 0.2, RANDOM_SEED);
        let x_train = estimator::take_rows(&x, &train_idx);
        let x_test = estimator::take_rows(&x, &test_idx);
        let y_train = estimator::take_rows(&y, &train_idx);
        let y_test = estimator::take_rows(&y, &test_idx);

        let scaler = StandardScaler::fit(&x_train)?;
        let x_train = scaler.transform(&x_train);
        let x_test = scaler.transform(&x_test);

        let mut classifier = RandomForestClassifier::new(encoder.len());
        classifier.fit(&x_train, &y_train)?;

        let predicted = classifier.predict(&x_test);
        let scores = evaluation::weighted_scores(&y_test, &predicted);
        let metrics = MetricsReport {
            accuracy: evaluation::accuracy(&y_test, &predicted),
            precision: scores.precision,
            recall: scores.recall,
            f1_score: scores.f1,
            sample_count: records.len(),
            trained_at: Utc::now(),
        };
        info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            "scheduling model trained"
        );

        self.fitted = Some(FittedScheduling {
            classifier,
            scaler,
            encoder,
        });
        Ok(metrics)
    }
}

impl SchedulingModel {
    /// Recommends a method for the given (or current) hour and weekday.
    /// Untrained models and users without history get the fallback.
    pub fn predict(
        &self,
        sessions: &[StudySessionRecord],
        hour: Option<u32>,
        weekday: Option<u32>,
    ) -> SchedulePrediction {
        let Some(fitted) = self.fitted.as_ref() else {
            warn!("scheduling model untrained, using fallback");
            return SchedulePrediction::fallback();
        };
        if fitted.encoder != features::method_encoder() {
            warn!(
                classes = fitted.encoder.len(),
                "scheduling artifact was fitted on another method set, using fallback"
            );
            return SchedulePrediction::fallback();
        }
        if sessions.is_empty() {
            return SchedulePrediction::fallback();
        }

        let now = Local::now();
        let hour = hour.unwrap_or_else(|| now.hour()).min(23);
        let weekday = weekday
            .unwrap_or_else(|| now.weekday().num_days_from_monday())
            .min(6);

        let completion_rate = completion_rate(sessions.iter());

        let candidates: Vec<(StudyMethod, f64)> = StudyMethod::ALL
            .into_iter()
            .map(|method| {
                let row = features::scheduling_row(
                    hour,
                    weekday,
                    method,
                    QUERY_DURATION,
                    QUERY_TAB_SWITCHES,
                    completion_rate,
                );
                let scaled = fitted.scaler.transform_row(&row);
                let confidence = fitted
                    .classifier
                    .predict_proba(&[scaled])
                    .first()
                    .and_then(|probabilities| probabilities.iter().copied().reduce(f64::max))
                    .unwrap_or(0.0);
                (method, confidence)
            })
            .collect();
        let (method, confidence) =
            best_method(&candidates).unwrap_or((StudyMethod::default(), 0.5));

        let optimal_hours = find_optimal_hours(sessions);
        let success_rate = method_success_rate(sessions, method);
        let reasoning = build_reasoning(method, confidence, success_rate, hour, &optimal_hours);

        SchedulePrediction {
            recommended_method: method,
            confidence,
            optimal_hours,
            reasoning,
        }
    }
}

/// Highest-confidence candidate. Ties keep the earliest candidate.
fn best_method(candidates: &[(StudyMethod, f64)]) -> Option<(StudyMethod, f64)> {
    let mut best: Option<(StudyMethod, f64)> = None;
    for &(method, confidence) in candidates {
        if best.map_or(true, |(_, current)| confidence > current) {
            best = Some((method, confidence));
        }
    }
    best
}

fn completion_rate<'a>(sessions: impl ExactSizeIterator<Item = &'a StudySessionRecord>) -> f64 {
    let total = sessions.len();
    if total == 0 {
        return 0.5;
    }
    let completed = sessions.filter(|session| session.completed).count();
    completed as f64 / total as f64
}

/// Completion rate over the sessions that used `method`, 0.5 when unused.
pub fn method_success_rate(sessions: &[StudySessionRecord], method: StudyMethod) -> f64 {
    let used: Vec<&StudySessionRecord> = sessions
        .iter()
        .filter(|session| session.method == method.as_str())
        .collect();
    completion_rate(used.into_iter())
}

/// Up to six hours with the best completion rate among hours that have at
/// least three sessions, in ascending order.
pub fn find_optimal_hours(sessions: &[StudySessionRecord]) -> Vec<u32> {
    let mut hour_stats: Vec<(u32, usize, usize)> = Vec::new();
    for session in sessions {
        let hour = session.hour();
        let position = match hour_stats.iter().position(|(h, _, _)| *h == hour) {
            Some(position) => position,
            None => {
                hour_stats.push((hour, 0, 0));
                hour_stats.len() - 1
            }
        };
        hour_stats[position].1 += 1;
        if session.completed {
            hour_stats[position].2 += 1;
        }
    }

    let mut rates: Vec<(u32, f64)> = hour_stats
        .into_iter()
        .filter(|(_, total, _)| *total >= MIN_SESSIONS_PER_HOUR)
        .map(|(hour, total, completed)| (hour, completed as f64 / total as f64))
        .collect();

    if rates.is_empty() {
        return DEFAULT_OPTIMAL_HOURS.to_vec();
    }

    rates.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut optimal: Vec<u32> = rates
        .into_iter()
        .take(MAX_OPTIMAL_HOURS)
        .map(|(hour, _)| hour)
        .collect();
    optimal.sort_unstable();
    optimal
}

fn build_reasoning(
    method: StudyMethod,
    confidence: f64,
    success_rate: f64,
    hour: u32,
    optimal_hours: &[u32],
) -> String {
    let mut reasoning = format!(
        "Based on your study patterns, {} ({}) is recommended with {:.0}% confidence. ",
        method.as_str().to_uppercase(),
        method.description(),
        confidence * 100.0
    );

    if optimal_hours.contains(&hour) {
        reasoning.push_str(&format!(
            "Current time ({hour}:00) is one of your optimal study hours. "
        ));
    } else {
        let suggested = &optimal_hours[..optimal_hours.len().min(3)];
        reasoning.push_str(&format!(
            "Consider studying during hours {suggested:?} for better results. "
        ));
    }

    reasoning.push_str(&format!(
        "Your historical success rate with this method is {:.0}%.",
        success_rate * 100.0
    ));
    reasoning
}
