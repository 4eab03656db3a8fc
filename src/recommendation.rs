use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::TrainableModel;
use crate::error::Result;
use crate::features::InteractionTables;
use crate::models::{Course, LearnerProfile, MetricsReport, ModelType, StudySessionRecord};
use crate::scoring::{CourseScorer, ScoreBreakdown};

const WELL_TRAVELLED_INTERACTIONS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecommendation {
    pub course_id: String,
    pub score: f64,
    pub reason: String,
}

/// Interaction-table recommender; the tables are the whole trained state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationModel {
    fitted: Option<InteractionTables>,
}

impl TrainableModel for RecommendationModel {
    const MODEL_TYPE: ModelType = ModelType::Recommendation;

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn train(&mut self, records: &[StudySessionRecord]) -> Result<MetricsReport> {
        info!(samples = records.len(), "training recommendation model");
        let tables = InteractionTables::build(records);

        let rates: Vec<f64> = tables
            .course_tallies
            .values()
            .filter(|tally| tally.total > 0)
            .map(|tally| tally.completion_rate())
            .collect();
        let average_completion = if rates.is_empty() {
            0.5
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };

        let metrics = MetricsReport {
            accuracy: average_completion,
            precision: average_completion,
            recall: tables.course_tallies.len() as f64 / records.len().max(1) as f64,
            f1_score: 2.0 * average_completion * average_completion
                / (average_completion + average_completion + 0.001),
            sample_count: records.len(),
            trained_at: Utc::now(),
        };
        info!(
            users = tables.user_courses.len(),
            courses = tables.course_tallies.len(),
            "recommendation model trained"
        );

        self.fitted = Some(tables);
        Ok(metrics)
    }
}

impl RecommendationModel {
    /// Ranks candidate courses the learner has not enrolled in or completed.
    /// An untrained model scores with empty interaction tables.
    pub fn recommend(
        &self,
        learner: &LearnerProfile,
        courses: &[Course],
        limit: usize,
    ) -> Vec<CourseRecommendation> {
        let empty = InteractionTables::default();
        let tables = self.fitted.as_ref().unwrap_or(&empty);
        let scorer = CourseScorer::new(tables);

        let excluded: HashSet<&str> = learner
            .completed_courses
            .iter()
            .chain(&learner.enrolled_courses)
            .map(String::as_str)
            .collect();

        let mut ranked: Vec<CourseRecommendation> = courses
            .iter()
            .filter(|course| !excluded.contains(course.id.as_str()))
            .map(|course| {
                let breakdown = scorer.score(learner, course);
                CourseRecommendation {
                    course_id: course.id.clone(),
                    score: breakdown.total,
                    reason: reason_for(tables, course, &breakdown),
                }
            })
            .collect();

        // Stable: equal scores keep candidate order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);
        ranked
    }
}

fn reason_for(tables: &InteractionTables, course: &Course, breakdown: &ScoreBreakdown) -> String {
    let mut reasons = vec![if breakdown.total > 0.8 {
        "Highly recommended based on your learning patterns".to_string()
    } else if breakdown.total > 0.6 {
        "Good match for your skill level and interests".to_string()
    } else {
        "Explore new topics outside your usual areas".to_string()
    }];

    if let Some(tally) = tables.course_tallies.get(&course.id) {
        if tally.total > WELL_TRAVELLED_INTERACTIONS {
            reasons.push(format!("{:.0}% completion rate", tally.completion_rate() * 100.0));
        }
    }

    reasons.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LearnerPreferences;

    fn record(user: &str, course: &str, completed: bool) -> StudySessionRecord {
        StudySessionRecord {
            user_id: Some(user.to_string()),
            course_id: Some(course.to_string()),
            completed,
            ..StudySessionRecord::default()
        }
    }

    fn course(id: &str, category: &str) -> Course {
        Course {
            id: id.to_string(),
            title: format!("Course {id}"),
            description: None,
            category: Some(category.to_string()),
            difficulty: Some("beginner".to_string()),
        }
    }

    #[test]
    fn training_reports_coverage_metrics() {
        let records = vec![
            record("u1", "c1", true),
            record("u2", "c1", false),
            record("u1", "c2", true),
            record("u3", "c2", true),
        ];
        let mut model = RecommendationModel::default();
        let metrics = model.train(&records).unwrap();
        assert!(model.is_trained());
        // c1: 0.5, c2: 1.0
        assert!((metrics.accuracy - 0.75).abs() < 1e-9);
        assert_eq!(metrics.recall, 0.5);
        assert!((metrics.f1_score - 2.0 * 0.5625 / 1.501).abs() < 1e-9);
    }

    #[test]
    fn enrolled_and_completed_courses_are_excluded() {
        let model = RecommendationModel::default();
        let learner = LearnerProfile {
            id: "u1".to_string(),
            completed_courses: vec!["c1".to_string()],
            enrolled_courses: vec!["c2".to_string()],
            ..LearnerProfile::default()
        };
        let ranked = model.recommend(
            &learner,
            &[course("c1", "math"), course("c2", "math"), course("c3", "math")],
            5,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.course_id.as_str()).collect();
        assert_eq!(ids, vec!["c3"]);
    }

    #[test]
    fn ranking_is_descending_stable_and_truncated() {
        let model = RecommendationModel::default();
        let learner = LearnerProfile {
            id: "u1".to_string(),
            preferences: LearnerPreferences {
                skill_level: None,
                interests: vec!["music".to_string()],
            },
            ..LearnerProfile::default()
        };
        let ranked = model.recommend(
            &learner,
            &[
                course("a", "art"),
                course("b", "music"),
                course("c", "art"),
                course("d", "art"),
            ],
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.course_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(ranked.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn popular_courses_mention_their_completion_rate() {
        let mut records: Vec<StudySessionRecord> =
            (0..12).map(|i| record(&format!("u{i}"), "c1", i % 4 != 0)).collect();
        records.push(record("target", "c0", true));
        let mut model = RecommendationModel::default();
        model.train(&records).unwrap();

        let ranked = model.recommend(&LearnerProfile::new_user("target"), &[course("c1", "x")], 1);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].reason.ends_with("75% completion rate"));
        assert!(ranked[0].reason.starts_with("Explore new topics"));
    }

    #[test]
    fn overlapping_learners_boost_a_shared_course() {
        let records = vec![
            record("u1", "c0", true),
            record("u1", "c1", true),
            record("u2", "c0", true),
            record("u2", "c1", true),
            record("u2", "c2", true),
        ];
        let mut model = RecommendationModel::default();
        model.train(&records).unwrap();

        let learner = LearnerProfile {
            id: "u1".to_string(),
            completed_courses: vec!["c0".to_string(), "c1".to_string()],
            ..LearnerProfile::default()
        };
        let ranked = model.recommend(&learner, &[course("c2", "x")], 5);
        // completion 0.3 + difficulty 0.2 + collaborative 0.2 * 2/3
        let expected = 0.3 + 0.2 + 0.2 * 2.0 / 3.0;
        assert!((ranked[0].score - expected).abs() < 1e-9);
    }
}
