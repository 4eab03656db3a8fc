use std::collections::HashSet;

use serde::Serialize;

use crate::features::InteractionTables;
use crate::models::{Course, LearnerProfile};

pub const COMPLETION_WEIGHT: f64 = 0.30;
pub const DIFFICULTY_WEIGHT: f64 = 0.20;
pub const INTEREST_WEIGHT: f64 = 0.30;
pub const COLLABORATIVE_WEIGHT: f64 = 0.20;

const UNMAPPED_LEVEL_MATCH: f64 = 0.5;
const NEUTRAL_COLLABORATIVE: f64 = 0.5;

/// How well a course difficulty suits a learner's skill level.
pub fn level_match(skill_level: &str, difficulty: &str) -> f64 {
    match (skill_level, difficulty) {
        ("beginner", "beginner") => 1.0,
        ("beginner", "intermediate") => 0.7,
        ("beginner", "advanced") => 0.3,
        ("intermediate", "beginner") => 0.6,
        ("intermediate", "intermediate") => 1.0,
        ("intermediate", "advanced") => 0.8,
        ("advanced", "beginner") => 0.3,
        ("advanced", "intermediate") => 0.7,
        ("advanced", "advanced") => 1.0,
        _ => UNMAPPED_LEVEL_MATCH,
    }
}

/// Weighted contributions of the four signals. Each term is capped at its
/// weight; `total` is capped at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub completion: f64,
    pub difficulty: f64,
    pub interest: f64,
    pub collaborative: f64,
    pub total: f64,
}

fn weighted(signal: f64, weight: f64) -> f64 {
    if signal.is_nan() {
        return 0.0;
    }
    (signal * weight).clamp(0.0, weight)
}

pub struct CourseScorer<'a> {
    tables: &'a InteractionTables,
}

impl<'a> CourseScorer<'a> {
    pub fn new(tables: &'a InteractionTables) -> Self {
        Self { tables }
    }

    pub fn score(&self, learner: &LearnerProfile, course: &Course) -> ScoreBreakdown {
        let completion_rate = self
            .tables
            .course_tallies
            .get(&course.id)
            .map(|tally| tally.completion_rate())
            .unwrap_or(0.0);

        let level_fit = match (
            learner.preferences.skill_level.as_deref(),
            course.difficulty.as_deref(),
        ) {
            (Some(skill_level), Some(difficulty)) => level_match(skill_level, difficulty),
            _ => UNMAPPED_LEVEL_MATCH,
        };

        let interest_match = course.category.as_deref().is_some_and(|category| {
            learner
                .preferences
                .interests
                .iter()
                .any(|interest| interest.to_lowercase() == category.to_lowercase())
        });

        let completion = weighted(completion_rate, COMPLETION_WEIGHT);
        let difficulty = weighted(level_fit, DIFFICULTY_WEIGHT);
        let interest = if interest_match { INTEREST_WEIGHT } else { 0.0 };
        let collaborative = weighted(
            self.collaborative_signal(&learner.id, &course.id),
            COLLABORATIVE_WEIGHT,
        );

        ScoreBreakdown {
            completion,
            difficulty,
            interest,
            collaborative,
            total: (completion + difficulty + interest + collaborative).min(1.0),
        }
    }

    /// Mean Jaccard-weighted interaction score for `course_id` among users
    /// who share at least one course with `user_id`. Unknown users and
    /// users without overlap get a neutral 0.5.
    pub fn collaborative_signal(&self, user_id: &str, course_id: &str) -> f64 {
        let Some(own) = self.tables.user_courses.get(user_id) else {
            return NEUTRAL_COLLABORATIVE;
        };
        let own_courses: HashSet<&str> = own.keys().map(String::as_str).collect();

        let weighted_scores: Vec<f64> = self
            .tables
            .user_courses
            .iter()
            .filter(|(other_id, _)| other_id.as_str() != user_id)
            .filter_map(|(_, other)| {
                let interaction = *other.get(course_id)?;
                let other_courses: HashSet<&str> = other.keys().map(String::as_str).collect();
                let overlap = own_courses.intersection(&other_courses).count();
                if overlap == 0 {
                    return None;
                }
                let union = own_courses.union(&other_courses).count();
                Some(interaction * overlap as f64 / union as f64)
            })
            .collect();

        if weighted_scores.is_empty() {
            return NEUTRAL_COLLABORATIVE;
        }
        weighted_scores.iter().sum::<f64>() / weighted_scores.len() as f64
    }
}
