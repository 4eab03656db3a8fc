use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::StudySessionRecord;

const PEAK_HOURS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorSummary {
    pub user_id: String,
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub completion_rate: f64,
    pub total_study_time_minutes: f64,
    pub avg_session_minutes: f64,
    pub avg_tab_switches: f64,
    pub method_distribution: BTreeMap<String, usize>,
    pub preferred_method: String,
    pub peak_study_hours: Vec<u32>,
    pub focus_score: f64,
}

/// Summarizes a learner's raw history. `None` when there is no history.
pub fn analyze(user_id: &str, sessions: &[StudySessionRecord]) -> Option<BehaviorSummary> {
    if sessions.is_empty() {
        return None;
    }
    let total = sessions.len() as f64;
    let completed_sessions = sessions.iter().filter(|session| session.completed).count();
    let total_duration: f64 = sessions.iter().map(|session| session.duration_seconds).sum();
    let avg_tab_switches = sessions
        .iter()
        .map(|session| f64::from(session.tab_switch_count))
        .sum::<f64>()
        / total;

    // First-seen order breaks ties for both rankings.
    let mut methods: Vec<(&str, usize)> = Vec::new();
    let mut hours: Vec<(u32, usize)> = Vec::new();
    for session in sessions {
        let method = if session.method.is_empty() {
            "unknown"
        } else {
            session.method.as_str()
        };
        match methods.iter_mut().find(|(name, _)| *name == method) {
            Some((_, count)) => *count += 1,
            None => methods.push((method, 1)),
        }

        if let Some(hour) = session.parsed_hour() {
            match hours.iter_mut().find(|(h, _)| *h == hour) {
                Some((_, count)) => *count += 1,
                None => hours.push((hour, 1)),
            }
        }
    }

    let preferred_method = methods
        .iter()
        .fold(None::<(&str, usize)>, |best, &(name, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((name, count)),
        })
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "none".to_string());

    hours.sort_by(|a, b| b.1.cmp(&a.1));
    let peak_study_hours = hours.iter().take(PEAK_HOURS).map(|(hour, _)| *hour).collect();

    Some(BehaviorSummary {
        user_id: user_id.to_string(),
        total_sessions: sessions.len(),
        completed_sessions,
        completion_rate: completed_sessions as f64 / total,
        total_study_time_minutes: total_duration / 60.0,
        avg_session_minutes: total_duration / total / 60.0,
        avg_tab_switches,
        method_distribution: methods
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect(),
        preferred_method,
        peak_study_hours,
        focus_score: (100.0 - avg_tab_switches * 10.0).max(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(method: &str, hour: u32, completed: bool, tabs: u32) -> StudySessionRecord {
        StudySessionRecord {
            user_id: Some("u1".to_string()),
            method: method.to_string(),
            duration_seconds: 1800.0,
            tab_switch_count: tabs,
            completed,
            started_at: Some(format!("2026-03-02T{hour:02}:15:00")),
            ..StudySessionRecord::default()
        }
    }

    #[test]
    fn empty_history_has_no_summary() {
        assert!(analyze("u1", &[]).is_none());
    }

    #[test]
    fn summary_aggregates_history() {
        let sessions = vec![
            session("blitz", 9, true, 1),
            session("flowtime", 14, false, 5),
            session("flowtime", 14, true, 0),
            session("blitz", 20, true, 2),
        ];
        let summary = analyze("u1", &sessions).unwrap();

        assert_eq!(summary.total_sessions, 4);
        assert_eq!(summary.completed_sessions, 3);
        assert_eq!(summary.completion_rate, 0.75);
        assert_eq!(summary.total_study_time_minutes, 120.0);
        assert_eq!(summary.avg_session_minutes, 30.0);
        assert_eq!(summary.avg_tab_switches, 2.0);
        assert_eq!(summary.focus_score, 80.0);
        // blitz and flowtime tie at two; blitz was seen first
        assert_eq!(summary.preferred_method, "blitz");
        assert_eq!(summary.method_distribution.get("flowtime"), Some(&2));
        assert_eq!(summary.peak_study_hours, vec![14, 9, 20]);
    }

    #[test]
    fn distracted_learners_bottom_out_at_zero_focus() {
        let summary = analyze("u1", &[session("blitz", 9, false, 15)]).unwrap();
        assert_eq!(summary.focus_score, 0.0);
    }

    #[test]
    fn unparseable_timestamps_are_left_out_of_peak_hours() {
        let mut undated = session("pomodoro", 9, true, 0);
        undated.started_at = Some("yesterday".to_string());
        let summary = analyze("u1", &[undated, session("pomodoro", 7, true, 0)]).unwrap();
        assert_eq!(summary.peak_study_hours, vec![7]);
    }
}
