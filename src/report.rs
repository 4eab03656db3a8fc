use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::behavior::BehaviorSummary;
use crate::performance::PerformancePrediction;
use crate::scheduling::SchedulePrediction;

pub struct MethodShare {
    pub method: String,
    pub count: usize,
    pub share: f64,
}

pub fn method_mix(summary: &BehaviorSummary) -> Vec<MethodShare> {
    let total = summary.total_sessions.max(1) as f64;
    let mut shares: Vec<MethodShare> = summary
        .method_distribution
        .iter()
        .map(|(method, count)| MethodShare {
            method: method.clone(),
            count: *count,
            share: *count as f64 / total,
        })
        .collect();

    shares.sort_by(|a, b| b.count.cmp(&a.count));
    shares
}

pub fn build_report(
    user_id: &str,
    generated_at: DateTime<Utc>,
    summary: Option<&BehaviorSummary>,
    schedule: &SchedulePrediction,
    performance: &PerformancePrediction,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Study Forecast Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        user_id,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Study Habits");

    match summary {
        None => {
            let _ = writeln!(output, "No study data available.");
        }
        Some(summary) => {
            let _ = writeln!(
                output,
                "- {} sessions, {} completed ({:.0}%)",
                summary.total_sessions,
                summary.completed_sessions,
                summary.completion_rate * 100.0
            );
            let _ = writeln!(
                output,
                "- {:.0} minutes studied, {:.1} minutes per session",
                summary.total_study_time_minutes, summary.avg_session_minutes
            );
            let _ = writeln!(
                output,
                "- Focus score {:.0} ({:.1} tab switches per session)",
                summary.focus_score, summary.avg_tab_switches
            );
            if !summary.peak_study_hours.is_empty() {
                let hours: Vec<String> = summary
                    .peak_study_hours
                    .iter()
                    .map(|hour| format!("{hour}:00"))
                    .collect();
                let _ = writeln!(output, "- Peak hours: {}", hours.join(", "));
            }

            let _ = writeln!(output);
            let _ = writeln!(output, "## Method Mix");
            for share in method_mix(summary) {
                let _ = writeln!(
                    output,
                    "- {}: {} sessions ({:.0}%)",
                    share.method,
                    share.count,
                    share.share * 100.0
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommended Schedule");
    let _ = writeln!(
        output,
        "- Method: {} (confidence {:.2})",
        schedule.recommended_method, schedule.confidence
    );
    let hours: Vec<String> = schedule
        .optimal_hours
        .iter()
        .map(|hour| format!("{hour}:00"))
        .collect();
    let _ = writeln!(output, "- Best hours: {}", hours.join(", "));
    let _ = writeln!(output, "- {}", schedule.reasoning);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance Outlook");
    let _ = writeln!(
        output,
        "- Predicted completion rate {:.0}%, quiz score {:.1}",
        performance.predicted_completion_rate * 100.0,
        performance.predicted_quiz_score
    );
    let _ = writeln!(output, "- Risk level: {}", performance.risk_level.as_str());
    for recommendation in performance.recommendations.iter() {
        let _ = writeln!(output, "- {}", recommendation);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior;
    use crate::models::StudySessionRecord;
    use chrono::TimeZone;

    fn generated() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap()
    }

    #[test]
    fn report_without_history_still_has_predictions() {
        let report = build_report(
            "u1",
            generated(),
            None,
            &SchedulePrediction::fallback(),
            &PerformancePrediction::fallback(),
        );
        assert!(report.starts_with("# Study Forecast Report"));
        assert!(report.contains("Generated for u1 on 2026-03-02 08:30 UTC"));
        assert!(report.contains("No study data available."));
        assert!(report.contains("- Method: pomodoro (confidence 0.50)"));
        assert!(report.contains("- Best hours: 9:00, 10:00, 11:00, 14:00, 15:00, 16:00"));
        assert!(report.contains("- Risk level: medium"));
        assert!(!report.contains("## Method Mix"));
    }

    #[test]
    fn method_mix_orders_by_count() {
        let sessions: Vec<StudySessionRecord> = ["blitz", "flowtime", "flowtime", "flowtime"]
            .iter()
            .map(|method| StudySessionRecord {
                method: method.to_string(),
                started_at: Some("2026-03-02T10:00:00".to_string()),
                ..StudySessionRecord::default()
            })
            .collect();
        let summary = behavior::analyze("u1", &sessions).unwrap();

        let mix = method_mix(&summary);
        assert_eq!(mix[0].method, "flowtime");
        assert_eq!(mix[0].share, 0.75);

        let report = build_report(
            "u1",
            generated(),
            Some(&summary),
            &SchedulePrediction::fallback(),
            &PerformancePrediction::fallback(),
        );
        assert!(report.contains("- flowtime: 3 sessions (75%)"));
        assert!(report.contains("- Peak hours: 10:00"));
    }
}
