use crate::models::{Metrics, Participation, RiskAssessment, RiskTier};

/// Scores a metrics snapshot. Total over finite input; out-of-range values fall
/// into the nearest end band.
pub fn score(metrics: &Metrics) -> RiskAssessment {
    let score = grade_penalty(metrics.average_grade)
        + attendance_penalty(metrics.attendance_percentage)
        + study_hours_penalty(metrics.weekly_study_hours)
        + submission_penalty(metrics.assignment_submission_percentage)
        + exam_penalty(metrics.exam_average);

    RiskAssessment {
        tier: RiskTier::from_score(score),
        score,
        factors: key_factors(metrics),
    }
}

pub fn grade_penalty(average_grade: f64) -> u8 {
    match average_grade {
        g if g < 5.0 => 30,
        g if g < 7.0 => 15,
        g if g < 8.0 => 5,
        _ => 0,
    }
}

pub fn attendance_penalty(attendance: f64) -> u8 {
    match attendance {
        a if a < 70.0 => 25,
        a if a < 80.0 => 15,
        a if a < 90.0 => 5,
        _ => 0,
    }
}

pub fn study_hours_penalty(hours: f64) -> u8 {
    match hours {
        h if h < 5.0 => 20,
        h if h < 10.0 => 10,
        h if h < 15.0 => 5,
        _ => 0,
    }
}

pub fn submission_penalty(submissions: f64) -> u8 {
    match submissions {
        s if s < 60.0 => 15,
        s if s < 80.0 => 10,
        s if s < 90.0 => 5,
        _ => 0,
    }
}

pub fn exam_penalty(exam_average: f64) -> u8 {
    match exam_average {
        e if e < 5.0 => 10,
        e if e < 7.0 => 5,
        _ => 0,
    }
}

// Concern thresholds are softer than the penalty bands and independent of the score.
fn key_factors(metrics: &Metrics) -> Vec<String> {
    let mut factors = Vec::new();

    if metrics.average_grade < 6.0 {
        factors.push(format!(
            "Low average grade ({:.1}/10)",
            metrics.average_grade
        ));
    }
    match metrics.attendance_percentage {
        a if a < 70.0 => factors.push(format!("Very low attendance ({a}%)")),
        a if a < 80.0 => factors.push(format!("Irregular attendance ({a}%)")),
        _ => {}
    }
    if metrics.weekly_study_hours < 10.0 {
        factors.push(format!(
            "Few weekly study hours ({}h)",
            metrics.weekly_study_hours
        ));
    }
    if metrics.assignment_submission_percentage < 80.0 {
        factors.push(format!(
            "Low assignment submission rate ({}%)",
            metrics.assignment_submission_percentage
        ));
    }
    if metrics.class_participation == Participation::Low {
        factors.push("Insufficient class participation (low)".to_string());
    }

    if factors.is_empty() {
        factors.push("Good overall academic performance".to_string());
        factors.push(format!("Average grade: {:.1}/10", metrics.average_grade));
        factors.push(format!("Attendance: {}%", metrics.attendance_percentage));
    }

    factors
}

/// Advisory actions for a snapshot; never empty.
pub fn recommendations(metrics: &Metrics) -> Vec<String> {
    let mut items = Vec::new();

    if metrics.average_grade < 7.0 {
        items.push("Schedule personalised tutoring sessions".to_string());
        items.push("Work additional exercises in weaker subjects".to_string());
    }
    if metrics.weekly_study_hours < 10.0 {
        items.push(format!(
            "Increase weekly study time to 15h (currently {}h)",
            metrics.weekly_study_hours
        ));
    }
    if metrics.attendance_percentage < 85.0 {
        items.push("Improve class attendance (target: 90%)".to_string());
    }
    if metrics.class_participation != Participation::High {
        items.push("Participate more actively in class discussions".to_string());
    }
    if metrics.assignment_submission_percentage < 90.0 {
        items.push("Plan a submission calendar and meet deadlines".to_string());
    }

    if items.is_empty() {
        items.push("Keep up the excellent work".to_string());
        items.push("Consider advanced or enrichment coursework".to_string());
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong() -> Metrics {
        Metrics {
            average_grade: 8.0,
            attendance_percentage: 95.0,
            weekly_study_hours: 20.0,
            class_participation: Participation::High,
            assignment_submission_percentage: 95.0,
            exam_average: 8.0,
        }
    }

    fn weakest() -> Metrics {
        Metrics {
            average_grade: 0.0,
            attendance_percentage: 0.0,
            weekly_study_hours: 0.0,
            class_participation: Participation::Low,
            assignment_submission_percentage: 0.0,
            exam_average: 0.0,
        }
    }

    #[test]
    fn strong_student_scores_zero_with_positive_summary() {
        let result = score(&strong());
        assert_eq!(result.score, 0);
        assert_eq!(result.tier, RiskTier::Low);
        assert_eq!(
            result.factors,
            vec![
                "Good overall academic performance".to_string(),
                "Average grade: 8.0/10".to_string(),
                "Attendance: 95%".to_string(),
            ]
        );
    }

    #[test]
    fn worst_case_hits_every_band_and_concern() {
        let result = score(&weakest());
        assert_eq!(result.score, 100);
        assert_eq!(result.tier, RiskTier::High);
        assert_eq!(result.factors.len(), 5);
        assert!(result.factors[0].contains("grade"));
        assert!(result.factors[0].contains("0.0/10"));
        assert!(result.factors[1].contains("attendance"));
        assert!(result.factors[1].contains("(0%)"));
        assert!(result.factors[2].contains("study hours"));
        assert!(result.factors[2].contains("(0h)"));
        assert!(result.factors[3].contains("submission"));
        assert!(result.factors[3].contains("(0%)"));
        assert!(result.factors[4].contains("participation"));
        assert!(result.factors[4].contains("(low)"));
    }

    #[test]
    fn attendance_concern_wording_follows_severity() {
        let very_low = score(&Metrics {
            attendance_percentage: 65.0,
            ..strong()
        });
        assert_eq!(very_low.factors, vec!["Very low attendance (65%)".to_string()]);

        let irregular = score(&Metrics {
            attendance_percentage: 75.0,
            ..strong()
        });
        assert_eq!(irregular.factors, vec!["Irregular attendance (75%)".to_string()]);

        let edge = score(&Metrics {
            attendance_percentage: 70.0,
            ..strong()
        });
        assert_eq!(edge.factors, vec!["Irregular attendance (70%)".to_string()]);
    }

    #[test]
    fn single_grade_concern_is_reported_with_its_value() {
        let metrics = Metrics {
            average_grade: 5.5,
            ..strong()
        };
        let result = score(&metrics);
        assert_eq!(result.score, 15);
        assert_eq!(result.tier, RiskTier::Low);
        assert_eq!(result.factors, vec!["Low average grade (5.5/10)".to_string()]);
    }

    #[test]
    fn tier_thresholds_are_inclusive_at_lower_edge() {
        assert_eq!(RiskTier::from_score(0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(29), RiskTier::Low);
        assert_eq!(RiskTier::from_score(30), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(59), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(60), RiskTier::High);
        assert_eq!(RiskTier::from_score(100), RiskTier::High);
    }

    #[test]
    fn reachable_tier_edges_from_metrics() {
        let thirty = Metrics {
            average_grade: 4.0,
            exam_average: 7.0,
            ..strong()
        };
        let result = score(&thirty);
        assert_eq!(result.score, 30);
        assert_eq!(result.tier, RiskTier::Medium);

        let sixty = Metrics {
            average_grade: 4.0,
            attendance_percentage: 50.0,
            weekly_study_hours: 12.0,
            exam_average: 7.0,
            ..strong()
        };
        let result = score(&sixty);
        assert_eq!(result.score, 60);
        assert_eq!(result.tier, RiskTier::High);

        let fifty_five = Metrics {
            weekly_study_hours: 20.0,
            ..sixty
        };
        assert_eq!(score(&fifty_five).score, 55);
        assert_eq!(score(&fifty_five).tier, RiskTier::Medium);
    }

    #[test]
    fn band_edges_match_table() {
        assert_eq!(grade_penalty(4.99), 30);
        assert_eq!(grade_penalty(5.0), 15);
        assert_eq!(grade_penalty(6.9), 15);
        assert_eq!(grade_penalty(7.0), 5);
        assert_eq!(grade_penalty(8.0), 0);
        assert_eq!(attendance_penalty(69.9), 25);
        assert_eq!(attendance_penalty(70.0), 15);
        assert_eq!(attendance_penalty(80.0), 5);
        assert_eq!(attendance_penalty(90.0), 0);
        assert_eq!(study_hours_penalty(4.5), 20);
        assert_eq!(study_hours_penalty(5.0), 10);
        assert_eq!(study_hours_penalty(10.0), 5);
        assert_eq!(study_hours_penalty(15.0), 0);
        assert_eq!(submission_penalty(59.0), 15);
        assert_eq!(submission_penalty(60.0), 10);
        assert_eq!(submission_penalty(80.0), 5);
        assert_eq!(submission_penalty(90.0), 0);
        assert_eq!(exam_penalty(4.9), 10);
        assert_eq!(exam_penalty(5.0), 5);
        assert_eq!(exam_penalty(7.0), 0);
    }

    #[test]
    fn out_of_range_values_fall_into_end_bands() {
        let metrics = Metrics {
            average_grade: -3.0,
            attendance_percentage: 140.0,
            ..strong()
        };
        let result = score(&metrics);
        assert_eq!(result.score, 30);
    }

    #[test]
    fn scoring_is_deterministic() {
        let metrics = Metrics {
            average_grade: 6.2,
            attendance_percentage: 77.0,
            weekly_study_hours: 8.0,
            class_participation: Participation::Medium,
            assignment_submission_percentage: 70.0,
            exam_average: 5.5,
        };
        assert_eq!(score(&metrics), score(&metrics));
    }

    #[test]
    fn worsening_any_metric_never_lowers_score() {
        let steps: Vec<f64> = (0..=20).map(|i| f64::from(i) * 5.0).collect();
        let base = strong();

        let variants: [fn(Metrics, f64) -> Metrics; 4] = [
            |m, v| Metrics { average_grade: v / 10.0, ..m },
            |m, v| Metrics { attendance_percentage: v, ..m },
            |m, v| Metrics { weekly_study_hours: v / 4.0, ..m },
            |m, v| Metrics { assignment_submission_percentage: v, ..m },
        ];

        for build in variants {
            let mut previous = 0u8;
            for value in steps.iter().rev() {
                let current = score(&build(base, *value)).score;
                assert!(current >= previous, "score dropped at {value}");
                previous = current;
            }
        }
    }

    #[test]
    fn recommendations_fall_back_to_encouragement() {
        let items = recommendations(&strong());
        assert_eq!(items.len(), 2);
        assert!(items[0].contains("excellent"));

        let items = recommendations(&weakest());
        assert!(items.iter().any(|item| item.contains("currently 0h")));
        assert!(items.iter().any(|item| item.contains("tutoring")));
    }
}
