use std::fmt::Write;

use chrono::SecondsFormat;

use crate::models::{PredictionRecord, PredictionSummary, RiskTier, Student};

#[derive(Debug, Clone, PartialEq)]
pub struct TierCount {
    pub tier: RiskTier,
    pub count: usize,
    pub avg_score: f64,
}

/// Latest prediction per student, tallied by tier, highest tier first.
pub fn summarize_by_tier(predictions: &[PredictionSummary]) -> Vec<TierCount> {
    let latest = latest_per_student(predictions);
    let mut map: std::collections::BTreeMap<RiskTier, (usize, u32)> =
        std::collections::BTreeMap::new();

    for prediction in latest.iter() {
        let entry = map.entry(prediction.risk_tier).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u32::from(prediction.score);
    }

    map.into_iter()
        .rev()
        .map(|(tier, (count, total_score))| TierCount {
            tier,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                f64::from(total_score) / count as f64
            },
        })
        .collect()
}

fn latest_per_student(predictions: &[PredictionSummary]) -> Vec<&PredictionSummary> {
    let mut latest: std::collections::HashMap<&str, &PredictionSummary> =
        std::collections::HashMap::new();

    for prediction in predictions {
        latest
            .entry(prediction.student_id.as_str())
            .and_modify(|current| {
                if prediction.created_at > current.created_at {
                    *current = prediction;
                }
            })
            .or_insert(prediction);
    }

    let mut values: Vec<&PredictionSummary> = latest.into_values().collect();
    values.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.last_name.cmp(&b.last_name))
    });
    values
}

pub fn prediction_report(student: &Student, record: &PredictionRecord) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Academic Risk Report");
    let _ = writeln!(
        output,
        "Generated {}",
        record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Student");
    let _ = writeln!(output, "- Name: {}", student.full_name());
    let _ = writeln!(output, "- ID: {}", student.id);
    let _ = writeln!(output, "- Email: {}", student.email);
    let _ = writeln!(output, "- Semester: {}", student.semester);
    if let Some(career) = &student.career {
        let _ = writeln!(output, "- Career: {career}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Assessment");
    let _ = writeln!(output, "- Prediction: {}", record.id);
    let _ = writeln!(output, "- Risk tier: {}", record.risk_tier);
    let _ = writeln!(output, "- Score: {}/100", record.score);
    let _ = writeln!(output, "- Status: {}", record.status.as_str());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Factors");
    for factor in &record.key_factors {
        let _ = writeln!(output, "- {factor}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    if record.recommendations.is_empty() {
        let _ = writeln!(output, "No recommendations recorded.");
    } else {
        for item in &record.recommendations {
            let _ = writeln!(output, "- {item}");
        }
    }

    output
}

pub fn cohort_summary(predictions: &[PredictionSummary]) -> String {
    let tiers = summarize_by_tier(predictions);
    let latest = latest_per_student(predictions);
    let mut output = String::new();

    let _ = writeln!(output, "# Cohort Risk Summary");
    let _ = writeln!(
        output,
        "{} students assessed across {} predictions",
        latest.len(),
        predictions.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Tier Mix");

    if tiers.is_empty() {
        let _ = writeln!(output, "No predictions recorded yet.");
    } else {
        for tier in tiers.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg score {:.1})",
                tier.tier, tier.count, tier.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    if latest.is_empty() {
        let _ = writeln!(output, "No students assessed yet.");
    } else {
        for prediction in latest.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} {} ({}) {} score {}",
                prediction.first_name,
                prediction.last_name,
                prediction.student_id,
                prediction.risk_tier,
                prediction.score
            );
        }
    }

    output
}
