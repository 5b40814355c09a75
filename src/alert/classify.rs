//! Anomaly Classifier.
//!
//! Turns an observed value and its baseline into an `Anomaly` with a z-score,
//! direction, severity tier and a structured explanation. The confidence
//! threshold is compared directly against `|z|`; it is never rescaled by the
//! baseline's standard deviation.

use crate::logging::{self, Component};
use crate::model::{Anomaly, Baseline, Direction, ElementFamily, Explanation, Severity};

/// Classifies `value` against `baseline`.
///
/// Returns `None` when the value or baseline is missing, when the z-score is
/// not finite, or when `|z| <= confidence_threshold`.
pub fn classify(value: Option<f64>, baseline: Option<&Baseline>, confidence_threshold: f64) -> Option<Anomaly> {
    let value = value.filter(|v| v.is_finite())?;
    let baseline = baseline?;

    let z_score = (value - baseline.mean) / baseline.std;
    if !z_score.is_finite() || z_score.abs() <= confidence_threshold {
        return None;
    }

    let direction = if z_score > 0.0 { Direction::High } else { Direction::Low };
    let severity = Severity::from_z_score(z_score);
    let explanation = explain(value, z_score, baseline, direction, severity);

    logging::debug(
        Component::Classifier,
        Some(&baseline.station_id),
        &format!(
            "{} {} on {}: z = {:.2} ({} {})",
            baseline.element, value, baseline.target_date, z_score, severity, direction
        ),
    );

    Some(Anomaly {
        station_id: baseline.station_id.clone(),
        element: baseline.element.clone(),
        date: baseline.target_date,
        observed_value: value,
        z_score,
        direction,
        severity,
        explanation,
        baseline: baseline.clone(),
        quality: None,
        qa_score: None,
    })
}

/// How often a deviation of `|z|` occurs under a normal distribution,
/// bucketed.
pub fn frequency_description(z_score: f64) -> &'static str {
    let z = z_score.abs();
    if z >= 3.0 {
        "less than 0.3% of the time"
    } else if z >= 2.0 {
        "about 2.3% of the time"
    } else if z >= 1.5 {
        "about 6.7% of the time"
    } else if z >= 1.0 {
        "about 15.9% of the time"
    } else {
        "about 31.7% of the time"
    }
}

// ---------------------------------------------------------------------------
// Explanations
// ---------------------------------------------------------------------------

fn explain(value: f64, z_score: f64, baseline: &Baseline, direction: Direction, severity: Severity) -> Explanation {
    let element = &baseline.element;
    let unit = element.unit();
    let name = element.name().to_lowercase();
    let value_str = format!("{:.1}{}", value, unit);
    let typical = format!("{:.1}{} ± {:.1}{}", baseline.mean, unit, baseline.std, unit);
    let high = direction == Direction::High;
    let side = if high { "above" } else { "below" };
    let level = if high { "high" } else { "low" };

    let (headline, comparison, subject) = match element.family() {
        ElementFamily::Temperature => (
            format!("This represents a {} {} temperature for {}.", severity, level, name),
            format!("The observed value of {} is significantly {} the typical range of {}.", value_str, side, typical),
            "This temperature",
        ),
        ElementFamily::Precipitation => (
            format!("This represents {} {} precipitation for {}.", severity, level, name),
            format!("The observed value of {} is significantly {} the typical range of {}.", value_str, side, typical),
            "This precipitation level",
        ),
        ElementFamily::Wind => (
            format!("This represents {} {} wind for {}.", severity, level, name),
            format!("The observed value of {} is significantly {} the typical range of {}.", value_str, side, typical),
            "This wind level",
        ),
        _ => (
            format!("This represents a {} {} value for {}.", severity, level, name),
            format!("The observed value of {} is significantly different from the typical range of {}.", value_str, typical),
            "This value",
        ),
    };

    let frequency = frequency_description(z_score).to_string();
    let rarity = format!(
        "{} is in the {:.1} standard deviation range, which occurs approximately {}.",
        subject,
        z_score.abs(),
        frequency
    );

    Explanation {
        headline,
        comparison,
        rarity,
        frequency,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
