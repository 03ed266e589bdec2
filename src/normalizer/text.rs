//! Free-text metric extraction
//!
//! An ordered list of regular expressions, one per phrasing. For every metric
//! type the first accepted candidate wins; later candidates of the same type
//! are suppressed. Candidates that are not finite, not positive or outside the
//! type's physiological bounds are dropped without error.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::collections::HashSet;

use super::{fahrenheit_to_celsius, LB_TO_KG};
use crate::error::VitalsError;
use crate::types::{CanonicalMetric, MetricType};

/// Source tag for metrics parsed out of free text
pub const TEXT_SOURCE: &str = "text";

/// mmol/L to mg/dL for glucose
const GLUCOSE_MMOL_TO_MG_DL: f64 = 18.0;

type Extract = fn(&Captures) -> Vec<(MetricType, f64)>;

struct TextPattern {
    name: &'static str,
    regex: Regex,
    extract: Extract,
}

/// Compiled pattern set for free-text extraction
pub struct TextExtractor {
    patterns: Vec<TextPattern>,
}

impl TextExtractor {
    pub fn new() -> Result<Self, VitalsError> {
        let table: [(&'static str, &str, Extract); 11] = [
            (
                "blood_pressure",
                r"(?i)\b(\d{2,3})\s*(?:/|over)\s*(\d{2,3})\b",
                blood_pressure,
            ),
            (
                "heart_rate",
                concat!(
                    r"(?i)(?:\b(?:heart\s*rate|pulse|hr)\b\D{0,15}?(\d{2,3}(?:\.\d+)?))",
                    r"|(?:\b(\d{2,3}(?:\.\d+)?)\s*bpm\b)",
                ),
                heart_rate,
            ),
            (
                "glucose",
                r"(?i)\b(?:blood\s*sugar|glucose|bg)\b\D{0,15}?(\d{1,3}(?:\.\d+)?)\s*(mmol)?",
                glucose,
            ),
            (
                "hba1c",
                r"(?i)\b(?:hb)?a1c\b\D{0,10}?(\d{1,2}(?:\.\d+)?)",
                hba1c,
            ),
            (
                "weight",
                concat!(
                    r"(?i)\bweigh(?:t|s|ed)?\b\D{0,15}?(\d{2,3}(?:\.\d+)?)",
                    r"\s*(kgs?|kilos?|kilograms?|lbs?|pounds?)?",
                ),
                weight,
            ),
            (
                "temperature",
                r"(?i)\b(?:temp(?:erature)?|fever)\b\D{0,15}?(\d{2,3}(?:\.\d+)?)\s*°?\s*([cf])?\b",
                temperature,
            ),
            (
                "sleep",
                concat!(
                    r"(?i)(?:\bslept\b\D{0,15}?(\d{1,2}(?:\.\d+)?)\s*(?:h|hrs?|hours?)\b)",
                    r"|(?:\b(\d{1,2}(?:\.\d+)?)\s*(?:h|hrs?|hours?)\s+(?:of\s+)?sleep)",
                ),
                sleep,
            ),
            (
                "steps",
                r"(?i)\b(\d{1,3}(?:,\d{3})+|\d+)\s*steps\b",
                steps,
            ),
            (
                "oxygen_saturation",
                concat!(
                    r"(?i)\b(?:spo2|o2\s*sat(?:uration)?|oxygen(?:\s*(?:level|saturation|sat))?)\b",
                    r"\D{0,15}?(\d{2,3}(?:\.\d+)?)",
                ),
                oxygen_saturation,
            ),
            (
                "stress",
                r"(?i)\bstress(?:ed)?(?:\s*level)?\b\D{0,15}?(\d{1,2}(?:\.\d+)?)",
                stress,
            ),
            (
                "mood",
                r"(?i)\bmood\b\D{0,15}?(\d{1,2}(?:\.\d+)?)",
                mood,
            ),
        ];

        let patterns = table
            .into_iter()
            .map(|(name, pattern, extract)| -> Result<TextPattern, VitalsError> {
                Ok(TextPattern {
                    name,
                    regex: Regex::new(pattern)?,
                    extract,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Extract metrics from one text input, stamped at `at`
    pub fn extract(&self, text: &str, at: DateTime<Utc>) -> Vec<CanonicalMetric> {
        let mut seen: HashSet<MetricType> = HashSet::new();
        let mut metrics = Vec::new();

        // A rejected match (a date, an implausible value) falls through to the
        // next match of the same pattern; the first accepted one per type wins.
        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(text) {
                for (metric_type, value) in (pattern.extract)(&caps) {
                    if seen.contains(&metric_type) {
                        tracing::debug!(
                            pattern = pattern.name,
                            metric = %metric_type,
                            "duplicate metric suppressed"
                        );
                        continue;
                    }
                    if !(value.is_finite() && value > 0.0) {
                        tracing::debug!(
                            pattern = pattern.name,
                            value,
                            "dropped non-positive candidate"
                        );
                        continue;
                    }
                    match CanonicalMetric::canonical(metric_type, value, at, TEXT_SOURCE) {
                        Ok(metric) => {
                            seen.insert(metric_type);
                            metrics.push(metric);
                        }
                        Err(err) => {
                            tracing::debug!(
                                pattern = pattern.name,
                                error = %err,
                                "dropped text candidate"
                            );
                        }
                    }
                }
            }
        }

        metrics
    }
}

fn number(caps: &Captures, group: usize) -> Option<f64> {
    caps.get(group)?.as_str().replace(',', "").parse().ok()
}

/// First present group among `groups`
fn first_number(caps: &Captures, groups: &[usize]) -> Option<f64> {
    groups.iter().find_map(|&g| number(caps, g))
}

fn blood_pressure(caps: &Captures) -> Vec<(MetricType, f64)> {
    match (number(caps, 1), number(caps, 2)) {
        // Dates and fractions also look like "a/b"; a reading has systolic above diastolic
        (Some(sys), Some(dia)) if sys > dia => vec![
            (MetricType::BloodPressureSystolic, sys),
            (MetricType::BloodPressureDiastolic, dia),
        ],
        _ => Vec::new(),
    }
}

fn heart_rate(caps: &Captures) -> Vec<(MetricType, f64)> {
    first_number(caps, &[1, 2])
        .map(|v| vec![(MetricType::HeartRate, v)])
        .unwrap_or_default()
}

fn glucose(caps: &Captures) -> Vec<(MetricType, f64)> {
    let Some(value) = number(caps, 1) else {
        return Vec::new();
    };
    let mg_dl = if caps.get(2).is_some() {
        value * GLUCOSE_MMOL_TO_MG_DL
    } else {
        value
    };
    vec![(MetricType::Glucose, mg_dl)]
}

fn hba1c(caps: &Captures) -> Vec<(MetricType, f64)> {
    number(caps, 1)
        .map(|v| vec![(MetricType::Hba1c, v)])
        .unwrap_or_default()
}

fn weight(caps: &Captures) -> Vec<(MetricType, f64)> {
    let Some(value) = number(caps, 1) else {
        return Vec::new();
    };
    let pounds = caps
        .get(2)
        .map(|u| {
            let u = u.as_str().to_ascii_lowercase();
            u.starts_with("lb") || u.starts_with("pound")
        })
        .unwrap_or(false);
    let kg = if pounds { value * LB_TO_KG } else { value };
    vec![(MetricType::Weight, kg)]
}

fn temperature(caps: &Captures) -> Vec<(MetricType, f64)> {
    let Some(value) = number(caps, 1) else {
        return Vec::new();
    };
    let fahrenheit = match caps.get(2).map(|u| u.as_str().to_ascii_lowercase()) {
        Some(unit) => unit == "f",
        None => value > 50.0,
    };
    let celsius = if fahrenheit {
        fahrenheit_to_celsius(value)
    } else {
        value
    };
    vec![(MetricType::Temperature, celsius)]
}

fn sleep(caps: &Captures) -> Vec<(MetricType, f64)> {
    first_number(caps, &[1, 2])
        .map(|v| vec![(MetricType::SleepDuration, v)])
        .unwrap_or_default()
}

fn steps(caps: &Captures) -> Vec<(MetricType, f64)> {
    number(caps, 1)
        .map(|v| vec![(MetricType::Steps, v)])
        .unwrap_or_default()
}

fn oxygen_saturation(caps: &Captures) -> Vec<(MetricType, f64)> {
    number(caps, 1)
        .map(|v| vec![(MetricType::OxygenSaturation, v)])
        .unwrap_or_default()
}

fn stress(caps: &Captures) -> Vec<(MetricType, f64)> {
    number(caps, 1)
        .map(|v| vec![(MetricType::StressLevel, v)])
        .unwrap_or_default()
}

fn mood(caps: &Captures) -> Vec<(MetricType, f64)> {
    number(caps, 1)
        .map(|v| vec![(MetricType::MoodScore, v)])
        .unwrap_or_default()
}
