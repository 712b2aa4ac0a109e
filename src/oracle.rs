//! Conflict oracle: the pluggable judgment call on whether a candidate
//! experiment's mechanism interferes with experiments already occupying the
//! same dates. The scheduler only consults it after the overlap predicate
//! found date collisions; the oracle decides whether those collisions are
//! actual conflicts.

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::Experiment;

#[derive(Debug)]
pub enum OracleError {
    /// Transport failure — the analysis backend could not be reached.
    Unavailable(String),
    /// The backend answered with something we could not interpret at all.
    Malformed(String),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Unavailable(detail) => write!(f, "conflict oracle unavailable: {detail}"),
            OracleError::Malformed(detail) => write!(f, "unreadable oracle verdict: {detail}"),
        }
    }
}

impl std::error::Error for OracleError {}

/// The oracle's verdict on a candidate experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    pub has_conflict: bool,
    /// Causal mechanism the oracle inferred for the candidate, if any.
    pub mechanism: Option<String>,
    pub reason: String,
    pub recommendation: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Ids of the existing experiments the verdict implicates.
    pub implicated: Vec<Ulid>,
}

impl ConflictReport {
    /// The verdict when nothing occupies the candidate's dates. The scheduler
    /// produces this itself without calling the oracle.
    pub fn no_existing() -> Self {
        Self {
            has_conflict: false,
            mechanism: None,
            reason: "No existing experiments in this period.".into(),
            recommendation: "Safe to schedule.".into(),
            confidence: 1.0,
            implicated: Vec::new(),
        }
    }

    /// The fallback verdict when the oracle failed or timed out: no conflict,
    /// low confidence, manual review flagged. Scheduling never blocks on a
    /// dead oracle.
    pub fn degraded(detail: &str) -> Self {
        Self {
            has_conflict: false,
            mechanism: None,
            reason: format!("Could not perform conflict analysis ({detail})."),
            recommendation: "Proceed with caution - consider manual review.".into(),
            confidence: 0.3,
            implicated: Vec::new(),
        }
    }
}

/// Judges whether a candidate experiment interferes with the existing ones
/// sharing its dates. `existing` is pre-filtered to date overlaps only.
#[async_trait]
pub trait ConflictOracle: Send + Sync {
    async fn evaluate(
        &self,
        candidate: &Experiment,
        existing: &[Experiment],
    ) -> Result<ConflictReport, OracleError>;
}

/// Parse a tagged analysis verdict into a report. The expected line format:
///
/// ```text
/// [MECHANISM] <inferred mechanism>
/// [CONFLICT] YES or NO
/// [INTERFERES_WITH] name_1, name_2 (or NONE)
/// [REASON] one sentence
/// [RECOMMENDATION] what to do
/// [CONFIDENCE] 0.0 to 1.0
/// [DETAILS] longer analysis
/// ```
///
/// Missing tags keep their defaults (no conflict, confidence 0.5).
/// `[INTERFERES_WITH]` names are matched against `existing` case-insensitively
/// by substring; `[DETAILS]` is appended to the reason.
pub fn parse_verdict(text: &str, existing: &[Experiment]) -> ConflictReport {
    let mut report = ConflictReport {
        has_conflict: false,
        mechanism: None,
        reason: String::new(),
        recommendation: String::new(),
        confidence: 0.5,
        implicated: Vec::new(),
    };

    for line in text.trim().lines() {
        if let Some(rest) = line.strip_prefix("[MECHANISM]") {
            let rest = rest.trim();
            if !rest.is_empty() {
                report.mechanism = Some(rest.to_string());
            }
        } else if line.starts_with("[CONFLICT]") {
            report.has_conflict = line.contains("YES");
        } else if let Some(rest) = line.strip_prefix("[INTERFERES_WITH]") {
            let rest = rest.trim();
            if rest != "NONE" {
                let lowered = rest.to_lowercase();
                for e in existing {
                    if lowered.contains(&e.name.to_lowercase()) {
                        report.implicated.push(e.id);
                    }
                }
            }
        } else if let Some(rest) = line.strip_prefix("[REASON]") {
            report.reason = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("[RECOMMENDATION]") {
            report.recommendation = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("[CONFIDENCE]") {
            if let Ok(v) = rest.trim().parse::<f64>() {
                report.confidence = v.clamp(0.0, 1.0);
            }
        } else if let Some(rest) = line.strip_prefix("[DETAILS]") {
            let details = rest.trim();
            if report.reason.is_empty() {
                report.reason = details.to_string();
            } else {
                report.reason = format!("{}\n{}", report.reason, details);
            }
        }
    }

    report
}

fn shares(a: &[String], b: &[String]) -> bool {
    a.iter().any(|x| b.contains(x))
}

fn shared(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|x| b.contains(x)).cloned().collect()
}

fn names(experiments: &[&Experiment]) -> String {
    experiments
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deterministic oracle built from known interaction patterns. Risk tiers:
///
/// - same screen modified by both → conflict (results confounded)
/// - same surface and same metric → conflict (can't attribute the movement)
/// - same surface or same metric, not both → safe, flagged for monitoring
/// - fully disjoint → safe
///
/// Useful on its own for offline operation and as the fallback when no
/// external analysis backend is wired in.
pub struct PatternOracle;

#[async_trait]
impl ConflictOracle for PatternOracle {
    async fn evaluate(
        &self,
        candidate: &Experiment,
        existing: &[Experiment],
    ) -> Result<ConflictReport, OracleError> {
        if existing.is_empty() {
            return Ok(ConflictReport::no_existing());
        }

        let same_screen: Vec<&Experiment> = existing
            .iter()
            .filter(|e| shares(&candidate.screens, &e.screens))
            .collect();
        if !same_screen.is_empty() {
            return Ok(ConflictReport {
                has_conflict: true,
                mechanism: Some("same-element modification".into()),
                reason: format!(
                    "Same screen modified by multiple experiments ({}): results would be confounded.",
                    names(&same_screen)
                ),
                recommendation: "Run sequentially, or as variants in the same test.".into(),
                confidence: 0.9,
                implicated: same_screen.iter().map(|e| e.id).collect(),
            });
        }

        let confounded: Vec<&Experiment> = existing
            .iter()
            .filter(|e| {
                shares(&candidate.surfaces, &e.surfaces) && shares(&candidate.metrics, &e.metrics)
            })
            .collect();
        if !confounded.is_empty() {
            let metrics = shared(&candidate.metrics, &confounded[0].metrics);
            return Ok(ConflictReport {
                has_conflict: true,
                mechanism: Some("confounded measurement".into()),
                reason: format!(
                    "{} change the same surface while measuring {}: the metric movement cannot be attributed.",
                    names(&confounded),
                    metrics.join(", ")
                ),
                recommendation: "Run sequentially or segment users between the tests.".into(),
                confidence: 0.85,
                implicated: confounded.iter().map(|e| e.id).collect(),
            });
        }

        let partial: Vec<&Experiment> = existing
            .iter()
            .filter(|e| {
                shares(&candidate.surfaces, &e.surfaces) || shares(&candidate.metrics, &e.metrics)
            })
            .collect();
        if !partial.is_empty() {
            return Ok(ConflictReport {
                has_conflict: false,
                mechanism: Some("partial overlap".into()),
                reason: format!(
                    "Shares a surface or metric with {} but targets a different decision point.",
                    names(&partial)
                ),
                recommendation: "Safe to schedule; monitor the shared dimension for cross-effects."
                    .into(),
                confidence: 0.6,
                implicated: Vec::new(),
            });
        }

        Ok(ConflictReport {
            has_conflict: false,
            mechanism: Some("orthogonal".into()),
            reason: "No shared surfaces, screens, or metrics with experiments in this period."
                .into(),
            recommendation: "Safe to schedule.".into(),
            confidence: 0.9,
            implicated: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateInterval, ExperimentDraft};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn exp(name: &str, surfaces: &[&str], screens: &[&str], metrics: &[&str]) -> Experiment {
        Experiment::from_draft(ExperimentDraft {
            name: name.into(),
            description: String::new(),
            hypothesis: String::new(),
            surfaces: surfaces.iter().map(|s| s.to_string()).collect(),
            screens: screens.iter().map(|s| s.to_string()).collect(),
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            interval: DateInterval::new(d(2026, 2, 1), d(2026, 2, 14)),
        })
    }

    #[test]
    fn no_existing_report() {
        let r = ConflictReport::no_existing();
        assert!(!r.has_conflict);
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.recommendation, "Safe to schedule.");
        assert!(r.implicated.is_empty());
    }

    #[test]
    fn degraded_report_flags_manual_review() {
        let r = ConflictReport::degraded("timed out after 20s");
        assert!(!r.has_conflict);
        assert_eq!(r.confidence, 0.3);
        assert!(r.reason.contains("timed out after 20s"));
        assert!(r.recommendation.contains("manual review"));
    }

    #[test]
    fn parse_full_verdict() {
        let existing = vec![
            exp("hero_copy_test", &["homepage"], &[], &["click_through_rate"]),
            exp("checkout_trust", &["checkout"], &[], &["conversion_rate"]),
        ];
        let text = "\
[MECHANISM] urgency
[CONFLICT] YES
[INTERFERES_WITH] Hero_Copy_Test
[REASON] Both compete for attention above the fold.
[RECOMMENDATION] Run sequentially.
[CONFIDENCE] 0.8
[DETAILS] The urgency banner would sit inside the hero being rewritten.";

        let r = parse_verdict(text, &existing);
        assert!(r.has_conflict);
        assert_eq!(r.mechanism.as_deref(), Some("urgency"));
        assert_eq!(r.confidence, 0.8);
        assert_eq!(r.implicated, vec![existing[0].id]); // case-insensitive name match
        assert!(r.reason.starts_with("Both compete"));
        assert!(r.reason.contains("above the fold.\nThe urgency banner"));
        assert_eq!(r.recommendation, "Run sequentially.");
    }

    #[test]
    fn parse_no_conflict_none_interferes() {
        let existing = vec![exp("promo_email", &["email"], &[], &["open_rate"])];
        let text = "\
[CONFLICT] NO
[INTERFERES_WITH] NONE
[REASON] No interference identified
[CONFIDENCE] 0.95";

        let r = parse_verdict(text, &existing);
        assert!(!r.has_conflict);
        assert!(r.implicated.is_empty());
        assert_eq!(r.confidence, 0.95);
    }

    #[test]
    fn parse_defaults_when_tags_missing() {
        let r = parse_verdict("something unstructured", &[]);
        assert!(!r.has_conflict);
        assert_eq!(r.confidence, 0.5);
        assert!(r.reason.is_empty());
    }

    #[test]
    fn parse_bad_confidence_keeps_default() {
        let r = parse_verdict("[CONFIDENCE] very sure", &[]);
        assert_eq!(r.confidence, 0.5);
    }

    #[test]
    fn parse_confidence_clamped_to_unit_interval() {
        let r = parse_verdict("[CONFIDENCE] 1.7", &[]);
        assert_eq!(r.confidence, 1.0);
        let r = parse_verdict("[CONFIDENCE] -0.2", &[]);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn parse_matches_multiple_implicated_names() {
        let existing = vec![
            exp("alpha", &["homepage"], &[], &[]),
            exp("beta", &["homepage"], &[], &[]),
            exp("gamma", &["checkout"], &[], &[]),
        ];
        let r = parse_verdict("[INTERFERES_WITH] alpha, beta", &existing);
        assert_eq!(r.implicated, vec![existing[0].id, existing[1].id]);
    }

    #[tokio::test]
    async fn pattern_oracle_empty_existing_is_safe() {
        let candidate = exp("solo", &["homepage"], &[], &["pageviews"]);
        let r = PatternOracle.evaluate(&candidate, &[]).await.unwrap();
        assert_eq!(r, ConflictReport::no_existing());
    }

    #[tokio::test]
    async fn pattern_oracle_same_screen_conflicts() {
        let candidate = exp(
            "cta_color",
            &["homepage"],
            &["hero_section"],
            &["click_through_rate"],
        );
        let existing = vec![exp(
            "hero_headline",
            &["homepage"],
            &["hero_section"],
            &["bounce_rate"],
        )];
        let r = PatternOracle.evaluate(&candidate, &existing).await.unwrap();
        assert!(r.has_conflict);
        assert_eq!(r.confidence, 0.9);
        assert_eq!(r.implicated, vec![existing[0].id]);
        assert!(r.reason.contains("hero_headline"));
    }

    #[tokio::test]
    async fn pattern_oracle_shared_surface_and_metric_conflicts() {
        let candidate = exp("fewer_form_fields", &["checkout"], &[], &["conversion_rate"]);
        let existing = vec![exp(
            "express_shipping_default",
            &["checkout"],
            &[],
            &["conversion_rate", "aov"],
        )];
        let r = PatternOracle.evaluate(&candidate, &existing).await.unwrap();
        assert!(r.has_conflict);
        assert_eq!(r.confidence, 0.85);
        assert_eq!(r.implicated, vec![existing[0].id]);
        assert!(r.reason.contains("conversion_rate"));
    }

    #[tokio::test]
    async fn pattern_oracle_partial_overlap_is_safe_but_uncertain() {
        // Same surface, different metrics
        let candidate = exp("nav_search_box", &["homepage"], &[], &["pageviews"]);
        let existing = vec![exp("hero_video", &["homepage"], &[], &["bounce_rate"])];
        let r = PatternOracle.evaluate(&candidate, &existing).await.unwrap();
        assert!(!r.has_conflict);
        assert_eq!(r.confidence, 0.6);
        assert!(r.implicated.is_empty());
    }

    #[tokio::test]
    async fn pattern_oracle_disjoint_is_safe() {
        let candidate = exp("welcome_email_tone", &["email"], &[], &["open_rate"]);
        let existing = vec![exp("shipping_cost_display", &["checkout"], &[], &["aov"])];
        let r = PatternOracle.evaluate(&candidate, &existing).await.unwrap();
        assert!(!r.has_conflict);
        assert_eq!(r.confidence, 0.9);
        assert!(r.recommendation.contains("Safe to schedule"));
    }
}
