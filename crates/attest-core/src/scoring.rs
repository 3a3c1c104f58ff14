//! Score aggregation.
//!
//! Pure fan-in over verification results: no I/O, no external calls,
//! identical input always yields identical output. This is the only place
//! the faithfulness score and the hallucination flag are computed; the
//! flag is derivable solely from the verifications and never set
//! independently.

use crate::types::{ClaimVerification, VerificationStatus};

/// Aggregate result for one audit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    /// (supported + 0.5 × partially supported) / total; 1.0 when there
    /// were no claims to dispute
    pub faithfulness_score: f64,

    /// True iff the score is below 1.0 or any claim is unsupported
    pub hallucination_detected: bool,

    /// Human-readable rendering of the findings, in claim order
    pub reasoning_trace: String,
}

/// Aggregate per-claim verifications into a faithfulness score,
/// hallucination flag, and reasoning trace.
pub fn aggregate(verifications: &[ClaimVerification]) -> ScoreSummary {
    let total = verifications.len();

    if total == 0 {
        return ScoreSummary {
            faithfulness_score: 1.0,
            hallucination_detected: false,
            reasoning_trace: "No verifiable claims found in response.".to_string(),
        };
    }

    let supported = count(verifications, VerificationStatus::Supported);
    let partial = count(verifications, VerificationStatus::PartiallySupported);
    let unsupported = count(verifications, VerificationStatus::Unsupported);
    let unknown = count(verifications, VerificationStatus::Unknown);

    let faithfulness_score = (supported as f64 + 0.5 * partial as f64) / total as f64;
    let hallucination_detected = faithfulness_score < 1.0 || unsupported > 0;

    let mut trace = vec![
        format!("Faithfulness Score: {faithfulness_score:.2}/1.00"),
        String::new(),
        format!("Total Claims Analyzed: {total}"),
        format!("  Supported: {supported}"),
        format!("  Partially Supported: {partial}"),
        format!("  Unsupported: {unsupported}"),
        format!("  Unknown: {unknown}"),
        String::new(),
    ];

    for (i, v) in verifications.iter().enumerate() {
        trace.push(format!("{}. [{}] {}", i + 1, status_label(v.status), v.claim.text));
        trace.push(format!("   {}", evidence_line(v)));
    }

    ScoreSummary {
        faithfulness_score,
        hallucination_detected,
        reasoning_trace: trace.join("\n"),
    }
}

/// Whether verification quality is too poor to trust the score.
///
/// Trips when at least `min_unknown` claims ended up `Unknown` and the
/// claim count is below `max_total`: a handful of claims where most could
/// not be verified at all says more about backend health than about the
/// response.
pub fn quality_degraded(
    verifications: &[ClaimVerification],
    min_unknown: usize,
    max_total: usize,
) -> bool {
    let unknown = count(verifications, VerificationStatus::Unknown);
    unknown >= min_unknown && verifications.len() < max_total
}

fn count(verifications: &[ClaimVerification], status: VerificationStatus) -> usize {
    verifications.iter().filter(|v| v.status == status).count()
}

fn status_label(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Supported => "SUPPORTED",
        VerificationStatus::Unsupported => "UNSUPPORTED",
        VerificationStatus::PartiallySupported => "PARTIALLY_SUPPORTED",
        VerificationStatus::Unknown => "UNKNOWN",
    }
}

/// One-line evidence summary for a claim.
///
/// An `Unknown` claim that still carries evidence means retrieval worked
/// but verification could not run; that distinction is kept visible.
fn evidence_line(v: &ClaimVerification) -> String {
    match v.evidence.first() {
        Some(e) if v.status == VerificationStatus::Unknown => {
            format!("verification unavailable (evidence: \"{}\")", snippet(&e.text))
        }
        Some(e) => format!(
            "evidence (relevance {:.2}): \"{}\"",
            e.relevance_score,
            snippet(&e.text)
        ),
        None => "no evidence found".to_string(),
    }
}

fn snippet(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Claim, Evidence};
    use proptest::prelude::*;

    fn verification(status: VerificationStatus, evidence: Vec<Evidence>) -> ClaimVerification {
        ClaimVerification {
            claim: Claim {
                text: "claim".to_string(),
                source_span: None,
            },
            status,
            confidence: 0.9,
            evidence,
        }
    }

    fn evidence(text: &str, relevance: f64) -> Evidence {
        Evidence {
            text: text.to_string(),
            relevance_score: relevance,
            source_doc_index: 0,
        }
    }

    #[test]
    fn empty_verifications_score_one_and_no_flag() {
        let summary = aggregate(&[]);
        assert_eq!(summary.faithfulness_score, 1.0);
        assert!(!summary.hallucination_detected);
    }

    #[test]
    fn partially_supported_counts_half() {
        let vs = vec![
            verification(VerificationStatus::Supported, vec![]),
            verification(VerificationStatus::PartiallySupported, vec![]),
        ];
        let summary = aggregate(&vs);
        assert!((summary.faithfulness_score - 0.75).abs() < 1e-9);
        assert!(summary.hallucination_detected);
    }

    #[test]
    fn any_unsupported_trips_flag_even_with_high_score() {
        let mut vs = vec![verification(VerificationStatus::Supported, vec![]); 9];
        vs.push(verification(VerificationStatus::Unsupported, vec![]));

        let summary = aggregate(&vs);
        assert!(summary.faithfulness_score >= 0.9);
        assert!(summary.hallucination_detected);
    }

    #[test]
    fn all_supported_means_no_hallucination() {
        let vs = vec![verification(VerificationStatus::Supported, vec![]); 3];
        let summary = aggregate(&vs);
        assert_eq!(summary.faithfulness_score, 1.0);
        assert!(!summary.hallucination_detected);
    }

    #[test]
    fn all_unknown_trips_flag() {
        let vs = vec![verification(VerificationStatus::Unknown, vec![]); 2];
        let summary = aggregate(&vs);
        assert_eq!(summary.faithfulness_score, 0.0);
        assert!(summary.hallucination_detected);
    }

    #[test]
    fn trace_lists_claims_in_order_with_evidence() {
        let vs = vec![
            verification(
                VerificationStatus::Supported,
                vec![evidence("France's capital is Paris", 0.92)],
            ),
            verification(VerificationStatus::Unsupported, vec![]),
        ];
        let summary = aggregate(&vs);

        let supported_pos = summary.reasoning_trace.find("1. [SUPPORTED]").unwrap();
        let unsupported_pos = summary.reasoning_trace.find("2. [UNSUPPORTED]").unwrap();
        assert!(supported_pos < unsupported_pos);
        assert!(summary.reasoning_trace.contains("France's capital is Paris"));
        assert!(summary.reasoning_trace.contains("no evidence found"));
    }

    #[test]
    fn trace_marks_failed_verification_with_evidence_as_unavailable() {
        let vs = vec![verification(
            VerificationStatus::Unknown,
            vec![evidence("some passage", 0.5)],
        )];
        let summary = aggregate(&vs);
        assert!(summary.reasoning_trace.contains("verification unavailable"));
    }

    #[test]
    fn degraded_when_mostly_unknown_and_few_claims() {
        let vs = vec![verification(VerificationStatus::Unknown, vec![]); 3];
        assert!(quality_degraded(&vs, 3, 5));

        // Enough claims that a few unknowns are tolerable
        let mut many = vec![verification(VerificationStatus::Supported, vec![]); 4];
        many.extend(vec![verification(VerificationStatus::Unknown, vec![]); 3]);
        assert!(!quality_degraded(&many, 3, 5));

        let few_unknown = vec![verification(VerificationStatus::Unknown, vec![]); 2];
        assert!(!quality_degraded(&few_unknown, 3, 5));
    }

    fn arb_status() -> impl Strategy<Value = VerificationStatus> {
        prop_oneof![
            Just(VerificationStatus::Supported),
            Just(VerificationStatus::Unsupported),
            Just(VerificationStatus::PartiallySupported),
            Just(VerificationStatus::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn score_always_within_unit_interval(statuses in prop::collection::vec(arb_status(), 0..64)) {
            let vs: Vec<_> = statuses
                .into_iter()
                .map(|s| verification(s, vec![]))
                .collect();
            let summary = aggregate(&vs);
            prop_assert!(summary.faithfulness_score >= 0.0);
            prop_assert!(summary.faithfulness_score <= 1.0);
        }

        #[test]
        fn aggregation_is_deterministic(statuses in prop::collection::vec(arb_status(), 0..32)) {
            let vs: Vec<_> = statuses
                .into_iter()
                .map(|s| verification(s, vec![]))
                .collect();
            let a = aggregate(&vs);
            let b = aggregate(&vs);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn unsupported_always_flags(statuses in prop::collection::vec(arb_status(), 1..32)) {
            let mut vs: Vec<_> = statuses
                .into_iter()
                .map(|s| verification(s, vec![]))
                .collect();
            vs.push(verification(VerificationStatus::Unsupported, vec![]));
            prop_assert!(aggregate(&vs).hallucination_detected);
        }
    }
}
