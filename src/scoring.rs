//! Deterministic score reducer
//!
//! ```text
//! penalty = 15 * critical + 7 * major + 2 * minor + (5 if any complexity > 15)
//! score   = clamp(100 - penalty, 0, 100)
//! ```

use crate::model::{FilteredEvidence, Severity, VerifiedViolation};
use serde::{Deserialize, Serialize};

pub const MAX_SCORE: u8 = 100;
pub const CRITICAL_PENALTY: u32 = 15;
pub const MAJOR_PENALTY: u32 = 7;
pub const MINOR_PENALTY: u32 = 2;
pub const COMPLEXITY_PENALTY: u32 = 5;
/// Complexity strictly above this value triggers [`COMPLEXITY_PENALTY`]
pub const COMPLEXITY_THRESHOLD: u32 = 15;

/// Violation tally by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub major: u32,
    pub minor: u32,
}

impl SeverityCounts {
    pub fn tally(violations: &[VerifiedViolation]) -> Self {
        violations
            .iter()
            .fold(Self::default(), |mut counts, v| {
                match v.severity {
                    Severity::Critical => counts.critical += 1,
                    Severity::Major => counts.major += 1,
                    Severity::Minor => counts.minor += 1,
                }
                counts
            })
    }
}

pub fn penalty(counts: SeverityCounts, max_complexity: u32) -> u32 {
    let mut total = CRITICAL_PENALTY * counts.critical
        + MAJOR_PENALTY * counts.major
        + MINOR_PENALTY * counts.minor;
    if max_complexity > COMPLEXITY_THRESHOLD {
        total += COMPLEXITY_PENALTY;
    }
    total
}

/// Score a file from its verified violations and measured complexity.
pub fn score(violations: &[VerifiedViolation], evidence: &FilteredEvidence) -> u8 {
    let penalty = penalty(SeverityCounts::tally(violations), evidence.max_complexity());
    MAX_SCORE.saturating_sub(penalty.min(MAX_SCORE as u32) as u8)
}

/// Letter grade for console display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=100 => Grade::A,
            75..=89 => Grade::B,
            60..=74 => Grade::C,
            40..=59 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Grade::A => "Clean",
            Grade::B => "Minor issues",
            Grade::C => "Needs attention",
            Grade::D => "Significant issues",
            Grade::F => "Critical defects",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComplexityBlock, ToolResult};

    fn violation(severity: Severity) -> VerifiedViolation {
        VerifiedViolation {
            line: 1,
            message: "m".into(),
            proof_quote: "q".into(),
            reasoning: "r".into(),
            severity,
            fix_suggestion: String::new(),
        }
    }

    fn evidence_with_complexity(complexity: u32) -> FilteredEvidence {
        FilteredEvidence::new(vec![ToolResult::new("radon").with_complexity(vec![
            ComplexityBlock {
                name: "f".into(),
                kind: "function".into(),
                complexity,
                line: 1,
            },
        ])])
    }

    #[test]
    fn test_no_violations_scores_100() {
        assert_eq!(score(&[], &FilteredEvidence::default()), 100);
    }

    #[test]
    fn test_formula_with_complexity_penalty() {
        let violations = vec![
            violation(Severity::Critical),
            violation(Severity::Critical),
            violation(Severity::Minor),
        ];
        // 15*2 + 2*1 + 5 = 37
        assert_eq!(score(&violations, &evidence_with_complexity(16)), 63);
    }

    #[test]
    fn test_complexity_threshold_is_strict() {
        assert_eq!(score(&[], &evidence_with_complexity(15)), 100);
        assert_eq!(score(&[], &evidence_with_complexity(16)), 95);
    }

    #[test]
    fn test_score_clamps_at_zero() {
        let violations: Vec<_> = (0..20).map(|_| violation(Severity::Critical)).collect();
        assert_eq!(score(&violations, &evidence_with_complexity(40)), 0);
    }

    #[test]
    fn test_score_is_deterministic() {
        let violations = vec![violation(Severity::Major), violation(Severity::Minor)];
        let evidence = evidence_with_complexity(3);
        let first = score(&violations, &evidence);
        for _ in 0..10 {
            assert_eq!(score(&violations, &evidence), first);
        }
        assert_eq!(first, 91);
    }

    #[test]
    fn test_grade_from_score() {
        assert_eq!(Grade::from_score(100), Grade::A);
        assert_eq!(Grade::from_score(85), Grade::B);
        assert_eq!(Grade::from_score(63), Grade::C);
        assert_eq!(Grade::from_score(0), Grade::F);
    }
}
