//! Case workflow stages and the stage transition rule.
//!
//! # Responsibility
//! - Define the fixed, ordered list of expropriation workflow stages.
//! - Decide whether a case may move from one stage to another.
//!
//! # Invariants
//! - `ALL_STAGES` order is the source of truth for stage indexes.
//! - The sixteen working stages come first (ending in `Completed`), followed by
//!   the absorbing states `Suspended` then `Cancelled`.
//! - Transition rules are evaluated in order; the first rule whose condition on
//!   `current` matches decides the outcome.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Workflow stage of an expropriation case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStage {
    InitialRequest,
    DocumentCollection,
    TechnicalInspection,
    LegalAnalysis,
    PropertyAppraisal,
    ValuationReview,
    OwnerNotification,
    Negotiation,
    LegalOpinion,
    BudgetApproval,
    DecreeDrafting,
    ExecutiveApproval,
    Publication,
    PaymentProcessing,
    PropertyTransfer,
    Completed,
    Suspended,
    Cancelled,
}

/// All stages in workflow order.
pub const ALL_STAGES: [CaseStage; 18] = [
    CaseStage::InitialRequest,
    CaseStage::DocumentCollection,
    CaseStage::TechnicalInspection,
    CaseStage::LegalAnalysis,
    CaseStage::PropertyAppraisal,
    CaseStage::ValuationReview,
    CaseStage::OwnerNotification,
    CaseStage::Negotiation,
    CaseStage::LegalOpinion,
    CaseStage::BudgetApproval,
    CaseStage::DecreeDrafting,
    CaseStage::ExecutiveApproval,
    CaseStage::Publication,
    CaseStage::PaymentProcessing,
    CaseStage::PropertyTransfer,
    CaseStage::Completed,
    CaseStage::Suspended,
    CaseStage::Cancelled,
];

/// Number of working (non-absorbing) stages.
pub const WORKING_STAGE_COUNT: usize = 16;

impl CaseStage {
    /// Position of this stage in `ALL_STAGES`.
    pub fn index(self) -> usize {
        ALL_STAGES
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or(ALL_STAGES.len())
    }

    /// Stage every new case starts in.
    pub fn first() -> Self {
        ALL_STAGES[0]
    }

    /// Whether this is `Suspended` or `Cancelled`.
    pub fn is_absorbing(self) -> bool {
        matches!(self, Self::Suspended | Self::Cancelled)
    }

    /// Whether the case is closed for regular processing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Stable storage/API value, e.g. `LEGAL_ANALYSIS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialRequest => "INITIAL_REQUEST",
            Self::DocumentCollection => "DOCUMENT_COLLECTION",
            Self::TechnicalInspection => "TECHNICAL_INSPECTION",
            Self::LegalAnalysis => "LEGAL_ANALYSIS",
            Self::PropertyAppraisal => "PROPERTY_APPRAISAL",
            Self::ValuationReview => "VALUATION_REVIEW",
            Self::OwnerNotification => "OWNER_NOTIFICATION",
            Self::Negotiation => "NEGOTIATION",
            Self::LegalOpinion => "LEGAL_OPINION",
            Self::BudgetApproval => "BUDGET_APPROVAL",
            Self::DecreeDrafting => "DECREE_DRAFTING",
            Self::ExecutiveApproval => "EXECUTIVE_APPROVAL",
            Self::Publication => "PUBLICATION",
            Self::PaymentProcessing => "PAYMENT_PROCESSING",
            Self::PropertyTransfer => "PROPERTY_TRANSFER",
            Self::Completed => "COMPLETED",
            Self::Suspended => "SUSPENDED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a stage from its storage/API value.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim();
        ALL_STAGES
            .iter()
            .copied()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(normalized))
    }

    /// Returns whether moving from `self` to `target` is permitted.
    pub fn can_transition_to(self, target: CaseStage) -> bool {
        if target.is_absorbing() {
            return true;
        }

        match self {
            Self::Suspended => target.index() > self.index(),
            Self::Cancelled => target == Self::first(),
            Self::Completed => target == Self::Suspended,
            _ => target.index() >= self.index(),
        }
    }

    /// All stages reachable from `self` in one transition, in workflow order.
    pub fn allowed_targets(self) -> Vec<CaseStage> {
        ALL_STAGES
            .iter()
            .copied()
            .filter(|target| *target != self && self.can_transition_to(*target))
            .collect()
    }

    /// Workflow completion percentage for working stages.
    ///
    /// Absorbing states report `None` because they sit outside the sequence.
    pub fn progress_percent(self) -> Option<u8> {
        if self.is_absorbing() {
            return None;
        }
        let position = self.index() + 1;
        Some(((position * 100) / WORKING_STAGE_COUNT) as u8)
    }
}

impl Display for CaseStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{CaseStage, ALL_STAGES, WORKING_STAGE_COUNT};

    fn expected(current: CaseStage, target: CaseStage) -> bool {
        let (ci, ti) = (current.index(), target.index());
        if target == CaseStage::Suspended || target == CaseStage::Cancelled {
            true
        } else if current == CaseStage::Suspended {
            ti > ci
        } else if current == CaseStage::Cancelled {
            ti == 0
        } else if current == CaseStage::Completed {
            false
        } else {
            ti >= ci
        }
    }

    #[test]
    fn stage_list_has_sixteen_working_stages_then_absorbing_states() {
        assert_eq!(ALL_STAGES.len(), WORKING_STAGE_COUNT + 2);
        assert_eq!(ALL_STAGES[WORKING_STAGE_COUNT - 1], CaseStage::Completed);
        assert_eq!(ALL_STAGES[WORKING_STAGE_COUNT], CaseStage::Suspended);
        assert_eq!(ALL_STAGES[WORKING_STAGE_COUNT + 1], CaseStage::Cancelled);
    }

    #[test]
    fn transition_table_holds_for_every_pair() {
        for current in ALL_STAGES {
            for target in ALL_STAGES {
                assert_eq!(
                    current.can_transition_to(target),
                    expected(current, target),
                    "{current} -> {target}"
                );
            }
        }
    }

    #[test]
    fn forward_moves_and_skips_are_allowed_backward_moves_are_not() {
        assert!(CaseStage::InitialRequest.can_transition_to(CaseStage::DocumentCollection));
        assert!(CaseStage::InitialRequest.can_transition_to(CaseStage::Negotiation));
        assert!(CaseStage::LegalAnalysis.can_transition_to(CaseStage::LegalAnalysis));
        assert!(!CaseStage::Negotiation.can_transition_to(CaseStage::LegalAnalysis));
    }

    #[test]
    fn cancelled_can_only_reopen_at_first_stage_or_stay_absorbed() {
        assert!(CaseStage::Cancelled.can_transition_to(CaseStage::InitialRequest));
        assert!(!CaseStage::Cancelled.can_transition_to(CaseStage::DocumentCollection));
        assert!(CaseStage::Cancelled.can_transition_to(CaseStage::Suspended));
    }

    #[test]
    fn completed_only_moves_to_absorbing_states() {
        assert!(CaseStage::Completed.can_transition_to(CaseStage::Suspended));
        assert!(CaseStage::Completed.can_transition_to(CaseStage::Cancelled));
        assert!(!CaseStage::Completed.can_transition_to(CaseStage::PropertyTransfer));
        assert!(!CaseStage::Completed.can_transition_to(CaseStage::Completed));
    }

    #[test]
    fn suspended_cannot_resume_working_stages() {
        assert!(!CaseStage::Suspended.can_transition_to(CaseStage::InitialRequest));
        assert!(!CaseStage::Suspended.can_transition_to(CaseStage::Completed));
        assert!(CaseStage::Suspended.can_transition_to(CaseStage::Cancelled));
    }

    #[test]
    fn parse_roundtrips_and_is_case_insensitive() {
        for stage in ALL_STAGES {
            assert_eq!(CaseStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(
            CaseStage::parse(" legal_analysis "),
            Some(CaseStage::LegalAnalysis)
        );
        assert_eq!(CaseStage::parse("ARCHIVED"), None);
    }

    #[test]
    fn allowed_targets_excludes_current_stage() {
        let targets = CaseStage::PaymentProcessing.allowed_targets();
        assert_eq!(
            targets,
            vec![
                CaseStage::PropertyTransfer,
                CaseStage::Completed,
                CaseStage::Suspended,
                CaseStage::Cancelled,
            ]
        );
    }

    #[test]
    fn progress_is_reported_for_working_stages_only() {
        assert_eq!(CaseStage::Completed.progress_percent(), Some(100));
        assert_eq!(CaseStage::InitialRequest.progress_percent(), Some(6));
        assert_eq!(CaseStage::Suspended.progress_percent(), None);
    }
}
