//! Session phase state machine.
//!
//! The pipeline moves strictly forward through 8 phases:
//!   Scope -> Spark -> Mutation -> FeatureExpansion -> ProductRefinement
//!     -> TechnicalRefinement -> Visual -> Completed
//!
//! This module is a pure decision layer: which actions are legal in which
//! phase, and which phase an action moves the session to once it succeeds.
//! Persisting the new phase is the caller's job (see `IdeaPipeline`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Answers per refinement interview before the session moves on.
pub const REFINEMENT_QUESTION_COUNT: usize = 10;

// =============================================================================
// Phases
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scope,
    Spark,
    Mutation,
    FeatureExpansion,
    ProductRefinement,
    TechnicalRefinement,
    Visual,
    Completed,
}

impl Phase {
    /// All phases in pipeline order.
    pub const ALL: &'static [Phase] = &[
        Phase::Scope,
        Phase::Spark,
        Phase::Mutation,
        Phase::FeatureExpansion,
        Phase::ProductRefinement,
        Phase::TechnicalRefinement,
        Phase::Visual,
        Phase::Completed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Scope => "Scope",
            Self::Spark => "Spark",
            Self::Mutation => "Mutation",
            Self::FeatureExpansion => "FeatureExpansion",
            Self::ProductRefinement => "ProductRefinement",
            Self::TechnicalRefinement => "TechnicalRefinement",
            Self::Visual => "Visual",
            Self::Completed => "Completed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scope => "scope",
            Self::Spark => "spark",
            Self::Mutation => "mutation",
            Self::FeatureExpansion => "feature_expansion",
            Self::ProductRefinement => "product_refinement",
            Self::TechnicalRefinement => "technical_refinement",
            Self::Visual => "visual",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("invalid phase: '{s}'"))
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Every phase-gated operation the pipeline exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseAction {
    ConfigureScope,
    GenerateIdeas,
    RecordSwipe,
    SelectIdeas,
    GenerateMutations,
    RecordMutationFeedback,
    Synthesize,
    ExpandFeatures,
    RateVariation,
    SelectProtoApp,
    SubmitRefinementAnswer,
    GenerateVisuals,
    SelectVisual,
    Complete,
    Publish,
}

const REFINEMENT_ONWARD: &[Phase] = &[
    Phase::ProductRefinement,
    Phase::TechnicalRefinement,
    Phase::Visual,
];

impl PhaseAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfigureScope => "configure_scope",
            Self::GenerateIdeas => "generate_ideas",
            Self::RecordSwipe => "record_swipe",
            Self::SelectIdeas => "select_ideas",
            Self::GenerateMutations => "generate_mutations",
            Self::RecordMutationFeedback => "record_mutation_feedback",
            Self::Synthesize => "synthesize",
            Self::ExpandFeatures => "expand_features",
            Self::RateVariation => "rate_variation",
            Self::SelectProtoApp => "select_proto_app",
            Self::SubmitRefinementAnswer => "submit_refinement_answer",
            Self::GenerateVisuals => "generate_visuals",
            Self::SelectVisual => "select_visual",
            Self::Complete => "complete",
            Self::Publish => "publish",
        }
    }

    /// Phases in which this action may run.
    pub fn allowed_phases(&self) -> &'static [Phase] {
        match self {
            Self::ConfigureScope => &[Phase::Scope],
            Self::GenerateIdeas | Self::RecordSwipe | Self::SelectIdeas => &[Phase::Spark],
            Self::GenerateMutations | Self::Synthesize => &[Phase::Mutation],
            Self::RecordMutationFeedback | Self::ExpandFeatures => {
                &[Phase::Mutation, Phase::FeatureExpansion]
            }
            Self::RateVariation | Self::SelectProtoApp => &[Phase::FeatureExpansion],
            Self::SubmitRefinementAnswer => {
                &[Phase::ProductRefinement, Phase::TechnicalRefinement]
            }
            Self::GenerateVisuals | Self::SelectVisual => REFINEMENT_ONWARD,
            Self::Complete => &[Phase::Visual],
            Self::Publish => &[Phase::Visual, Phase::Completed],
        }
    }
}

impl fmt::Display for PhaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Fail with `PhaseViolation` unless `action` is legal in `current`.
pub fn ensure_allowed(current: Phase, action: PhaseAction) -> Result<(), AppError> {
    let allowed = action.allowed_phases();
    if allowed.contains(&current) {
        return Ok(());
    }
    Err(AppError::PhaseViolation {
        action: action.name().into(),
        current,
        required: allowed
            .iter()
            .map(|p| p.label())
            .collect::<Vec<_>>()
            .join(" | "),
    })
}

/// The phase a session moves to after `action` succeeded in `current`, or
/// `None` when it stays put.
///
/// `answers_recorded` is the number of refinement answers recorded in the
/// current interview including the one just submitted; other actions ignore it.
pub fn next_phase(current: Phase, action: PhaseAction, answers_recorded: usize) -> Option<Phase> {
    match (action, current) {
        (PhaseAction::ConfigureScope, Phase::Scope) => Some(Phase::Spark),
        (PhaseAction::SelectIdeas, Phase::Spark) => Some(Phase::Mutation),
        (PhaseAction::ExpandFeatures, Phase::Mutation) => Some(Phase::FeatureExpansion),
        (PhaseAction::SelectProtoApp, Phase::FeatureExpansion) => Some(Phase::ProductRefinement),
        (PhaseAction::SubmitRefinementAnswer, Phase::ProductRefinement)
            if answers_recorded >= REFINEMENT_QUESTION_COUNT =>
        {
            Some(Phase::TechnicalRefinement)
        }
        (PhaseAction::SubmitRefinementAnswer, Phase::TechnicalRefinement)
            if answers_recorded >= REFINEMENT_QUESTION_COUNT =>
        {
            Some(Phase::Visual)
        }
        (PhaseAction::Complete, Phase::Visual) => Some(Phase::Completed),
        _ => None,
    }
}

/// Guard for committing a new phase: sessions never move backward or sideways.
pub fn ensure_forward(from: Phase, to: Phase) -> Result<(), AppError> {
    if to > from {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "refusing phase transition {from} -> {to}: phases only move forward"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_strict() {
        for pair in Phase::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Phase::ALL.len(), 8);
    }

    #[test]
    fn test_phase_db_text_roundtrip() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), *phase);
        }
        assert!("limbo".parse::<Phase>().is_err());
    }

    #[test]
    fn test_refinement_answers_only_in_refinement_phases() {
        for phase in Phase::ALL {
            let result = ensure_allowed(*phase, PhaseAction::SubmitRefinementAnswer);
            let expected = matches!(
                phase,
                Phase::ProductRefinement | Phase::TechnicalRefinement
            );
            assert_eq!(result.is_ok(), expected, "phase {phase}");
        }
    }

    #[test]
    fn test_visuals_legal_from_product_refinement_onward() {
        assert!(ensure_allowed(Phase::FeatureExpansion, PhaseAction::GenerateVisuals).is_err());
        assert!(ensure_allowed(Phase::ProductRefinement, PhaseAction::GenerateVisuals).is_ok());
        assert!(ensure_allowed(Phase::TechnicalRefinement, PhaseAction::GenerateVisuals).is_ok());
        assert!(ensure_allowed(Phase::Visual, PhaseAction::GenerateVisuals).is_ok());
        assert!(ensure_allowed(Phase::Completed, PhaseAction::GenerateVisuals).is_err());
    }

    #[test]
    fn test_violation_names_current_and_required() {
        let err = ensure_allowed(Phase::Scope, PhaseAction::GenerateIdeas).unwrap_err();
        match err {
            AppError::PhaseViolation {
                action,
                current,
                required,
            } => {
                assert_eq!(action, "generate_ideas");
                assert_eq!(current, Phase::Scope);
                assert_eq!(required, "Spark");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_tenth_answer_triggers_transition() {
        let action = PhaseAction::SubmitRefinementAnswer;
        assert_eq!(next_phase(Phase::ProductRefinement, action, 9), None);
        assert_eq!(
            next_phase(Phase::ProductRefinement, action, 10),
            Some(Phase::TechnicalRefinement)
        );
        assert_eq!(next_phase(Phase::TechnicalRefinement, action, 3), None);
        assert_eq!(
            next_phase(Phase::TechnicalRefinement, action, 10),
            Some(Phase::Visual)
        );
    }

    #[test]
    fn test_expand_features_advances_only_from_mutation() {
        assert_eq!(
            next_phase(Phase::Mutation, PhaseAction::ExpandFeatures, 0),
            Some(Phase::FeatureExpansion)
        );
        assert_eq!(
            next_phase(Phase::FeatureExpansion, PhaseAction::ExpandFeatures, 0),
            None
        );
    }

    #[test]
    fn test_every_transition_moves_forward() {
        let actions = [
            PhaseAction::ConfigureScope,
            PhaseAction::SelectIdeas,
            PhaseAction::ExpandFeatures,
            PhaseAction::SelectProtoApp,
            PhaseAction::SubmitRefinementAnswer,
            PhaseAction::Complete,
        ];
        for phase in Phase::ALL {
            for action in actions {
                if let Some(next) = next_phase(*phase, action, REFINEMENT_QUESTION_COUNT) {
                    assert!(ensure_allowed(*phase, action).is_ok());
                    assert!(ensure_forward(*phase, next).is_ok());
                }
            }
        }
        assert!(ensure_forward(Phase::Visual, Phase::Spark).is_err());
        assert!(ensure_forward(Phase::Visual, Phase::Visual).is_err());
    }
}
