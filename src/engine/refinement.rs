//! Fixed refinement interviews: ten product-manager questions followed by ten
//! architect questions.

use serde::Serialize;

use super::phase::{Phase, REFINEMENT_QUESTION_COUNT};
use super::types::RefinementRole;

pub const PRODUCT_MANAGER_QUESTIONS: [&str; REFINEMENT_QUESTION_COUNT] = [
    "Who is the primary user, and what situation are they in when they reach for this app?",
    "What is the single most painful problem this product solves for them?",
    "How do they solve that problem today, and why is that not good enough?",
    "What does success look like for a user after their first week?",
    "Which feature would you cut last if scope had to shrink?",
    "How will the product make money, or how will it sustain itself?",
    "What would make a user recommend this to a friend?",
    "Which competitor or alternative worries you most, and why?",
    "What metric will tell you the product is working?",
    "What is explicitly out of scope for the first release?",
];

pub const ARCHITECT_QUESTIONS: [&str; REFINEMENT_QUESTION_COUNT] = [
    "Which platforms must the first release run on (web, iOS, Android, desktop)?",
    "Does the app need to work offline, and what must sync when it reconnects?",
    "What user data will be stored, and what are the privacy or compliance constraints?",
    "How many users do you expect in the first year, and how spiky is the traffic?",
    "Which third-party services or APIs are essential versus nice to have?",
    "How will users sign in, and do you need roles or team accounts?",
    "Which parts of the experience must feel real-time?",
    "What content or data needs search, ranking, or recommendations?",
    "What is the budget and team size for building and running it?",
    "Which part of the system is the biggest technical risk?",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementQuestion {
    pub role: RefinementRole,
    /// 1-based.
    pub index: usize,
    pub total: usize,
    pub question: &'static str,
}

/// The interview a refinement phase runs, if any.
pub fn role_for_phase(phase: Phase) -> Option<RefinementRole> {
    match phase {
        Phase::ProductRefinement => Some(RefinementRole::ProductManager),
        Phase::TechnicalRefinement => Some(RefinementRole::Architect),
        _ => None,
    }
}

pub fn questions(role: RefinementRole) -> &'static [&'static str; REFINEMENT_QUESTION_COUNT] {
    match role {
        RefinementRole::ProductManager => &PRODUCT_MANAGER_QUESTIONS,
        RefinementRole::Architect => &ARCHITECT_QUESTIONS,
    }
}

/// The question after `answered` answers, or `None` once the interview is done.
pub fn next_question(role: RefinementRole, answered: usize) -> Option<RefinementQuestion> {
    questions(role).get(answered).map(|question| RefinementQuestion {
        role,
        index: answered + 1,
        total: REFINEMENT_QUESTION_COUNT,
        question,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_follow_phases() {
        assert_eq!(
            role_for_phase(Phase::ProductRefinement),
            Some(RefinementRole::ProductManager)
        );
        assert_eq!(
            role_for_phase(Phase::TechnicalRefinement),
            Some(RefinementRole::Architect)
        );
        assert_eq!(role_for_phase(Phase::Visual), None);
    }

    #[test]
    fn test_interview_runs_ten_questions() {
        let first = next_question(RefinementRole::Architect, 0).unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.question, ARCHITECT_QUESTIONS[0]);
        let last = next_question(RefinementRole::ProductManager, 9).unwrap();
        assert_eq!(last.index, 10);
        assert!(next_question(RefinementRole::ProductManager, 10).is_none());
    }
}
