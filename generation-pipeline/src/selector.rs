use std::cmp::Ordering;

use common::storage::types::video_candidate::{CandidateStatus, VideoCandidate};

/// Picks the passing candidate with the highest final score; ties go to the lowest index.
pub fn select_best(candidates: &[VideoCandidate]) -> Option<&VideoCandidate> {
    candidates
        .iter()
        .filter(|c| c.status == CandidateStatus::Completed && c.qa_passed)
        .filter_map(|c| c.final_score.map(|score| (c, score)))
        .min_by(|(a, a_score), (b, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(Ordering::Equal)
                .then(a.candidate_index.cmp(&b.candidate_index))
        })
        .map(|(candidate, _)| candidate)
}

/// With QA disabled the first candidate to finish wins; `completed` is in completion order.
pub fn first_completed(completed: &[VideoCandidate]) -> Option<&VideoCandidate> {
    completed
        .iter()
        .find(|c| c.status == CandidateStatus::Completed)
}

#[cfg(test)]
mod tests {
    use common::storage::types::shot_plan::PromptVariant;

    use super::*;

    fn candidate(index: u32, score: Option<f64>, passed: bool) -> VideoCandidate {
        let mut c = VideoCandidate::new("job", index, 0, PromptVariant::Standard);
        c.status = CandidateStatus::Completed;
        c.final_score = score;
        c.qa_passed = passed;
        c
    }

    #[test]
    fn highest_passing_score_wins() {
        let pool = vec![
            candidate(0, Some(0.90), true),
            candidate(1, Some(0.74), true),
            candidate(2, Some(0.86), true),
            candidate(3, Some(0.95), false),
        ];
        assert_eq!(select_best(&pool).map(|c| c.candidate_index), Some(0));
    }

    #[test]
    fn ties_break_to_lowest_index() {
        let pool = vec![
            candidate(3, Some(0.80), true),
            candidate(1, Some(0.80), true),
            candidate(2, Some(0.79), true),
        ];
        assert_eq!(select_best(&pool).map(|c| c.candidate_index), Some(1));
    }

    #[test]
    fn nothing_passing_selects_nothing() {
        let mut failed = candidate(0, None, false);
        failed.status = CandidateStatus::Failed;
        let pool = vec![failed, candidate(1, Some(0.4), false), candidate(2, None, false)];
        assert!(select_best(&pool).is_none());
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn first_completed_follows_completion_order() {
        let pool = vec![candidate(2, None, false), candidate(0, None, false)];
        assert_eq!(first_completed(&pool).map(|c| c.candidate_index), Some(2));
    }
}
