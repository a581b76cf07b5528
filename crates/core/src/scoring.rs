//! Exact-match quiz scoring.
//!
//! A question awards its full points or nothing. Selections are compared
//! against the question's active correct options:
//!
//! - single-choice: the one selection must be a correct option;
//! - multi-choice: every correct option selected, no incorrect option selected.
//!
//! Selecting an option that is unknown to the question, retired, or marked
//! incorrect counts against the learner.

use std::collections::{BTreeMap, BTreeSet};

use bigdecimal::BigDecimal;

use crate::model::{AnswerOptionId, Question, QuestionId, QuestionKind, UserAnswer};

/// Per-question tally of the learner's selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionTally {
    pub total_correct: usize,
    pub selected_correct: usize,
    pub selected_incorrect: usize,
}

impl SelectionTally {
    /// Tallies de-duplicated selections for one question.
    #[must_use]
    pub fn new(question: &Question, selected: &BTreeSet<AnswerOptionId>) -> Self {
        let mut tally = Self {
            total_correct: question.correct_option_count(),
            ..Self::default()
        };
        for option_id in selected {
            match question.option(*option_id) {
                Some(option) if option.is_active && option.is_correct => {
                    tally.selected_correct += 1;
                }
                _ => tally.selected_incorrect += 1,
            }
        }
        tally
    }

    /// Applies the exact-match rule for the given question kind.
    #[must_use]
    pub fn is_correct(&self, kind: QuestionKind) -> bool {
        match kind {
            QuestionKind::SingleChoice => {
                self.selected_correct == 1 && self.selected_incorrect == 0
            }
            QuestionKind::MultiChoice => {
                self.total_correct > 0
                    && self.selected_correct == self.total_correct
                    && self.selected_incorrect == 0
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionScore {
    pub question_id: QuestionId,
    pub tally: SelectionTally,
    pub is_correct: bool,
    pub awarded: BigDecimal,
    pub possible: BigDecimal,
}

/// Result of grading an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptScore {
    pub total: BigDecimal,
    pub max: BigDecimal,
    pub questions: Vec<QuestionScore>,
}

impl AttemptScore {
    /// Whether `total / max` reaches `ratio` (0.0..=1.0).
    ///
    /// A quiz with nothing to score passes.
    #[must_use]
    pub fn passes(&self, ratio: &BigDecimal) -> bool {
        if self.max <= BigDecimal::from(0) {
            return true;
        }
        self.total >= &self.max * ratio
    }

    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_correct).count()
    }
}

/// Grades one question against a set of selected options.
#[must_use]
pub fn score_question(question: &Question, selected: &BTreeSet<AnswerOptionId>) -> QuestionScore {
    let tally = SelectionTally::new(question, selected);
    let is_correct = tally.is_correct(question.kind);
    QuestionScore {
        question_id: question.id,
        tally,
        is_correct,
        awarded: if is_correct {
            question.points.clone()
        } else {
            BigDecimal::from(0)
        },
        possible: question.points.clone(),
    }
}

/// Grades every active question of a quiz against the answers of one attempt.
///
/// Answers must already be restricted to the attempt being scored; answers
/// for questions outside `questions` are ignored.
#[must_use]
pub fn score_attempt(questions: &[Question], answers: &[UserAnswer]) -> AttemptScore {
    let mut by_question: BTreeMap<QuestionId, BTreeSet<AnswerOptionId>> = BTreeMap::new();
    for answer in answers {
        by_question
            .entry(answer.question_id)
            .or_default()
            .insert(answer.selected_option_id);
    }

    let empty = BTreeSet::new();
    let mut total = BigDecimal::from(0);
    let mut max = BigDecimal::from(0);
    let mut scored = Vec::with_capacity(questions.len());

    for question in questions.iter().filter(|q| q.is_active) {
        let selected = by_question.get(&question.id).unwrap_or(&empty);
        let score = score_question(question, selected);
        total += score.awarded.clone();
        max += score.possible.clone();
        scored.push(score);
    }

    AttemptScore {
        total,
        max,
        questions: scored,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, LearningContentId, QuizAttemptId};

    fn opt(id: u64) -> AnswerOptionId {
        AnswerOptionId::new(id)
    }

    fn single_choice() -> Question {
        Question::new(
            QuestionId::new(1),
            LearningContentId::new(1),
            QuestionKind::SingleChoice,
            BigDecimal::from(10),
            vec![
                AnswerOption::correct(opt(1)),
                AnswerOption::incorrect(opt(2)),
                AnswerOption::incorrect(opt(3)),
            ],
        )
        .unwrap()
    }

    fn multi_choice() -> Question {
        Question::new(
            QuestionId::new(2),
            LearningContentId::new(1),
            QuestionKind::MultiChoice,
            BigDecimal::from(10),
            vec![
                AnswerOption::correct(opt(11)),
                AnswerOption::correct(opt(12)),
                AnswerOption::incorrect(opt(13)),
                AnswerOption::incorrect(opt(14)),
            ],
        )
        .unwrap()
    }

    fn picks(ids: &[u64]) -> BTreeSet<AnswerOptionId> {
        ids.iter().copied().map(opt).collect()
    }

    fn answers(question: QuestionId, ids: &[u64]) -> Vec<UserAnswer> {
        ids.iter()
            .map(|id| UserAnswer {
                quiz_attempt_id: QuizAttemptId::new(1),
                question_id: question,
                selected_option_id: opt(*id),
            })
            .collect()
    }

    #[test]
    fn single_choice_requires_exactly_the_correct_option() {
        let q = single_choice();
        assert_eq!(score_question(&q, &picks(&[1])).awarded, BigDecimal::from(10));
        assert_eq!(score_question(&q, &picks(&[1, 2])).awarded, BigDecimal::from(0));
        assert_eq!(score_question(&q, &picks(&[3])).awarded, BigDecimal::from(0));
        assert_eq!(score_question(&q, &picks(&[])).awarded, BigDecimal::from(0));
    }

    #[test]
    fn multi_choice_has_no_partial_credit() {
        let q = multi_choice();
        assert!(score_question(&q, &picks(&[11, 12])).is_correct);
        assert!(!score_question(&q, &picks(&[11])).is_correct);
        assert!(!score_question(&q, &picks(&[11, 12, 13])).is_correct);

        let tally = score_question(&q, &picks(&[11, 13])).tally;
        assert_eq!(tally.total_correct, 2);
        assert_eq!(tally.selected_correct, 1);
        assert_eq!(tally.selected_incorrect, 1);
    }

    #[test]
    fn multi_choice_without_correct_options_never_scores() {
        let q = Question::new(
            QuestionId::new(3),
            LearningContentId::new(1),
            QuestionKind::MultiChoice,
            BigDecimal::from(5),
            vec![AnswerOption::incorrect(opt(1))],
        )
        .unwrap();
        assert!(!score_question(&q, &picks(&[])).is_correct);
    }

    #[test]
    fn unknown_or_retired_options_count_as_incorrect() {
        let mut q = multi_choice();
        q.options[1].is_active = false;
        // only option 11 is still an active correct option
        assert!(score_question(&q, &picks(&[11])).is_correct);
        assert!(!score_question(&q, &picks(&[11, 12])).is_correct);
        assert!(!score_question(&q, &picks(&[11, 99])).is_correct);
    }

    #[test]
    fn attempt_total_sums_active_questions_only() {
        let single = single_choice();
        let multi = multi_choice();
        let mut retired = single_choice();
        retired.id = QuestionId::new(9);
        retired.is_active = false;

        let mut recorded = answers(single.id, &[1]);
        recorded.extend(answers(multi.id, &[11, 12]));
        recorded.extend(answers(retired.id, &[1]));
        // duplicate rows for one option collapse into a single selection
        recorded.extend(answers(multi.id, &[12]));

        let score = score_attempt(&[single, multi, retired], &recorded);
        assert_eq!(score.total, BigDecimal::from(20));
        assert_eq!(score.max, BigDecimal::from(20));
        assert_eq!(score.questions.len(), 2);
        assert_eq!(score.correct_count(), 2);
    }

    #[test]
    fn unanswered_questions_score_zero() {
        let score = score_attempt(&[single_choice(), multi_choice()], &[]);
        assert_eq!(score.total, BigDecimal::from(0));
        assert_eq!(score.max, BigDecimal::from(20));
    }

    #[test]
    fn pass_ratio_is_inclusive() {
        let single = single_choice();
        let multi = multi_choice();
        let score = score_attempt(&[single.clone(), multi], &answers(single.id, &[1]));
        let half: BigDecimal = "0.5".parse().unwrap();
        let most: BigDecimal = "0.75".parse().unwrap();
        assert!(score.passes(&half));
        assert!(!score.passes(&most));
    }
}
