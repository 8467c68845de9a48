//! Deterministic question selection for test attempts.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use crate::model::{AttemptConfig, AttemptSeed, LessonId, Question, QuestionId, Role};

/// Picks the questions presented in one attempt.
///
/// For learners the subset and its order depend only on `(lesson, seed)`, so
/// rendering the same in-progress attempt twice yields the same sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionSelector {
    max_questions: usize,
}

impl QuestionSelector {
    #[must_use]
    pub fn new(max_questions: usize) -> Self {
        Self { max_questions }
    }

    #[must_use]
    pub fn from_config(config: &AttemptConfig) -> Self {
        Self::new(config.max_questions())
    }

    /// Select the question set for `role`.
    ///
    /// Administrators preview the full bank in authored order. Learners get
    /// `min(max_questions, bank.len())` questions in a seeded shuffle.
    #[must_use]
    pub fn select(
        &self,
        bank: &[Question],
        role: Role,
        lesson_id: LessonId,
        seed: AttemptSeed,
    ) -> Vec<Question> {
        if role.is_admin() {
            return bank.to_vec();
        }

        let mut rng = StdRng::seed_from_u64(mix(lesson_id, seed));
        let mut picked = bank.to_vec();
        picked.shuffle(&mut rng);
        picked.truncate(self.max_questions);
        picked
    }

    /// Rebuild a previously presented set from its persisted order.
    ///
    /// Returns `None` if the order is empty, repeats an id, or names a question
    /// no longer in the bank.
    #[must_use]
    pub fn reorder(bank: &[Question], order: &[QuestionId]) -> Option<Vec<Question>> {
        if order.is_empty() {
            return None;
        }
        let mut seen = HashSet::with_capacity(order.len());
        let mut out = Vec::with_capacity(order.len());
        for id in order {
            if !seen.insert(*id) {
                return None;
            }
            out.push(bank.iter().find(|q| q.id() == *id)?.clone());
        }
        Some(out)
    }
}

impl Default for QuestionSelector {
    fn default() -> Self {
        Self::from_config(&AttemptConfig::default())
    }
}

fn mix(lesson_id: LessonId, seed: AttemptSeed) -> u64 {
    lesson_id
        .value()
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .rotate_left(29)
        ^ seed.value()
}
