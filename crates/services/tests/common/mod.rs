#![allow(dead_code)]

use progress_core::BigDecimal;
use progress_core::model::{
    AnswerOption, AnswerOptionId, ContentKind, CourseId, CourseTree, LearningContentId, ModuleId,
    Question, QuestionId, QuestionKind, SubModuleId,
};
use storage::repository::Storage;

pub const COURSE: u64 = 10;
pub const QUIZ: u64 = 10;

/// Two modules, three sub-modules, ten items; item 10 is a quiz.
///
/// Module 1 holds sub-module 1 (items 1-4) and sub-module 2 (items 5-6);
/// module 2 holds sub-module 3 (items 7-10).
pub fn course_tree() -> CourseTree {
    let mut tree = CourseTree::new(CourseId::new(COURSE), "Baroque painting").unwrap();
    tree.add_module(ModuleId::new(1), "Caravaggio").unwrap();
    tree.add_module(ModuleId::new(2), "Rembrandt").unwrap();
    tree.add_sub_module(SubModuleId::new(1), ModuleId::new(1), "Chiaroscuro")
        .unwrap();
    tree.add_sub_module(SubModuleId::new(2), ModuleId::new(1), "Naturalism")
        .unwrap();
    tree.add_sub_module(SubModuleId::new(3), ModuleId::new(2), "Night Watch")
        .unwrap();
    for id in 1..=10u64 {
        let sub = match id {
            1..=4 => 1,
            5..=6 => 2,
            _ => 3,
        };
        let kind = if id == QUIZ {
            ContentKind::Quiz
        } else {
            ContentKind::Reading
        };
        tree.add_content(
            LearningContentId::new(id),
            SubModuleId::new(sub),
            kind,
            format!("Lesson {id}"),
        )
        .unwrap();
    }
    tree
}

/// Single-choice question 1 (option 1 correct, 2 and 3 wrong) and
/// multi-choice question 2 (options 11 and 12 correct, 13 and 14 wrong),
/// ten points each.
pub fn quiz_questions() -> Vec<Question> {
    vec![
        Question::new(
            QuestionId::new(1),
            LearningContentId::new(QUIZ),
            QuestionKind::SingleChoice,
            BigDecimal::from(10),
            vec![
                AnswerOption::correct(AnswerOptionId::new(1)),
                AnswerOption::incorrect(AnswerOptionId::new(2)),
                AnswerOption::incorrect(AnswerOptionId::new(3)),
            ],
        )
        .unwrap(),
        Question::new(
            QuestionId::new(2),
            LearningContentId::new(QUIZ),
            QuestionKind::MultiChoice,
            BigDecimal::from(10),
            vec![
                AnswerOption::correct(AnswerOptionId::new(11)),
                AnswerOption::correct(AnswerOptionId::new(12)),
                AnswerOption::incorrect(AnswerOptionId::new(13)),
                AnswerOption::incorrect(AnswerOptionId::new(14)),
            ],
        )
        .unwrap(),
    ]
}

pub async fn seed(storage: &Storage) {
    storage
        .catalog
        .upsert_course_tree(&course_tree())
        .await
        .expect("seed course");
    for question in quiz_questions() {
        storage
            .catalog
            .upsert_question(&question)
            .await
            .expect("seed question");
    }
}

pub fn content(id: u64) -> LearningContentId {
    LearningContentId::new(id)
}
