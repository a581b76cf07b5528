mod common;

use progress_core::BigDecimal;
use progress_core::model::{
    AnswerOptionId, CourseId, LearningStatus, ModuleId, QuestionId, SubModuleId, UserId,
};
use progress_core::time::fixed_now;
use services::{Clock, EngineConfig, EngineError, ErrorKind, ProgressEngine};
use storage::repository::{Storage, TrackingStore, TrackingTx};

use common::{COURSE, QUIZ, content};

async fn memory_engine() -> ProgressEngine {
    let engine = ProgressEngine::in_memory(Clock::fixed(fixed_now()));
    common::seed(engine.storage()).await;
    engine
}

#[tokio::test]
async fn enrollment_fans_out_one_row_per_node() {
    let storage = Storage::sqlite("sqlite:file:memdb_engine_fan_out?mode=memory&cache=shared")
        .await
        .expect("connect sqlite");
    common::seed(&storage).await;
    let engine = ProgressEngine::new(storage, Clock::fixed(fixed_now()), EngineConfig::default());
    let user = UserId::new(7);

    let info = engine
        .enroll(user, CourseId::new(COURSE))
        .await
        .expect("enroll");
    assert_eq!(info.progress_percent, 0);
    assert_eq!(info.learning_status, LearningStatus::NotStarted);

    let overview = engine
        .course_progress(user, CourseId::new(COURSE))
        .await
        .expect("overview");
    assert_eq!(overview.modules.total, 2);
    assert_eq!(overview.sub_modules.total, 3);
    assert_eq!(overview.contents.total, 10);
    assert_eq!(overview.contents.completed, 0);

    // Another learner's enrollment is independent.
    engine
        .enroll(UserId::new(8), CourseId::new(COURSE))
        .await
        .expect("second learner");
}

#[tokio::test]
async fn second_enrollment_is_rejected_and_leaves_rows_alone() {
    let engine = memory_engine().await;
    let user = UserId::new(1);
    let course = CourseId::new(COURSE);

    let first = engine.enroll(user, course).await.expect("enroll");
    engine
        .start_learning_content(user, content(1))
        .await
        .expect("start");

    let err = engine.enroll(user, course).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyEnrolled { .. }));
    assert_eq!(err.kind(), ErrorKind::AlreadyEnrolled);
    assert!(!err.is_retryable());

    let mut tx = engine.storage().tracking.begin().await.expect("begin");
    let course_row = tx.course_info(user, course).await.unwrap().unwrap();
    assert_eq!(course_row, first);
    let row = tx.learning_progress(user, content(1)).await.unwrap().unwrap();
    assert_eq!(row.attempts, 1);
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn sub_module_completes_only_with_its_last_item() {
    let engine = memory_engine().await;
    let user = UserId::new(1);
    engine.enroll(user, CourseId::new(COURSE)).await.unwrap();

    for id in 1..=3 {
        engine.complete_learning_content(user, content(id)).await.unwrap();
    }
    let mut tx = engine.storage().tracking.begin().await.unwrap();
    let sub = tx.sub_module_info(user, SubModuleId::new(1)).await.unwrap().unwrap();
    assert!(!sub.is_completed());
    tx.rollback().await.unwrap();

    engine.complete_learning_content(user, content(4)).await.unwrap();
    let mut tx = engine.storage().tracking.begin().await.unwrap();
    let sub = tx.sub_module_info(user, SubModuleId::new(1)).await.unwrap().unwrap();
    assert_eq!(sub.completed_at, Some(fixed_now()));
    // Sub-module 2 is still open, so module 1 stays open.
    let module = tx.module_info(user, ModuleId::new(1)).await.unwrap().unwrap();
    assert!(!module.is_completed());
    tx.rollback().await.unwrap();

    for id in 5..=6 {
        engine.complete_learning_content(user, content(id)).await.unwrap();
    }
    let mut tx = engine.storage().tracking.begin().await.unwrap();
    let module = tx.module_info(user, ModuleId::new(1)).await.unwrap().unwrap();
    assert!(module.is_completed());
    let other = tx.module_info(user, ModuleId::new(2)).await.unwrap().unwrap();
    assert!(!other.is_completed());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn course_percentage_tracks_completed_items() {
    let engine = memory_engine().await;
    let user = UserId::new(1);
    let course = CourseId::new(COURSE);
    engine.enroll(user, course).await.unwrap();

    for id in 1..=3 {
        engine.complete_learning_content(user, content(id)).await.unwrap();
    }
    let overview = engine.course_progress(user, course).await.unwrap();
    assert_eq!(overview.course.progress_percent, 30);
    assert_eq!(overview.course.learning_status, LearningStatus::InProgress);
    assert_eq!(overview.course.completed_at, None);

    for id in 4..=10 {
        engine.complete_learning_content(user, content(id)).await.unwrap();
    }
    let overview = engine.course_progress(user, course).await.unwrap();
    assert_eq!(overview.course.progress_percent, 100);
    assert_eq!(overview.course.learning_status, LearningStatus::Completed);
    assert_eq!(overview.course.completed_at, Some(fixed_now()));
    assert_eq!(overview.modules.completed, 2);
    assert_eq!(overview.sub_modules.completed, 3);
}

#[tokio::test]
async fn single_and_multi_choice_have_no_partial_credit() {
    let engine = memory_engine().await;
    let user = UserId::new(1);
    engine.enroll(user, CourseId::new(COURSE)).await.unwrap();

    let single = QuestionId::new(1);
    let multi = QuestionId::new(2);
    let opt = AnswerOptionId::new;
    let cases: Vec<(Vec<(QuestionId, AnswerOptionId)>, u32)> = vec![
        (vec![(single, opt(1))], 10),
        (vec![(single, opt(1)), (single, opt(2))], 0),
        (vec![(single, opt(3))], 0),
        (vec![(multi, opt(11)), (multi, opt(12))], 10),
        (vec![(multi, opt(11))], 0),
        (vec![(multi, opt(11)), (multi, opt(12)), (multi, opt(13))], 0),
        (vec![(single, opt(1)), (multi, opt(12)), (multi, opt(11))], 20),
        (vec![], 0),
    ];

    for (selections, expected) in cases {
        let attempt = engine
            .create_quiz_attempt(user, content(QUIZ))
            .await
            .unwrap();
        engine
            .submit_quiz_answers(attempt.id, &selections)
            .await
            .unwrap();
        let total = engine.score_attempt(attempt.id).await.unwrap();
        assert_eq!(total, BigDecimal::from(expected), "selections {selections:?}");
    }
}

#[tokio::test]
async fn scored_attempt_cannot_be_scored_again() {
    let engine = memory_engine().await;
    let user = UserId::new(1);
    engine.enroll(user, CourseId::new(COURSE)).await.unwrap();

    let attempt = engine
        .create_quiz_attempt(user, content(QUIZ))
        .await
        .unwrap();
    engine.score_attempt(attempt.id).await.unwrap();

    let err = engine.score_attempt(attempt.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AttemptAlreadyCompleted(id) if id == attempt.id));
    assert_eq!(err.kind().as_str(), "attempt_already_completed");
}

#[tokio::test]
async fn passing_quiz_completes_the_item() {
    let engine = memory_engine().await;
    let user = UserId::new(1);
    let course = CourseId::new(COURSE);
    engine.enroll(user, course).await.unwrap();

    let failed = engine
        .create_quiz_attempt(user, content(QUIZ))
        .await
        .unwrap();
    engine
        .submit_quiz_answers(failed.id, &[(QuestionId::new(1), AnswerOptionId::new(2))])
        .await
        .unwrap();
    let outcome = engine.finish_quiz(failed.id).await.unwrap();
    assert!(!outcome.passed);
    assert!(outcome.progress.is_none());
    assert_eq!(outcome.scored.score.max, BigDecimal::from(20));

    let passed = engine
        .create_quiz_attempt(user, content(QUIZ))
        .await
        .unwrap();
    engine
        .submit_quiz_answers(
            passed.id,
            &[
                (QuestionId::new(1), AnswerOptionId::new(1)),
                (QuestionId::new(2), AnswerOptionId::new(11)),
                (QuestionId::new(2), AnswerOptionId::new(12)),
            ],
        )
        .await
        .unwrap();
    let outcome = engine.finish_quiz(passed.id).await.unwrap();
    assert!(outcome.passed);
    assert_eq!(outcome.scored.score.correct_count(), 2);
    let progress = outcome.progress.expect("quiz item completed");
    assert_eq!(progress.status, LearningStatus::Completed);
    assert_eq!(progress.score, Some(BigDecimal::from(20)));

    let overview = engine.course_progress(user, course).await.unwrap();
    assert_eq!(overview.contents.completed, 1);
    assert_eq!(overview.course.progress_percent, 10);
}
