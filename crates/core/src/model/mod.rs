mod hierarchy;
mod ids;
mod progress;
mod quiz;

pub use ids::{
    AnswerOptionId, CourseId, LearningContentId, ModuleId, ParseIdError, QuestionId,
    QuizAttemptId, SubModuleId, UserId,
};

pub use hierarchy::{
    ContentKind, ContentNode, ContentParents, CourseTree, HierarchyError, HierarchyIds,
    ModuleNode, SubModuleNode,
};
pub use progress::{
    CompletionCount, EnrollmentStatus, LearningStatus, StatusParseError, UserCourseInfo,
    UserLearningProgress, UserModuleInfo, UserSubModuleInfo,
};
pub use quiz::{
    AnswerOption, NewQuizAttempt, Question, QuestionKind, QuizAttempt, QuizStateError, UserAnswer,
};
