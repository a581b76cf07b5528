use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
    raw: String,
}

impl ParseIdError {
    /// Name of the id type that failed to parse.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from {:?}", self.kind, self.raw)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                        raw: s.to_owned(),
                    })
            }
        }
    };
}

opaque_id!(
    /// Authenticated learner, as handed to the engine by the calling service layer.
    UserId
);
opaque_id!(
    /// Catalog course identifier.
    CourseId
);
opaque_id!(
    /// Catalog module identifier (child of a course).
    ModuleId
);
opaque_id!(
    /// Catalog sub-module identifier (child of a module).
    SubModuleId
);
opaque_id!(
    /// Catalog learning-content identifier (child of a sub-module).
    LearningContentId
);
opaque_id!(QuizAttemptId);
opaque_id!(QuestionId);
opaque_id!(AnswerOptionId);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_bare_number() {
        assert_eq!(CourseId::new(42).to_string(), "42");
        assert_eq!(LearningContentId::new(7).to_string(), "7");
    }

    #[test]
    fn debug_names_the_type() {
        assert_eq!(format!("{:?}", ModuleId::new(3)), "ModuleId(3)");
        assert_eq!(format!("{:?}", QuizAttemptId::new(11)), "QuizAttemptId(11)");
    }

    #[test]
    fn from_str_accepts_padded_numbers() {
        let id: UserId = " 123 ".parse().unwrap();
        assert_eq!(id, UserId::new(123));
    }

    #[test]
    fn from_str_rejects_garbage() {
        let err = "art-101".parse::<CourseId>().unwrap_err();
        assert_eq!(err.kind(), "CourseId");
        assert!(err.to_string().contains("art-101"));
    }

    #[test]
    fn negative_numbers_are_rejected() {
        assert!("-1".parse::<SubModuleId>().is_err());
    }
}
