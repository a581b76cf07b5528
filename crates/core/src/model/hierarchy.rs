use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LearningContentId, ModuleId, SubModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HierarchyError {
    #[error("node title cannot be empty")]
    EmptyTitle,

    #[error("{node} already exists in course")]
    DuplicateNode { node: String },

    #[error("parent {parent} does not exist in course")]
    UnknownParent { parent: String },

    #[error("invalid content kind: {0}")]
    InvalidContentKind(String),
}

//
// ─── CONTENT KIND ──────────────────────────────────────────────────────────────
//

/// What a learning-content item presents to the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    Reading,
    Video,
    Quiz,
    Assignment,
    Image,
}

impl ContentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Reading => "reading",
            ContentKind::Video => "video",
            ContentKind::Quiz => "quiz",
            ContentKind::Assignment => "assignment",
            ContentKind::Image => "image",
        }
    }

    /// Parses the lowercase storage form.
    ///
    /// # Errors
    ///
    /// Returns `HierarchyError::InvalidContentKind` for unknown values.
    pub fn parse(s: &str) -> Result<Self, HierarchyError> {
        match s {
            "reading" => Ok(ContentKind::Reading),
            "video" => Ok(ContentKind::Video),
            "quiz" => Ok(ContentKind::Quiz),
            "assignment" => Ok(ContentKind::Assignment),
            "image" => Ok(ContentKind::Image),
            other => Err(HierarchyError::InvalidContentKind(other.to_owned())),
        }
    }
}

//
// ─── NODES ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub title: String,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubModuleNode {
    pub id: SubModuleId,
    pub module_id: ModuleId,
    pub title: String,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: LearningContentId,
    pub sub_module_id: SubModuleId,
    pub kind: ContentKind,
    pub title: String,
    pub position: u32,
}

/// Every id under a course, one set per hierarchy level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyIds {
    pub module_ids: Vec<ModuleId>,
    pub sub_module_ids: Vec<SubModuleId>,
    pub learning_content_ids: Vec<LearningContentId>,
}

impl HierarchyIds {
    /// Number of tracking rows a learner gets on enrollment (course row excluded).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.module_ids.len() + self.sub_module_ids.len() + self.learning_content_ids.len()
    }
}

/// Ancestors of a learning-content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentParents {
    pub sub_module_id: SubModuleId,
    pub module_id: ModuleId,
    pub course_id: CourseId,
}

//
// ─── COURSE TREE ───────────────────────────────────────────────────────────────
//

/// Arena of one course's hierarchy.
///
/// Nodes are keyed by id and point at their parent by id, so the tree can be
/// cloned, cached and shared without any ownership cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseTree {
    id: CourseId,
    title: String,
    modules: BTreeMap<ModuleId, ModuleNode>,
    sub_modules: BTreeMap<SubModuleId, SubModuleNode>,
    contents: BTreeMap<LearningContentId, ContentNode>,
}

impl CourseTree {
    /// Creates an empty course.
    ///
    /// # Errors
    ///
    /// Returns `HierarchyError::EmptyTitle` if the title is blank.
    pub fn new(id: CourseId, title: impl Into<String>) -> Result<Self, HierarchyError> {
        Ok(Self {
            id,
            title: non_empty(title.into())?,
            modules: BTreeMap::new(),
            sub_modules: BTreeMap::new(),
            contents: BTreeMap::new(),
        })
    }

    /// Adds a module to the course.
    ///
    /// # Errors
    ///
    /// Returns `EmptyTitle` or `DuplicateNode`.
    pub fn add_module(
        &mut self,
        id: ModuleId,
        title: impl Into<String>,
    ) -> Result<&mut Self, HierarchyError> {
        let title = non_empty(title.into())?;
        if self.modules.contains_key(&id) {
            return Err(HierarchyError::DuplicateNode {
                node: format!("{id:?}"),
            });
        }
        let position = u32::try_from(self.modules.len()).unwrap_or(u32::MAX);
        self.modules.insert(
            id,
            ModuleNode {
                id,
                title,
                position,
            },
        );
        Ok(self)
    }

    /// Adds a sub-module under an existing module.
    ///
    /// # Errors
    ///
    /// Returns `EmptyTitle`, `DuplicateNode`, or `UnknownParent`.
    pub fn add_sub_module(
        &mut self,
        id: SubModuleId,
        module_id: ModuleId,
        title: impl Into<String>,
    ) -> Result<&mut Self, HierarchyError> {
        let title = non_empty(title.into())?;
        if !self.modules.contains_key(&module_id) {
            return Err(HierarchyError::UnknownParent {
                parent: format!("{module_id:?}"),
            });
        }
        if self.sub_modules.contains_key(&id) {
            return Err(HierarchyError::DuplicateNode {
                node: format!("{id:?}"),
            });
        }
        let position = self.sub_module_ids_in_module(module_id).len();
        self.sub_modules.insert(
            id,
            SubModuleNode {
                id,
                module_id,
                title,
                position: u32::try_from(position).unwrap_or(u32::MAX),
            },
        );
        Ok(self)
    }

    /// Adds a learning-content item under an existing sub-module.
    ///
    /// # Errors
    ///
    /// Returns `EmptyTitle`, `DuplicateNode`, or `UnknownParent`.
    pub fn add_content(
        &mut self,
        id: LearningContentId,
        sub_module_id: SubModuleId,
        kind: ContentKind,
        title: impl Into<String>,
    ) -> Result<&mut Self, HierarchyError> {
        let title = non_empty(title.into())?;
        if !self.sub_modules.contains_key(&sub_module_id) {
            return Err(HierarchyError::UnknownParent {
                parent: format!("{sub_module_id:?}"),
            });
        }
        if self.contents.contains_key(&id) {
            return Err(HierarchyError::DuplicateNode {
                node: format!("{id:?}"),
            });
        }
        let position = self.content_ids_in_sub_module(sub_module_id).len();
        self.contents.insert(
            id,
            ContentNode {
                id,
                sub_module_id,
                kind,
                title,
                position: u32::try_from(position).unwrap_or(u32::MAX),
            },
        );
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn sub_modules(&self) -> impl Iterator<Item = &SubModuleNode> {
        self.sub_modules.values()
    }

    pub fn contents(&self) -> impl Iterator<Item = &ContentNode> {
        self.contents.values()
    }

    #[must_use]
    pub fn content(&self, id: LearningContentId) -> Option<&ContentNode> {
        self.contents.get(&id)
    }

    /// Full id sets of the course.
    #[must_use]
    pub fn hierarchy_ids(&self) -> HierarchyIds {
        HierarchyIds {
            module_ids: self.modules.keys().copied().collect(),
            sub_module_ids: self.sub_modules.keys().copied().collect(),
            learning_content_ids: self.contents.keys().copied().collect(),
        }
    }

    /// Resolves the sub-module, module and course owning a content item.
    #[must_use]
    pub fn parents(&self, content_id: LearningContentId) -> Option<ContentParents> {
        let content = self.contents.get(&content_id)?;
        let sub_module = self.sub_modules.get(&content.sub_module_id)?;
        Some(ContentParents {
            sub_module_id: sub_module.id,
            module_id: sub_module.module_id,
            course_id: self.id,
        })
    }

    #[must_use]
    pub fn content_ids_in_sub_module(&self, sub_module_id: SubModuleId) -> Vec<LearningContentId> {
        self.contents
            .values()
            .filter(|c| c.sub_module_id == sub_module_id)
            .map(|c| c.id)
            .collect()
    }

    #[must_use]
    pub fn sub_module_ids_in_module(&self, module_id: ModuleId) -> Vec<SubModuleId> {
        self.sub_modules
            .values()
            .filter(|s| s.module_id == module_id)
            .map(|s| s.id)
            .collect()
    }
}

fn non_empty(title: String) -> Result<String, HierarchyError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(HierarchyError::EmptyTitle);
    }
    Ok(trimmed.to_owned())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
