use std::collections::HashMap;
use std::sync::Arc;

use progress_core::model::{ContentParents, CourseId, CourseTree, HierarchyIds, LearningContentId};
use storage::repository::CatalogRepository;
use tokio::sync::RwLock;

use crate::error::EngineError;

/// Read-only view of the course catalog with a per-course tree cache.
///
/// The catalog is owned by course authoring; call [`HierarchyReader::invalidate`]
/// after a course structure changes.
pub struct HierarchyReader {
    catalog: Arc<dyn CatalogRepository>,
    trees: RwLock<HashMap<CourseId, Arc<CourseTree>>>,
}

impl HierarchyReader {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            catalog,
            trees: RwLock::new(HashMap::new()),
        }
    }

    /// Loads (or returns the cached) tree for a course.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CourseNotFound` if the catalog has no such course.
    pub async fn course_tree(&self, course_id: CourseId) -> Result<Arc<CourseTree>, EngineError> {
        if let Some(tree) = self.trees.read().await.get(&course_id) {
            return Ok(Arc::clone(tree));
        }

        let tree = self
            .catalog
            .course_tree(course_id)
            .await?
            .ok_or(EngineError::CourseNotFound(course_id))?;
        let tree = Arc::new(tree);
        self.trees
            .write()
            .await
            .insert(course_id, Arc::clone(&tree));
        tracing::debug!(%course_id, "cached course tree");
        Ok(tree)
    }

    /// Module, sub-module and learning-content ids of a course.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CourseNotFound` if the course does not exist.
    pub async fn hierarchy_ids(&self, course_id: CourseId) -> Result<HierarchyIds, EngineError> {
        Ok(self.course_tree(course_id).await?.hierarchy_ids())
    }

    /// Resolves the owning sub-module, module and course of a content item,
    /// together with the course tree for the following rollups.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ContentNotFound` if the item is not in the catalog.
    pub async fn parents(
        &self,
        content_id: LearningContentId,
    ) -> Result<(Arc<CourseTree>, ContentParents), EngineError> {
        let cached = self
            .trees
            .read()
            .await
            .values()
            .find(|tree| tree.content(content_id).is_some())
            .cloned();

        let tree = match cached {
            Some(tree) => tree,
            None => {
                let course_id = self
                    .catalog
                    .course_for_content(content_id)
                    .await?
                    .ok_or(EngineError::ContentNotFound(content_id))?;
                self.course_tree(course_id).await.map_err(|err| match err {
                    EngineError::CourseNotFound(_) => EngineError::ContentNotFound(content_id),
                    other => other,
                })?
            }
        };

        let parents = tree
            .parents(content_id)
            .ok_or(EngineError::ContentNotFound(content_id))?;
        Ok((tree, parents))
    }

    pub async fn invalidate(&self, course_id: CourseId) {
        self.trees.write().await.remove(&course_id);
    }
}

#[cfg(test)]
mod tests {
    use progress_core::model::{ContentKind, ModuleId, SubModuleId};
    use storage::repository::InMemoryRepository;

    use super::*;

    async fn reader() -> (InMemoryRepository, HierarchyReader) {
        let repo = InMemoryRepository::new();
        let mut tree = CourseTree::new(CourseId::new(1), "Gothic cathedrals").unwrap();
        tree.add_module(ModuleId::new(1), "Chartres").unwrap();
        tree.add_sub_module(SubModuleId::new(1), ModuleId::new(1), "Stained glass")
            .unwrap();
        tree.add_content(
            LearningContentId::new(1),
            SubModuleId::new(1),
            ContentKind::Image,
            "Rose window",
        )
        .unwrap();
        repo.upsert_course_tree(&tree).await.unwrap();
        let reader = HierarchyReader::new(Arc::new(repo.clone()));
        (repo, reader)
    }

    #[tokio::test]
    async fn resolves_parents_and_ids() {
        let (_repo, reader) = reader().await;

        let (_, parents) = reader.parents(LearningContentId::new(1)).await.unwrap();
        assert_eq!(parents.sub_module_id, SubModuleId::new(1));
        assert_eq!(parents.module_id, ModuleId::new(1));
        assert_eq!(parents.course_id, CourseId::new(1));

        let ids = reader.hierarchy_ids(CourseId::new(1)).await.unwrap();
        assert_eq!(ids.node_count(), 3);
    }

    #[tokio::test]
    async fn unknown_nodes_map_to_not_found() {
        let (_repo, reader) = reader().await;
        assert!(matches!(
            reader.course_tree(CourseId::new(9)).await,
            Err(EngineError::CourseNotFound(_))
        ));
        assert!(matches!(
            reader.parents(LearningContentId::new(9)).await,
            Err(EngineError::ContentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalidate_reloads_changed_courses() {
        let (repo, reader) = reader().await;
        assert_eq!(
            reader.hierarchy_ids(CourseId::new(1)).await.unwrap().node_count(),
            3
        );

        let mut tree = (*reader.course_tree(CourseId::new(1)).await.unwrap()).clone();
        tree.add_content(
            LearningContentId::new(2),
            SubModuleId::new(1),
            ContentKind::Reading,
            "Flying buttresses",
        )
        .unwrap();
        repo.upsert_course_tree(&tree).await.unwrap();

        assert_eq!(
            reader.hierarchy_ids(CourseId::new(1)).await.unwrap().node_count(),
            3
        );
        reader.invalidate(CourseId::new(1)).await;
        assert_eq!(
            reader.hierarchy_ids(CourseId::new(1)).await.unwrap().node_count(),
            4
        );
    }
}
