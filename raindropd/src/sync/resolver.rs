use std::collections::{HashMap, HashSet};

use crate::store::{BookmarkStore, NodeId, NodeKind};

use super::directory::CollectionDirectory;
use super::engine::EngineError;

/// Reserved collection ids ("unsorted" and friends) that never get a local
/// folder of their own.
const SYSTEM_COLLECTION_IDS: [&str; 3] = ["-1", "-99", "0"];

/// Per-query inputs that decide where a collection's folder chain bottoms
/// out.
#[derive(Debug, Clone, Copy)]
pub struct ResolveScope<'a> {
    pub target_root: &'a NodeId,
    /// Collection currently being imported at top level; it is not nested
    /// under its own folder.
    pub imported_root: Option<&'a str>,
    pub flatten: bool,
}

/// Maps collection ids onto local folders, creating ancestors before
/// descendants and memoizing handles for the duration of one run. The cache
/// is the at-most-one-folder-per-collection guarantee.
#[derive(Debug, Default)]
pub struct FolderResolver {
    cache: HashMap<String, NodeId>,
}

impl FolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve<S: BookmarkStore>(
        &mut self,
        store: &S,
        directory: &CollectionDirectory,
        scope: ResolveScope<'_>,
        collection_id: Option<&str>,
    ) -> Result<NodeId, EngineError> {
        let Some(start) = collection_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(scope.target_root.clone());
        };
        if scope.flatten {
            return Ok(scope.target_root.clone());
        }

        // Climb the ancestor chain until something that already maps to a
        // handle, recording the ids that still need folders (deepest first).
        let mut pending: Vec<(String, String)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = start.to_string();
        let base = loop {
            if terminates_at_root(&cursor, scope.imported_root) {
                break scope.target_root.clone();
            }
            if let Some(handle) = self.cache.get(cursor.as_str()) {
                break handle.clone();
            }
            let Some(record) = directory.get(&cursor) else {
                // Directory and remote are out of sync; fall back to the root.
                break scope.target_root.clone();
            };
            if !seen.insert(cursor.clone()) {
                return Err(EngineError::CollectionCycle(cursor));
            }
            pending.push((cursor.clone(), record.title.clone()));
            match &record.parent_id {
                Some(parent_id) => cursor = parent_id.clone(),
                None => break scope.target_root.clone(),
            }
        };

        // Walk back down, reusing folders left by earlier partial runs when
        // a child with the exact title already exists.
        let mut parent = base;
        for (id, title) in pending.into_iter().rev() {
            let existing = store
                .children_of(&parent)
                .await?
                .into_iter()
                .find(|child| child.kind == NodeKind::Folder && child.title == title);
            let handle = match existing {
                Some(folder) => folder.id,
                None => store.create_folder(&parent, &title).await?.id,
            };
            self.cache.insert(id, handle.clone());
            parent = handle;
        }
        Ok(parent)
    }
}

fn terminates_at_root(id: &str, imported_root: Option<&str>) -> bool {
    SYSTEM_COLLECTION_IDS.contains(&id) || imported_root == Some(id)
}
