use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Fixed identifier of the store's top-level toolbar location.
pub const TOOLBAR_ID: &str = "toolbar_____";

pub type NodeId = String;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown bookmark node: {0}")]
    MissingNode(NodeId),
    #[error("node is not a folder: {0}")]
    NotAFolder(NodeId),
    #[error("node is not a bookmark: {0}")]
    NotABookmark(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    Bookmark,
}

#[derive(Debug, Clone)]
pub struct BookmarkNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub title: String,
    pub url: Option<String>,
    pub kind: NodeKind,
}

/// Local hierarchical bookmark store boundary. Store operations are treated
/// as reliable local calls: failures abort the run and are never retried.
#[allow(async_fn_in_trait)]
pub trait BookmarkStore {
    fn toolbar_id(&self) -> NodeId;
    async fn search_by_title(&self, title: &str) -> Result<Vec<BookmarkNode>, StoreError>;
    async fn children_of(&self, folder: &NodeId) -> Result<Vec<BookmarkNode>, StoreError>;
    async fn create_folder(&self, parent: &NodeId, title: &str)
    -> Result<BookmarkNode, StoreError>;
    async fn create_bookmark(
        &self,
        parent: &NodeId,
        title: &str,
        url: &str,
    ) -> Result<BookmarkNode, StoreError>;
    async fn remove_bookmark(&self, id: &NodeId) -> Result<(), StoreError>;
    async fn remove_subtree(&self, id: &NodeId) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct NodeRecord {
    parent_id: Option<NodeId>,
    title: String,
    url: Option<String>,
    kind: NodeKind,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Inner {
    nodes: HashMap<NodeId, NodeRecord>,
    next_id: u64,
}

/// Nested JSON rendering of the store, written to disk after a sync.
#[derive(Debug, Serialize)]
pub struct SnapshotNode {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

/// In-memory bookmark tree with stable child ordering, rooted at the fixed
/// toolbar node.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            TOOLBAR_ID.to_string(),
            NodeRecord {
                parent_id: None,
                title: "Bookmarks Toolbar".to_string(),
                url: None,
                kind: NodeKind::Folder,
                children: Vec::new(),
            },
        );
        Self {
            inner: Mutex::new(Inner { nodes, next_id: 1 }),
        }
    }

    pub async fn snapshot(&self) -> SnapshotNode {
        let inner = self.inner.lock().await;
        inner.snapshot_node(TOOLBAR_ID)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn node(&self, id: &str) -> Result<&NodeRecord, StoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::MissingNode(id.to_string()))
    }

    fn view(&self, id: &str) -> Result<BookmarkNode, StoreError> {
        let record = self.node(id)?;
        Ok(BookmarkNode {
            id: id.to_string(),
            parent_id: record.parent_id.clone(),
            title: record.title.clone(),
            url: record.url.clone(),
            kind: record.kind,
        })
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = format!("node-{}", self.next_id);
        self.next_id += 1;
        id
    }

    fn attach(
        &mut self,
        parent: &NodeId,
        title: &str,
        url: Option<String>,
        kind: NodeKind,
    ) -> Result<BookmarkNode, StoreError> {
        if self.node(parent)?.kind != NodeKind::Folder {
            return Err(StoreError::NotAFolder(parent.clone()));
        }
        let id = self.alloc_id();
        self.nodes.insert(
            id.clone(),
            NodeRecord {
                parent_id: Some(parent.clone()),
                title: title.to_string(),
                url: url.clone(),
                kind,
                children: Vec::new(),
            },
        );
        if let Some(record) = self.nodes.get_mut(parent) {
            record.children.push(id.clone());
        }
        Ok(BookmarkNode {
            id,
            parent_id: Some(parent.clone()),
            title: title.to_string(),
            url,
            kind,
        })
    }

    fn detach(&mut self, id: &str) {
        if let Some(parent_id) = self.nodes.get(id).and_then(|node| node.parent_id.clone())
            && let Some(parent) = self.nodes.get_mut(&parent_id)
        {
            parent.children.retain(|child| child != id);
        }
    }

    fn remove_recursive(&mut self, id: &str) {
        if let Some(record) = self.nodes.remove(id) {
            for child in record.children {
                self.remove_recursive(&child);
            }
        }
    }

    fn snapshot_node(&self, id: &str) -> SnapshotNode {
        let Some(record) = self.nodes.get(id) else {
            return SnapshotNode {
                title: String::new(),
                url: None,
                children: Vec::new(),
            };
        };
        SnapshotNode {
            title: record.title.clone(),
            url: record.url.clone(),
            children: record
                .children
                .iter()
                .map(|child| self.snapshot_node(child))
                .collect(),
        }
    }
}

impl BookmarkStore for MemoryStore {
    fn toolbar_id(&self) -> NodeId {
        TOOLBAR_ID.to_string()
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<BookmarkNode>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .nodes
            .iter()
            .filter(|(_, record)| record.title == title)
            .map(|(id, _)| inner.view(id))
            .collect()
    }

    async fn children_of(&self, folder: &NodeId) -> Result<Vec<BookmarkNode>, StoreError> {
        let inner = self.inner.lock().await;
        let record = inner.node(folder)?;
        if record.kind != NodeKind::Folder {
            return Err(StoreError::NotAFolder(folder.clone()));
        }
        record.children.iter().map(|id| inner.view(id)).collect()
    }

    async fn create_folder(
        &self,
        parent: &NodeId,
        title: &str,
    ) -> Result<BookmarkNode, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.attach(parent, title, None, NodeKind::Folder)
    }

    async fn create_bookmark(
        &self,
        parent: &NodeId,
        title: &str,
        url: &str,
    ) -> Result<BookmarkNode, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.attach(parent, title, Some(url.to_string()), NodeKind::Bookmark)
    }

    async fn remove_bookmark(&self, id: &NodeId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.node(id)?.kind != NodeKind::Bookmark {
            return Err(StoreError::NotABookmark(id.clone()));
        }
        inner.detach(id);
        inner.nodes.remove(id.as_str());
        Ok(())
    }

    async fn remove_subtree(&self, id: &NodeId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.node(id)?;
        inner.detach(id);
        inner.remove_recursive(id);
        Ok(())
    }
}
