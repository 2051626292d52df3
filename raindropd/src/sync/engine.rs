use std::collections::HashSet;
use std::str::FromStr;

use raindrop_core::{RaindropClient, RaindropError};
use thiserror::Error;
use tokio::sync::watch;

use crate::store::{BookmarkStore, NodeId, NodeKind, StoreError};

use super::directory::CollectionDirectory;
use super::import::{ImportPass, ImportQuery};
use super::progress::{ProgressReporter, ProgressState, ProgressUpdate};
use super::resolver::FolderResolver;

/// Items endpoint scope meaning "every collection".
const ALL_COLLECTIONS_SCOPE: &str = "0";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),
    #[error("api error: {0}")]
    Api(#[from] RaindropError),
    #[error("bookmark store error: {0}")]
    Store(#[from] StoreError),
    #[error("Collection(s) not found: {0}")]
    CollectionsNotFound(String),
    #[error("collection parent chain loops at id {0}")]
    CollectionCycle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Tag,
    Collection,
    All,
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "tag" => Ok(Self::Tag),
            "collection" => Ok(Self::Collection),
            "all" => Ok(Self::All),
            other => Err(format!("unknown import mode: {other}")),
        }
    }
}

/// One sync run's inputs. `config_value` holds comma-separated tag or
/// collection names; it is ignored for mode `all`.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub target_folder: String,
    pub mode: ImportMode,
    pub config_value: String,
    pub flatten: bool,
}

impl SyncSettings {
    fn validate(&self) -> Result<(), EngineError> {
        if self.target_folder.trim().is_empty() {
            return Err(EngineError::MissingSetting("target folder name"));
        }
        if matches!(self.mode, ImportMode::Tag | ImportMode::Collection)
            && split_config_values(&self.config_value).is_empty()
        {
            return Err(EngineError::MissingSetting("tag/collection value"));
        }
        Ok(())
    }
}

/// Terminal outcome of one run. The orchestrator converts every internal
/// error into a `Failure`, so callers render a message instead of handling
/// errors themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    Success { imported: u64, target_folder: String },
    Failure { message: String },
}

struct RunSummary {
    imported: u64,
    progress: ProgressState,
}

pub struct SyncEngine<S> {
    client: RaindropClient,
    store: S,
    progress: ProgressReporter,
}

impl<S: BookmarkStore> SyncEngine<S> {
    pub fn new(client: RaindropClient, store: S) -> Self {
        Self {
            client,
            store,
            progress: ProgressReporter::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressUpdate> {
        self.progress.subscribe()
    }

    /// Runs one full import. Every run starts from an emptied target folder;
    /// nothing placed there by a previous run survives.
    pub async fn import_all(&self, settings: &SyncSettings) -> SyncReport {
        if let Err(err) = settings.validate() {
            return SyncReport::Failure {
                message: err.to_string(),
            };
        }
        match self.run_import(settings).await {
            Ok(summary) => {
                self.progress.emit_complete(summary.progress);
                SyncReport::Success {
                    imported: summary.imported,
                    target_folder: settings.target_folder.clone(),
                }
            }
            // The run's directory, folder cache and dedup set live inside
            // run_import and are dropped with it, so a failed run leaves no
            // stale state behind.
            Err(err) => SyncReport::Failure {
                message: err.to_string(),
            },
        }
    }

    async fn run_import(&self, settings: &SyncSettings) -> Result<RunSummary, EngineError> {
        let mut directory = CollectionDirectory::new();
        directory.refresh(&self.client).await?;

        let target_root = self.prepare_target_folder(&settings.target_folder).await?;
        let queries = self
            .plan_queries(settings, &directory, &target_root)
            .await?;

        let mut progress = ProgressState::default();
        for query in &queries {
            // Best-effort pre-flight count; a failed call just leaves its
            // contribution at zero.
            match self
                .client
                .raindrop_count(&query.scope, query.search.as_deref())
                .await
            {
                Ok(count) => progress.total += count,
                Err(err) => {
                    eprintln!("[raindropd] warning: pre-flight count failed: {err}");
                }
            }
        }

        let mut resolver = FolderResolver::new();
        let mut seen_items = HashSet::new();
        let mut imported = 0u64;
        for query in &queries {
            let mut pass = ImportPass {
                client: &self.client,
                store: &self.store,
                directory: &directory,
                resolver: &mut resolver,
                seen_items: &mut seen_items,
                progress: &mut progress,
                reporter: &self.progress,
                flatten: settings.flatten,
            };
            imported += pass.run(query).await?;
        }
        Ok(RunSummary { imported, progress })
    }

    /// Finds or creates the named folder directly under the toolbar and
    /// empties it: folders recursively, leaves individually.
    async fn prepare_target_folder(&self, name: &str) -> Result<NodeId, EngineError> {
        let toolbar = self.store.toolbar_id();
        let existing = self
            .store
            .search_by_title(name)
            .await?
            .into_iter()
            .find(|node| {
                node.kind == NodeKind::Folder && node.parent_id.as_deref() == Some(toolbar.as_str())
            });
        let root = match existing {
            Some(folder) => folder.id,
            None => self.store.create_folder(&toolbar, name).await?.id,
        };
        for child in self.store.children_of(&root).await? {
            match child.kind {
                NodeKind::Folder => self.store.remove_subtree(&child.id).await?,
                NodeKind::Bookmark => self.store.remove_bookmark(&child.id).await?,
            }
        }
        Ok(root)
    }

    async fn plan_queries(
        &self,
        settings: &SyncSettings,
        directory: &CollectionDirectory,
        target_root: &NodeId,
    ) -> Result<Vec<ImportQuery>, EngineError> {
        match settings.mode {
            ImportMode::All => Ok(vec![ImportQuery {
                scope: ALL_COLLECTIONS_SCOPE.to_string(),
                search: None,
                target_root: target_root.clone(),
                imported_root: None,
            }]),
            ImportMode::Tag => Ok(split_config_values(&settings.config_value)
                .into_iter()
                .map(|tag| ImportQuery {
                    scope: ALL_COLLECTIONS_SCOPE.to_string(),
                    search: Some(tag_search_expression(&tag)),
                    target_root: target_root.clone(),
                    imported_root: None,
                })
                .collect()),
            ImportMode::Collection => {
                let names = split_config_values(&settings.config_value);
                let wrap_each = names.len() > 1;
                let mut resolved = Vec::new();
                let mut missing = Vec::new();
                for name in names {
                    match directory.lookup_by_title(&name) {
                        // Repeated names map to one id; planning it twice
                        // would leave a second, empty wrapper folder behind.
                        Some(id) if resolved.iter().any(|seen| seen == id) => {}
                        Some(id) => resolved.push(id.to_string()),
                        None => missing.push(name),
                    }
                }
                if resolved.is_empty() {
                    return Err(EngineError::CollectionsNotFound(missing.join(", ")));
                }
                if !missing.is_empty() {
                    eprintln!(
                        "[raindropd] warning: skipping unresolved collection(s): {}",
                        missing.join(", ")
                    );
                }

                let mut queries = Vec::new();
                for id in resolved {
                    // With several collections in one run, each one keeps its
                    // own titled subfolder under the target root.
                    let query_root = if wrap_each {
                        let title = directory
                            .get(&id)
                            .map(|record| record.title.clone())
                            .unwrap_or_else(|| id.clone());
                        self.store.create_folder(target_root, &title).await?.id
                    } else {
                        target_root.clone()
                    };
                    for scope in std::iter::once(id.clone()).chain(directory.descendants_of(&id)) {
                        queries.push(ImportQuery {
                            scope,
                            search: None,
                            target_root: query_root.clone(),
                            imported_root: Some(id.clone()),
                        });
                    }
                }
                Ok(queries)
            }
        }
    }
}

fn split_config_values(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// `work` and `#work` both become the service's quoted tag search form,
/// `#"work"`.
fn tag_search_expression(value: &str) -> String {
    let name = value.trim();
    let name = name.strip_prefix('#').unwrap_or(name).trim();
    format!("#\"{name}\"")
}
