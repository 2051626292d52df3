use std::collections::HashSet;

use raindrop_core::{PAGE_SIZE, PageQuery, RaindropClient};

use crate::store::{BookmarkStore, NodeId};

use super::directory::CollectionDirectory;
use super::engine::EngineError;
use super::progress::{ProgressReporter, ProgressState};
use super::resolver::{FolderResolver, ResolveScope};

/// One logical query against the items endpoint: a single collection's
/// contents (scope = that collection's id) or a search across everything
/// (scope `"0"`).
#[derive(Debug, Clone)]
pub struct ImportQuery {
    pub scope: String,
    pub search: Option<String>,
    pub target_root: NodeId,
    pub imported_root: Option<String>,
}

/// Run-scoped state threaded through every query of one orchestrator run, so
/// overlapping queries share dedup and progress bookkeeping.
pub struct ImportPass<'a, S: BookmarkStore> {
    pub client: &'a RaindropClient,
    pub store: &'a S,
    pub directory: &'a CollectionDirectory,
    pub resolver: &'a mut FolderResolver,
    pub seen_items: &'a mut HashSet<String>,
    pub progress: &'a mut ProgressState,
    pub reporter: &'a ProgressReporter,
    pub flatten: bool,
}

impl<S: BookmarkStore> ImportPass<'_, S> {
    /// Pages through one query, creating a local leaf per previously unseen
    /// item. Returns the number of leaves created by this query alone;
    /// duplicates are skipped and counted nowhere.
    pub async fn run(&mut self, query: &ImportQuery) -> Result<u64, EngineError> {
        let mut page = 0u32;
        let mut created = 0u64;
        loop {
            let batch = self
                .client
                .raindrops_page(
                    &query.scope,
                    &PageQuery {
                        page,
                        per_page: PAGE_SIZE,
                        search: query.search.as_deref(),
                    },
                )
                .await?;
            if batch.items.is_empty() {
                break;
            }
            let full_page = batch.items.len() as u32 >= PAGE_SIZE;

            for item in &batch.items {
                if !self.seen_items.insert(item.id.clone()) {
                    continue;
                }
                let scope = ResolveScope {
                    target_root: &query.target_root,
                    imported_root: query.imported_root.as_deref(),
                    flatten: self.flatten,
                };
                let destination = self
                    .resolver
                    .resolve(
                        self.store,
                        self.directory,
                        scope,
                        item.collection.as_ref().map(|collection| collection.id.as_str()),
                    )
                    .await?;
                self.store
                    .create_bookmark(&destination, &item.title, &item.link)
                    .await?;
                created += 1;
                if self.progress.total > 0 {
                    self.progress.current += 1;
                    self.reporter.emit(*self.progress);
                }
            }

            // A short page is the last page; a met remote total means the
            // next page would only come back empty.
            if !full_page {
                break;
            }
            if let Some(count) = batch.count
                && created >= count
            {
                break;
            }
            page += 1;
        }
        Ok(created)
    }
}
