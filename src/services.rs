//! The read-only services shared by the REST handlers and the MCP engine

use std::sync::Arc;

use crate::content::{
    AnnotationService, CollectionService, ContentExtractor, ContentService, FileExtractor,
    FulltextService,
};
use crate::search::SearchEngine;
use crate::storage::LibraryStore;

/// Built once at startup; nothing here is mutated afterwards
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn LibraryStore>,
    pub search: Arc<SearchEngine>,
    pub content: ContentService,
    pub fulltext: Arc<FulltextService>,
    pub annotations: Arc<AnnotationService>,
    pub collections: Arc<CollectionService>,
}

impl Services {
    pub fn new(store: Arc<dyn LibraryStore>, extractor: Arc<dyn ContentExtractor>) -> Self {
        let content = ContentService::new(store.clone(), extractor);
        Self {
            search: Arc::new(SearchEngine::new(store.clone())),
            fulltext: Arc::new(FulltextService::new(content.clone())),
            annotations: Arc::new(AnnotationService::new(store.clone())),
            collections: Arc::new(CollectionService::new(store.clone())),
            content,
            store,
        }
    }

    /// Services reading attachments from local disk
    pub fn with_file_extractor(store: Arc<dyn LibraryStore>) -> Self {
        Self::new(store, Arc::new(FileExtractor::new()))
    }
}
