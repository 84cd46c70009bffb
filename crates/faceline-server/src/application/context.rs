//! Everything a connection task needs, built once at startup.

use std::sync::Arc;

use faceline_core::Matcher;

use super::registry::SessionRegistry;
use super::subject_store::SubjectStore;
use crate::domain::ServerConfig;

/// Shared state handed to every connection task as `Arc<ServerContext>`.
pub struct ServerContext {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn SubjectStore>,
    /// Cheap to clone; the extractor inside is shared.
    pub matcher: Matcher,
}

impl ServerContext {
    /// Builds a context with a fresh, empty registry.
    pub fn new(config: ServerConfig, store: Arc<dyn SubjectStore>, matcher: Matcher) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            store,
            matcher,
        }
    }
}
