//! Process-wide shared state handed to every handler, grounded on the
//! teacher's `AppState` shape (`Arc`-cloned handles passed into each
//! connection task rather than a global `static`).

use std::sync::Arc;

use crate::config::Config;
use crate::descriptors::HandleCache;
use crate::graph::engine::GraphEngine;
use crate::media::{RemoteOpClient, UserOpRegistry};

#[derive(Clone)]
pub struct AppContext {
    pub graph: GraphEngine,
    pub descriptors: Arc<HandleCache>,
    pub user_ops: UserOpRegistry,
    pub remote: RemoteOpClient,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        AppContext {
            graph: GraphEngine::new(),
            descriptors: Arc::new(HandleCache::new()),
            user_ops: UserOpRegistry::new(),
            remote: RemoteOpClient::new(),
            config: Arc::new(config),
        }
    }
}
