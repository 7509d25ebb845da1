// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tether_core::{Hub, InteractionRegistry, Journal, LifecycleController, Repository};

use crate::config::Config;

/// Shared server state, wired from a concrete [`Repository`].
pub struct AppState {
    pub config: Config,
    pub repo: Arc<dyn Repository>,
    pub journal: Journal,
    pub hub: Hub,
    pub lifecycle: LifecycleController,
    pub interactions: InteractionRegistry,
}

impl AppState {
    pub fn new(config: Config, repo: Arc<dyn Repository>) -> Self {
        let journal = Journal::new(repo.clone());
        let hub = Hub::new();
        let lifecycle = LifecycleController::new(repo.clone(), journal.clone(), hub.clone());
        let interactions = InteractionRegistry::new(repo.clone(), journal.clone(), hub.clone());
        Self { config, repo, journal, hub, lifecycle, interactions }
    }
}
