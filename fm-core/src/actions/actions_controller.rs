use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use crate::actions::action::{Action, ActionId};
use crate::actions::actions_model::{ActionsDeps, ActionsModel};
use crate::fs::entry::Entry;

/// Keeps the actions model of the most recent selection, rebuilding it when
/// the selection changes or the model reports itself stale.
#[derive(Debug)]
pub struct ActionsController {
    deps: ActionsDeps,
    current: Mutex<Option<(String, Arc<ActionsModel>)>>,
}

fn selection_key(entries: &[Entry]) -> String {
    entries.iter().map(Entry::url).collect::<Vec<_>>().join("\n")
}

impl ActionsController {
    pub fn new(deps: ActionsDeps) -> Self {
        Self {
            deps,
            current: Mutex::new(None),
        }
    }

    pub fn deps(&self) -> &ActionsDeps {
        &self.deps
    }

    /// Initialized model for `entries`.
    pub async fn model_for(&self, entries: &[Entry]) -> Arc<ActionsModel> {
        if let Some(model) = self.cached(entries) {
            return model;
        }

        trace!(count = entries.len(), "Rebuilding actions model");
        let model = Arc::new(ActionsModel::new(self.deps.clone(), entries.to_vec()));
        model.initialize().await;
        *self.current.lock() = Some((selection_key(entries), model.clone()));
        model
    }

    /// Model for `entries` if it is already built and still valid.
    pub fn cached(&self, entries: &[Entry]) -> Option<Arc<ActionsModel>> {
        let key = selection_key(entries);
        self.current
            .lock()
            .as_ref()
            .filter(|(k, model)| *k == key && !model.is_invalidated())
            .map(|(_, model)| model.clone())
    }

    pub async fn action(&self, entries: &[Entry], id: &ActionId) -> Option<Arc<dyn Action>> {
        self.model_for(entries).await.get_action(id)
    }

    /// Drops the cached model, e.g. after the selection was cleared.
    pub fn reset(&self) {
        self.current.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::action::InternalActionId;
    use crate::test_support::TestEnv;

    #[tokio::test]
    async fn test_model_is_reused_until_invalidated() {
        let env = TestEnv::new();
        let controller = ActionsController::new(env.actions_deps());
        let folder = Entry::directory("drive", "/root/Work");
        let entries = vec![folder];

        let first = controller.model_for(&entries).await;
        let again = controller.model_for(&entries).await;
        assert!(Arc::ptr_eq(&first, &again));

        let create = ActionId::Internal(InternalActionId::CreateFolderShortcut);
        first.get_action(&create).unwrap().execute().await.unwrap();

        let rebuilt = controller.model_for(&entries).await;
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert!(
            rebuilt
                .get_action(&ActionId::Internal(InternalActionId::RemoveFolderShortcut))
                .is_some()
        );
    }
}
