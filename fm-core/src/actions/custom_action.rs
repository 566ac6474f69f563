use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::actions::action::{Action, ActionId, Invalidator};
use crate::error::AppError;
use crate::fs::entry::Entry;
use crate::services::private_api::PrivateApi;

/// Action supplied by a file-system provider and executed by it.
pub struct CustomAction {
    entries: Vec<Entry>,
    id: ActionId,
    title: Option<String>,
    api: Arc<dyn PrivateApi>,
    invalidator: Invalidator,
}

impl std::fmt::Debug for CustomAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomAction")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl CustomAction {
    pub fn new(
        entries: &[Entry],
        id: ActionId,
        title: Option<String>,
        api: Arc<dyn PrivateApi>,
        invalidator: Invalidator,
    ) -> Self {
        Self {
            entries: entries.to_vec(),
            id,
            title,
            api,
            invalidator,
        }
    }
}

#[async_trait]
impl Action for CustomAction {
    fn id(&self) -> ActionId {
        self.id.clone()
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn can_execute(&self) -> bool {
        !self.entries.is_empty()
    }

    async fn execute(&self) -> Result<(), AppError> {
        self.api
            .execute_custom_action(&self.entries, self.id.as_str())
            .await?;
        info!(action = %self.id, count = self.entries.len(), "Custom action executed");
        self.invalidator.invalidate();
        Ok(())
    }
}
