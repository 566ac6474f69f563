//! # Actions model
//!
//! Computes the set of actions available for one entry selection.
//! Provider-backed volumes get exactly what their provider reports (nothing
//! at all if it fails), Drive selections get the built-in Drive actions and
//! every other location gets none.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OnceCell, broadcast};
use tracing::{debug, warn};

use crate::actions::action::{Action, ActionId, Invalidator};
use crate::actions::custom_action::CustomAction;
use crate::actions::drive_actions::{
    DriveManageAction, DriveShareAction, DriveToggleOfflineAction, FolderShortcutAction,
};
use crate::actions::folder_shortcuts::FolderShortcuts;
use crate::cache::metadata_cache::{DRIVE_PROPERTIES, MetadataCache};
use crate::config::FeatureFlags;
use crate::fs::entry::Entry;
use crate::fs::volume::{VolumeManager, VolumeType};
use crate::services::private_api::PrivateApi;
use crate::ui::delegate::UiDelegate;
use crate::util::metrics::Metrics;

pub type ActionMap = IndexMap<ActionId, Arc<dyn Action>>;

#[derive(Clone)]
pub struct ActionsDeps {
    pub volume_manager: Arc<dyn VolumeManager>,
    pub metadata: Arc<MetadataCache>,
    pub api: Arc<dyn PrivateApi>,
    pub shortcuts: Arc<FolderShortcuts>,
    pub ui: Arc<dyn UiDelegate>,
    pub metrics: Arc<Metrics>,
    pub features: FeatureFlags,
}

impl fmt::Debug for ActionsDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionsDeps")
            .field("shortcuts", &self.shortcuts.len())
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

pub struct ActionsModel {
    entries: Vec<Entry>,
    deps: ActionsDeps,
    actions: OnceCell<ActionMap>,
    invalidator: Invalidator,
}

impl fmt::Debug for ActionsModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionsModel")
            .field("entries", &self.entries.len())
            .field("initialized", &self.actions.initialized())
            .field("invalidated", &self.invalidator.is_invalidated())
            .finish_non_exhaustive()
    }
}

impl ActionsModel {
    pub fn new(deps: ActionsDeps, entries: Vec<Entry>) -> Self {
        Self {
            entries,
            deps,
            actions: OnceCell::new(),
            invalidator: Invalidator::new(),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Computes the action set once; later calls return immediately.
    pub async fn initialize(&self) {
        self.actions.get_or_init(|| self.compute()).await;
    }

    /// Empty until [`initialize`](Self::initialize) has completed.
    pub fn get_actions(&self) -> ActionMap {
        self.actions.get().cloned().unwrap_or_default()
    }

    pub fn get_action(&self, id: &ActionId) -> Option<Arc<dyn Action>> {
        self.actions.get().and_then(|actions| actions.get(id).cloned())
    }

    pub fn subscribe_invalidated(&self) -> broadcast::Receiver<()> {
        self.invalidator.subscribe()
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidator.is_invalidated()
    }

    pub fn invalidation_count(&self) -> usize {
        self.invalidator.count()
    }

    async fn compute(&self) -> ActionMap {
        if self.entries.is_empty() {
            return ActionMap::new();
        }

        let vm = self.deps.volume_manager.as_ref();
        let provided = self.entries.iter().any(|entry| {
            vm.volume_info(entry)
                .is_some_and(|volume| volume.volume_type == VolumeType::Provided)
        });
        if provided {
            return self.custom_actions().await;
        }

        let all_drive = self.entries.iter().all(|entry| {
            vm.location_info(entry)
                .is_some_and(|location| location.is_drive_based)
        });
        if all_drive {
            return self.drive_actions().await;
        }

        debug!(count = self.entries.len(), "No actions for selection");
        ActionMap::new()
    }

    async fn custom_actions(&self) -> ActionMap {
        let infos = match self.deps.api.get_custom_actions(&self.entries).await {
            Ok(infos) => infos,
            Err(e) => {
                warn!(error = %e, count = self.entries.len(), "Custom actions unavailable");
                return ActionMap::new();
            }
        };

        infos
            .into_iter()
            .map(|info| {
                let id = ActionId::from_provider(&info.id);
                let action: Arc<dyn Action> = Arc::new(CustomAction::new(
                    &self.entries,
                    id.clone(),
                    info.title,
                    self.deps.api.clone(),
                    self.invalidator.clone(),
                ));
                (id, action)
            })
            .collect()
    }

    async fn drive_actions(&self) -> ActionMap {
        // Warm the cache so the synchronous checks below see real values.
        self.deps.metadata.get(&self.entries, DRIVE_PROPERTIES).await;

        let deps = &self.deps;
        let entries = self.entries.as_slice();
        let mut actions = ActionMap::new();
        let mut add = |action: Option<Arc<dyn Action>>| {
            if let Some(action) = action {
                actions.insert(action.id(), action);
            }
        };

        add(DriveShareAction::create(entries, deps).map(|a| Arc::new(a) as Arc<dyn Action>));
        add(
            DriveToggleOfflineAction::create(entries, deps, &self.invalidator)
                .map(|a| Arc::new(a) as Arc<dyn Action>),
        );
        add(DriveManageAction::create(entries, deps).map(|a| Arc::new(a) as Arc<dyn Action>));
        add(
            FolderShortcutAction::create(entries, deps, &self.invalidator)
                .map(|a| Arc::new(a) as Arc<dyn Action>),
        );

        debug!(count = actions.len(), "Drive actions computed");
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::action::{CommonActionId, InternalActionId};
    use crate::actions::drive_actions::{METRIC_PIN_FILE, METRIC_PIN_HOSTED_FILE};
    use crate::cache::metadata_cache::Metadata;
    use crate::error::AppError;
    use crate::fs::volume::{DriveConnectionState, VolumeInfo};
    use crate::services::private_api::CustomActionInfo;
    use crate::test_support::TestEnv;

    const SHARE: ActionId = ActionId::Common(CommonActionId::Share);
    const SAVE: ActionId = ActionId::Common(CommonActionId::SaveForOffline);
    const UNPIN: ActionId = ActionId::Common(CommonActionId::OfflineNotNecessary);
    const MANAGE: ActionId = ActionId::Internal(InternalActionId::ManageInDrive);
    const CREATE_SHORTCUT: ActionId = ActionId::Internal(InternalActionId::CreateFolderShortcut);
    const REMOVE_SHORTCUT: ActionId = ActionId::Internal(InternalActionId::RemoveFolderShortcut);

    fn drive_meta(hosted: bool, pinned: bool, can_pin: bool) -> Metadata {
        let mut m = Metadata::default();
        m.hosted = Some(hosted);
        m.pinned = Some(pinned);
        m.can_pin = Some(can_pin);
        m.can_share = Some(true);
        m.alternate_url = Some("https://drive.example/open".to_string());
        m.complete()
    }

    async fn model(env: &TestEnv, entries: Vec<Entry>) -> ActionsModel {
        let model = ActionsModel::new(env.actions_deps(), entries);
        model.initialize().await;
        model
    }

    #[tokio::test]
    async fn test_pinnable_drive_file_gets_three_actions() {
        let env = TestEnv::new();
        let file = Entry::file("drive", "/root/report.txt");
        env.metadata.insert(&file, drive_meta(false, false, true));

        let model = model(&env, vec![file]).await;
        let actions = model.get_actions();

        assert_eq!(actions.len(), 3);
        assert!(actions.contains_key(&SHARE));
        assert!(actions.contains_key(&MANAGE));
        assert!(actions[&SAVE].can_execute());
    }

    #[tokio::test]
    async fn test_offline_drive_disables_share() {
        let env = TestEnv::new();
        env.volumes.set_drive_connection_state(DriveConnectionState::Offline);
        let file = Entry::file("drive", "/root/report.txt");
        env.metadata.insert(&file, drive_meta(false, false, true));

        let model = model(&env, vec![file]).await;

        assert!(!model.get_action(&SHARE).unwrap().can_execute());
    }

    #[tokio::test]
    async fn test_mixed_hosted_selection_pins_only_pinnable_files() {
        let mut env = TestEnv::new();
        env.config.features.hosted_file_pinning = false;
        let doc = Entry::file("drive", "/root/notes.gdoc");
        let file = Entry::file("drive", "/root/photo.jpg");
        env.metadata.insert(&doc, drive_meta(true, false, false));
        env.metadata.insert(&file, drive_meta(false, false, true));

        let model = model(&env, vec![doc, file.clone()]).await;
        let save = model.get_action(&SAVE).unwrap();
        assert!(save.can_execute());

        save.execute().await.unwrap();

        assert_eq!(env.api.pinned(), vec![(file.url().to_string(), true)]);
        assert_eq!(env.metrics.count(METRIC_PIN_FILE), 1);
        assert_eq!(env.metrics.count(METRIC_PIN_HOSTED_FILE), 0);
        assert!(model.is_invalidated());
        assert_eq!(env.ui.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_pinned_selection_offers_unpin() {
        let env = TestEnv::new();
        let file = Entry::file("drive", "/root/a.txt");
        env.metadata.insert(&file, drive_meta(false, true, true));

        let model = model(&env, vec![file.clone()]).await;

        assert!(!model.get_actions().contains_key(&SAVE));
        model.get_action(&UNPIN).unwrap().execute().await.unwrap();
        assert_eq!(env.api.pinned(), vec![(file.url().to_string(), false)]);
    }

    #[tokio::test]
    async fn test_pin_failure_does_not_stop_siblings() {
        let env = TestEnv::new();
        let a = Entry::file("drive", "/root/a.txt");
        let b = Entry::file("drive", "/root/b.txt");
        env.metadata.insert(&a, drive_meta(false, false, true));
        env.metadata.insert(&b, drive_meta(false, false, true));
        env.api.fail_pin(a.url());

        let model = model(&env, vec![a, b.clone()]).await;
        model.get_action(&SAVE).unwrap().execute().await.unwrap();

        assert_eq!(env.api.pinned(), vec![(b.url().to_string(), true)]);
        assert_eq!(env.metrics.count(METRIC_PIN_FILE), 1);
    }

    #[tokio::test]
    async fn test_provider_error_yields_no_actions() {
        let env = TestEnv::new();
        env.volumes.mount(
            VolumeInfo::new("zip-provider", VolumeType::Provided, "provided", "Archive")
                .with_provider("zipper"),
        );
        env.api
            .set_custom_actions(Err(AppError::provider_failed("zipper", "runtime error")));
        let entry = Entry::file("provided", "/a.zip");

        let model = model(&env, vec![entry]).await;

        assert!(model.get_actions().is_empty());
    }

    #[tokio::test]
    async fn test_provider_actions_map_common_ids_and_invalidate_after_execution() {
        let env = TestEnv::new();
        env.volumes.mount(VolumeInfo::new("p", VolumeType::Provided, "provided", "P"));
        env.api.set_custom_actions(Ok(vec![
            CustomActionInfo {
                id: "SHARE".into(),
                title: Some("Share with team".to_string()),
            },
            CustomActionInfo {
                id: "compress".into(),
                title: None,
            },
        ]));
        let entry = Entry::file("provided", "/doc.txt");

        let model = model(&env, vec![entry]).await;
        let share = model.get_action(&SHARE).unwrap();
        assert_eq!(share.title().as_deref(), Some("Share with team"));
        assert!(model.get_actions().contains_key(&ActionId::Custom("compress".into())));

        assert!(!model.is_invalidated());
        share.execute().await.unwrap();
        assert_eq!(env.api.executed_actions(), vec!["SHARE".to_string()]);
        assert!(model.is_invalidated());
    }

    #[tokio::test]
    async fn test_local_entries_get_no_actions() {
        let env = TestEnv::new();
        let file = Entry::file("downloads", "/a.txt");

        let model = model(&env, vec![file]).await;

        assert!(model.get_actions().is_empty());
    }

    #[tokio::test]
    async fn test_shared_drive_root_keeps_manage_in_drive() {
        let env = TestEnv::new();
        let root = Entry::directory("drive", "/team_drives/Design");
        let grand_root = Entry::directory("drive", "/team_drives");
        env.metadata.insert(&root, drive_meta(false, false, false));
        env.metadata.insert(&grand_root, drive_meta(false, false, false));

        let root_model = model(&env, vec![root]).await;
        let grand_model = model(&env, vec![grand_root]).await;

        assert!(root_model.get_action(&MANAGE).unwrap().can_execute());
        assert!(grand_model.get_action(&MANAGE).is_none());
        assert!(grand_model.get_action(&SHARE).is_none());
    }

    #[tokio::test]
    async fn test_folder_shortcut_toggles_after_invalidation() {
        let env = TestEnv::new();
        let folder = Entry::directory("drive", "/root/Projects");
        env.metadata.insert(&folder, drive_meta(false, false, false));

        let first = model(&env, vec![folder.clone()]).await;
        let mut invalidated = first.subscribe_invalidated();
        assert!(first.get_action(&REMOVE_SHORTCUT).is_none());
        first
            .get_action(&CREATE_SHORTCUT)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(first.invalidation_count(), 1);
        assert!(invalidated.try_recv().is_ok());
        let second = model(&env, vec![folder]).await;
        assert!(second.get_action(&CREATE_SHORTCUT).is_none());
        assert!(second.get_action(&REMOVE_SHORTCUT).is_some());
    }
}
