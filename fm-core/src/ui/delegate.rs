//! What the core asks of the presentation layer: dialogs, toasts, URLs,
//! list refreshes and progress items.

use async_trait::async_trait;
use compact_str::CompactString;
use smallvec::SmallVec;

use crate::transfer::confirmation::ConfirmationType;

/// Button on a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastAction {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    pub action: Option<ToastAction>,
}

impl Toast {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.action = Some(ToastAction {
            label: label.into(),
            url: url.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressItemState {
    Progressing,
    Completed,
    Error,
}

/// One row in the progress center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressItem {
    pub id: CompactString,
    pub state: ProgressItemState,
    pub message: String,
}

impl ProgressItem {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            id: CompactString::from(nanoid::nanoid!(10)),
            state: ProgressItemState::Error,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait UiDelegate: Send + Sync {
    fn alert(&self, message: &str);

    /// Yes/no question; `true` when the user agreed.
    async fn confirm(&self, message: &str) -> bool;

    /// Warning shown before a transfer that changes sharing.
    async fn confirm_transfer(
        &self,
        confirmation: ConfirmationType,
        messages: &SmallVec<[String; 2]>,
    ) -> bool;

    /// Asks for a file name; `None` when cancelled.
    async fn prompt_name(&self, title: &str, default_name: &str) -> Option<String>;

    fn show_toast(&self, toast: Toast);

    fn open_url(&self, url: &str);

    /// Entries' displayed state changed without a rescan.
    fn refresh_list(&self);

    fn update_progress(&self, item: ProgressItem);
}
