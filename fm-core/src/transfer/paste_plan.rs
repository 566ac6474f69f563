use fm_clip::TransferPayload;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::fs::entry::Entry;
use crate::fs::file_system::FileSystem;

/// What a paste or drop will transfer, and where.
#[derive(Debug, Clone)]
pub struct PastePlan {
    pub source_urls: Vec<String>,
    pub source_root_url: Option<String>,
    pub destination: Entry,
    pub is_move: bool,
    failure_urls: Vec<String>,
}

impl PastePlan {
    pub fn new(source_urls: Vec<String>, destination: Entry, is_move: bool) -> Self {
        Self {
            source_urls,
            source_root_url: None,
            destination,
            is_move,
            failure_urls: Vec::new(),
        }
    }

    pub fn from_payload(payload: &TransferPayload, destination: Entry, is_move: bool) -> Self {
        Self {
            source_root_url: payload.source_root_url.clone(),
            ..Self::new(payload.source_urls.clone(), destination, is_move)
        }
    }

    /// Resolves every source URL. URLs that fail to resolve are recorded in
    /// [`failure_urls`](Self::failure_urls) and left out of the result.
    pub async fn resolve_entries(&mut self, fs: &dyn FileSystem) -> Vec<Entry> {
        let results = join_all(self.source_urls.iter().map(|url| fs.resolve_url(url))).await;

        self.failure_urls.clear();
        let mut entries = Vec::with_capacity(results.len());
        for (url, result) in self.source_urls.iter().zip(results) {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(url = %url, error = %e, "Paste source did not resolve");
                    self.failure_urls.push(url.clone());
                }
            }
        }

        debug!(
            resolved = entries.len(),
            failed = self.failure_urls.len(),
            "Paste sources resolved"
        );
        entries
    }

    pub fn failure_urls(&self) -> &[String] {
        &self.failure_urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestEnv, downloads_root};

    #[tokio::test]
    async fn test_unresolved_sources_are_tracked() {
        let env = TestEnv::new();
        let root = downloads_root();
        let a = root.child("a.txt", false);
        let b = root.child("b.txt", false);
        env.fs.add_dir(&root, vec![a.clone(), b.clone()]);
        let missing = root.child("gone.txt", false);

        let mut plan = PastePlan::new(
            vec![a.url().to_string(), missing.url().to_string(), b.url().to_string()],
            root.child("dest", true),
            false,
        );
        let entries = plan.resolve_entries(&*env.fs).await;

        assert_eq!(entries, vec![a, b]);
        assert_eq!(plan.failure_urls(), [missing.url().to_string()]);
    }
}
