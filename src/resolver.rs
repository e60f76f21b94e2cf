//! Map configured folder paths to concrete folders
//!
//! Users configure folders by a readable suffix such as `Tickets/Open`,
//! which may exist under several accounts. Resolution prefers an exact
//! full-path match and otherwise takes the first suffix match in index
//! order, warning about the ambiguity so the setting can be qualified
//! with the account name.

use crate::folder::Folder;
use crate::index::FolderIndex;
use crate::provider::FolderProvider;
use serde::Serialize;
use tracing::debug;

/// Result of a folder lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderCheck {
    pub exists: bool,
    pub folder: Option<Folder>,
}

impl From<Option<Folder>> for FolderCheck {
    fn from(folder: Option<Folder>) -> Self {
        Self {
            exists: folder.is_some(),
            folder,
        }
    }
}

#[derive(Clone, Copy)]
pub struct FolderResolver<'a> {
    provider: &'a dyn FolderProvider,
}

impl<'a> FolderResolver<'a> {
    #[must_use]
    pub const fn new(provider: &'a dyn FolderProvider) -> Self {
        Self { provider }
    }

    /// Resolve against a freshly built index.
    pub async fn resolve(&self, path_spec: &str) -> Option<Folder> {
        if crate::folder::normalize_path(path_spec).is_empty() {
            return None;
        }
        let index = FolderIndex::build(self.provider).await;
        let found = index.resolve(path_spec).cloned();
        match &found {
            Some(folder) => debug!("Resolved '{path_spec}' to '{}'", folder.path),
            None => debug!("No folder found for '{path_spec}'"),
        }
        found
    }

    pub async fn check(&self, path_spec: &str) -> FolderCheck {
        self.resolve(path_spec).await.into()
    }
}
