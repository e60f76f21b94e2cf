//! Flat, searchable view of every account's folder tree

use crate::folder::{Account, Folder, normalize_path};
use crate::provider::FolderProvider;
use tracing::{error, warn};

/// Every folder of every account, accounts in provider order and
/// folders pre-order within each account. Children are detached; the
/// index is a snapshot and is rebuilt for every lookup.
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    folders: Vec<Folder>,
}

impl FolderIndex {
    /// Read the folder trees from the provider. Enumeration failures
    /// are logged and produce an empty index.
    pub async fn build(provider: &dyn FolderProvider) -> Self {
        match provider.list_accounts(true).await {
            Ok(accounts) => Self::from_accounts(accounts),
            Err(e) => {
                error!("Error retrieving folders: {e}");
                Self::default()
            }
        }
    }

    /// Flatten with an explicit stack so deep trees cannot exhaust the
    /// call stack.
    #[must_use]
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        let mut folders = Vec::new();
        for account in accounts {
            let mut stack: Vec<Folder> = account.root.into_iter().rev().collect();
            while let Some(mut folder) = stack.pop() {
                let children = std::mem::take(&mut folder.children);
                stack.extend(children.into_iter().rev());
                folders.push(folder);
            }
        }
        Self { folders }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.folders.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Folder> {
        self.folders.iter()
    }

    /// Resolve a user-supplied path: exact match on the normalized full
    /// path first, then the first suffix match in index order. A suffix
    /// matching several folders logs one warning naming the pick.
    #[must_use]
    pub fn resolve(&self, path_spec: &str) -> Option<&Folder> {
        let wanted = normalize_path(path_spec);
        if wanted.is_empty() {
            return None;
        }

        if let Some(exact) = self.iter().find(|f| normalize_path(&f.path) == wanted) {
            return Some(exact);
        }

        let mut candidates = self.iter().filter(|f| f.matches_suffix(wanted));
        let found = candidates.next()?;
        let others = candidates.count();
        if others > 0 {
            warn!(
                account = %found.account_id,
                path = %found.path,
                "Found {} folders for ambiguous setting '{wanted}'. Using the first one found: \
                 '{}' in account '{}'. Include the account name in the setting to disambiguate.",
                others + 1,
                found.path,
                found.account_id,
            );
        }
        Some(found)
    }

    /// Every folder whose path equals or ends with one of `paths`.
    #[must_use]
    pub fn matching_any(&self, paths: &[String]) -> Vec<Folder> {
        self.iter()
            .filter(|f| paths.iter().any(|p| f.matches_suffix(p)))
            .cloned()
            .collect()
    }
}
