//! Folder, account and message types
//!
//! Folders are addressed by a `/`-delimited path rooted at their
//! account. Identifiers are opaque handles handed out by a provider;
//! the core never interprets them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle for a folder, scoped to its provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(pub String);

impl FolderId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle for an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mail folder and, when listed as part of a tree, its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: FolderId,
    pub account_id: AccountId,
    /// Full path, `/`-delimited, unique within the account.
    pub path: String,
    /// Last path segment.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Self>,
}

impl Folder {
    /// The path joined with one more segment.
    #[must_use]
    pub fn child_path(&self, name: &str) -> String {
        format!("{}/{name}", self.path.trim_end_matches('/'))
    }

    /// Whether `path` equals this folder's path or ends with
    /// `"/" + path`.
    #[must_use]
    pub fn matches_suffix(&self, path: &str) -> bool {
        self.path == path
            || self
                .path
                .strip_suffix(path)
                .is_some_and(|head| head.ends_with('/'))
    }

    /// Whether this folder lives below `root`. The root itself is not
    /// within itself.
    #[must_use]
    pub fn is_within(&self, root: &Self) -> bool {
        self.path
            .strip_prefix(root.path.trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty())
    }
}

/// A mail account owning a tree of folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub is_default: bool,
    pub root: Vec<Folder>,
}

/// Handle for a message. Only meaningful together with its folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageId {
    pub folder: FolderId,
    pub uid: u64,
}

/// The subset of a message the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub subject: Option<String>,
}

/// Trim whitespace and leading/trailing `/` from a user-supplied
/// folder path.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    path.trim().trim_matches('/')
}

/// The default account: the one flagged as default, else the first.
#[must_use]
pub fn default_account(accounts: Vec<Account>) -> Option<Account> {
    let position = accounts.iter().position(|a| a.is_default).unwrap_or(0);
    accounts.into_iter().nth(position)
}
