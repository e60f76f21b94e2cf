//! Contracts for the mail backend the engine drives
//!
//! [`FolderProvider`] and [`MessageProvider`] are implemented by a
//! backend (see [`crate::ImapProvider`]); [`DisplayedFolder`] is
//! implemented by whatever knows which folder the user is looking at.

use crate::error::{Error, Result};
use crate::folder::{Account, Folder, FolderId, Message, MessageId};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Where a new folder is created.
#[derive(Debug, Clone, Copy)]
pub enum Parent<'a> {
    /// Top level of an account.
    Account(&'a Account),
    Folder(&'a Folder),
}

impl Parent<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Account(account) => &account.name,
            Self::Folder(folder) => &folder.name,
        }
    }
}

/// Continuation handle for a message listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    pub folder: FolderId,
    pub cursor: u64,
}

/// One page of a message listing.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Present when more messages follow.
    pub next: Option<PageToken>,
}

#[async_trait]
pub trait FolderProvider: Send + Sync {
    /// All accounts in provider order, with their folder trees when
    /// `include_folders` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn list_accounts(&self, include_folders: bool) -> Result<Vec<Account>>;

    /// # Errors
    ///
    /// Returns an error if the folder exists or cannot be created.
    async fn create_folder(&self, parent: Parent<'_>, name: &str) -> Result<Folder>;

    /// Direct children of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    async fn sub_folders(&self, parent: Parent<'_>) -> Result<Vec<Folder>>;

    /// Move `folder` below `destination`. Some backends report errors
    /// for moves that did happen; callers verify instead of trusting
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend reports a failure. The move may
    /// still have happened.
    async fn move_folder(&self, folder: &FolderId, destination: &FolderId) -> Result<()>;
}

#[async_trait]
pub trait MessageProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the folder cannot be opened or listed.
    async fn list_messages(&self, folder: &FolderId) -> Result<MessagePage>;

    /// # Errors
    ///
    /// Returns an error if the next page cannot be fetched.
    async fn continue_list(&self, token: &PageToken) -> Result<MessagePage>;

    /// # Errors
    ///
    /// Returns an error if any batch fails to move.
    async fn move_messages(&self, messages: &[MessageId], destination: &FolderId) -> Result<()>;
}

/// A backend offering both folder and message operations.
pub trait MailProvider: FolderProvider + MessageProvider {}

impl<T: FolderProvider + MessageProvider + ?Sized> MailProvider for T {}

/// The folder currently shown to the user, if any.
#[async_trait]
pub trait DisplayedFolder: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the host cannot be asked.
    async fn displayed_folder(&self) -> Result<Option<Folder>>;
}

/// A fixed selection, for callers that know the folder up front.
#[derive(Debug, Clone, Default)]
pub struct Selected(pub Option<Folder>);

#[async_trait]
impl DisplayedFolder for Selected {
    async fn displayed_folder(&self) -> Result<Option<Folder>> {
        Ok(self.0.clone())
    }
}

/// Run one provider call under a time limit.
///
/// # Errors
///
/// Returns the call's own error, or a timeout error once `limit`
/// has passed.
pub async fn within<T, F>(limit: Duration, what: impl Into<String>, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout {
                what: what.into(),
                after: limit,
            })
        })
}
