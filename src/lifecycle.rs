//! Case folder creation and the open/closed transitions
//!
//! Archiving moves the displayed case folder from the opened root to
//! the closed root; restoring moves it back. The move primitive is not
//! trusted: after issuing it the destination is looked up again, and
//! only that lookup decides the outcome.

use crate::error::{Error, Result};
use crate::folder::{Folder, default_account, normalize_path};
use crate::provider::{FolderProvider, Parent, within};
use crate::resolver::FolderResolver;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Which way a case folder moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Opened root to closed root.
    Archive,
    /// Closed root to opened root.
    Restore,
}

impl Transition {
    const fn source_label(self) -> &'static str {
        match self {
            Self::Archive => "Opened",
            Self::Restore => "Closed",
        }
    }

    const fn destination_label(self) -> &'static str {
        match self {
            Self::Archive => "Closed",
            Self::Restore => "Opened",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Archive => "archive",
            Self::Restore => "restore",
        })
    }
}

/// A completed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub folder_name: String,
    /// Where the folder was found after the move.
    pub folder: Folder,
}

pub struct CaseFolders<'a> {
    provider: &'a dyn FolderProvider,
    call_timeout: Duration,
}

impl<'a> CaseFolders<'a> {
    #[must_use]
    pub const fn new(provider: &'a dyn FolderProvider, call_timeout: Duration) -> Self {
        Self {
            provider,
            call_timeout,
        }
    }

    const fn resolver(&self) -> FolderResolver<'a> {
        FolderResolver::new(self.provider)
    }

    /// Return the folder at `path`, creating whatever part of it is
    /// missing under the default account.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty, there is no account to
    /// create in, or a CREATE fails.
    pub async fn create(&self, path: &str) -> Result<Folder> {
        let wanted = normalize_path(path);
        if wanted.is_empty() {
            return Err(Error::Config("Folder path not provided.".into()));
        }
        if let Some(existing) = self.resolver().resolve(wanted).await {
            info!("Folder \"{wanted}\" already exists.");
            return Ok(existing);
        }

        let accounts = within(
            self.call_timeout,
            "listing accounts",
            self.provider.list_accounts(true),
        )
        .await?;
        let account = default_account(accounts)
            .ok_or_else(|| Error::Config("No mail account available.".into()))?;
        info!(
            "Folder does not exist. Creating \"{wanted}\" in default account \"{}\".",
            account.name
        );

        let mut siblings = account.root.clone();
        let mut current: Option<Folder> = None;
        for segment in wanted.split('/').filter(|s| !s.is_empty()) {
            let parent = current
                .as_ref()
                .map_or(Parent::Account(&account), Parent::Folder);
            let folder = match siblings.into_iter().find(|f| f.name == segment) {
                Some(found) => found,
                None => {
                    info!(
                        "Creating folder part: \"{segment}\" in parent: \"{}\"",
                        parent.name()
                    );
                    within(
                        self.call_timeout,
                        format!("creating {segment}"),
                        self.provider.create_folder(parent, segment),
                    )
                    .await?
                }
            };
            siblings = within(
                self.call_timeout,
                format!("listing subfolders of {}", folder.path),
                self.provider.sub_folders(Parent::Folder(&folder)),
            )
            .await?;
            current = Some(folder);
        }

        let created =
            current.ok_or_else(|| Error::Config("Folder path not provided.".into()))?;
        info!(
            "Full folder path created successfully: \"{}\" in account \"{}\"",
            created.path, account.name
        );
        Ok(created)
    }

    /// Move `current` from the transition's source root to its
    /// destination root.
    ///
    /// `opened` and `closed` are the configured root paths. An error
    /// from the move itself is logged; the result is decided by looking
    /// the folder up under the destination afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a root does not resolve, no folder is
    /// displayed, the folder is not below the source root, or it cannot
    /// be found under the destination after the move.
    pub async fn transition(
        &self,
        transition: Transition,
        opened: &str,
        closed: &str,
        current: Option<Folder>,
    ) -> Result<MoveOutcome> {
        let (source_path, destination_path) = match transition {
            Transition::Archive => (opened, closed),
            Transition::Restore => (closed, opened),
        };
        info!("Starting {transition} of the displayed folder.");

        let source_root = self.resolver().resolve(source_path).await.ok_or_else(|| {
            Error::Resolution(format!(
                "The source \"{}\" folder \"{source_path}\" does not exist.",
                transition.source_label()
            ))
        })?;
        let destination_root =
            self.resolver()
                .resolve(destination_path)
                .await
                .ok_or_else(|| {
                    Error::Resolution(format!(
                        "The destination \"{}\" folder \"{destination_path}\" does not exist.",
                        transition.destination_label()
                    ))
                })?;

        let current = current.ok_or_else(|| {
            Error::Precondition("No folder is currently selected/displayed.".into())
        })?;
        if !current.is_within(&source_root) {
            return Err(Error::Precondition(format!(
                "Current folder \"{}\" is not in the configured \"{}\" directory.",
                current.name,
                transition.source_label()
            )));
        }

        info!(
            "Moving folder \"{}\" from \"{}\" to \"{}\".",
            current.name, source_root.path, destination_root.path
        );
        if let Err(e) = within(
            self.call_timeout,
            format!("moving {}", current.path),
            self.provider.move_folder(&current.id, &destination_root.id),
        )
        .await
        {
            warn!("Move of \"{}\" reported an error, verifying: {e}", current.name);
        }

        let expected = destination_root.child_path(&current.name);
        match self.resolver().resolve(&expected).await {
            Some(folder) => {
                info!(
                    "Verification successful: folder \"{}\" is now in \"{}\".",
                    current.name, destination_root.path
                );
                Ok(MoveOutcome {
                    folder_name: current.name,
                    folder,
                })
            }
            None => Err(Error::Verification(format!(
                "Could not find folder \"{}\" in \"{}\" after {transition}.",
                current.name, destination_root.path
            ))),
        }
    }
}
