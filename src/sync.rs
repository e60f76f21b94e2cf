//! The ticket operations, bound to a backend and a settings store

use crate::error::{Error, Result};
use crate::folder::Folder;
use crate::index::FolderIndex;
use crate::lifecycle::{CaseFolders, MoveOutcome, Transition};
use crate::provider::{DisplayedFolder, MailProvider, Parent, within};
use crate::resolver::{FolderCheck, FolderResolver};
use crate::scanner::MessageScanner;
use crate::settings::{Settings, SettingsStore};
use crate::ticket::TicketId;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Ticket folder operations over one backend.
///
/// Every operation takes a fresh settings snapshot from the store.
/// Manual syncs should normally go through
/// [`SyncScheduler`](crate::SyncScheduler) so they do not overlap the
/// periodic one.
pub struct TicketSync {
    provider: Arc<dyn MailProvider>,
    displayed: Arc<dyn DisplayedFolder>,
    store: Arc<dyn SettingsStore>,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl TicketSync {
    #[must_use]
    pub fn new(
        provider: Arc<dyn MailProvider>,
        displayed: Arc<dyn DisplayedFolder>,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            provider,
            displayed,
            store,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Limit for each single provider call (one page, one move).
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Scans stop before their next page or folder once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    /// # Errors
    ///
    /// Returns an error if the stored settings are not a JSON object.
    pub fn settings(&self) -> Result<Settings> {
        Settings::load(self.store.as_ref())
    }

    fn resolver(&self) -> FolderResolver<'_> {
        FolderResolver::new(self.provider.as_ref())
    }

    fn case_folders(&self) -> CaseFolders<'_> {
        CaseFolders::new(self.provider.as_ref(), self.call_timeout)
    }

    fn scanner(&self) -> MessageScanner<'_> {
        MessageScanner::new(self.provider.as_ref(), self.call_timeout, &self.cancel)
    }

    pub async fn check_folder_exists(&self, path: &str) -> FolderCheck {
        self.resolver().check(path).await
    }

    /// # Errors
    ///
    /// Returns an error if the path is empty or a folder cannot be
    /// created.
    pub async fn create_case_folder(&self, path: &str) -> Result<Folder> {
        self.case_folders().create(path).await
    }

    /// Move the displayed case folder from the opened to the closed
    /// root.
    ///
    /// # Errors
    ///
    /// Returns an error if the roots are unconfigured or missing, the
    /// displayed folder is not under the opened root, or the move cannot
    /// be verified.
    pub async fn close_case_folder(&self) -> Result<MoveOutcome> {
        self.transition(Transition::Archive).await
    }

    /// Move the displayed case folder from the closed back to the
    /// opened root.
    ///
    /// # Errors
    ///
    /// Returns an error if the roots are unconfigured or missing, the
    /// displayed folder is not under the closed root, or the move cannot
    /// be verified.
    pub async fn restore_archived_folder(&self) -> Result<MoveOutcome> {
        self.transition(Transition::Restore).await
    }

    async fn transition(&self, transition: Transition) -> Result<MoveOutcome> {
        let settings = self.settings()?;
        let (opened, closed) = settings.lifecycle_roots()?;
        let current = self.displayed.displayed_folder().await?;
        self.case_folders()
            .transition(transition, opened, closed, current)
            .await
    }

    /// Pull the displayed case folder's mail in from the sync folders.
    ///
    /// # Errors
    ///
    /// Returns an error if no folder is displayed or its name carries no
    /// ticket ID.
    pub async fn sync_folder_mails(&self) -> Result<usize> {
        let current = self
            .displayed
            .displayed_folder()
            .await?
            .ok_or_else(|| Error::Precondition("No folder is currently selected.".into()))?;
        let ticket = TicketId::from_folder_name(&current.name).ok_or_else(|| {
            Error::Precondition(
                "The selected folder does not appear to be a ticket folder (no ID in name)."
                    .into(),
            )
        })?;
        let settings = self.settings()?;

        info!(
            "Syncing mails for ticket \"{ticket}\" into folder \"{}\". Searching in paths: {}.",
            current.path,
            settings.sync_folder_paths.join(", ")
        );
        let sources = self.sync_sources(&settings).await;
        let moved = self.scanner().scan_and_move(&ticket, &current, &sources).await;

        info!("Sync complete. Moved {moved} messages for ticket \"{ticket}\".");
        Ok(moved)
    }

    /// Sync every case folder under both roots.
    ///
    /// # Errors
    ///
    /// Returns an error if either root is unconfigured.
    pub async fn sync_all_folders(&self) -> Result<usize> {
        let settings = self.settings()?;
        let (opened, closed) = settings.lifecycle_roots().map_err(|_| {
            Error::Config("Opened and/or Closed folders are not configured in settings.".into())
        })?;
        info!("Starting sync for ALL ticket folders.");

        let mut case_folders = self.case_folders_under(opened).await?;
        case_folders.extend(self.case_folders_under(closed).await?);
        if case_folders.is_empty() {
            info!("No ticket folders found to sync.");
            return Ok(0);
        }
        info!("Found {} ticket folders to process.", case_folders.len());

        let total = self.sync_case_folders(&settings, &case_folders).await;
        info!("Finished sync for ALL folders. Total messages moved: {total}.");
        Ok(total)
    }

    /// Sync every case folder under the opened root. Used by the
    /// periodic trigger; an unconfigured or missing root is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be read.
    pub async fn auto_sync(&self) -> Result<usize> {
        info!("Auto-sync process started.");
        let settings = self.settings()?;
        let Some(opened) = settings.opened_folder_path.as_deref() else {
            info!("Auto-sync skipped: 'Opened' folder path is not configured.");
            return Ok(0);
        };
        if self.resolver().resolve(opened).await.is_none() {
            info!("Auto-sync skipped: configured 'Opened' folder \"{opened}\" does not exist.");
            return Ok(0);
        }

        let case_folders = self.case_folders_under(opened).await?;
        if case_folders.is_empty() {
            info!("No subfolders found in the 'Opened' directory to sync.");
            return Ok(0);
        }
        info!("Auto-syncing {} folder(s).", case_folders.len());

        let total = self.sync_case_folders(&settings, &case_folders).await;
        info!("Auto-sync process finished. Moved {total} message(s).");
        Ok(total)
    }

    /// Ticket URL for the ticket named in a message subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject has no ticket ID or no ticket URL
    /// is configured.
    pub fn ticket_url(&self, subject: &str) -> Result<String> {
        let settings = self.settings()?;
        let template = settings
            .ticket_url_template
            .ok_or_else(|| Error::Config("Ticket URL is not configured in settings.".into()))?;
        let ticket = TicketId::from_subject(subject).ok_or_else(|| {
            Error::Precondition("No ticket ID found in the email subject.".into())
        })?;
        let url = ticket.url(&template);
        info!("Ticket URL: {url}");
        Ok(url)
    }

    /// Direct subfolders of the root configured at `path`, or none if
    /// it does not resolve.
    async fn case_folders_under(&self, path: &str) -> Result<Vec<Folder>> {
        let Some(root) = self.resolver().resolve(path).await else {
            debug!("Root \"{path}\" does not exist; no case folders there.");
            return Ok(Vec::new());
        };
        within(
            self.call_timeout,
            format!("listing subfolders of {}", root.path),
            self.provider.sub_folders(Parent::Folder(&root)),
        )
        .await
    }

    async fn sync_sources(&self, settings: &Settings) -> Vec<Folder> {
        FolderIndex::build(self.provider.as_ref())
            .await
            .matching_any(&settings.sync_folder_paths)
    }

    async fn sync_case_folders(&self, settings: &Settings, case_folders: &[Folder]) -> usize {
        info!(
            "Searching for messages in paths: {}.",
            settings.sync_folder_paths.join(", ")
        );
        let sources = self.sync_sources(settings).await;
        let scanner = self.scanner();
        let mut total = 0;

        for folder in case_folders {
            if self.cancel.is_cancelled() {
                info!("Sync cancelled after {total} message(s).");
                break;
            }
            let Some(ticket) = TicketId::from_folder_name(&folder.name) else {
                continue;
            };
            debug!("Processing folder: {} for ticket ID {ticket}", folder.path);
            let moved = scanner.scan_and_move(&ticket, folder, &sources).await;
            if moved > 0 {
                info!(
                    "Moved {moved} messages for ticket \"{ticket}\" to folder \"{}\".",
                    folder.name
                );
                total += moved;
            }
        }
        total
    }
}

impl std::fmt::Debug for TicketSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketSync")
            .field("call_timeout", &self.call_timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Log and swallow an auto-sync failure. Backend failures are usually
/// transient and retried on the next period.
pub(crate) fn log_auto_sync_error(e: &Error) {
    if e.is_provider() {
        warn!("Auto-sync could not reach the mail backend: {e}");
    } else {
        error!("Error during auto-sync: {e}");
    }
}
