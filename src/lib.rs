//! Ticket case-folder synchronization
//!
//! Keeps per-ticket "case folders" in step with incoming mail. Case
//! folders live under a configured *opened* root while a ticket is
//! active and under a *closed* root once it is done; each is named
//! after its ticket number (`12345 - Acme`). The engine
//!
//! - resolves configured folder paths across accounts ([`FolderIndex`]),
//! - moves messages mentioning a ticket into its case folder
//!   ([`MessageScanner`]),
//! - archives and restores case folders with move verification
//!   ([`CaseFolders`]),
//! - runs the mail sync periodically ([`SyncScheduler`]).
//!
//! The mail backend is abstracted behind [`FolderProvider`] and
//! [`MessageProvider`]; [`ImapProvider`] implements both over IMAP.

mod action;
mod config;
mod connection;
mod error;
mod folder;
mod imap;
mod index;
mod lifecycle;
mod provider;
mod resolver;
mod scanner;
mod scheduler;
mod settings;
mod sync;
mod ticket;

pub use action::{Action, Dispatcher, Response};
pub use config::{ImapConfig, call_timeout_from_env, settings_path_from_env};
pub use error::{Error, Result};
pub use folder::{
    Account, AccountId, Folder, FolderId, Message, MessageId, default_account, normalize_path,
};
pub use imap::ImapProvider;
pub use index::FolderIndex;
pub use lifecycle::{CaseFolders, MoveOutcome, Transition};
pub use provider::{
    DisplayedFolder, FolderProvider, MailProvider, MessagePage, MessageProvider, PageToken,
    Parent, Selected, within,
};
pub use resolver::{FolderCheck, FolderResolver};
pub use scanner::MessageScanner;
pub use scheduler::{AutoSyncReport, ManualSync, SYNC_ALARM, SchedulerState, SyncScheduler};
pub use settings::{
    FileStore, MemoryStore, SETTINGS_KEY, Settings, SettingsStore, split_folder_list,
};
pub use sync::TicketSync;
pub use ticket::TicketId;
pub use tokio_util::sync::CancellationToken;
