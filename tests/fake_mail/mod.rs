//! In-memory mail backend for integration testing
//!
//! Implements every provider trait over a flat list of folders and
//! messages, with knobs for the failure modes the engine has to
//! survive:
//!
//! ```ignore
//! let mail = FakeMail::new();
//! let work = mail.account("work", true);
//! let inbox = mail.folder(&work, "INBOX");
//! mail.message(&inbox, "Re: Ticket ID: 12345 printer");
//! mail.fail_listing(&inbox);          // listing INBOX errors
//! mail.spurious_move_errors(true);     // folder moves succeed but report an error
//! ```
//!
//! Folder ids are stable counters (`f1`, `f2`, ...) so they survive
//! moves, like real backend handles.

#![allow(dead_code)]

pub mod mailbox;

pub use mailbox::FakeMail;

use serde_json::{Value, json};
use std::sync::Arc;
use ticket_folder_sync::{MemoryStore, SyncScheduler, TicketSync};

/// Settings with the given opened/closed roots and sync folders.
pub fn settings(opened: &str, closed: &str, sync_folders: &str) -> Value {
    json!({
        "ticketURL": "https://tickets.example.com/case/",
        "openedFolder": opened,
        "closedFolder": closed,
        "syncFolders": sync_folders,
        "openFoldersAutoSync": "true",
        "autoSyncTime": "5",
        "debugMode": false,
    })
}

/// A `TicketSync` over `mail`, reading settings from a fresh store.
pub fn engine(mail: &Arc<FakeMail>, settings: Value) -> (TicketSync, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_settings(settings));
    let sync = TicketSync::new(mail.clone(), mail.clone(), store.clone());
    (sync, store)
}

pub fn scheduler(mail: &Arc<FakeMail>, settings: Value) -> (Arc<SyncScheduler>, Arc<MemoryStore>) {
    let (sync, store) = engine(mail, settings);
    (Arc::new(SyncScheduler::new(Arc::new(sync))), store)
}
