//! Fake IMAP server for exercising `ImapProvider` over the wire
//!
//! Speaks the subset of IMAP the provider uses, on a real socket with
//! a real STARTTLS upgrade:
//!
//! greeting -> STARTTLS -> TLS -> LOGIN -> LIST / CREATE / RENAME /
//! SELECT / UID SEARCH / UID FETCH / UID MOVE -> LOGOUT
//!
//! - `server` accepts connections and dispatches commands
//! - `handlers/` holds one file per command family
//! - `mailbox` is the folder and message model with its builder
//! - `io` has the write helpers

#![allow(dead_code)]


pub use mailbox::MailboxBuilder;
pub use server::FakeImapServer;
