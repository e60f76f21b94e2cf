//! UID SEARCH handler
//!
//! Supports `ALL`, `UID <set>` and their conjunction, which is all the
//! provider sends:
//!
//! ```text
//! A0004 UID SEARCH UID 3:*
//! * SEARCH 3 4 5
//! A0004 OK SEARCH completed
//! ```

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::{Mailbox, TestMessage};
use imap_codec::imap_types::search::SearchKey;
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_uid_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    criteria: &[SearchKey<'_>],
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let _ = write_line(stream, &format!("{tag} BAD No folder selected\r\n")).await;
        return;
    };
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let _ = write_line(stream, &format!("{tag} BAD Folder not found\r\n")).await;
        return;
    };

    let max = folder.max_uid();
    let uids: Vec<String> = folder
        .messages
        .iter()
        .filter(|m| criteria.iter().all(|key| matches_key(m, key, max)))
        .map(|m| m.uid.to_string())
        .collect();

    let line = if uids.is_empty() {
        "* SEARCH\r\n".to_string()
    } else {
        format!("* SEARCH {}\r\n", uids.join(" "))
    };
    let _ = write_line(stream, &line).await;
    let _ = write_line(stream, &format!("{tag} OK SEARCH completed\r\n")).await;
}

fn matches_key(message: &TestMessage, key: &SearchKey<'_>, max: u32) -> bool {
    match key {
        SearchKey::Uid(set) => set_contains(set, message.uid, max),
        SearchKey::And(keys) => keys.as_ref().iter().all(|k| matches_key(message, k, max)),
        _ => true,
    }
}

/// Whether `uid` is in `set`. `*` stands for the highest UID in the
/// folder, and ranges match in either order, so `6:*` still matches
/// UID 5 when 5 is the highest.
pub fn set_contains(set: &SequenceSet, uid: u32, max: u32) -> bool {
    let value = |bound: &SeqOrUid| match bound {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => max,
    };
    set.0.as_ref().iter().any(|seq| match seq {
        Sequence::Single(single) => value(single) == uid,
        Sequence::Range(a, b) => {
            let (a, b) = (value(a), value(b));
            (a.min(b)..=a.max(b)).contains(&uid)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use std::num::NonZeroU32;

    fn from(lo: u32) -> SequenceSet {
        SequenceSet(
            vec![Sequence::Range(
                SeqOrUid::Value(NonZeroU32::new(lo).unwrap()),
                SeqOrUid::Asterisk,
            )]
            .try_into()
            .unwrap(),
        )
    }

    async fn run(criteria: &[SearchKey<'_>], mailbox: &Mailbox) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);
        handle_uid_search("A1", criteria, mailbox, Some("INBOX"), &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn inbox(count: usize) -> Mailbox {
        (0..count)
            .fold(MailboxBuilder::new().folder("INBOX"), |b, i| {
                b.message(&format!("message {i}"))
            })
            .build()
    }

    #[tokio::test]
    async fn open_range_starts_at_lower_bound() {
        let output = run(&[SearchKey::Uid(from(3))], &inbox(5)).await;
        assert!(output.starts_with("* SEARCH 3 4 5\r\n"));
    }

    #[tokio::test]
    async fn open_range_past_the_end_still_matches_highest() {
        let output = run(&[SearchKey::Uid(from(9))], &inbox(5)).await;
        assert!(output.starts_with("* SEARCH 5\r\n"));
    }

    #[tokio::test]
    async fn empty_folder_returns_empty_search() {
        let output = run(&[SearchKey::All], &inbox(0)).await;
        assert_eq!(output, "* SEARCH\r\nA1 OK SEARCH completed\r\n");
    }
}
