//! UID FETCH handler
//!
//! Answers with the header block of each message as a counted literal,
//! which is what `BODY.PEEK[HEADER]` asks for:
//!
//! ```text
//! * 2 FETCH (UID 7 BODY[HEADER] {97}
//! <97 bytes of header>
//! )
//! ```

use super::uid_search::set_contains;
use crate::fake_imap::io::{write_bytes, write_line};
use crate::fake_imap::mailbox::Mailbox;
use imap_codec::imap_types::sequence::SequenceSet;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_uid_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
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
    for (idx, message) in folder.messages.iter().enumerate() {
        if !set_contains(sequence_set, message.uid, max) {
            continue;
        }
        let header = message.header();
        let prefix = format!(
            "* {} FETCH (UID {} BODY[HEADER] {{{}}}\r\n",
            idx + 1,
            message.uid,
            header.len()
        );
        if write_line(stream, &prefix).await.is_err()
            || write_bytes(stream, &header).await.is_err()
            || write_line(stream, ")\r\n").await.is_err()
        {
            return;
        }
    }

    let _ = write_line(stream, &format!("{tag} OK FETCH completed\r\n")).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use imap_codec::imap_types::sequence::{SeqOrUid, Sequence};
    use std::num::NonZeroU32;

    fn uids(values: &[u32]) -> SequenceSet {
        SequenceSet(
            values
                .iter()
                .map(|v| Sequence::Single(SeqOrUid::Value(NonZeroU32::new(*v).unwrap())))
                .collect::<Vec<_>>()
                .try_into()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn fetches_headers_as_literals() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .message("first")
            .message("Ticket ID: 12345 second")
            .build();
        let (client, server) = tokio::io::duplex(8192);
        let mut stream = BufReader::new(server);
        handle_uid_fetch("A1", &uids(&[2]), &mailbox, Some("INBOX"), &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        let output = String::from_utf8(buf).unwrap();

        assert!(output.starts_with("* 2 FETCH (UID 2 BODY[HEADER] {"));
        assert!(output.contains("Subject: Ticket ID: 12345 second\r\n"));
        assert!(!output.contains("Subject: first"));
        assert!(output.ends_with(")\r\nA1 OK FETCH completed\r\n"));
    }
}
