//! Find a ticket's messages in source folders and move them

use crate::error::{Error, Result};
use crate::folder::{Folder, MessageId};
use crate::provider::{MessageProvider, within};
use crate::ticket::TicketId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scans source folders page by page and moves matching messages.
pub struct MessageScanner<'a> {
    provider: &'a dyn MessageProvider,
    call_timeout: Duration,
    cancel: &'a CancellationToken,
}

impl<'a> MessageScanner<'a> {
    #[must_use]
    pub const fn new(
        provider: &'a dyn MessageProvider,
        call_timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            provider,
            call_timeout,
            cancel,
        }
    }

    /// Move every message mentioning `ticket` from `sources` into
    /// `destination` and return how many moved.
    ///
    /// Each source is handled on its own: a folder that cannot be
    /// listed or moved from is logged and contributes nothing.
    /// Cancellation stops before the next page or folder.
    pub async fn scan_and_move(
        &self,
        ticket: &TicketId,
        destination: &Folder,
        sources: &[Folder],
    ) -> usize {
        debug!(
            "Searching for ticket ID \"{ticket}\" in {} folder(s).",
            sources.len()
        );
        let mut moved = 0;

        for source in sources {
            if self.cancel.is_cancelled() {
                info!("Scan for ticket \"{ticket}\" cancelled");
                break;
            }
            if source.id == destination.id {
                debug!("Skipping \"{}\": it is the destination", source.path);
                continue;
            }
            match self.move_from(ticket, destination, source).await {
                Ok(count) => moved += count,
                Err(e) => warn!(
                    "Could not process folder \"{}\". It might be a special or inaccessible folder: {e}",
                    source.path
                ),
            }
        }
        moved
    }

    async fn move_from(
        &self,
        ticket: &TicketId,
        destination: &Folder,
        source: &Folder,
    ) -> Result<usize> {
        debug!("Scanning folder: \"{}\"", source.path);
        let matches = self.matching(ticket, source).await?;

        if matches.is_empty() {
            debug!("No matching messages found in \"{}\".", source.path);
            return Ok(0);
        }

        debug!(
            "Moving {} message(s) for ticket \"{ticket}\" from \"{}\" to \"{}\".",
            matches.len(),
            source.path,
            destination.path
        );
        within(
            self.call_timeout,
            format!("moving messages from {}", source.path),
            self.provider.move_messages(&matches, &destination.id),
        )
        .await?;
        Ok(matches.len())
    }

    async fn matching(&self, ticket: &TicketId, source: &Folder) -> Result<Vec<MessageId>> {
        let what = || format!("listing messages in {}", source.path);
        let mut page = within(
            self.call_timeout,
            what(),
            self.provider.list_messages(&source.id),
        )
        .await?;
        let mut matches = Vec::new();

        while !page.messages.is_empty() {
            debug!(
                "Found {} message(s) on this page in \"{}\".",
                page.messages.len(),
                source.path
            );
            for message in page.messages {
                if message
                    .subject
                    .as_deref()
                    .is_some_and(|s| ticket.mentioned_in(s))
                {
                    debug!(
                        "Match for ticket \"{ticket}\" in subject: {:?}",
                        message.subject
                    );
                    matches.push(message.id);
                }
            }

            let Some(token) = page.next else { break };
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            page = within(self.call_timeout, what(), self.provider.continue_list(&token)).await?;
        }
        Ok(matches)
    }
}
