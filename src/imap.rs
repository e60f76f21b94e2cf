//! Mail backend speaking IMAP
//!
//! One IMAP login is one account. Mailbox names are the folder ids;
//! folder paths are the mailbox hierarchy re-joined with `/` and rooted
//! at the account (`/Tickets/Open`). Message listings page through UIDs
//! in ascending order, carrying the last UID seen as the cursor.

use crate::config::ImapConfig;
use crate::connection::{ImapSession, connect, logout, select};
use crate::error::{Error, Result};
use crate::folder::{Account, AccountId, Folder, FolderId, Message, MessageId};
use crate::provider::{FolderProvider, MessagePage, MessageProvider, PageToken, Parent};
use async_trait::async_trait;
use futures::StreamExt;
use mail_parser::MessageParser;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const DEFAULT_DELIMITER: &str = "/";

/// IMAP implementation of the folder and message providers.
pub struct ImapProvider {
    config: ImapConfig,
}

impl ImapProvider {
    #[must_use]
    pub const fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    fn account_id(&self) -> AccountId {
        AccountId(self.config.username.clone())
    }

    /// `(mailbox name, hierarchy delimiter)` for every mailbox matching
    /// `pattern`, in server order. `None` asks for the delimiter only.
    async fn list(
        session: &mut ImapSession,
        pattern: Option<&str>,
    ) -> Result<Vec<(String, String)>> {
        let mut names = session
            .list(Some(""), pattern)
            .await
            .map_err(|e| Error::Imap(format!("List folders failed: {e}")))?;

        let mut mailboxes = Vec::new();
        while let Some(item) = names.next().await {
            match item {
                Ok(name) => mailboxes.push((
                    name.name().to_string(),
                    name.delimiter().unwrap_or(DEFAULT_DELIMITER).to_string(),
                )),
                Err(e) => warn!("Skipping unreadable LIST entry: {e}"),
            }
        }
        Ok(mailboxes)
    }

    async fn delimiter(session: &mut ImapSession) -> Result<String> {
        Ok(Self::list(session, None)
            .await?
            .into_iter()
            .next()
            .map_or_else(|| DEFAULT_DELIMITER.to_string(), |(_, delimiter)| delimiter))
    }

    async fn tree(&self) -> Result<Vec<Folder>> {
        let mut session = connect(&self.config).await?;
        let mailboxes = Self::list(&mut session, Some("*")).await;
        logout(session).await;
        Ok(assemble(&self.account_id(), &mailboxes?))
    }

    async fn page(&self, folder: &FolderId, after: u64) -> Result<MessagePage> {
        let mut session = connect(&self.config).await?;
        let page = self.page_in(&mut session, folder, after).await;
        logout(session).await;
        page
    }

    async fn page_in(
        &self,
        session: &mut ImapSession,
        folder: &FolderId,
        after: u64,
    ) -> Result<MessagePage> {
        select(session, folder.as_str()).await?;

        let mut uids: Vec<u32> = session
            .uid_search(format!("UID {}:*", after + 1))
            .await
            .map_err(|e| Error::Imap(format!("Search failed: {e}")))?
            .into_iter()
            .filter(|uid| u64::from(*uid) > after)
            .collect();
        uids.sort_unstable();

        let more = uids.len() > self.config.page_size;
        uids.truncate(self.config.page_size);
        let Some(&last) = uids.last() else {
            return Ok(MessagePage::default());
        };

        let set = uid_set(&uids);
        let mut fetches = session
            .uid_fetch(&set, "(UID BODY.PEEK[HEADER])")
            .await
            .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?;

        let mut messages = Vec::with_capacity(uids.len());
        while let Some(fetch) = fetches.next().await {
            let fetch = fetch.map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;
            let Some(uid) = fetch.uid else { continue };
            messages.push(Message {
                id: MessageId {
                    folder: folder.clone(),
                    uid: u64::from(uid),
                },
                subject: fetch.header().and_then(subject_of),
            });
        }
        drop(fetches);
        messages.sort_by_key(|m| m.id.uid);

        debug!(
            "Fetched {} message header(s) from {folder} after UID {after}",
            messages.len()
        );
        Ok(MessagePage {
            messages,
            next: more.then(|| PageToken {
                folder: folder.clone(),
                cursor: u64::from(last),
            }),
        })
    }
}

#[async_trait]
impl FolderProvider for ImapProvider {
    async fn list_accounts(&self, include_folders: bool) -> Result<Vec<Account>> {
        let root = if include_folders {
            self.tree().await?
        } else {
            Vec::new()
        };
        Ok(vec![Account {
            id: self.account_id(),
            name: self.config.username.clone(),
            is_default: true,
            root,
        }])
    }

    async fn create_folder(&self, parent: Parent<'_>, name: &str) -> Result<Folder> {
        let mut session = connect(&self.config).await?;
        let result = async {
            let delimiter = Self::delimiter(&mut session).await?;
            let (mailbox, path) = match parent {
                Parent::Account(_) => (name.to_string(), format!("/{name}")),
                Parent::Folder(folder) => (
                    format!("{}{delimiter}{name}", folder.id),
                    folder.child_path(name),
                ),
            };
            session
                .create(&mailbox)
                .await
                .map_err(|e| Error::Imap(format!("Create {mailbox} failed: {e}")))?;
            info!("Created mailbox {mailbox}");
            Ok::<_, Error>(Folder {
                id: FolderId(mailbox),
                account_id: self.account_id(),
                path,
                name: name.to_string(),
                children: Vec::new(),
            })
        }
        .await;
        logout(session).await;
        result
    }

    async fn sub_folders(&self, parent: Parent<'_>) -> Result<Vec<Folder>> {
        let tree = self.tree().await?;
        let children = match parent {
            Parent::Account(_) => tree,
            Parent::Folder(wanted) => {
                let mut stack = tree;
                let mut found = Vec::new();
                while let Some(folder) = stack.pop() {
                    if folder.id == wanted.id {
                        found = folder.children;
                        break;
                    }
                    stack.extend(folder.children);
                }
                found
            }
        };
        Ok(children
            .into_iter()
            .map(|mut f| {
                f.children.clear();
                f
            })
            .collect())
    }

    async fn move_folder(&self, folder: &FolderId, destination: &FolderId) -> Result<()> {
        let mut session = connect(&self.config).await?;
        let result = async {
            let delimiter = Self::delimiter(&mut session).await?;
            let leaf = folder
                .as_str()
                .rsplit(delimiter.as_str())
                .next()
                .unwrap_or(folder.as_str());
            let target = format!("{destination}{delimiter}{leaf}");
            session
                .rename(folder.as_str(), &target)
                .await
                .map_err(|e| Error::Imap(format!("Rename {folder} to {target} failed: {e}")))?;
            info!("Renamed mailbox {folder} to {target}");
            Ok::<_, Error>(())
        }
        .await;
        logout(session).await;
        result
    }
}

#[async_trait]
impl MessageProvider for ImapProvider {
    async fn list_messages(&self, folder: &FolderId) -> Result<MessagePage> {
        self.page(folder, 0).await
    }

    async fn continue_list(&self, token: &PageToken) -> Result<MessagePage> {
        self.page(&token.folder, token.cursor).await
    }

    async fn move_messages(&self, messages: &[MessageId], destination: &FolderId) -> Result<()> {
        let mut by_folder: Vec<(&FolderId, Vec<u32>)> = Vec::new();
        for id in messages {
            let uid = u32::try_from(id.uid)
                .map_err(|_| Error::Provider(format!("UID {} out of range", id.uid)))?;
            match by_folder.iter_mut().find(|(folder, _)| **folder == id.folder) {
                Some((_, uids)) => uids.push(uid),
                None => by_folder.push((&id.folder, vec![uid])),
            }
        }

        let mut session = connect(&self.config).await?;
        let result = async {
            for (folder, uids) in &by_folder {
                select(&mut session, folder.as_str()).await?;
                session
                    .uid_mv(uid_set(uids), destination.as_str())
                    .await
                    .map_err(|e| Error::Imap(format!("Move to {destination} failed: {e}")))?;
                debug!("Moved {} message(s) from {folder} to {destination}", uids.len());
            }
            Ok::<_, Error>(())
        }
        .await;
        logout(session).await;
        result
    }
}

/// Decoded `Subject` of a header block.
fn subject_of(header: &[u8]) -> Option<String> {
    MessageParser::default()
        .parse(header)
        .and_then(|message| message.subject().map(str::to_string))
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the folder tree from a flat LIST result. A mailbox whose
/// parent is not listed becomes a top-level folder.
fn assemble(account: &AccountId, mailboxes: &[(String, String)]) -> Vec<Folder> {
    let position: HashMap<&str, usize> = mailboxes
        .iter()
        .enumerate()
        .map(|(idx, (mailbox, _))| (mailbox.as_str(), idx))
        .collect();

    let mut slots: Vec<Option<Folder>> = Vec::with_capacity(mailboxes.len());
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(mailboxes.len());
    let mut depths: Vec<usize> = Vec::with_capacity(mailboxes.len());
    for (mailbox, delimiter) in mailboxes {
        let segments: Vec<&str> = mailbox.split(delimiter.as_str()).collect();
        parents.push(
            mailbox
                .rsplit_once(delimiter.as_str())
                .and_then(|(head, _)| position.get(head).copied()),
        );
        depths.push(segments.len());
        slots.push(Some(Folder {
            id: FolderId(mailbox.clone()),
            account_id: account.clone(),
            path: format!("/{}", segments.join("/")),
            name: segments.last().copied().unwrap_or_default().to_string(),
            children: Vec::new(),
        }));
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); mailboxes.len()];
    for (idx, parent) in parents.iter().enumerate() {
        if let Some(parent) = parent {
            children[*parent].push(idx);
        }
    }

    let mut order: Vec<usize> = (0..mailboxes.len()).collect();
    order.sort_by_key(|idx| std::cmp::Reverse(depths[*idx]));
    for idx in order {
        let kids: Vec<Folder> = children[idx]
            .iter()
            .filter_map(|kid| slots[*kid].take())
            .collect();
        if let Some(folder) = slots[idx].as_mut() {
            folder.children = kids;
        }
    }

    parents
        .iter()
        .enumerate()
        .filter(|(_, parent)| parent.is_none())
        .filter_map(|(idx, _)| slots[idx].take())
        .collect()
}
