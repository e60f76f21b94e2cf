//! State and provider implementations of the fake backend

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use ticket_folder_sync::{
    Account, AccountId, DisplayedFolder, Error, Folder, FolderId, FolderProvider, Message,
    MessageId, MessagePage, MessageProvider, PageToken, Parent, Result,
};

#[derive(Debug, Clone)]
struct AccountEntry {
    id: AccountId,
    is_default: bool,
}

#[derive(Debug, Clone)]
struct Node {
    id: FolderId,
    account: AccountId,
    /// `/`-rooted, e.g. `/Tickets/Open`.
    path: String,
}

impl Node {
    fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    fn parent_path(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(head, _)| head)
    }

    fn folder(&self) -> Folder {
        Folder {
            id: self.id.clone(),
            account_id: self.account.clone(),
            path: self.path.clone(),
            name: self.name().to_string(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Stored {
    uid: u64,
    folder: FolderId,
    subject: Option<String>,
}

#[derive(Debug)]
struct State {
    accounts: Vec<AccountEntry>,
    folders: Vec<Node>,
    messages: Vec<Stored>,
    next_folder: u64,
    next_uid: u64,
    page_size: usize,
    failing_lists: HashSet<FolderId>,
    failing_moves_from: HashSet<FolderId>,
    slow_lists: HashMap<FolderId, Duration>,
    held_accounts: Option<Arc<Notify>>,
    accounts_fail: bool,
    spurious_move_errors: bool,
    broken_folder_moves: bool,
    message_moves: Vec<(Vec<MessageId>, FolderId)>,
    folder_moves: usize,
    created: Vec<String>,
    displayed: Option<FolderId>,
}

/// The fake backend. Share it behind an `Arc`.
#[derive(Debug)]
pub struct FakeMail {
    state: Mutex<State>,
}

impl FakeMail {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                accounts: Vec::new(),
                folders: Vec::new(),
                messages: Vec::new(),
                next_folder: 0,
                next_uid: 0,
                page_size: 2,
                failing_lists: HashSet::new(),
                failing_moves_from: HashSet::new(),
                slow_lists: HashMap::new(),
                held_accounts: None,
                accounts_fail: false,
                spurious_move_errors: false,
                broken_folder_moves: false,
                message_moves: Vec::new(),
                folder_moves: 0,
                created: Vec::new(),
                displayed: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // -- building --

    pub fn account(&self, id: &str, is_default: bool) -> AccountId {
        let id = AccountId(id.to_string());
        self.state().accounts.push(AccountEntry {
            id: id.clone(),
            is_default,
        });
        id
    }

    /// Add a folder path, creating missing parents. Returns the id of
    /// the deepest folder.
    pub fn folder(&self, account: &AccountId, path: &str) -> FolderId {
        let mut state = self.state();
        let mut full = String::new();
        let mut last = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full = format!("{full}/{segment}");
            let existing = state
                .folders
                .iter()
                .find(|n| n.account == *account && n.path == full)
                .map(|n| n.id.clone());
            let id = existing.unwrap_or_else(|| state.add_folder(account, &full));
            last = Some(id);
        }
        last.expect("non-empty folder path")
    }

    pub fn message(&self, folder: &FolderId, subject: &str) -> MessageId {
        let mut state = self.state();
        state.next_uid += 1;
        let uid = state.next_uid;
        state.messages.push(Stored {
            uid,
            folder: folder.clone(),
            subject: Some(subject.to_string()),
        });
        MessageId {
            folder: folder.clone(),
            uid,
        }
    }

    pub fn message_without_subject(&self, folder: &FolderId) {
        let mut state = self.state();
        state.next_uid += 1;
        let uid = state.next_uid;
        state.messages.push(Stored {
            uid,
            folder: folder.clone(),
            subject: None,
        });
    }

    pub fn display(&self, folder: &FolderId) {
        self.state().displayed = Some(folder.clone());
    }

    // -- knobs --

    pub fn page_size(&self, size: usize) {
        self.state().page_size = size;
    }

    pub fn fail_listing(&self, folder: &FolderId) {
        self.state().failing_lists.insert(folder.clone());
    }

    pub fn fail_moving_from(&self, folder: &FolderId) {
        self.state().failing_moves_from.insert(folder.clone());
    }

    /// Listing `folder` takes `delay` before answering.
    pub fn slow_listing(&self, folder: &FolderId, delay: Duration) {
        self.state().slow_lists.insert(folder.clone(), delay);
    }

    /// The next account listing waits until the returned handle is
    /// notified.
    pub fn hold_accounts(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.state().held_accounts = Some(Arc::clone(&release));
        release
    }

    pub fn fail_accounts(&self, fail: bool) {
        self.state().accounts_fail = fail;
    }

    /// Folder moves happen but report an error.
    pub fn spurious_move_errors(&self, on: bool) {
        self.state().spurious_move_errors = on;
    }

    /// Folder moves report success but do nothing.
    pub fn broken_folder_moves(&self, on: bool) {
        self.state().broken_folder_moves = on;
    }

    // -- inspection --

    pub fn subjects_in(&self, folder: &FolderId) -> Vec<String> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.folder == *folder)
            .filter_map(|m| m.subject.clone())
            .collect()
    }

    pub fn count_in(&self, folder: &FolderId) -> usize {
        self.state()
            .messages
            .iter()
            .filter(|m| m.folder == *folder)
            .count()
    }

    pub fn path_of(&self, folder: &FolderId) -> Option<String> {
        self.state()
            .folders
            .iter()
            .find(|n| n.id == *folder)
            .map(|n| n.path.clone())
    }

    pub fn find(&self, account: &AccountId, path: &str) -> Option<FolderId> {
        self.state()
            .folders
            .iter()
            .find(|n| n.account == *account && n.path == path)
            .map(|n| n.id.clone())
    }

    pub fn folder_count(&self) -> usize {
        self.state().folders.len()
    }

    /// Number of message move calls issued.
    pub fn message_move_calls(&self) -> usize {
        self.state().message_moves.len()
    }

    pub fn folder_move_calls(&self) -> usize {
        self.state().folder_moves
    }

    pub fn created(&self) -> Vec<String> {
        self.state().created.clone()
    }
}

impl FakeMail {
    async fn stall(&self, folder: &FolderId) {
        let delay = self.state().slow_lists.get(folder).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl State {
    fn add_folder(&mut self, account: &AccountId, path: &str) -> FolderId {
        self.next_folder += 1;
        let id = FolderId(format!("f{}", self.next_folder));
        self.folders.push(Node {
            id: id.clone(),
            account: account.clone(),
            path: path.to_string(),
        });
        id
    }

    fn node(&self, id: &FolderId) -> Result<&Node> {
        self.folders
            .iter()
            .find(|n| n.id == *id)
            .ok_or_else(|| Error::Provider(format!("no folder {id}")))
    }

    fn children(&self, account: &AccountId, parent_path: &str) -> Vec<Folder> {
        self.folders
            .iter()
            .filter(|n| n.account == *account && n.parent_path() == parent_path)
            .map(|n| {
                let mut folder = n.folder();
                folder.children = self.children(account, &n.path);
                folder
            })
            .collect()
    }

    fn page(&self, folder: &FolderId, cursor: u64) -> Result<MessagePage> {
        if self.failing_lists.contains(folder) {
            return Err(Error::Provider(format!("cannot list {folder}")));
        }
        self.node(folder)?;
        let all: Vec<&Stored> = self.messages.iter().filter(|m| m.folder == *folder).collect();
        let start = usize::try_from(cursor).unwrap();
        let end = (start + self.page_size).min(all.len());
        let messages = all
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|m| Message {
                id: MessageId {
                    folder: folder.clone(),
                    uid: m.uid,
                },
                subject: m.subject.clone(),
            })
            .collect();
        let next = (end < all.len()).then(|| PageToken {
            folder: folder.clone(),
            cursor: u64::try_from(end).unwrap(),
        });
        Ok(MessagePage { messages, next })
    }
}

#[async_trait]
impl FolderProvider for FakeMail {
    async fn list_accounts(&self, include_folders: bool) -> Result<Vec<Account>> {
        let held = self.state().held_accounts.take();
        if let Some(release) = held {
            release.notified().await;
        }
        let state = self.state();
        if state.accounts_fail {
            return Err(Error::Provider("accounts unavailable".into()));
        }
        Ok(state
            .accounts
            .iter()
            .map(|a| Account {
                id: a.id.clone(),
                name: a.id.0.clone(),
                is_default: a.is_default,
                root: if include_folders {
                    state.children(&a.id, "")
                } else {
                    Vec::new()
                },
            })
            .collect())
    }

    async fn create_folder(&self, parent: Parent<'_>, name: &str) -> Result<Folder> {
        let mut state = self.state();
        let (account, path) = match parent {
            Parent::Account(account) => (account.id.clone(), format!("/{name}")),
            Parent::Folder(folder) => {
                let node = state.node(&folder.id)?;
                (node.account.clone(), format!("{}/{name}", node.path))
            }
        };
        if state
            .folders
            .iter()
            .any(|n| n.account == account && n.path == path)
        {
            return Err(Error::Provider(format!("{path} already exists")));
        }
        let id = state.add_folder(&account, &path);
        state.created.push(path);
        Ok(state.node(&id)?.folder())
    }

    async fn sub_folders(&self, parent: Parent<'_>) -> Result<Vec<Folder>> {
        let state = self.state();
        let (account, path) = match parent {
            Parent::Account(account) => (account.id.clone(), String::new()),
            Parent::Folder(folder) => {
                let node = state.node(&folder.id)?;
                (node.account.clone(), node.path.clone())
            }
        };
        Ok(state
            .children(&account, &path)
            .into_iter()
            .map(|mut f| {
                f.children.clear();
                f
            })
            .collect())
    }

    async fn move_folder(&self, folder: &FolderId, destination: &FolderId) -> Result<()> {
        let mut state = self.state();
        state.folder_moves += 1;
        if state.broken_folder_moves {
            return Ok(());
        }
        let moving = state.node(folder)?.clone();
        let target = state.node(destination)?.clone();
        let new_path = format!("{}/{}", target.path, moving.name());
        let old_prefix = format!("{}/", moving.path);

        for node in &mut state.folders {
            if node.id == moving.id {
                node.path.clone_from(&new_path);
            } else if let Some(rest) = node.path.strip_prefix(&old_prefix) {
                node.path = format!("{new_path}/{rest}");
            } else {
                continue;
            }
            node.account = target.account.clone();
        }

        if state.spurious_move_errors {
            return Err(Error::Provider("move reported failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageProvider for FakeMail {
    async fn list_messages(&self, folder: &FolderId) -> Result<MessagePage> {
        self.stall(folder).await;
        self.state().page(folder, 0)
    }

    async fn continue_list(&self, token: &PageToken) -> Result<MessagePage> {
        self.stall(&token.folder).await;
        self.state().page(&token.folder, token.cursor)
    }

    async fn move_messages(&self, messages: &[MessageId], destination: &FolderId) -> Result<()> {
        let mut state = self.state();
        if let Some(bad) = messages
            .iter()
            .find(|m| state.failing_moves_from.contains(&m.folder))
        {
            return Err(Error::Provider(format!("cannot move out of {}", bad.folder)));
        }
        state.node(destination)?;
        for stored in &mut state.messages {
            if messages
                .iter()
                .any(|m| m.folder == stored.folder && m.uid == stored.uid)
            {
                stored.folder = destination.clone();
            }
        }
        state
            .message_moves
            .push((messages.to_vec(), destination.clone()));
        Ok(())
    }
}

#[async_trait]
impl DisplayedFolder for FakeMail {
    async fn displayed_folder(&self) -> Result<Option<Folder>> {
        let state = self.state();
        match &state.displayed {
            Some(id) => Ok(Some(state.node(id)?.folder())),
            None => Ok(None),
        }
    }
}
