//! Request/response surface over the scheduler and the ticket operations
//!
//! Requests are JSON objects tagged by `action`, e.g.
//! `{"action": "createCaseFolder", "folderPath": "Tickets/Open"}`.
//! Every request gets a [`Response`]; failures are logged and reported
//! with `success: false` and the error message.

use crate::error::Result;
use crate::folder::Folder;
use crate::scheduler::{ManualSync, SyncScheduler};
use crate::ticket::TicketId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action")]
pub enum Action {
    #[serde(rename = "createCaseFolder")]
    CreateCaseFolder {
        #[serde(rename = "folderPath")]
        folder_path: String,
    },
    #[serde(rename = "checkFolderExists")]
    CheckFolderExists {
        #[serde(rename = "folderPath")]
        folder_path: String,
    },
    #[serde(rename = "syncAllFolders")]
    SyncAllFolders,
    #[serde(rename = "closeCaseFolder")]
    CloseCaseFolder,
    #[serde(rename = "syncFolderMails")]
    SyncFolderMails,
    #[serde(rename = "restoreArchivedFolder")]
    RestoreArchivedFolder,
    #[serde(rename = "openTicketURL")]
    OpenTicketUrl { subject: String },
    #[serde(rename = "getCaseID")]
    GetCaseId { subject: String },
}

impl Action {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateCaseFolder { .. } => "createCaseFolder",
            Self::CheckFolderExists { .. } => "checkFolderExists",
            Self::SyncAllFolders => "syncAllFolders",
            Self::CloseCaseFolder => "closeCaseFolder",
            Self::SyncFolderMails => "syncFolderMails",
            Self::RestoreArchivedFolder => "restoreArchivedFolder",
            Self::OpenTicketUrl { .. } => "openTicketURL",
            Self::GetCaseId { .. } => "getCaseID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<Folder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Present for `getCaseID`; `null` when the subject has no ticket.
    #[serde(rename = "caseID", skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Option<TicketId>>,
}

impl Response {
    fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
            ..Self::default()
        }
    }
}

/// Routes actions to the scheduler (syncs) and the ticket operations.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    scheduler: Arc<SyncScheduler>,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(scheduler: Arc<SyncScheduler>) -> Self {
        Self { scheduler }
    }

    /// Parse a JSON request and handle it.
    pub async fn dispatch_json(&self, request: &str) -> Response {
        match serde_json::from_str::<Action>(request) {
            Ok(action) => self.dispatch(action).await,
            Err(e) => {
                error!("Unknown or malformed action: {e}");
                Response::failed(format!("Unknown or malformed action: {e}"))
            }
        }
    }

    pub async fn dispatch(&self, action: Action) -> Response {
        let name = action.name();
        debug!("Handling action: {name}");
        match self.handle(action).await {
            Ok(response) => response,
            Err(e) => {
                error!("{name} -> Error: {e}");
                Response::failed(e.to_string())
            }
        }
    }

    async fn handle(&self, action: Action) -> Result<Response> {
        let sync = self.scheduler.sync();
        let response = match action {
            Action::CreateCaseFolder { folder_path } => {
                let folder = sync.create_case_folder(&folder_path).await?;
                Response {
                    folder: Some(folder),
                    ..Response::ok()
                }
            }
            Action::CheckFolderExists { folder_path } => {
                let check = sync.check_folder_exists(&folder_path).await;
                Response {
                    exists: Some(check.exists),
                    folder: check.folder,
                    ..Response::ok()
                }
            }
            Action::SyncAllFolders => Response {
                messages_count: Some(self.scheduler.manual_sync(ManualSync::AllFolders).await?),
                ..Response::ok()
            },
            Action::SyncFolderMails => Response {
                messages_count: Some(
                    self.scheduler
                        .manual_sync(ManualSync::DisplayedFolder)
                        .await?,
                ),
                ..Response::ok()
            },
            Action::CloseCaseFolder => {
                let outcome = sync.close_case_folder().await?;
                Response {
                    folder_name: Some(outcome.folder_name),
                    folder: Some(outcome.folder),
                    ..Response::ok()
                }
            }
            Action::RestoreArchivedFolder => {
                let outcome = sync.restore_archived_folder().await?;
                Response {
                    folder_name: Some(outcome.folder_name),
                    folder: Some(outcome.folder),
                    ..Response::ok()
                }
            }
            Action::OpenTicketUrl { subject } => Response {
                url: Some(sync.ticket_url(&subject)?),
                ..Response::ok()
            },
            Action::GetCaseId { subject } => Response {
                case_id: Some(TicketId::from_subject(&subject)),
                ..Response::ok()
            },
        };
        Ok(response)
    }
}
