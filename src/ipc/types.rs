use std::path::{Path, PathBuf};

use crate::config::ExportSettings;
use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub profile_id: String,
    pub login_id: String,
    pub display_name: String,
    pub role: String,
}

/// Sidecar state. Nothing is readable until a workspace is open; opening
/// runs migrations and loads the persisted export settings.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub export: ExportSettings,
    pub session: Option<Session>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            export: ExportSettings::default(),
            session: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.db.is_some()
    }

    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let conn = db::open_db(path)?;
        let export = ExportSettings::load(&conn)?;
        self.close_workspace();
        self.workspace = Some(path.to_path_buf());
        self.db = Some(conn);
        self.export = export;
        info!(workspace = %path.display(), "workspace ready");
        Ok(())
    }

    pub fn close_workspace(&mut self) {
        if let Some(path) = self.workspace.take() {
            info!(workspace = %path.display(), "workspace closed");
        }
        self.db = None;
        self.session = None;
        self.export = ExportSettings::default();
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
