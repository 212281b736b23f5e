//! Session registry and spoken-name resolution.
//!
//! The [`AliasTable`] is built once from the configured projects and maps every
//! lowercased name and alias to a project id. Lookups are exact; the first
//! project registered with a given name wins, and any collision is reported as
//! a warning when the table is built.

use crate::config::{ControllerConfig, ProjectConfig};
use crate::router::GlobalCommand;
use crate::session::{Session, TerminalDriver};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Pause between sending close requests to consecutive windows.
const CLOSE_STAGGER: Duration = Duration::from_millis(200);

/// All names one project answers to, in the order they were configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub id: String,
    /// Lowercased name followed by lowercased aliases.
    pub names: Vec<String>,
}

/// Lowercased name/alias -> project id, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
    warnings: Vec<String>,
}

impl AliasTable {
    pub fn from_projects(projects: &[ProjectConfig]) -> Self {
        let entries: Vec<AliasEntry> = projects
            .iter()
            .map(|p| AliasEntry {
                id: p.name.clone(),
                names: p.all_names(),
            })
            .collect();

        let mut warnings = Vec::new();
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for entry in &entries {
            for name in &entry.names {
                match owner.get(name.as_str()) {
                    Some(first) if *first != entry.id => warnings.push(format!(
                        "'{}' is claimed by both '{}' and '{}'; '{}' wins",
                        name, first, entry.id, first
                    )),
                    Some(_) => {}
                    None => {
                        owner.insert(name.as_str(), entry.id.as_str());
                    }
                }
                if let Some(global) = GlobalCommand::shadowing(name) {
                    warnings.push(format!(
                        "'{}' of project '{}' starts with the global phrase '{}' and cannot be used as a prefix",
                        name,
                        entry.id,
                        global.phrase()
                    ));
                }
            }
        }

        for w in &warnings {
            warn!("alias table: {}", w);
        }

        Self { entries, warnings }
    }

    /// Exact, case-insensitive lookup. First registered project wins.
    pub fn resolve(&self, spoken: &str) -> Option<&str> {
        let spoken = spoken.trim().to_lowercase();
        if spoken.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.names.iter().any(|n| *n == spoken))
            .map(|e| e.id.as_str())
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }

    /// Collisions and shadowed names found while building the table.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Live sessions keyed by project id, plus the alias table used to find them.
pub struct SessionRegistry {
    aliases: AliasTable,
    sessions: RwLock<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(aliases: AliasTable) -> Self {
        Self {
            aliases,
            sessions: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(AliasTable::from_projects(&config.projects))
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Register a session. A session with the same id is replaced in place.
    pub fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.iter_mut().find(|s| s.id() == session.id()) {
            Some(slot) => *slot = Arc::clone(&session),
            None => sessions.push(Arc::clone(&session)),
        }
        session
    }

    /// Launch windows for `names` (or every configured project), in configuration order
    /// for the full set and in the given order otherwise. Unknown names and failed
    /// launches are logged and skipped. Returns the number of sessions launched.
    pub fn launch(
        &self,
        config: &ControllerConfig,
        driver: Arc<dyn TerminalDriver>,
        names: Option<&[String]>,
    ) -> usize {
        let projects: Vec<&ProjectConfig> = match names {
            Some(names) if !names.is_empty() => names
                .iter()
                .filter_map(|n| {
                    let found = config.project(n);
                    if found.is_none() {
                        warn!(project = %n, "project not found in config");
                    }
                    found
                })
                .collect(),
            _ => config.projects.iter().collect(),
        };

        let positions = config.layout.positions(projects.len());
        let mut launched = 0;
        for (i, project) in projects.into_iter().enumerate() {
            match driver.launch(project, &config.layout, positions.get(i).copied()) {
                Ok(handle) => {
                    info!(project = %project.name, title = %handle.title, "launched session");
                    let session = Session::new(
                        project.name.clone(),
                        project.name.clone(),
                        handle,
                        Arc::clone(&driver),
                    )
                    .with_extent(config.monitor.read_extent);
                    self.insert(session);
                    launched += 1;
                }
                Err(e) => warn!(project = %project.name, error = %e, "launch failed"),
            }
        }
        launched
    }

    /// Resolve a spoken name to a live session.
    pub fn resolve(&self, spoken: &str) -> Option<Arc<Session>> {
        self.aliases.resolve(spoken).and_then(|id| self.by_id(id))
    }

    pub fn by_id(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Sessions in registration order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions().iter().map(|s| s.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask every window to exit and forget the sessions.
    pub fn close_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.write().unwrap_or_else(|e| e.into_inner()));
        for session in sessions {
            session.close();
            std::thread::sleep(CLOSE_STAGGER);
        }
    }
}
