//! Session bookkeeping.
//!
//! The manager owns the stored session collection plus a working copy of the current session.
//! Streaming writes land in the working copy; [`SessionManager::update_session`] copies it back
//! into the collection.

use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::types::{Message, Model, Session, SessionId};

/// Source of the models a new session may talk to.
pub trait ModelCatalog: Send + Sync {
    /// The configured models; new sessions use the first one.
    fn models(&self) -> Vec<Model>;
}

/// Source of the project metadata a new session is seeded with.
pub trait ProjectCatalog: Send + Sync {
    /// The projects, as opaque JSON.
    fn projects(&self) -> Vec<Value>;
}

impl ModelCatalog for Vec<Model> {
    fn models(&self) -> Vec<Model> {
        self.clone()
    }
}

impl ProjectCatalog for Vec<Value> {
    fn projects(&self) -> Vec<Value> {
        self.clone()
    }
}

/// CRUD over chat sessions.
pub struct SessionManager {
    models: Arc<dyn ModelCatalog>,
    projects: Arc<dyn ProjectCatalog>,
    sessions: Vec<Session>,
    current: Option<Session>,
    last_id: u64,
}

impl SessionManager {
    /// Creates an empty manager backed by the given catalogs.
    pub fn new(models: Arc<dyn ModelCatalog>, projects: Arc<dyn ProjectCatalog>) -> Self {
        Self {
            models,
            projects,
            sessions: Vec::new(),
            current: None,
            last_id: 0,
        }
    }

    /// Start a new session and make it current.
    ///
    /// The session talks to the first catalogued model and opens with a system message holding
    /// the project list as a fenced JSON block.
    pub fn create_session(&mut self) -> Result<&Session> {
        let projects = serde_json::to_string_pretty(&self.projects.projects())?;
        let model = self.models.models().into_iter().next();
        let id = self.next_id();
        let session = Session::new(
            id,
            model,
            vec![Message::system(format!("```json\n{projects}\n```"))],
        );
        self.sessions.push(session.clone());
        Ok(self.current.insert(session))
    }

    /// Remove the stored session at `index`.  Out-of-range indices are ignored.
    pub fn delete_session(&mut self, index: usize) -> Option<Session> {
        if index < self.sessions.len() {
            Some(self.sessions.remove(index))
        } else {
            None
        }
    }

    /// Copy the current session over the stored session with the same identifier.
    ///
    /// Returns false, changing nothing, when no stored session matches.
    pub fn update_session(&mut self) -> bool {
        let Some(current) = &self.current else {
            return false;
        };
        match self.sessions.iter_mut().find(|s| s.id == current.id) {
            Some(stored) => {
                *stored = current.clone();
                true
            }
            None => false,
        }
    }

    /// Make the stored session at `index` current.
    pub fn select_session(&mut self, index: usize) -> Option<&Session> {
        let session = self.sessions.get(index)?.clone();
        Some(self.current.insert(session))
    }

    /// Change the model of the current session.
    pub fn set_model(&mut self, model: Option<Model>) -> Result<()> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| Error::configuration("no session selected"))?;
        current.model = model;
        Ok(())
    }

    /// The current session.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// The current session, mutably.
    pub fn current_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    /// The stored sessions, in creation order.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// The models new sessions can pick from.
    pub fn models(&self) -> Vec<Model> {
        self.models.models()
    }

    /// The session with identifier `id`, preferring the working copy of the current session.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        match &self.current {
            Some(current) if current.id == id => Some(current),
            _ => self.sessions.iter().find(|s| s.id == id),
        }
    }

    /// Mutable counterpart of [`SessionManager::session`].
    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        match &mut self.current {
            Some(current) if current.id == id => Some(current),
            _ => self.sessions.iter_mut().find(|s| s.id == id),
        }
    }

    fn next_id(&mut self) -> SessionId {
        let now = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).max(0) as u64;
        self.last_id = now.max(self.last_id + 1);
        SessionId::new(self.last_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> SessionManager {
        let models = vec![
            Model::new("https://one.example.com", "k1").with_option("model", "first"),
            Model::new("https://two.example.com", "k2"),
        ];
        let projects = vec![json!({"name": "demo", "files": ["src/main.rs"]})];
        SessionManager::new(Arc::new(models), Arc::new(projects))
    }

    #[test]
    fn create_session_seeds_model_and_projects() {
        let mut manager = manager();
        let session = manager.create_session().unwrap().clone();
        assert_eq!(session.model.as_ref().and_then(Model::name), Some("first"));
        assert_eq!(session.messages.len(), 1);
        assert_eq!(
            session.messages[0],
            Message::system(
                "```json\n[\n  {\n    \"name\": \"demo\",\n    \"files\": [\n      \"src/main.rs\"\n    ]\n  }\n]\n```"
            )
        );
        assert_eq!(manager.current(), Some(&session));
        assert_eq!(manager.sessions(), &[session]);
    }

    #[test]
    fn create_session_without_models() {
        let mut manager = SessionManager::new(Arc::new(Vec::new()), Arc::new(Vec::new()));
        let session = manager.create_session().unwrap();
        assert!(session.model.is_none());
        assert_eq!(session.messages[0].content, "```json\n[]\n```");
    }

    #[test]
    fn session_ids_are_unique() {
        let mut manager = manager();
        let a = manager.create_session().unwrap().id;
        let b = manager.create_session().unwrap().id;
        let c = manager.create_session().unwrap().id;
        assert!(a < b && b < c);
    }

    #[test]
    fn update_session_touches_only_the_matching_entry() {
        let mut manager = manager();
        manager.create_session().unwrap();
        manager.create_session().unwrap();
        manager.create_session().unwrap();
        manager.select_session(1).unwrap();
        let before = manager.sessions().to_vec();

        manager
            .current_mut()
            .unwrap()
            .messages
            .push(Message::user("changed"));
        assert!(manager.update_session());

        let after = manager.sessions();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert_eq!(after[1].messages.last(), Some(&Message::user("changed")));
        assert_eq!(Some(&after[1]), manager.current());
    }

    #[test]
    fn update_session_without_match_is_a_no_op() {
        let mut manager = manager();
        manager.create_session().unwrap();
        let before = manager.sessions().to_vec();
        manager.delete_session(0).unwrap();
        manager
            .current_mut()
            .unwrap()
            .messages
            .push(Message::user("orphan"));
        assert!(!manager.update_session());
        assert!(manager.sessions().is_empty());
        assert_eq!(before.len(), 1);
    }

    #[test]
    fn delete_session_out_of_range() {
        let mut manager = manager();
        manager.create_session().unwrap();
        assert!(manager.delete_session(4).is_none());
        assert_eq!(manager.sessions().len(), 1);
    }

    #[test]
    fn session_lookup_prefers_working_copy() {
        let mut manager = manager();
        let id = manager.create_session().unwrap().id;
        manager
            .session_mut(id)
            .unwrap()
            .messages
            .push(Message::user("draft"));
        assert_eq!(manager.session(id).unwrap().messages.len(), 2);
        assert_eq!(manager.sessions()[0].messages.len(), 1);
    }

    #[test]
    fn set_model_requires_a_session() {
        let mut manager = manager();
        assert!(manager.set_model(None).unwrap_err().is_configuration());
        manager.create_session().unwrap();
        manager.set_model(None).unwrap();
        assert!(manager.current().unwrap().model.is_none());
    }
}
