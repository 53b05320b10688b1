//! Open editor sessions, keyed by session id.
//!
//! Sessions idle for longer than the configured timeout are dropped the next
//! time the registry is touched, and deleting a container drops every session
//! open on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::db::Database;
use crate::engine::EmbeddedEditor;

pub type SharedEditor = Arc<AsyncMutex<EmbeddedEditor<Database>>>;

struct Session {
    editor: SharedEditor,
    container_id: Uuid,
    last_used: Instant,
}

#[derive(Clone)]
pub struct EditorSessions {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    idle_timeout: Duration,
}

impl EditorSessions {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn insert(&self, editor: EmbeddedEditor<Database>) -> Uuid {
        let id = Uuid::new_v4();
        let container_id = editor.entity().container_id();
        let mut sessions = self.sessions.lock().expect("editor sessions lock poisoned");
        self.expire_idle(&mut sessions);
        sessions.insert(
            id,
            Session {
                editor: Arc::new(AsyncMutex::new(editor)),
                container_id,
                last_used: Instant::now(),
            },
        );
        id
    }

    /// Look up a session and mark it used.
    pub fn get(&self, id: Uuid) -> Option<SharedEditor> {
        let mut sessions = self.sessions.lock().expect("editor sessions lock poisoned");
        self.expire_idle(&mut sessions);
        let session = sessions.get_mut(&id)?;
        session.last_used = Instant::now();
        Some(session.editor.clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<SharedEditor> {
        let mut sessions = self.sessions.lock().expect("editor sessions lock poisoned");
        sessions.remove(&id).map(|session| session.editor)
    }

    /// Drop every session editing a record of `container_id`.
    pub fn remove_container(&self, container_id: Uuid) -> usize {
        let mut sessions = self.sessions.lock().expect("editor sessions lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, session| session.container_id != container_id);
        before - sessions.len()
    }

    fn expire_idle(&self, sessions: &mut HashMap<Uuid, Session>) {
        let before = sessions.len();
        sessions.retain(|_, session| session.last_used.elapsed() < self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "Closed idle editor sessions");
        }
    }
}
