//! Named session sets for fan-out commands. Membership is exclusive.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    #[serde(default)]
    pub sessions: Vec<u64>,
}

impl GroupRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sessions: Vec::new(),
        }
    }

    pub fn add(&mut self, session_id: u64) -> bool {
        if self.sessions.contains(&session_id) {
            return false;
        }
        self.sessions.push(session_id);
        true
    }

    pub fn remove(&mut self, session_id: u64) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| *s != session_id);
        self.sessions.len() != before
    }
}
