//! Post edit sessions.
//!
//! Entering the correct edit code for a post opens a session bound to that
//! post. The session id is handed to the client and must accompany the
//! update that follows. Sessions are single-use and expire after
//! [`SESSION_TTL`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;
use ulid::Ulid;

/// Lifetime of an edit session.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

struct EditSession {
    post: String,
    started: Instant,
}

/// Open edit sessions, keyed by session id.
pub struct EditSessions {
    ttl: Duration,
    sessions: Mutex<HashMap<String, EditSession>>,
}

impl Default for EditSessions {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

impl EditSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sweep(&self, sessions: &mut HashMap<String, EditSession>) {
        let before = sessions.len();
        sessions.retain(|_, s| s.started.elapsed() < self.ttl);

        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "Swept edit sessions");
        }
    }

    /// Open a session for `post` and return its id.
    pub async fn open(&self, post: &str) -> String {
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions);

        let id = Ulid::new().to_string();
        sessions.insert(
            id.clone(),
            EditSession {
                post: post.to_string(),
                started: Instant::now(),
            },
        );

        id
    }

    /// Consume a session. True only when it exists, has not expired and
    /// belongs to `post`. A session presented for another post is left
    /// untouched.
    pub async fn take(&self, session: &str, post: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions);

        match sessions.get(session) {
            Some(s) if s.post == post => {
                sessions.remove(session);
                true
            }
            _ => false,
        }
    }

    /// Number of live sessions.
    pub async fn active(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions);
        sessions.len()
    }
}
