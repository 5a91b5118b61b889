/*!
Per-browser session state.

Sessions live in memory, keyed by an opaque 32-character id the client
carries in a signed cookie. A session records who is logged in and the
most recent score for each subject attempted this session; it dies on
logout or after a configurable period of inactivity.
*/
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use time::{Duration, OffsetDateTime};

use crate::auth;

const SESSION_ID_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct SessionData {
    pub uname: String,
    pub results: HashMap<String, u32>,
    last_access: OffsetDateTime,
}

pub struct Sessions {
    map: Mutex<HashMap<String, SessionData>>,
    expiry: Duration,
}

impl Sessions {
    pub fn new(expiry_hours: i64) -> Sessions {
        log::trace!("Sessions::new( {} ) called.", &expiry_hours);

        Sessions {
            map: Mutex::new(HashMap::new()),
            expiry: Duration::hours(expiry_hours),
        }
    }

    fn lock(&self) -> MutexGuard<HashMap<String, SessionData>> {
        self.map.lock().expect("Session store lock poisoned")
    }

    /// Start an authenticated session for `uname` and return its id.
    ///
    /// Expired sessions are swept here, so the map stays bounded by
    /// login traffic.
    pub fn open(&self, uname: &str) -> String {
        log::trace!("Sessions::open( {:?} ) called.", uname);

        let mut map = self.lock();
        let cutoff = OffsetDateTime::now_utc() - self.expiry;
        map.retain(|_, s| s.last_access > cutoff);

        let id = auth::random_token(SESSION_ID_LENGTH);
        map.insert(id.clone(), SessionData {
            uname: uname.to_owned(),
            results: HashMap::new(),
            last_access: OffsetDateTime::now_utc(),
        });
        id
    }

    /// A snapshot of the session, if it exists and hasn't expired.
    /// Refreshes the inactivity clock.
    pub fn get(&self, id: &str) -> Option<SessionData> {
        let mut map = self.lock();
        let cutoff = OffsetDateTime::now_utc() - self.expiry;
        match map.get_mut(id) {
            Some(s) if s.last_access > cutoff => {
                s.last_access = OffsetDateTime::now_utc();
                Some(s.clone())
            },
            Some(_) => {
                log::trace!("Session expired; dropping.");
                map.remove(id);
                None
            },
            None => None,
        }
    }

    pub fn uname(&self, id: &str) -> Option<String> {
        self.get(id).map(|s| s.uname)
    }

    /// Store `score` for `subject`, silently replacing any score a
    /// previous attempt left this session.
    pub fn record_result(&self, id: &str, subject: &str, score: u32) {
        log::trace!(
            "Sessions::record_result( [id], {:?}, {} ) called.",
            subject, &score
        );

        if let Some(s) = self.lock().get_mut(id) {
            s.results.insert(subject.to_owned(), score);
        }
    }

    /// This session's per-subject scores, sorted by subject.
    pub fn results(&self, id: &str) -> Vec<(String, u32)> {
        match self.get(id) {
            Some(s) => {
                let mut results: Vec<(String, u32)> = s.results.into_iter().collect();
                results.sort();
                results
            },
            None => Vec::new(),
        }
    }

    /// Sum of this session's stored per-subject scores.
    pub fn totals(&self, id: &str) -> u32 {
        match self.get(id) {
            Some(s) => s.results.values().sum(),
            None => 0,
        }
    }

    /// Logout.
    pub fn close(&self, id: &str) {
        log::trace!("Sessions::close( [id] ) called.");
        self.lock().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[test]
    fn open_and_get() {
        ensure_logging();

        let sessions = Sessions::new(24);
        let id = sessions.open("alice");
        assert_eq!(id.len(), SESSION_ID_LENGTH);

        let s = sessions.get(&id).unwrap();
        assert_eq!(s.uname, "alice");
        assert!(s.results.is_empty());

        assert!(sessions.get("no-such-session").is_none());
    }

    #[test]
    fn later_attempts_replace_earlier() {
        ensure_logging();

        let sessions = Sessions::new(24);
        let id = sessions.open("alice");

        sessions.record_result(&id, "math", 4);
        sessions.record_result(&id, "history", 6);
        sessions.record_result(&id, "math", 9);

        assert_eq!(sessions.results(&id), vec![
            ("history".to_owned(), 6),
            ("math".to_owned(), 9),
        ]);
        assert_eq!(sessions.totals(&id), 15);
    }

    #[test]
    fn close_clears_state() {
        ensure_logging();

        let sessions = Sessions::new(24);
        let id = sessions.open("alice");
        sessions.record_result(&id, "math", 4);

        sessions.close(&id);
        assert!(sessions.get(&id).is_none());
        assert_eq!(sessions.results(&id), vec![]);
        assert_eq!(sessions.totals(&id), 0);
    }

    #[test]
    fn zero_expiry_means_no_session_survives() {
        ensure_logging();

        let sessions = Sessions::new(0);
        let id = sessions.open("alice");
        assert!(sessions.get(&id).is_none());
        assert_eq!(sessions.uname(&id), None);
    }

    #[test]
    fn sessions_are_independent() {
        ensure_logging();

        let sessions = Sessions::new(24);
        let alice = sessions.open("alice");
        let bob = sessions.open("bob");

        sessions.record_result(&alice, "math", 9);
        assert_eq!(sessions.results(&bob), vec![]);
        assert_eq!(sessions.uname(&bob), Some("bob".to_owned()));
    }
}
