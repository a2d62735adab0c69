//! Signed session cookies and in-memory session state.
//!
//! # Cookie format
//!
//! ```text
//! base64url(json {sid, username, exp}) "." hex(HMAC-SHA256(cookie.key, payload))
//! ```
//!
//! The MAC is checked in constant time and expired tokens are rejected.
//! Session state (chat history and indexed documents per page) lives only
//! in memory until its cookie expires or the user logs out; a valid cookie
//! whose session is unknown is re-admitted by [`SessionStore::restore`]
//! unless that session was logged out. Expired sessions and revocations are
//! pruned whenever a session is created or restored.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::credentials::{CookieConfig, UserRecord};
use crate::index::IndexedDocument;
use crate::models::ChatMessage;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sid: String,
    pub username: String,
    /// Expiry, unix seconds.
    pub exp: i64,
}

fn mac(key: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size")
}

pub fn sign_token(key: &str, claims: &TokenClaims) -> String {
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    let mut m = mac(key);
    m.update(payload.as_bytes());
    let sig = hex::encode(m.finalize().into_bytes());
    format!("{}.{}", payload, sig)
}

/// Returns the claims if the signature matches and `exp` is after `now`.
pub fn verify_token(key: &str, token: &str, now: i64) -> Option<TokenClaims> {
    let (payload, sig) = token.split_once('.')?;
    let sig = hex::decode(sig).ok()?;
    let mut m = mac(key);
    m.update(payload.as_bytes());
    m.verify_slice(&sig).ok()?;

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: TokenClaims = serde_json::from_slice(&bytes).ok()?;
    if claims.exp <= now {
        return None;
    }
    Some(claims)
}

/// `Set-Cookie` value carrying a signed token.
pub fn session_cookie(cookie: &CookieConfig, token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        cookie.name,
        token,
        cookie.max_age_secs()
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(cookie: &CookieConfig) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", cookie.name)
}

/// Find a cookie by name in a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Per-page state: chat history and the indexed document, if any.
#[derive(Debug, Default, Clone)]
pub struct PageSession {
    pub messages: Vec<ChatMessage>,
    pub document: Option<Arc<IndexedDocument>>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub sid: String,
    pub username: String,
    pub name: String,
    pub roles: Option<Vec<String>>,
    pub pages: HashMap<String, PageSession>,
    /// Expiry of the owning cookie, unix seconds.
    pub exp: i64,
}

impl Session {
    fn for_user(sid: String, user: &UserRecord, exp: i64) -> Self {
        Self {
            sid,
            username: user.username.clone(),
            name: user.name.clone(),
            roles: user.roles.clone(),
            pages: HashMap::new(),
            exp,
        }
    }

    pub fn roles(&self) -> Option<&[String]> {
        self.roles.as_deref()
    }

    pub fn page_mut(&mut self, slug: &str) -> &mut PageSession {
        self.pages.entry(slug.to_string()).or_default()
    }
}

/// All live sessions, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    /// Logged-out session ids mapped to their cookie expiry; a cookie stays
    /// signed until then, so the id is refused until then.
    revoked: RwLock<HashMap<String, i64>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh session for `user` whose cookie expires at `exp`,
    /// returning its id.
    pub fn create(&self, user: &UserRecord, exp: i64, now: i64) -> String {
        self.prune(now);
        let sid = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(sid.clone(), Session::for_user(sid.clone(), user, exp));
        sid
    }

    /// Re-admit a session from a valid cookie after its state was lost.
    /// Existing state is kept. Returns `false` for a logged-out session.
    pub fn restore(&self, sid: &str, user: &UserRecord, exp: i64, now: i64) -> bool {
        self.prune(now);
        if self
            .revoked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(sid)
        {
            return false;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(sid.to_string())
            .or_insert_with(|| Session::for_user(sid.to_string(), user, exp));
        true
    }

    /// Drop sessions whose cookie has expired, and revocations that no
    /// longer matter because the revoked cookie has expired too.
    /// Returns the number of sessions dropped.
    pub fn prune(&self, now: i64) -> usize {
        let dropped = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let before = sessions.len();
            sessions.retain(|_, s| s.exp > now);
            before - sessions.len()
        };
        self.revoked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, exp| *exp > now);
        if dropped > 0 {
            tracing::debug!(sessions = dropped, "pruned expired sessions");
        }
        dropped
    }

    pub fn with<R>(&self, sid: &str, f: impl FnOnce(&Session) -> R) -> Option<R> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(sid).map(f)
    }

    pub fn with_mut<R>(&self, sid: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.get_mut(sid).map(f)
    }

    /// Log a session out: drop everything it holds and refuse to restore it
    /// while its cookie (expiring at `exp`) is still valid.
    pub fn remove(&self, sid: &str, exp: i64) -> bool {
        self.revoked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sid.to_string(), exp);
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(sid).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;

    fn claims(exp: i64) -> TokenClaims {
        TokenClaims {
            sid: "s1".to_string(),
            username: "jsmith".to_string(),
            exp,
        }
    }

    #[test]
    fn test_token_verifies_with_same_key() {
        let token = sign_token("key", &claims(2_000));
        assert_eq!(verify_token("key", &token, 1_000), Some(claims(2_000)));
    }

    #[test]
    fn test_token_rejected_with_other_key() {
        let token = sign_token("key", &claims(2_000));
        assert!(verify_token("other", &token, 1_000).is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = sign_token("key", &claims(2_000));
        assert!(verify_token("key", &token, 2_000).is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign_token("key", &claims(2_000));
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenClaims {
                username: "admin".to_string(),
                ..claims(2_000)
            })
            .unwrap(),
        );
        let forged = format!("{}.{}", forged_payload, sig);
        assert!(verify_token("key", &forged, 1_000).is_none());
        assert!(verify_token("key", "garbage", 1_000).is_none());
    }

    #[test]
    fn test_cookie_value_parsing() {
        let header = "theme=dark; pdfa_auth=abc.def; other=1";
        assert_eq!(cookie_value(header, "pdfa_auth"), Some("abc.def"));
        assert_eq!(cookie_value(header, "missing"), None);
    }

    fn user() -> UserRecord {
        let yaml = r#"
credentials:
  usernames:
    jsmith:
      name: John Smith
      password: pw
      roles: [user]
cookie:
  name: pdfa_auth
  key: k
  expiry_days: 1
"#;
        let creds = Credentials::from_yaml_with_cost(yaml, 4).unwrap();
        creds.user("jsmith").unwrap().clone()
    }

    const NOW: i64 = 1_000;
    const EXP: i64 = 2_000;

    #[test]
    fn test_store_lifecycle() {
        let store = SessionStore::new();
        let u = user();
        let sid = store.create(&u, EXP, NOW);
        store.with_mut(&sid, |s| {
            s.page_mut("assistant")
                .messages
                .push(ChatMessage::user("hello"))
        });
        let count = store.with(&sid, |s| s.pages["assistant"].messages.len());
        assert_eq!(count, Some(1));

        // restoring an existing session keeps its state
        assert!(store.restore(&sid, &u, EXP, NOW));
        assert_eq!(store.with(&sid, |s| s.pages.len()), Some(1));

        assert!(store.remove(&sid, EXP));
        assert!(store.is_empty());
        assert!(!store.restore(&sid, &u, EXP, NOW));
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_unknown_sid_creates_session() {
        let store = SessionStore::new();
        assert!(store.restore("lost-sid", &user(), EXP, NOW));
        assert_eq!(store.with("lost-sid", |s| s.name.clone()), Some("John Smith".to_string()));
        assert_eq!(store.with("lost-sid", |s| s.exp), Some(EXP));
    }

    #[test]
    fn test_expired_sessions_are_pruned_on_login() {
        let store = SessionStore::new();
        let u = user();
        for _ in 0..5 {
            store.create(&u, 1_500, NOW);
        }
        assert_eq!(store.len(), 5);

        let fresh = store.create(&u, 5_000, 1_600);
        assert_eq!(store.len(), 1);
        assert!(store.with(&fresh, |_| ()).is_some());
    }

    #[test]
    fn test_revocations_expire_with_their_cookie() {
        let store = SessionStore::new();
        let u = user();
        let sid = store.create(&u, EXP, NOW);
        store.remove(&sid, EXP);
        assert!(!store.restore(&sid, &u, EXP, NOW + 1));
        assert_eq!(store.revoked.read().unwrap().len(), 1);

        assert_eq!(store.prune(EXP), 0);
        assert!(store.revoked.read().unwrap().is_empty());
    }
}
