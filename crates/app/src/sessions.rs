use axum::http::header::{HeaderValue, COOKIE};
use axum::http::HeaderMap;
use docchat_core::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    /// `None` issues a browser-session cookie.
    pub max_age: Option<Duration>,
    /// Restricts the cookie to HTTPS.
    pub secure: bool,
}

impl CookieSettings {
    pub fn header_value(&self, id: Uuid) -> Option<HeaderValue> {
        let mut cookie = format!("{}={id}; Path=/; HttpOnly; SameSite=Lax", self.name);
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).ok()
    }
}

pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

struct Entry {
    session: SharedSession,
    last_seen: Instant,
}

/// One `Session` per browser cookie. Each session sits behind its own mutex so
/// a browser's requests run one at a time while other browsers proceed.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

impl SessionRegistry {
    /// Returns the session for `id`, creating a fresh one when the id is
    /// missing or unknown. The flag tells whether a cookie must be issued.
    pub async fn resolve(&self, id: Option<Uuid>) -> (Uuid, SharedSession, bool) {
        let mut entries = self.entries.lock().await;
        if let Some(id) = id {
            if let Some(entry) = entries.get_mut(&id) {
                entry.last_seen = Instant::now();
                return (id, Arc::clone(&entry.session), false);
            }
        }

        let session = Session::new();
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        entries.insert(
            id,
            Entry {
                session: Arc::clone(&shared),
                last_seen: Instant::now(),
            },
        );
        (id, shared, true)
    }

    /// Moves the entry stored under `old` to `new`, the id its session now
    /// carries. Afterwards `old` resolves to a fresh session.
    pub async fn rekey(&self, old: Uuid, new: Uuid) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.remove(&old) {
            Some(mut entry) => {
                entry.last_seen = Instant::now();
                entries.insert(new, entry);
                true
            }
            None => false,
        }
    }

    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_seen.elapsed() < idle);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_found_among_others() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.append(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; docchat_session={id}; lang=en"))
                .expect("header"),
        );

        assert_eq!(session_id_from_headers(&headers, "docchat_session"), Some(id));
        assert_eq!(session_id_from_headers(&headers, "other"), None);
    }

    #[test]
    fn malformed_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("docchat_session=not-a-uuid"));
        assert_eq!(session_id_from_headers(&headers, "docchat_session"), None);
    }

    #[test]
    fn cookie_header_carries_max_age_only_when_set() {
        let id = Uuid::new_v4();
        let session_cookie = CookieSettings {
            name: "docchat_session".to_string(),
            max_age: None,
            secure: false,
        };
        let persistent = CookieSettings {
            max_age: Some(Duration::from_secs(30 * 86_400)),
            ..session_cookie.clone()
        };

        let plain = session_cookie.header_value(id).expect("header");
        assert!(!plain.to_str().expect("ascii").contains("Max-Age"));
        let lasting = persistent.header_value(id).expect("header");
        assert!(lasting.to_str().expect("ascii").ends_with("Max-Age=2592000"));
    }

    #[test]
    fn secure_attribute_follows_settings() {
        let id = Uuid::new_v4();
        let mut settings = CookieSettings {
            name: "docchat_session".to_string(),
            max_age: None,
            secure: false,
        };
        let plain = settings.header_value(id).expect("header");
        assert!(!plain.to_str().expect("ascii").contains("Secure"));

        settings.secure = true;
        let secure = settings.header_value(id).expect("header");
        let secure = secure.to_str().expect("ascii");
        assert!(secure.contains("HttpOnly"));
        assert!(secure.ends_with("; Secure"));
    }

    #[tokio::test]
    async fn rekeyed_session_leaves_old_id_unknown() {
        let registry = SessionRegistry::default();
        let (old, shared, _) = registry.resolve(None).await;
        let new = shared.lock().await.renew_id();

        assert!(registry.rekey(old, new).await);
        let (same, moved, created) = registry.resolve(Some(new)).await;
        assert_eq!(same, new);
        assert!(!created);
        assert!(Arc::ptr_eq(&shared, &moved));

        let (fresh, _, created) = registry.resolve(Some(old)).await;
        assert!(created);
        assert_ne!(fresh, old);
        assert!(!registry.rekey(old, Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn known_ids_reuse_sessions_and_unknown_ids_get_new_ones() {
        let registry = SessionRegistry::default();
        let (id, _, created) = registry.resolve(None).await;
        assert!(created);

        let (same, _, created) = registry.resolve(Some(id)).await;
        assert_eq!(same, id);
        assert!(!created);

        let (fresh, _, created) = registry.resolve(Some(Uuid::new_v4())).await;
        assert_ne!(fresh, id);
        assert!(created);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let registry = SessionRegistry::default();
        registry.resolve(None).await;

        assert_eq!(registry.evict_idle(Duration::from_secs(3_600)).await, 0);
        assert_eq!(registry.evict_idle(Duration::ZERO).await, 1);
        assert_eq!(registry.len().await, 0);
    }
}
