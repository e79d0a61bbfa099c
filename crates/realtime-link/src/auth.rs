//! Authentication signals.
//!
//! The link only needs a yes/no answer to "is there evidence of an
//! authenticated session?". Evidence usually lives somewhere that cannot
//! announce changes (a cookie jar), so the link polls [`AuthSignal::poll`]
//! on a fixed interval. Push-based sources can call
//! [`RealtimeClient::refresh_auth`](crate::websocket::RealtimeClient::refresh_auth)
//! instead of waiting for the next poll.
//!
//! Closures can be used through [`FnSignal`].

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::RwLock;

/// Session marker names set by the backend login flow.
pub const DEFAULT_SESSION_MARKERS: &[&str] = &["encube_auth", "SESSION", "JSESSIONID"];

/// A side-effect free boolean signal.
pub trait AuthSignal: Send + Sync + 'static {
    /// Read the current value.
    fn poll(&self) -> bool;
}

/// Adapts a closure into an [`AuthSignal`].
#[derive(Clone)]
pub struct FnSignal<F>(pub F);

impl<F> AuthSignal for FnSignal<F>
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    fn poll(&self) -> bool {
        (self.0)()
    }
}

impl<T: AuthSignal + ?Sized> AuthSignal for Arc<T> {
    fn poll(&self) -> bool {
        (**self).poll()
    }
}

/// Synchronous key lookup in an ambient store.
pub trait MarkerStore: Send + Sync + 'static {
    fn contains(&self, name: &str) -> bool;
}

impl<T: MarkerStore + ?Sized> MarkerStore for Arc<T> {
    fn contains(&self, name: &str) -> bool {
        (**self).contains(name)
    }
}

/// Authenticated when any of the configured marker names is present.
#[derive(Debug, Clone)]
pub struct SessionMarkerSignal<S> {
    store: S,
    markers: Vec<String>,
}

impl<S: MarkerStore> SessionMarkerSignal<S> {
    /// Watch `store` for the default session markers.
    pub fn new(store: S) -> Self {
        Self::with_markers(store, DEFAULT_SESSION_MARKERS.iter().copied())
    }

    pub fn with_markers<I, M>(store: S, markers: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            store,
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl<S: MarkerStore> AuthSignal for SessionMarkerSignal<S> {
    fn poll(&self) -> bool {
        self.markers.iter().any(|name| self.store.contains(name))
    }
}

/// A thread-safe cookie store keyed by cookie name.
///
/// Accepts `Cookie:` header syntax (`a=1; b=2`), the same shape a browser
/// exposes for page-readable cookies.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar from a cookie header string.
    pub fn from_header(header: &str) -> Self {
        let jar = Self::new();
        jar.set_header(header);
        jar
    }

    /// Replace the whole jar with the cookies of `header`.
    pub fn set_header(&self, header: &str) {
        let parsed = parse_cookie_header(header);
        *self.cookies.write() = parsed;
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.write().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.cookies.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies.read().get(name).cloned()
    }

    pub fn clear(&self) {
        self.cookies.write().clear();
    }

    /// Render the jar back into header syntax.
    pub fn header(&self) -> String {
        self.cookies
            .read()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl MarkerStore for CookieJar {
    fn contains(&self, name: &str) -> bool {
        self.cookies.read().contains_key(name)
    }
}

fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// A settable flag, for hosts that learn about sessions through events.
#[derive(Debug, Default)]
pub struct AuthFlag(AtomicBool);

impl AuthFlag {
    pub fn new(authenticated: bool) -> Self {
        Self(AtomicBool::new(authenticated))
    }

    pub fn set(&self, authenticated: bool) {
        self.0.store(authenticated, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl AuthSignal for AuthFlag {
    fn poll(&self) -> bool {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cookie_header() {
        let jar = CookieJar::from_header("theme=dark; SESSION=abc123 ;  empty=; =junk; novalue");
        assert_eq!(jar.get("theme").as_deref(), Some("dark"));
        assert_eq!(jar.get("SESSION").as_deref(), Some("abc123"));
        assert_eq!(jar.get("empty").as_deref(), Some(""));
        assert!(!jar.contains("novalue"));
        assert!(!jar.contains(""));
    }

    #[test]
    fn any_default_marker_authenticates() {
        for marker in DEFAULT_SESSION_MARKERS {
            let jar = CookieJar::from_header(&format!("theme=dark; {marker}=1"));
            let signal = SessionMarkerSignal::new(jar);
            assert!(signal.poll(), "{marker} should authenticate");
        }
    }

    #[test]
    fn marker_match_is_by_exact_name() {
        let signal = SessionMarkerSignal::new(CookieJar::from_header("MY_SESSION=1; xSESSIONx=2"));
        assert!(!signal.poll());
    }

    #[test]
    fn signal_tracks_jar_changes() {
        let jar = Arc::new(CookieJar::new());
        let signal = SessionMarkerSignal::new(Arc::clone(&jar));
        assert!(!signal.poll());

        jar.insert("encube_auth", "true");
        assert!(signal.poll());

        jar.remove("encube_auth");
        assert!(!signal.poll());

        jar.set_header("JSESSIONID=42");
        assert!(signal.poll());
        assert_eq!(jar.header(), "JSESSIONID=42");

        jar.clear();
        assert!(!signal.poll());
    }

    #[test]
    fn custom_markers() {
        let signal = SessionMarkerSignal::with_markers(CookieJar::from_header("token=x"), ["token"]);
        assert_eq!(signal.markers(), ["token".to_string()]);
        assert!(signal.poll());
    }

    #[test]
    fn flag_and_closure_signals() {
        let flag = Arc::new(AuthFlag::new(false));
        assert!(!flag.poll());
        flag.set(true);
        assert!(flag.poll());

        let closure = FnSignal(|| true);
        assert!(closure.poll());
    }
}
