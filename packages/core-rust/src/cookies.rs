//! Per-request cookie accessor.
//!
//! Reads are served from a snapshot of the incoming `Cookie` header. Writes
//! never touch that snapshot: each `set`/`delete` appends one fully
//! specified `Set-Cookie` directive to an outgoing buffer, which the server
//! drains exactly once when it finalizes the response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cookie::time::OffsetDateTime;
use cookie::Cookie;
use parking_lot::Mutex;

pub use cookie::SameSite;

/// Attributes of a written cookie.
///
/// The default is `HttpOnly; Secure` with no other attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<Duration>,
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            path: None,
            domain: None,
            max_age: None,
            same_site: None,
        }
    }
}

#[derive(Debug, Default)]
struct CookieState {
    incoming: HashMap<String, String>,
    outgoing: Mutex<Vec<String>>,
}

/// Cookie capability handed to operations and context adapters.
///
/// Cloning is cheap and every clone shares the same request state, so a
/// handle can be moved into an `async` block freely.
#[derive(Debug, Clone, Default)]
pub struct Cookies {
    state: Arc<CookieState>,
}

impl Cookies {
    /// Creates an accessor with no incoming cookies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one or more `Cookie` header values into the read snapshot.
    ///
    /// Malformed pairs are skipped. When a name appears twice the first
    /// occurrence wins.
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut incoming = HashMap::new();
        for header in headers {
            for parsed in Cookie::split_parse_encoded(header).filter_map(Result::ok) {
                incoming
                    .entry(parsed.name().to_owned())
                    .or_insert_with(|| parsed.value().to_owned());
            }
        }
        Self {
            state: Arc::new(CookieState {
                incoming,
                outgoing: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the value the client sent for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.state.incoming.get(name).map(String::as_str)
    }

    /// Buffers a cookie write with the default attributes.
    pub fn set(&self, name: &str, value: &str) {
        self.set_with(name, value, &CookieOptions::default());
    }

    /// Buffers a cookie write with explicit attributes.
    pub fn set_with(&self, name: &str, value: &str, options: &CookieOptions) {
        self.push(directive(name, value, options, false));
    }

    /// Buffers an immediately expiring, empty-valued directive for `name`.
    pub fn delete(&self, name: &str) {
        self.delete_with(name, &CookieOptions::default());
    }

    /// Like [`delete`](Self::delete), but scoped by `options`. Browsers only
    /// clear a cookie when `Path` and `Domain` match the ones it was set
    /// with. `max_age` is ignored.
    pub fn delete_with(&self, name: &str, options: &CookieOptions) {
        let options = CookieOptions {
            max_age: None,
            ..options.clone()
        };
        self.push(directive(name, "", &options, true));
    }

    /// Returns the buffered directives without draining them.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.state.outgoing.lock().clone()
    }

    /// Drains the buffered directives, in write order.
    ///
    /// The server calls this once per request while finalizing the response;
    /// anything written afterwards is never sent.
    #[must_use]
    pub fn take_set_cookies(&self) -> Vec<String> {
        std::mem::take(&mut *self.state.outgoing.lock())
    }

    fn push(&self, directive: String) {
        self.state.outgoing.lock().push(directive);
    }
}

fn directive(name: &str, value: &str, options: &CookieOptions, expired: bool) -> String {
    let mut builder = Cookie::build((name.to_owned(), value.to_owned()))
        .http_only(options.http_only)
        .secure(options.secure);

    if let Some(path) = &options.path {
        builder = builder.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(max_age) = options.max_age {
        let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        builder = builder.max_age(cookie::time::Duration::seconds(secs));
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(same_site);
    }
    if expired {
        builder = builder.expires(OffsetDateTime::UNIX_EPOCH);
    }

    builder.build().encoded().to_string()
}
