use std::{ops::Deref, sync::Arc, time::Duration};

use reqwest::{Client, ClientBuilder, Url};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::CaptureResult;

/// Timeout applied to every playlist and segment request unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A [Client] sharing one cookie jar between playlist and segment requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> CaptureResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    pub fn with_timeout(timeout: Duration) -> CaptureResult<Self> {
        Self::new(Client::builder().timeout(timeout))
    }

    /// Seed the jar with `name=value` pairs separated by `;`.
    pub fn add_cookies(&self, cookies: &str, url: &Url) {
        let Ok(mut lock) = self.cookies_store.lock() else {
            tracing::warn!("Cookie store is poisoned, cookies are ignored.");
            return;
        };

        for cookie in cookies.split(';').map(str::trim) {
            if cookie.is_empty() {
                continue;
            }
            if let Err(e) = lock.parse(cookie, url) {
                tracing::warn!("Ignoring invalid cookie {cookie}: {e}");
            }
        }
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
