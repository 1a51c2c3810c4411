//! Ordered proxy list with availability backed by `subtitle_cache::ProxyRegistry`.

use rand::seq::SliceRandom;
use subtitle_cache::ProxyRegistry;
use subtitle_models::Proxy;

/// A proxy selected for one extraction attempt: the URL to actually
/// connect through (credentials injected) and the bare identity used to
/// key failure bookkeeping.
pub struct ChosenProxy {
    pub connect_url: String,
    pub id: String,
}

pub struct ProxyPool {
    proxies: Vec<Proxy>,
    registry: ProxyRegistry,
    auth: Option<String>,
}

impl ProxyPool {
    /// `raw_urls` is a comma-separated list; `auth` is injected into each
    /// URL's userinfo when the URL doesn't already carry credentials.
    pub fn new(raw_urls: &str, registry: ProxyRegistry, auth: Option<String>) -> Self {
        let proxies = raw_urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Proxy::new)
            .collect();

        Self {
            proxies,
            registry,
            auth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Shuffle the list and return the first available entry; if none are
    /// available, return a random entry anyway (degraded mode).
    pub async fn choose(&self) -> Option<ChosenProxy> {
        if self.proxies.is_empty() {
            return None;
        }

        let mut shuffled = self.proxies.clone();
        shuffled.shuffle(&mut rand::thread_rng());

        for proxy in &shuffled {
            if self.registry.is_available(&proxy.id).await {
                return Some(self.to_chosen(proxy));
            }
        }

        shuffled.choose(&mut rand::thread_rng()).map(|p| self.to_chosen(p))
    }

    fn to_chosen(&self, proxy: &Proxy) -> ChosenProxy {
        ChosenProxy {
            connect_url: Proxy::with_injected_auth(&proxy.url, self.auth.as_deref()),
            id: proxy.id.clone(),
        }
    }

    pub async fn mark_success(&self, proxy_id: &str) {
        self.registry.mark_success(proxy_id).await;
    }

    pub async fn mark_failure(&self, proxy_id: &str) {
        self.registry.mark_failure(proxy_id).await;
    }
}
