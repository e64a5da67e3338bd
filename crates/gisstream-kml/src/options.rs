//! Reader configuration

use crate::resolver::LinkDefaults;
use std::time::Duration;

/// Default bound on the number of NetworkLinks followed by one import
pub const DEFAULT_MAX_LINK_COUNT: usize = 500;

/// Options for [`KmlReader`](crate::KmlReader) and the NetworkLink importer
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderOptions {
    /// Maximum NetworkLinks followed by one import (0 = unbounded)
    pub max_link_count: usize,

    /// Treat the root document as coming from a KMZ archive (`Some(true)`)
    /// or not (`Some(false)`) when resolving relative links, instead of
    /// what was detected when it was opened
    pub compressed: Option<bool>,

    /// Proxy URL for outbound fetches
    pub proxy: Option<String>,

    /// Rewrite relative `styleUrl`s that point into other documents
    /// (`styles.kml#id`) as absolute URIs
    pub rewrite_style_urls: bool,

    /// Skip NetworkLinks whose `Region` lies outside the configured view
    /// bounding box
    pub ignore_inactive_region_links: bool,

    /// Timeout for HTTP fetches; none by default
    pub http_timeout: Option<Duration>,

    /// Link template values used instead of the process-wide defaults
    pub link_defaults: Option<LinkDefaults>,
}

impl Default for ReaderOptions {
    #[inline]
    fn default() -> Self {
        Self {
            max_link_count: DEFAULT_MAX_LINK_COUNT,
            compressed: None,
            proxy: None,
            rewrite_style_urls: false,
            ignore_inactive_region_links: false,
            http_timeout: None,
            link_defaults: None,
        }
    }
}

impl ReaderOptions {
    /// Set the NetworkLink bound (0 = unbounded)
    #[inline]
    #[must_use = "returns options with the link bound configured"]
    pub const fn with_max_link_count(mut self, max_link_count: usize) -> Self {
        self.max_link_count = max_link_count;
        self
    }

    /// Override archive detection for relative link resolution
    #[inline]
    #[must_use = "returns options with the compressed flag configured"]
    pub const fn with_compressed(mut self, compressed: Option<bool>) -> Self {
        self.compressed = compressed;
        self
    }

    /// Route fetches through a proxy
    #[inline]
    #[must_use = "returns options with the proxy configured"]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Enable rewriting of relative `styleUrl`s
    #[inline]
    #[must_use = "returns options with style URL rewriting configured"]
    pub const fn with_rewrite_style_urls(mut self, enable: bool) -> Self {
        self.rewrite_style_urls = enable;
        self
    }

    /// Enable Region-based NetworkLink pruning
    #[inline]
    #[must_use = "returns options with region pruning configured"]
    pub const fn with_ignore_inactive_region_links(mut self, enable: bool) -> Self {
        self.ignore_inactive_region_links = enable;
        self
    }

    /// Set the HTTP timeout
    #[inline]
    #[must_use = "returns options with the HTTP timeout configured"]
    pub const fn with_http_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Use explicit link template values instead of the process-wide ones
    #[inline]
    #[must_use = "returns options with link defaults configured"]
    pub fn with_link_defaults(mut self, defaults: LinkDefaults) -> Self {
        self.link_defaults = Some(defaults);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ReaderOptions::default();
        assert_eq!(options.max_link_count, 500);
        assert!(options.compressed.is_none());
        assert!(options.proxy.is_none());
        assert!(!options.rewrite_style_urls);
        assert!(!options.ignore_inactive_region_links);
        assert!(options.http_timeout.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let options = ReaderOptions::default()
            .with_max_link_count(0)
            .with_compressed(Some(true))
            .with_proxy("http://proxy:3128")
            .with_rewrite_style_urls(true)
            .with_http_timeout(Some(Duration::from_secs(5)));
        assert_eq!(options.max_link_count, 0);
        assert_eq!(options.compressed, Some(true));
        assert_eq!(options.proxy.as_deref(), Some("http://proxy:3128"));
        assert!(options.rewrite_style_urls);
        assert_eq!(options.http_timeout, Some(Duration::from_secs(5)));
    }
}
