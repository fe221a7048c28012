//! Cache policies and the decisions derived from them.
//!
//! [`CachePolicy::plan`] turns a policy and a cache hit/miss into a
//! [`Plan`]: whether to deliver the cached body, whether to go to the
//! network, and whether the network result reaches the caller.

use serde::{Deserialize, Serialize};

/// How a request combines the response cache with the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Ignore the cache entirely. The default.
    #[default]
    FetchOnly,
    /// Deliver the cached result, then fetch and deliver the network result.
    ReturnCacheThenFetch,
    /// Deliver the cached result, then refresh the cache in the background
    /// without delivering the network result.
    ReturnCacheThenFetchSilently,
    /// Deliver the cached result if present, otherwise fetch.
    ReturnCacheElseFetch,
    /// Deliver the cached result if present, never fetch.
    ReturnCacheOnly,
}

/// What a dispatch should do once the cache has been consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Deliver the cached body to the caller.
    pub serve_cache: bool,
    /// Send the request to the network.
    pub fetch: bool,
    /// Deliver the network success to the caller. When `false` the
    /// network result only refreshes the cache.
    pub deliver_network: bool,
}

impl Plan {
    const NOTHING: Plan = Plan {
        serve_cache: false,
        fetch: false,
        deliver_network: false,
    };

    const FETCH: Plan = Plan {
        serve_cache: false,
        fetch: true,
        deliver_network: true,
    };
}

impl CachePolicy {
    /// Whether this policy reads the cache before deciding.
    pub fn reads_cache(self) -> bool {
        self != CachePolicy::FetchOnly
    }

    /// Whether successful network results may be written to the cache.
    pub fn writes_cache(self) -> bool {
        self != CachePolicy::FetchOnly
    }

    /// Decides what to do given whether the cache had an entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use stashline::CachePolicy;
    ///
    /// let plan = CachePolicy::ReturnCacheThenFetchSilently.plan(true);
    /// assert!(plan.serve_cache && plan.fetch && !plan.deliver_network);
    ///
    /// let plan = CachePolicy::ReturnCacheOnly.plan(false);
    /// assert!(!plan.serve_cache && !plan.fetch);
    /// ```
    pub fn plan(self, cache_hit: bool) -> Plan {
        match (self, cache_hit) {
            (CachePolicy::FetchOnly, _) => Plan::FETCH,
            (CachePolicy::ReturnCacheThenFetch, true) => Plan {
                serve_cache: true,
                fetch: true,
                deliver_network: true,
            },
            (CachePolicy::ReturnCacheThenFetchSilently, true) => Plan {
                serve_cache: true,
                fetch: true,
                deliver_network: false,
            },
            (CachePolicy::ReturnCacheElseFetch, true) | (CachePolicy::ReturnCacheOnly, true) => {
                Plan {
                    serve_cache: true,
                    fetch: false,
                    deliver_network: false,
                }
            }
            (CachePolicy::ReturnCacheOnly, false) => Plan::NOTHING,
            (CachePolicy::ReturnCacheThenFetch, false)
            | (CachePolicy::ReturnCacheThenFetchSilently, false)
            | (CachePolicy::ReturnCacheElseFetch, false) => Plan::FETCH,
        }
    }
}

/// Whether a successful network response may be written to the cache.
///
/// Caching is opt-in per request, and pages after the first are never
/// cached so they cannot later be served in place of the first page.
pub fn should_write_cache(policy: CachePolicy, page: Option<u64>, first_page: u64) -> bool {
    policy.writes_cache() && page.map_or(true, |page| page <= first_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use CachePolicy::*;

        let cases = [
            (FetchOnly, true, (false, true, true)),
            (FetchOnly, false, (false, true, true)),
            (ReturnCacheThenFetch, true, (true, true, true)),
            (ReturnCacheThenFetch, false, (false, true, true)),
            (ReturnCacheThenFetchSilently, true, (true, true, false)),
            (ReturnCacheThenFetchSilently, false, (false, true, true)),
            (ReturnCacheElseFetch, true, (true, false, false)),
            (ReturnCacheElseFetch, false, (false, true, true)),
            (ReturnCacheOnly, true, (true, false, false)),
            (ReturnCacheOnly, false, (false, false, false)),
        ];

        for (policy, hit, (serve_cache, fetch, deliver_network)) in cases {
            assert_eq!(
                policy.plan(hit),
                Plan {
                    serve_cache,
                    fetch,
                    deliver_network
                },
                "{:?} with hit={}",
                policy,
                hit
            );
        }
    }

    #[test]
    fn test_fetch_only_never_touches_cache() {
        assert!(!CachePolicy::FetchOnly.reads_cache());
        assert!(!should_write_cache(CachePolicy::FetchOnly, None, 1));
    }

    #[test]
    fn test_later_pages_are_not_written() {
        let policy = CachePolicy::ReturnCacheThenFetch;
        assert!(should_write_cache(policy, None, 1));
        assert!(should_write_cache(policy, Some(1), 1));
        assert!(!should_write_cache(policy, Some(2), 1));
        assert!(should_write_cache(policy, Some(0), 0));
        assert!(!should_write_cache(policy, Some(1), 0));
    }

    #[test]
    fn test_policy_deserializes_from_snake_case() {
        let policy: CachePolicy =
            serde_json::from_str("\"return_cache_then_fetch_silently\"").unwrap();
        assert_eq!(policy, CachePolicy::ReturnCacheThenFetchSilently);
    }
}
