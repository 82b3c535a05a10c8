//! Virtual-host and location selection
//!
//! Both steps are pure functions of the configuration and the request,
//! so the choice is deterministic and directly testable.

use config::{HttpConfig, ListenDirective, LocationConfig, MatchType,
             ServerConfig};


/// Picks the server for a connection's endpoint and the request host
///
/// Servers listening on the accepting endpoint are filtered first, then
/// the request host is matched against their names (literally,
/// case-insensitively or by `*.suffix` wildcard). With no name match
/// the endpoint's default server answers.
pub fn resolve_server<'a>(config: &'a HttpConfig,
                          local: &ListenDirective,
                          request_host: Option<&str>)
    -> Option<&'a ServerConfig>
{
    let candidates: Vec<&ServerConfig> = config.get_servers().iter()
        .filter(|s| s.matches_listen(local))
        .collect();
    if let Some(host) = request_host {
        if let Some(found) = candidates.iter()
            .find(|s| s.matches_server_name(host))
        {
            return Some(found);
        }
    }
    candidates.iter().find(|s| s.is_default()).map(|s| *s)
}

/// nginx location precedence
///
/// 1. An exact match wins outright (`path` and `path/` are equal here).
/// 2. Regex locations are tried in configuration order; the first hit
///    beats any prefix match.
/// 3. Otherwise the longest prefix match (on a `/` boundary) wins; a
///    prefix `location /` matches every path, so it is the catch-all.
///
/// Named `@` locations never participate, and an exact `location = /`
/// only ever answers for `/` itself.
pub fn resolve_location<'a>(server: &'a ServerConfig, path: &str)
    -> Option<&'a LocationConfig>
{
    let mut best_prefix: Option<&LocationConfig> = None;
    let mut best_prefix_len = 0;
    for location in server.get_locations() {
        match location.get_match_type() {
            MatchType::Exact => {
                if location.matches_path(path) {
                    return Some(location);
                }
            }
            MatchType::Prefix => {
                if location.matches_path(path) {
                    let len = location.get_pattern().len();
                    if len > best_prefix_len {
                        best_prefix_len = len;
                        best_prefix = Some(location);
                    }
                }
            }
            MatchType::RegexCaseSensitive |
            MatchType::RegexCaseInsensitive => {}
        }
    }
    for location in server.get_locations() {
        if location.is_regex() && location.matches_path(path) {
            return Some(location);
        }
    }
    best_prefix
}

/// Finds a named `@location` for `try_files` fallbacks
pub fn find_named<'a>(server: &'a ServerConfig, name: &str)
    -> Option<&'a LocationConfig>
{
    server.get_locations().iter()
        .find(|l| l.is_named() && l.get_pattern() == name)
}
