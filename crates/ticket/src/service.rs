//! Relying services and redirect matching

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, trace};
use url::Url;

const LOCAL_SUFFIX: &str = ".local";

/// A relying application, identified by its URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    id: String,
}

impl Service {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether `other` names the same service as this one
    ///
    /// Both ids are form-decoded and compared ignoring ASCII case. When that
    /// fails and this service lives on a `.local` host, a candidate whose
    /// host starts with this host's label (minus its last character, see
    /// [`local_host_prefix`]) matches as long as scheme and path agree; the
    /// port and domain suffix are ignored. Undecodable or unparsable URLs
    /// never match.
    pub fn matches(&self, other: &Service) -> bool {
        match self.try_match(other) {
            Ok(matched) => matched,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    fn try_match(&self, other: &Service) -> Result<bool, String> {
        let this_url = form_decode(&self.id)?;
        let service_url = form_decode(&other.id)?;

        trace!(
            "Decoded urls and comparing [{}] with [{}]",
            this_url,
            service_url
        );
        if this_url.eq_ignore_ascii_case(&service_url) {
            return Ok(true);
        }
        if !this_url.contains(LOCAL_SUFFIX) {
            return Ok(false);
        }

        let this_parsed =
            Url::parse(&this_url).map_err(|e| format!("invalid url {}: {}", this_url, e))?;
        let service_parsed =
            Url::parse(&service_url).map_err(|e| format!("invalid url {}: {}", service_url, e))?;

        // url lowercases hosts, so the prefix test below ignores host case
        let this_host = this_parsed.host_str().unwrap_or_default();
        if !this_host.ends_with(LOCAL_SUFFIX) {
            return Ok(false);
        }
        let host_name = local_host_prefix(this_host)
            .ok_or_else(|| format!("no host label before {} in {}", LOCAL_SUFFIX, this_host))?;
        let service_host = service_parsed.host_str().unwrap_or_default();
        if !service_host.starts_with(host_name) {
            return Ok(false);
        }

        Ok(this_parsed.path().eq_ignore_ascii_case(service_parsed.path())
            && this_parsed
                .scheme()
                .eq_ignore_ascii_case(service_parsed.scheme()))
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl From<&str> for Service {
    fn from(id: &str) -> Self {
        Service::new(id)
    }
}

/// Host prefix used by the `.local` alias rule
///
/// This is everything before the last `.local`, with one more trailing
/// character dropped: `host.local` yields `hos`. Relying services depend on
/// exactly this prefix. A host that is nothing but `.local` has no prefix.
fn local_host_prefix(host: &str) -> Option<&str> {
    let idx = host.rfind(LOCAL_SUFFIX)?;
    let end = idx.checked_sub(1)?;
    host.get(..end)
}

/// `application/x-www-form-urlencoded` decoding: `+` is a space and every
/// `%` must introduce two hex digits
fn form_decode(s: &str) -> Result<String, String> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .map(|h| h.iter().all(u8::is_ascii_hexdigit))
                .unwrap_or(false);
            if !valid {
                return Err(format!("incomplete escape sequence in {}", s));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let plus_decoded = s.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| format!("invalid utf-8 in {}: {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_urls_match() {
        let s = Service::new("https://app.example.org/login");
        assert!(s.matches(&s.clone()));
        assert!(s.matches(&Service::new("HTTPS://APP.example.org/LOGIN")));
    }

    #[test]
    fn test_encoded_urls_match() {
        let s = Service::new("https://app.example.org/cb?next=%2Fhome");
        assert!(s.matches(&Service::new("https://app.example.org/cb?next=/home")));
    }

    #[test]
    fn test_different_urls_do_not_match() {
        let s = Service::new("https://app.example.org/a");
        assert!(!s.matches(&Service::new("https://app.example.org/b")));
    }

    #[test]
    fn test_local_alias_requires_path_and_scheme() {
        let s = Service::new("https://host.local:8443/app");

        assert!(s.matches(&Service::new("https://host2/app")));
        assert!(s.matches(&Service::new("https://host.example.com:9000/APP")));
        assert!(!s.matches(&Service::new("https://host2/other")));
        assert!(!s.matches(&Service::new("http://host2/app")));
        assert!(!s.matches(&Service::new("https://other/app")));
    }

    #[test]
    fn test_local_prefix_drops_one_character() {
        assert_eq!(local_host_prefix("host.local"), Some("hos"));
        assert_eq!(local_host_prefix("a.local"), Some(""));
        assert_eq!(local_host_prefix(".local"), None);

        // "hos" prefix: a sibling host sharing only three characters still matches
        let s = Service::new("https://host.local/app");
        assert!(s.matches(&Service::new("https://hospital.example.org/app")));
    }

    #[test]
    fn test_local_alias_ignores_host_case() {
        let s = Service::new("https://host.local/app");
        assert!(s.matches(&Service::new("https://HOSPITAL.example.org/app")));

        let upper = Service::new("https://Host.local/app");
        assert!(upper.matches(&Service::new("https://hos2/app")));
    }

    #[test]
    fn test_bare_local_host_never_aliases() {
        let s = Service::new("https://.local/app");
        assert!(!s.matches(&Service::new("https://anything/app")));
    }

    #[test]
    fn test_non_local_suffix_in_path_is_ignored() {
        let s = Service::new("https://host.example.org/x.local");
        assert!(!s.matches(&Service::new("https://host2/x.local")));
    }

    #[test]
    fn test_malformed_escape_never_matches() {
        let s = Service::new("https://host.local/app%2");
        assert!(!s.matches(&Service::new("https://host.local/app%2")));
    }
}
