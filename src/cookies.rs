//! Session cookie seeding from exported browser cookie files.
//!
//! Reads Netscape HTTP cookie files (the format written by most
//! "export cookies.txt" browser extensions) so image requests carry the
//! same session as the browser that rendered the reader.

use reqwest::Url;
use reqwest::cookie::Jar;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// One line of a Netscape cookie file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CookieLine {
    domain: String,
    include_subdomains: bool,
    path: String,
    secure: bool,
    expires_unix: Option<u64>,
    name: String,
    value: String,
    http_only: bool,
}

impl CookieLine {
    fn is_expired(&self, now_unix: u64) -> bool {
        self.expires_unix.is_some_and(|ts| ts <= now_unix)
    }

    fn to_set_cookie(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            header.push_str(&format!("; Domain={}", self.domain));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

/// Errors that can occur while loading cookies.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Failed to read the cookie file or walk its directory.
    #[error("Failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// Cookie file contains a malformed line.
    #[error("Invalid Netscape cookie line: {0}")]
    InvalidLine(String),

    /// Cookie domain could not be turned into a URL.
    #[error("Invalid cookie domain: {0}")]
    InvalidDomain(String),
}

/// Cookie jar seeded for one source site.
pub struct SeededJar {
    pub jar: Arc<Jar>,
    /// File the cookies came from, if one matched.
    pub source: Option<PathBuf>,
    /// Number of unexpired cookies added.
    pub loaded: usize,
}

/// Returns the label used to match cookie file names for a host,
/// e.g. `bato` for `www.bato.to`.
pub fn site_token(host: &str) -> Option<String> {
    let labels: Vec<&str> = host
        .trim_start_matches("www.")
        .split('.')
        .filter(|l| !l.is_empty())
        .collect();
    match labels.len() {
        0 => None,
        1 => Some(labels[0].to_ascii_lowercase()),
        n => Some(labels[n - 2].to_ascii_lowercase()),
    }
}

/// Builds a cookie jar for `site_url` from the newest matching cookie file
/// under `cookie_dir`. A missing directory yields an empty jar.
pub fn load_site_cookies(cookie_dir: &Path, site_url: &Url) -> Result<SeededJar, CookieError> {
    let jar = Arc::new(Jar::default());
    let token = site_url.host_str().and_then(site_token);

    let source = match token {
        Some(token) if cookie_dir.is_dir() => newest_cookie_file(cookie_dir, &token)?,
        _ => None,
    };

    let mut loaded = 0;
    if let Some(path) = &source {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        for cookie in parse_cookie_file(path)? {
            if cookie.is_expired(now) {
                continue;
            }
            add_to_jar(&jar, &cookie)?;
            loaded += 1;
        }
    }

    Ok(SeededJar {
        jar,
        source,
        loaded,
    })
}

fn newest_cookie_file(root: &Path, token: &str) -> Result<Option<PathBuf>, std::io::Error> {
    let mut best: Option<(PathBuf, SystemTime)> = None;
    walk_cookie_files(root, token, &mut best)?;
    Ok(best.map(|(path, _)| path))
}

fn walk_cookie_files(
    dir: &Path,
    token: &str,
    best: &mut Option<(PathBuf, SystemTime)>,
) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_cookie_files(&path, token, best)?;
            continue;
        }

        let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        let file_name = file_name.to_ascii_lowercase();
        if !file_name.ends_with(".txt") || !file_name.contains(token) {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(UNIX_EPOCH);

        if best.as_ref().is_none_or(|(_, time)| modified > *time) {
            *best = Some((path, modified));
        }
    }

    Ok(())
}

fn parse_cookie_file(path: &Path) -> Result<Vec<CookieLine>, CookieError> {
    let content = std::fs::read_to_string(path)?;
    let mut cookies = Vec::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let (http_only, line) = if let Some(stripped) = line.strip_prefix("#HttpOnly_") {
            (true, stripped)
        } else if line.starts_with('#') {
            continue;
        } else {
            (false, line)
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, subdomains, path, secure, expires, name, value] = fields[..] else {
            return Err(CookieError::InvalidLine(line.to_string()));
        };

        cookies.push(CookieLine {
            domain: domain.to_string(),
            include_subdomains: subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            expires_unix: expires.parse::<u64>().ok().filter(|ts| *ts != 0),
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        });
    }

    Ok(cookies)
}

fn add_to_jar(jar: &Jar, cookie: &CookieLine) -> Result<(), CookieError> {
    let host = cookie.domain.trim_start_matches('.');
    if host.is_empty() {
        return Err(CookieError::InvalidDomain(cookie.domain.clone()));
    }

    let url = Url::parse(&format!("https://{}/", host))
        .map_err(|_| CookieError::InvalidDomain(cookie.domain.clone()))?;

    jar.add_cookie_str(&cookie.to_set_cookie(), &url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use tempfile::TempDir;

    #[test]
    fn test_site_token() {
        assert_eq!(site_token("bato.to").as_deref(), Some("bato"));
        assert_eq!(site_token("www.xbato.com").as_deref(), Some("xbato"));
        assert_eq!(site_token("localhost").as_deref(), Some("localhost"));
        assert_eq!(site_token(""), None);
    }

    #[test]
    fn test_parse_cookie_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bato-cookies.txt");
        let content = "# Netscape HTTP Cookie File\n\
.bato.to\tTRUE\t/\tTRUE\t4102444800\tsession\tabc123\n\
#HttpOnly_.bato.to\tFALSE\t/\tFALSE\t0\ttheme\tdark\n";
        std::fs::write(&path, content).unwrap();

        let cookies = parse_cookie_file(&path).unwrap();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].include_subdomains);
        assert!(cookies[0].secure);
        assert_eq!(cookies[0].name, "session");
        assert_eq!(cookies[0].expires_unix, Some(4102444800));
        assert!(cookies[1].http_only);
        assert_eq!(cookies[1].expires_unix, None);
    }

    #[test]
    fn test_parse_invalid_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bato-cookies.txt");
        std::fs::write(&path, "only\ttwo").unwrap();

        let err = parse_cookie_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid Netscape cookie line"));
    }

    #[test]
    fn test_load_site_cookies_skips_expired() {
        let dir = TempDir::new().unwrap();
        let content = ".bato.to\tTRUE\t/\tFALSE\t4102444800\tfresh\t1\n\
.bato.to\tTRUE\t/\tFALSE\t1000\tstale\t2\n";
        std::fs::write(dir.path().join("bato.txt"), content).unwrap();
        std::fs::write(dir.path().join("other-site.txt"), "garbage").unwrap();

        let url = Url::parse("https://bato.to/title/1-x").unwrap();
        let seeded = load_site_cookies(dir.path(), &url).unwrap();
        assert_eq!(seeded.loaded, 1);
        assert!(seeded.source.unwrap().ends_with("bato.txt"));

        let header = seeded.jar.cookies(&url).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.contains("fresh=1"));
        assert!(!header.contains("stale"));
    }

    #[test]
    fn test_missing_directory_gives_empty_jar() {
        let url = Url::parse("https://bato.to/").unwrap();
        let seeded = load_site_cookies(Path::new("/nonexistent/cookie/dir"), &url).unwrap();
        assert_eq!(seeded.loaded, 0);
        assert!(seeded.source.is_none());
    }
}
