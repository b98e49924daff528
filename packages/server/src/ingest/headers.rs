//! Browser-like request headers for outbound image fetches.
//!
//! Many image hosts reject requests that do not look like an `<img>` load
//! from a page on their own origin, so every fetch carries a plausible,
//! randomized browser fingerprint with `Referer`/`Origin` set to the target.

use rand::Rng;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

const CHROME_VERSIONS: &[&str] = &["120.0.0.0", "121.0.0.0", "122.0.0.0", "123.0.0.0", "119.0.0.0"];
const EDGE_VERSIONS: &[&str] = &["120.0.0.0", "121.0.0.0", "122.0.0.0", "119.0.0.0"];
const FIREFOX_VERSIONS: &[&str] = &["121.0", "122.0", "123.0", "120.0", "119.0"];

/// `(User-Agent OS token, Sec-Ch-Ua-Platform value)`
const PLATFORMS: &[(&str, &str)] = &[
    ("Windows NT 10.0; Win64; x64", "Windows"),
    ("Windows NT 11.0; Win64; x64", "Windows"),
    ("Macintosh; Intel Mac OS X 10_15_7", "macOS"),
    ("Macintosh; Intel Mac OS X 13_0_0", "macOS"),
    ("X11; Linux x86_64", "Linux"),
];

const LANGUAGES: &[&str] = &[
    "zh-CN,zh;q=0.9,en;q=0.8",
    "en-US,en;q=0.9",
    "zh-TW,zh;q=0.9,en;q=0.8",
    "ja-JP,ja;q=0.9,en;q=0.8",
    "en-GB,en;q=0.9",
];

const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chrome,
    Edge,
    Firefox,
}

impl BrowserFamily {
    /// 60% Chrome, 25% Edge, 15% Firefox.
    fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let roll: f64 = rng.random();
        if roll < 0.6 {
            Self::Chrome
        } else if roll < 0.85 {
            Self::Edge
        } else {
            Self::Firefox
        }
    }
}

fn pick<'a, T, R: Rng + ?Sized>(pool: &'a [T], rng: &mut R) -> &'a T {
    &pool[rng.random_range(0..pool.len())]
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Build the header set for fetching `url`, drawing all choices from `rng`.
///
/// The same RNG state always yields the same headers.
pub fn fabricate_headers<R: Rng + ?Sized>(url: &Url, rng: &mut R) -> HeaderMap {
    let (os, platform) = *pick(PLATFORMS, rng);
    let language = *pick(LANGUAGES, rng);
    let family = BrowserFamily::pick(rng);

    let (user_agent, sec_ch_ua) = match family {
        BrowserFamily::Chrome => {
            let version = *pick(CHROME_VERSIONS, rng);
            let major = major(version);
            (
                format!(
                    "Mozilla/5.0 ({os}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36"
                ),
                Some(format!(
                    "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"{major}\", \"Google Chrome\";v=\"{major}\""
                )),
            )
        }
        BrowserFamily::Edge => {
            let version = *pick(EDGE_VERSIONS, rng);
            let major = major(version);
            (
                format!(
                    "Mozilla/5.0 ({os}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36 Edg/{version}"
                ),
                Some(format!(
                    "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"{major}\", \"Microsoft Edge\";v=\"{major}\""
                )),
            )
        }
        BrowserFamily::Firefox => {
            let version = *pick(FIREFOX_VERSIONS, rng);
            (
                format!("Mozilla/5.0 ({os}; rv:{version}) Gecko/20100101 Firefox/{version}"),
                None,
            )
        }
    };

    let origin = url.origin().ascii_serialization();

    let mut headers = HeaderMap::new();
    insert(&mut headers, reqwest::header::USER_AGENT, user_agent);
    headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static(ACCEPT_IMAGE));
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static(language),
    );
    headers.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );
    headers.insert(reqwest::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(reqwest::header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("image"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("no-cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("cross-site"),
    );
    insert(&mut headers, reqwest::header::REFERER, format!("{origin}/"));
    insert(&mut headers, reqwest::header::ORIGIN, origin);

    if let Some(sec_ch_ua) = sec_ch_ua {
        insert(&mut headers, HeaderName::from_static("sec-ch-ua"), sec_ch_ua);
        headers.insert(
            HeaderName::from_static("sec-ch-ua-mobile"),
            HeaderValue::from_static("?0"),
        );
        insert(
            &mut headers,
            HeaderName::from_static("sec-ch-ua-platform"),
            format!("\"{platform}\""),
        );
    }

    headers
}

/// Headers for `url` using the thread-local RNG.
pub fn random_headers(url: &Url) -> HeaderMap {
    fabricate_headers(url, &mut rand::rng())
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: String) {
    match HeaderValue::from_str(&value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::debug!(header = %name, "Skipping non-ASCII fabricated header"),
    }
}
