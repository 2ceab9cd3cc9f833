//! Minimal reader for WebDAV `207 Multi-Status` bodies.
//!
//! Only the handful of DAV properties the transport asks for are extracted.
//! Namespace prefixes vary between servers (`d:`, `D:`, `lp1:`, none), so
//! elements are matched by local name. Comments and CDATA sections are
//! skipped while scanning for tags; character data understands the
//! predefined and numeric entities. DTDs and custom entities are not
//! supported.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;

/// One `<response>` element of a multistatus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    /// Decoded path of the resource.
    pub path: String,
    /// Whether the resource is a collection.
    pub is_collection: bool,
    /// `getcontentlength`, if reported.
    pub size: Option<u64>,
    /// `getlastmodified`, if reported and parseable.
    pub modified: Option<DateTime<Utc>>,
    /// `getetag` without surrounding quotes.
    pub etag: Option<String>,
}

impl DavEntry {
    /// Last path segment, ignoring a trailing slash.
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }
}

/// Parse all `<response>` elements of a multistatus body.
pub fn parse(body: &str) -> Vec<DavEntry> {
    elements(body, "response")
        .into_iter()
        .filter_map(parse_response)
        .collect()
}

fn parse_response(response: &str) -> Option<DavEntry> {
    let href = text(first(response, "href")?);
    let href = href.trim().to_string();
    let raw_path = match url::Url::parse(&href) {
        Ok(absolute) => absolute.path().to_string(),
        Err(_) => href,
    };
    let path = percent_decode_str(&raw_path).decode_utf8().ok()?.into_owned();

    let is_collection = first(response, "resourcetype")
        .map(|r| r.contains("collection"))
        .unwrap_or(false);

    Some(DavEntry {
        path,
        is_collection,
        size: first(response, "getcontentlength").and_then(|s| text(s).trim().parse().ok()),
        modified: first(response, "getlastmodified")
            .and_then(|s| DateTime::parse_from_rfc2822(text(s).trim()).ok())
            .map(|d| d.with_timezone(&Utc)),
        etag: first(response, "getetag")
            .map(|s| text(s).trim().trim_matches('"').to_string())
            .filter(|s| !s.is_empty()),
    })
}

fn first<'a>(xml: &'a str, local_name: &str) -> Option<&'a str> {
    elements(xml, local_name).into_iter().next()
}

/// Inner text of every element whose local name matches.
///
/// Self-closing elements yield an empty string.
fn elements<'a>(xml: &'a str, local_name: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = xml[cursor..].find('<') {
        let start = cursor + offset;
        if let Some(end) = skip_markup(xml, start) {
            cursor = end;
            continue;
        }
        let Some(tag_len) = xml[start..].find('>') else {
            break;
        };
        let tag = &xml[start + 1..start + tag_len];
        cursor = start + tag_len + 1;

        if tag.starts_with('/') || tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }

        let self_closing = tag.ends_with('/');
        let qualified = tag
            .trim_end_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("");
        let local = qualified.rsplit(':').next().unwrap_or(qualified);
        if local != local_name {
            continue;
        }

        if self_closing {
            found.push("");
            continue;
        }

        let closing = format!("</{}>", qualified);
        if let Some(end) = xml[cursor..].find(&closing) {
            found.push(&xml[cursor..cursor + end]);
            cursor += end + closing.len();
        }
    }

    found
}

/// End offset of a comment or CDATA section starting at `start`.
fn skip_markup(xml: &str, start: usize) -> Option<usize> {
    let rest = &xml[start..];
    let terminator = if rest.starts_with("<!--") {
        "-->"
    } else if rest.starts_with("<![CDATA[") {
        "]]>"
    } else {
        return None;
    };
    Some(
        rest.find(terminator)
            .map(|end| start + end + terminator.len())
            .unwrap_or(xml.len()),
    )
}

/// Character data of an element: comments dropped, CDATA taken verbatim and
/// entities decoded in the rest.
fn text(raw: &str) -> String {
    let mut out = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("<!") {
        out.push_str(&unescape(&rest[..start]));
        let markup = &rest[start..];
        if let Some(body) = markup.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").unwrap_or(body.len());
            out.push_str(&body[..end]);
            rest = body.get(end + 3..).unwrap_or("");
        } else if markup.starts_with("<!--") {
            rest = markup.find("-->").map(|end| &markup[end + 3..]).unwrap_or("");
        } else {
            out.push_str("<!");
            rest = &markup[2..];
        }
    }

    out.push_str(&unescape(rest));
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let entity = &rest[amp..];
        let decoded = entity.find(';').and_then(|end| {
            let c = match &entity[1..end] {
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" => '\'',
                "amp" => '&',
                name => {
                    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                        None => name.strip_prefix('#')?.parse().ok()?,
                    };
                    char::from_u32(code)?
                }
            };
            Some((c, end + 1))
        });

        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &entity[len..];
            }
            None => {
                out.push('&');
                rest = &entity[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
