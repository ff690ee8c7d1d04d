//! Directory listings.

use std::fmt::Write;
use std::path::Path;

use http::{header, Response};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::fs;

use crate::{error::ServeError, resolve::ResolvedPath, util::Body};

/// Characters escaped in a single path segment of a listing link.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

/// One immediate child of a listed directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// File name of the entry.
    pub name: String,
    /// Size from the entry's own metadata. Directories report their inode size.
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Format a byte count with binary units, e.g. `1536` becomes `1.5 KB`.
pub fn human_size(n: u64) -> String {
    const UNIT: u64 = 1024;
    if n < UNIT {
        return format!("{} B", n);
    }
    let (mut div, mut exp) = (UNIT, 0);
    while n / div >= UNIT {
        div *= UNIT;
        exp += 1;
    }
    format!("{:.1} {}B", n as f64 / div as f64, b"KMGTPE"[exp] as char)
}

/// Read the immediate children of `dir`, in filesystem order.
pub async fn read_entries(dir: &Path) -> Result<Vec<DirectoryEntry>, ServeError> {
    let mut iter = fs::read_dir(dir)
        .await
        .map_err(|_| ServeError::Internal("cannot open dir".into()))?;

    let mut entries = Vec::new();
    while let Some(entry) = iter
        .next_entry()
        .await
        .map_err(|_| ServeError::Internal("cannot read dir".into()))?
    {
        let metadata = entry
            .metadata()
            .await
            .map_err(|_| ServeError::Internal("cannot read dir".into()))?;
        entries.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            is_dir: metadata.is_dir(),
        });
    }
    Ok(entries)
}

/// Link to `name` inside the directory shown at `request_path`.
///
/// Segments are joined with `/` and percent-encoded, so the link decodes back to the entry.
pub fn entry_href(request_path: &str, entry: &DirectoryEntry) -> String {
    let mut href = String::new();
    for segment in request_path
        .split('/')
        .filter(|s| !s.is_empty())
        .chain(Some(entry.name.as_str()))
    {
        href.push('/');
        href.extend(utf8_percent_encode(segment, PATH_SEGMENT));
    }
    if entry.is_dir {
        href.push('/');
    }
    href
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render a minimal HTML listing: title and heading are the request path, followed by one
/// link per entry with its size.
pub fn render_listing(request_path: &str, entries: &[DirectoryEntry]) -> String {
    let title = escape_html(request_path);
    let mut html = format!(
        "<html><head><meta charset='utf-8'><title>{0}</title></head><body><h1>{0}</h1><ul>",
        title
    );
    for entry in entries {
        let mut name = escape_html(&entry.name);
        if entry.is_dir {
            name.push('/');
        }
        // Writing to a `String` cannot fail.
        let _ = write!(
            html,
            "<li><a href=\"{}\">{}</a> {}</li>",
            escape_html(&entry_href(request_path, entry)),
            name,
            human_size(entry.size)
        );
    }
    html.push_str("</ul></body></html>");
    html
}

/// Build the listing response for a resolved directory.
pub async fn serve_directory(
    resolved: &ResolvedPath,
    is_head: bool,
) -> Result<Response<Body>, ServeError> {
    let entries = read_entries(&resolved.full_path).await?;
    let html = render_listing(&resolved.request_path(), &entries);

    let res = Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONTENT_LENGTH, html.len());
    Ok(res.body(if is_head {
        Body::Empty
    } else {
        Body::from_bytes(html)
    })?)
}
