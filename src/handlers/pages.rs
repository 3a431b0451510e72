//! Small HTML pages for the bucket status and clear endpoints.

use crate::{models::object::ObjectEntry, services::object_store::ClearOutcome};
use chrono::SecondsFormat;

/// Outcome of a clear request as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearPage {
    Nothing,
    Cleared,
    Failed,
}

impl From<ClearOutcome> for ClearPage {
    fn from(outcome: ClearOutcome) -> Self {
        match outcome {
            ClearOutcome::NothingToClear => ClearPage::Nothing,
            ClearOutcome::Cleared { .. } => ClearPage::Cleared,
        }
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\">",
            "<title>{}</title></head><body>{}</body></html>"
        ),
        html_escape(title),
        body
    )
}

/// Status page: object count, listing, and a button to clear the bucket.
///
/// `url_for` maps an object name to its public URL. `clearable` is false in
/// the shared layout, where there is no per-client bucket to wipe.
pub fn status(
    owner: &str,
    entries: &[ObjectEntry],
    url_for: impl Fn(&str) -> String,
    clearable: bool,
) -> String {
    let mut body = format!(
        "<h1>Album art for {}</h1><p>You have <b id=\"count\">{}</b> stored thumbnail(s).</p>",
        html_escape(owner),
        entries.len()
    );

    if !entries.is_empty() {
        body.push_str("<table><tr><th>Name</th><th>Size</th><th>Modified</th></tr>");
        for entry in entries {
            let url = url_for(&entry.name);
            body.push_str(&format!(
                "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>",
                html_escape(&url),
                html_escape(&entry.name),
                entry.size_bytes,
                entry
                    .last_modified
                    .to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        body.push_str("</table>");

        if clearable {
            body.push_str(
                "<form method=\"post\" action=\"/\"><button type=\"submit\">Clear my thumbnails</button></form>",
            );
        }
    }

    layout("Album art", &body)
}

pub fn clear(page: ClearPage) -> String {
    let message = match page {
        ClearPage::Nothing => "There was nothing to clear.",
        ClearPage::Cleared => "Your thumbnails have been cleared.",
        ClearPage::Failed => "Clearing your thumbnails failed. Please try again later.",
    };
    layout(
        "Album art",
        &format!("<p>{}</p><p><a href=\"/\">Back</a></p>", message),
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
