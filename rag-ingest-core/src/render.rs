//! Markdown rendering of exported records and file-name slugs.
//!
//! Records are kept as `serde_json::Value`: both source APIs return loosely-typed payloads
//! and a missing field should degrade to an empty cell, not a failed export.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn non_slug_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static regex"))
}

fn separator_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-\s]+").expect("static regex"))
}

/// Lower-case, punctuation-free, dash-separated form of `text`.
pub fn slug(text: &str) -> String {
    let cleaned = non_slug_chars().replace_all(text, "");
    let lowered = cleaned.trim().to_lowercase();
    separator_runs().replace_all(&lowered, "-").into_owned()
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// String contents for strings, JSON text for everything else, empty for null.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

fn named<'a>(record: &'a Value, key: &str) -> &'a str {
    record
        .get(key)
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Render a Redmine issue (with journals) as markdown.
pub fn issue_markdown(issue: &Value) -> String {
    let id = issue.get("id").map(display_value).unwrap_or_default();
    let subject = match field(issue, "subject").trim() {
        "" => format!("Issue {id}"),
        s => s.to_string(),
    };
    let description = field(issue, "description");

    let mut out = vec![
        format!("# [{id}] {subject}"),
        String::new(),
        "| Field | Value |".to_string(),
        "|---|---|".to_string(),
        format!("| Project | {} |", named(issue, "project")),
        format!("| Status | {} |", named(issue, "status")),
        format!("| Assigned to | {} |", named(issue, "assigned_to")),
        format!("| Author | {} |", named(issue, "author")),
        format!("| Created | {} |", field(issue, "created_on")),
        format!("| Updated | {} |", field(issue, "updated_on")),
        String::new(),
        "## Description".to_string(),
        if description.is_empty() {
            "_(empty)_".to_string()
        } else {
            description.to_string()
        },
    ];

    let journals = issue
        .get("journals")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if !journals.is_empty() {
        out.push(String::new());
        out.push("## Comments".to_string());
        for journal in journals {
            let notes = field(journal, "notes");
            if notes.is_empty() {
                continue;
            }
            out.push(format!(
                "### {} — {}",
                named(journal, "user"),
                field(journal, "created_on")
            ));
            out.push(notes.to_string());
        }
    }
    out.join("\n")
}

/// Render a Redmine wiki page.
pub fn redmine_wiki_markdown(project: &str, page: &Value) -> String {
    let title = match field(page, "title") {
        "" => "Untitled",
        t => t,
    };
    let content = match field(page, "text") {
        "" => field(page, "content"),
        t => t,
    };
    [
        format!("# {project} — {title}"),
        String::new(),
        format!("_Last updated: {}_", field(page, "updated_on")),
        String::new(),
        content.to_string(),
    ]
    .join("\n")
}

/// Render a Wiki.js page; `base_url` builds the link back to the page.
pub fn wikijs_markdown(base_url: &str, page: &Value) -> String {
    let title = match field(page, "title") {
        "" => "Untitled",
        t => t,
    };
    let path = field(page, "path");
    let page_id = page.get("id").map(display_value).unwrap_or_default();
    format!(
        "# {title}\n\n\
         **Path:** `{path}`  \n\
         **Page ID:** {page_id}  \n\
         **Last Updated:** {updated}  \n\
         **Source:** Wiki.js  \n\
         **URL:** {base}/{path}\n\n\
         ---\n\n\
         {content}\n",
        updated = field(page, "updatedAt"),
        base = base_url.trim_end_matches('/'),
        content = field(page, "content"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_strips_punctuation_and_collapses_separators() {
        assert_eq!(slug("  Fix: Login --  Timeout! "), "fix-login-timeout");
        assert_eq!(slug("Über Größe"), "über-größe");
        assert_eq!(slug("???"), "");
    }

    #[test]
    fn truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("abc", 80), "abc");
    }

    #[test]
    fn issue_markdown_includes_table_and_comments() {
        let issue = json!({
            "id": 17,
            "subject": "Printer on fire",
            "status": {"name": "Closed"},
            "project": {"name": "Ops"},
            "author": {"name": "Sam"},
            "created_on": "2024-01-01T10:00:00Z",
            "updated_on": "2024-01-02T10:00:00Z",
            "description": "It is on fire.",
            "journals": [
                {"notes": "", "user": {"name": "Bot"}},
                {"notes": "Extinguished.", "user": {"name": "Alex"}, "created_on": "2024-01-02T09:00:00Z"}
            ]
        });
        let md = issue_markdown(&issue);

        assert!(md.starts_with("# [17] Printer on fire\n"));
        assert!(md.contains("| Status | Closed |"));
        assert!(md.contains("| Assigned to |  |"));
        assert!(md.contains("## Comments\n### Alex — 2024-01-02T09:00:00Z\nExtinguished."));
        assert!(!md.contains("Bot"));
    }

    #[test]
    fn issue_markdown_defaults_subject_and_description() {
        let md = issue_markdown(&json!({"id": 5, "subject": "  "}));
        assert!(md.starts_with("# [5] Issue 5"));
        assert!(md.contains("## Description\n_(empty)_"));
        assert!(!md.contains("## Comments"));
    }

    #[test]
    fn redmine_wiki_falls_back_to_content_field() {
        let md = redmine_wiki_markdown("docs", &json!({"title": "Home", "content": "hello"}));
        assert_eq!(md, "# docs — Home\n\n_Last updated: _\n\nhello");
    }

    #[test]
    fn wikijs_markdown_links_back_to_page() {
        let page = json!({"id": 3, "title": "Runbook", "path": "ops/runbook", "content": "steps", "updatedAt": "2024-05-01"});
        let md = wikijs_markdown("https://wiki.example.org/", &page);
        assert!(md.starts_with("# Runbook\n"));
        assert!(md.contains("**Page ID:** 3"));
        assert!(md.contains("**URL:** https://wiki.example.org/ops/runbook"));
        assert!(md.ends_with("---\n\nsteps\n"));
    }
}
