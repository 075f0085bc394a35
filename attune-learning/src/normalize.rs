//! Section and topic label normalization.
//!
//! UI labels arrive in whatever form the display layer uses ("Tech Stack",
//! "technology", "Recent News"). They are normalized and folded through a
//! synonym table so every spelling of a section lands on one preference key.

/// Lowercase, turn whitespace into underscores and strip everything that is
/// not `[a-z0-9_]`. Runs of underscores collapse and edge underscores are
/// trimmed, so the result is stable under repeated application.
pub fn normalize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().to_lowercase().chars() {
        let mapped = if c.is_whitespace() || c == '_' {
            '_'
        } else if c.is_ascii_alphanumeric() {
            c
        } else {
            continue;
        };
        if mapped == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(mapped);
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Map a normalized label onto its canonical section name.
pub fn canonical_section(normalized: &str) -> &str {
    match normalized {
        "technology" | "technologies" | "tech" | "techstack" | "tech_stack"
        | "technology_stack" => "tech_stack",
        "funding" | "funding_history" | "financials" | "investors" => "funding",
        "leadership" | "leadership_team" | "executives" | "management" | "team" => "leadership",
        "news" | "recent_news" | "press" | "announcements" => "news",
        "competitors" | "competition" | "competitive_landscape" => "competitors",
        "hiring" | "jobs" | "job_postings" | "open_roles" => "hiring",
        "signals" | "buying_signals" => "signals",
        "overview" | "company_overview" | "summary" | "executive_summary" => "overview",
        other => other,
    }
}

/// Normalize and canonicalize a label into a key suffix.
///
/// Returns `None` when nothing usable is left.
pub fn section_key_suffix(raw: &str) -> Option<String> {
    let normalized = normalize_label(raw);
    if normalized.is_empty() {
        return None;
    }
    Some(canonical_section(&normalized).to_string())
}
