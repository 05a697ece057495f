//! Site selectors and pure HTML parsers for list cards and the detail pane.
//!
//! The browser side only hands back `outerHTML` snippets; everything here is
//! synchronous and testable against fixtures.

use crate::core::types::{DetailSnapshot, Mode, SummarySnapshot};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

pub const SITE_ORIGIN: &str = "https://www.linkedin.com";

/// CSS selectors and attributes for the two listing layouts.
pub mod selectors {
    pub const JOB_PLACEHOLDER: &str = "li[data-occludable-job-id]";
    pub const JOB_PLACEHOLDER_ATTR: &str = "data-occludable-job-id";
    /// Present only once the virtual list has rendered the entry.
    pub const JOB_CARD: &str = "div.job-card-container[data-job-id]";
    pub const JOB_CARD_ATTR: &str = "data-job-id";
    pub const JOB_LIST_SCROLLER: &str = ".scaffold-layout__list > div, .jobs-search-results-list";
    pub const JOB_DETAIL: &str = ".jobs-search__job-details--wrapper, .jobs-details, .job-view-layout";
    pub const JOB_SEE_MORE: &str =
        "button.jobs-description__footer-button, button.inline-show-more-text__button, button[aria-label*='see more description']";

    pub const PEOPLE_RESULT: &str = "div[data-chameleon-result-urn]";
    pub const PEOPLE_RESULT_ATTR: &str = "data-chameleon-result-urn";

    pub const NEXT_PAGE: &str =
        "button.artdeco-pagination__button--next, button.jobs-search-pagination__button--next";
}

/// Footer labels that mark an entry as already handled by the user.
const SEEN_MARKERS: &[&str] = &["viewed", "applied"];

const WORKPLACE_TYPES: &[&str] = &["remote", "hybrid", "on-site", "onsite"];
const EMPLOYMENT_TYPES: &[&str] = &[
    "full-time",
    "part-time",
    "contract",
    "temporary",
    "internship",
    "volunteer",
    "other",
];
const SENIORITY_LEVELS: &[&str] = &[
    "internship",
    "entry level",
    "associate",
    "mid-senior level",
    "director",
    "executive",
];

fn sel(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collapse runs of whitespace, trimming the ends.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// First non-empty text among `candidates`, tried in order.
fn first_text(root: ElementRef<'_>, candidates: &[&str]) -> String {
    for css in candidates {
        let Some(selector) = sel(css) else { continue };
        for el in root.select(&selector) {
            let text = element_text(el);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

fn first_attr(root: ElementRef<'_>, candidates: &[&str], attr: &str) -> String {
    for css in candidates {
        let Some(selector) = sel(css) else { continue };
        if let Some(v) = root
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
        {
            return v.to_string();
        }
    }
    String::new()
}

/// Resolve a possibly relative href against the site origin.
pub fn absolute_url(href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    Url::parse(SITE_ORIGIN)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

fn job_view_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/jobs/view/(\d+)").ok()).as_ref()
}

/// Job identifier shown in the detail pane, read from the page URL:
/// `currentJobId=` on search pages, `/jobs/view/<id>` on direct views.
pub fn job_id_from_url(url: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "currentJobId") {
            let v = v.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }
    job_view_regex()?
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn has_seen_marker(root: ElementRef<'_>) -> bool {
    let Some(selector) = sel(
        ".job-card-container__footer-item, .job-card-container__footer-job-state, li.job-card-container__footer-item",
    ) else {
        return false;
    };
    root.select(&selector).any(|el| {
        let text = element_text(el).to_ascii_lowercase();
        SEEN_MARKERS.iter().any(|m| text == *m || text.starts_with(m))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Job cards
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a rendered job card (`outerHTML` of the occludable `li`).
pub fn parse_job_card(html: &str, id: &str) -> SummarySnapshot {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    let title = first_text(
        root,
        &[
            ".job-card-list__title--link strong",
            ".job-card-list__title strong",
            "a.job-card-container__link span[aria-hidden='true']",
            "a.job-card-container__link",
        ],
    );
    let subtitle = first_text(
        root,
        &[
            ".artdeco-entity-lockup__subtitle",
            ".job-card-container__primary-description",
            ".job-card-container__company-name",
        ],
    );
    let location = first_text(
        root,
        &[
            ".job-card-container__metadata-wrapper li",
            ".artdeco-entity-lockup__caption li",
            ".job-card-container__metadata-item",
        ],
    );
    let href = first_attr(root, &["a.job-card-container__link", "a[href*='/jobs/view/']"], "href");

    SummarySnapshot {
        id: id.to_string(),
        title,
        subtitle,
        headline: String::new(),
        location,
        link: absolute_url(&href),
        seen: has_seen_marker(root),
        text: element_text(root),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job detail pane
// ─────────────────────────────────────────────────────────────────────────────

fn classify_insight(text: &str, detail: &mut DetailSnapshot) {
    let lower = text.to_ascii_lowercase();
    if detail.salary.is_empty()
        && (lower.contains('$') || lower.contains('€') || lower.contains('£') || lower.contains("/yr") || lower.contains("/hr"))
    {
        detail.salary = text.to_string();
    } else if detail.workplace_type.is_empty() && WORKPLACE_TYPES.iter().any(|w| lower == *w) {
        detail.workplace_type = text.to_string();
    } else if detail.employment_type.is_empty() && EMPLOYMENT_TYPES.iter().any(|e| lower == *e) {
        detail.employment_type = text.to_string();
    } else if detail.seniority.is_empty() && SENIORITY_LEVELS.iter().any(|s| lower == *s) {
        detail.seniority = text.to_string();
    }
}

/// Parse the detail pane (`outerHTML` of the details wrapper).
pub fn parse_job_detail(html: &str) -> DetailSnapshot {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();
    let mut detail = DetailSnapshot::default();

    let title_href = first_attr(
        root,
        &[
            ".job-details-jobs-unified-top-card__job-title a",
            ".jobs-unified-top-card__job-title a",
            "a[href*='/jobs/view/']",
        ],
        "href",
    );
    detail.id = first_attr(root, &["[data-job-id]"], "data-job-id");
    if detail.id.is_empty() {
        detail.id = job_id_from_url(&absolute_url(&title_href)).unwrap_or_default();
    }

    detail.title = first_text(
        root,
        &[
            ".job-details-jobs-unified-top-card__job-title h1",
            ".job-details-jobs-unified-top-card__job-title",
            ".jobs-unified-top-card__job-title",
            "h1",
            "h2",
        ],
    );
    let company_sel = [
        ".job-details-jobs-unified-top-card__company-name a",
        ".jobs-unified-top-card__company-name a",
        ".job-details-jobs-unified-top-card__company-name",
    ];
    detail.company = first_text(root, &company_sel);
    detail.company_url = absolute_url(&first_attr(root, &company_sel[..2], "href"));

    // "Berlin, Germany · 2 days ago · 48 applicants"
    let tertiary = first_text(
        root,
        &[
            ".job-details-jobs-unified-top-card__tertiary-description-container",
            ".job-details-jobs-unified-top-card__primary-description-container",
            ".jobs-unified-top-card__subtitle-primary-grouping",
        ],
    );
    for (i, part) in tertiary.split('·').map(str::trim).filter(|p| !p.is_empty()).enumerate() {
        let lower = part.to_ascii_lowercase();
        if lower.contains("applicant") || lower.contains("clicked apply") {
            detail.applicants = part.to_string();
        } else if lower.contains("ago") || lower.starts_with("reposted") || lower.starts_with("posted") {
            detail.posted = part.to_string();
        } else if i == 0 {
            detail.location = part.to_string();
        }
    }

    for css in [
        ".job-details-fit-level-preferences button",
        ".job-details-preferences-and-skills__pill",
        ".job-details-jobs-unified-top-card__job-insight span[aria-hidden='true']",
        ".job-details-jobs-unified-top-card__job-insight",
        ".ui-label",
    ] {
        let Some(selector) = sel(css) else { continue };
        for el in root.select(&selector) {
            // Pills read "Remote Matches your job preferences..."; keep the label.
            let text = first_line_label(&element_text(el));
            if !text.is_empty() {
                classify_insight(&text, &mut detail);
            }
        }
    }

    detail.apply_url = absolute_url(&first_attr(
        root,
        &["a.jobs-apply-button", ".jobs-apply-button--top-card a", ".jobs-s-apply a"],
        "href",
    ));

    if let Some(selector) = sel("#job-details, .jobs-description__content, .jobs-description-content__text") {
        if let Some(el) = root.select(&selector).next() {
            detail.description = tidy_markdown(&html2md::parse_html(&el.inner_html()));
        }
    }

    detail
}

/// Insight pills carry screen-reader suffixes; keep the visible label.
fn first_line_label(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let cut = ["matches your job preferences", "workplace type is", "job type is"]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min()
        .unwrap_or(text.len());
    text.get(..cut).unwrap_or(text).trim().to_string()
}

/// Drop blank-line runs and trailing spaces left by `html2md`.
fn tidy_markdown(md: &str) -> String {
    let mut out = Vec::new();
    let mut blank = false;
    for line in md.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
        } else {
            out.push(line.to_string());
            blank = false;
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// People cards
// ─────────────────────────────────────────────────────────────────────────────

/// Parse one people-search result (`outerHTML` of the result container).
pub fn parse_person_card(html: &str, id: &str) -> SummarySnapshot {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    let title = first_text(
        root,
        &[
            ".entity-result__title-text a span[aria-hidden='true']",
            "a[href*='/in/'] span[aria-hidden='true']",
            ".entity-result__title-text a",
        ],
    );
    let degree = first_text(
        root,
        &[
            ".entity-result__badge-text span[aria-hidden='true']",
            ".entity-result__badge-text",
        ],
    );
    let headline = first_text(
        root,
        &[".entity-result__primary-subtitle", ".linked-area .t-14.t-black.t-normal"],
    );
    let location = first_text(
        root,
        &[".entity-result__secondary-subtitle", ".linked-area .t-14.t-normal:not(.t-black)"],
    );
    let href = first_attr(
        root,
        &[".entity-result__title-text a", "a[href*='/in/']"],
        "href",
    );

    SummarySnapshot {
        id: id.to_string(),
        title,
        subtitle: clean_degree(&degree),
        headline,
        location,
        link: absolute_url(&href),
        seen: false,
        text: element_text(root),
    }
}

/// "• 2nd" → "2nd"
fn clean_degree(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '•' || c == '·' || c.is_whitespace())
        .to_string()
}

/// Placeholder selector and id attribute for `mode`.
pub fn placeholder_selector(mode: Mode) -> (&'static str, &'static str) {
    match mode {
        Mode::Jobs => (selectors::JOB_PLACEHOLDER, selectors::JOB_PLACEHOLDER_ATTR),
        Mode::People => (selectors::PEOPLE_RESULT, selectors::PEOPLE_RESULT_ATTR),
    }
}

/// Rendered-entry selector and id attribute for `mode`.
pub fn rendered_selector(mode: Mode) -> (&'static str, &'static str) {
    match mode {
        Mode::Jobs => (selectors::JOB_CARD, selectors::JOB_CARD_ATTR),
        Mode::People => (selectors::PEOPLE_RESULT, selectors::PEOPLE_RESULT_ATTR),
    }
}
