use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Results per page on the job search listing; drives the `start=` offset.
pub const JOBS_PAGE_SIZE: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    People,
    Jobs,
}

impl Mode {
    pub fn expected_page_kind(self) -> PageKind {
        match self {
            Mode::People => PageKind::PeopleSearch,
            Mode::Jobs => PageKind::JobSearch,
        }
    }

    /// Filename prefix and Markdown title noun.
    pub fn label(self) -> &'static str {
        match self {
            Mode::People => "people",
            Mode::Jobs => "jobs",
        }
    }

    /// Whether items open into a separate detail pane.
    ///
    /// People results carry everything on the card; jobs need the right-hand
    /// detail view to be selected and read.
    pub fn has_detail_view(self) -> bool {
        matches!(self, Mode::Jobs)
    }

    /// Page number encoded in a search URL (1-based). Missing → 1.
    pub fn page_from_url(self, url: &str) -> u32 {
        let Ok(parsed) = Url::parse(url) else {
            return 1;
        };
        match self {
            Mode::People => parsed
                .query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse::<u32>().ok())
                .filter(|p| *p > 0)
                .unwrap_or(1),
            Mode::Jobs => parsed
                .query_pairs()
                .find(|(k, _)| k == "start")
                .and_then(|(_, v)| v.parse::<u32>().ok())
                .map(|start| start / JOBS_PAGE_SIZE + 1)
                .unwrap_or(1),
        }
    }

    /// Search URL with any pagination parameter removed.
    pub fn base_url(self, url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };
        let pager = self.pager_param();
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| k != pager)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            parsed.set_query(None);
        } else {
            parsed.query_pairs_mut().clear().extend_pairs(kept);
        }
        parsed.to_string()
    }

    /// Build the URL for `page` (1-based) on top of a base search URL.
    pub fn page_url(self, base_url: &str, page: u32) -> String {
        let base = self.base_url(base_url);
        let Ok(mut parsed) = Url::parse(&base) else {
            return base;
        };
        let page = page.max(1);
        match self {
            Mode::People => {
                parsed
                    .query_pairs_mut()
                    .append_pair("page", &page.to_string());
            }
            Mode::Jobs => {
                parsed
                    .query_pairs_mut()
                    .append_pair("start", &((page - 1) * JOBS_PAGE_SIZE).to_string());
            }
        }
        parsed.to_string()
    }

    fn pager_param(self) -> &'static str {
        match self {
            Mode::People => "page",
            Mode::Jobs => "start",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What the host is currently showing, judged from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageKind {
    PeopleSearch,
    JobSearch,
    Other,
}

impl PageKind {
    pub fn from_url(url: &str) -> Self {
        let path = Url::parse(url)
            .map(|u| u.path().to_ascii_lowercase())
            .unwrap_or_default();
        if path.starts_with("/search/results/people") {
            PageKind::PeopleSearch
        } else if path.starts_with("/jobs/search") || path.starts_with("/jobs/collections") {
            PageKind::JobSearch
        } else {
            PageKind::Other
        }
    }

    pub fn mode(self) -> Option<Mode> {
        match self {
            PageKind::PeopleSearch => Some(Mode::People),
            PageKind::JobSearch => Some(Mode::Jobs),
            PageKind::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Xlsx,
    Csv,
    #[serde(alias = "md")]
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }

    pub fn supports(self, mode: Mode) -> bool {
        !matches!((self, mode), (ExportFormat::Csv, Mode::Jobs))
    }

    /// Parse a comma-separated list such as `xlsx,md`. Unknown entries are errors.
    pub fn parse_list(raw: &str) -> Result<Vec<ExportFormat>, String> {
        let mut out = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let format = part.parse::<ExportFormat>()?;
            if !out.contains(&format) {
                out.push(format);
            }
        }
        Ok(out)
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots read from the host
// ─────────────────────────────────────────────────────────────────────────────

/// Lightweight view of one list entry, read without opening the detail pane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub id: String,
    pub title: String,
    /// Company for jobs, connection degree for people.
    pub subtitle: String,
    /// Person headline; empty for jobs.
    pub headline: String,
    pub location: String,
    pub link: String,
    /// Host-rendered "Viewed" / "Applied" style marker.
    pub seen: bool,
    /// Free text of the whole card, fed to the evaluator.
    pub text: String,
}

/// Full view of the item currently shown in the detail pane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailSnapshot {
    /// Identifier of the item the pane is showing, if it could be read.
    pub id: String,
    pub title: String,
    pub company: String,
    pub company_url: String,
    pub location: String,
    pub workplace_type: String,
    pub employment_type: String,
    pub seniority: String,
    pub posted: String,
    pub applicants: String,
    pub salary: String,
    pub apply_url: String,
    /// Description rendered as Markdown text.
    pub description: String,
}

impl DetailSnapshot {
    /// Text handed to the evaluator after a defer.
    pub fn evaluation_text(&self) -> String {
        let mut parts = vec![
            self.title.as_str(),
            self.company.as_str(),
            self.location.as_str(),
            self.workplace_type.as_str(),
            self.employment_type.as_str(),
            self.salary.as_str(),
            self.description.as_str(),
        ];
        parts.retain(|p| !p.trim().is_empty());
        parts.join("\n")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRecord {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub workplace_type: String,
    pub employment_type: String,
    pub seniority: String,
    pub posted: String,
    pub applicants: String,
    pub salary: String,
    pub job_url: String,
    pub apply_url: String,
    pub company_url: String,
    pub description: String,
    pub scraped_at: String,
}

impl JobRecord {
    pub const HEADERS: [&'static str; 15] = [
        "Job ID",
        "Title",
        "Company",
        "Location",
        "Workplace Type",
        "Employment Type",
        "Seniority",
        "Posted",
        "Applicants",
        "Salary",
        "Job URL",
        "Apply URL",
        "Company URL",
        "Description",
        "Scraped At",
    ];

    /// Merge a card summary with the detail pane. Detail wins wherever it has
    /// a value; the summary fills the gaps.
    pub fn merge(summary: &SummarySnapshot, detail: Option<&DetailSnapshot>, now: DateTime<Utc>) -> Self {
        let empty = DetailSnapshot::default();
        let d = detail.unwrap_or(&empty);
        Self {
            job_id: prefer(&d.id, &summary.id),
            title: prefer(&d.title, &summary.title),
            company: prefer(&d.company, &summary.subtitle),
            location: prefer(&d.location, &summary.location),
            workplace_type: d.workplace_type.trim().to_string(),
            employment_type: d.employment_type.trim().to_string(),
            seniority: d.seniority.trim().to_string(),
            posted: d.posted.trim().to_string(),
            applicants: d.applicants.trim().to_string(),
            salary: d.salary.trim().to_string(),
            job_url: job_view_url(&prefer(&d.id, &summary.id), &summary.link),
            apply_url: d.apply_url.trim().to_string(),
            company_url: d.company_url.trim().to_string(),
            description: d.description.trim().to_string(),
            scraped_at: now.to_rfc3339(),
        }
    }

    pub fn row(&self) -> [&str; 15] {
        [
            &self.job_id,
            &self.title,
            &self.company,
            &self.location,
            &self.workplace_type,
            &self.employment_type,
            &self.seniority,
            &self.posted,
            &self.applicants,
            &self.salary,
            &self.job_url,
            &self.apply_url,
            &self.company_url,
            &self.description,
            &self.scraped_at,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonRecord {
    pub name: String,
    pub degree: String,
    pub description: String,
    pub location: String,
    pub profile_url: String,
}

impl PersonRecord {
    pub const HEADERS: [&'static str; 5] = ["Name", "Degree", "Description", "Location", "Profile URL"];

    pub fn from_summary(summary: &SummarySnapshot) -> Self {
        Self {
            name: summary.title.trim().to_string(),
            degree: summary.subtitle.trim().to_string(),
            description: summary.headline.trim().to_string(),
            location: summary.location.trim().to_string(),
            profile_url: strip_tracking(&summary.link),
        }
    }

    pub fn row(&self) -> [&str; 5] {
        [
            &self.name,
            &self.degree,
            &self.description,
            &self.location,
            &self.profile_url,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Job(JobRecord),
    Person(PersonRecord),
}

impl Record {
    pub fn mode(&self) -> Mode {
        match self {
            Record::Job(_) => Mode::Jobs,
            Record::Person(_) => Mode::People,
        }
    }

    pub fn headers(mode: Mode) -> &'static [&'static str] {
        match mode {
            Mode::Jobs => &JobRecord::HEADERS,
            Mode::People => &PersonRecord::HEADERS,
        }
    }

    pub fn cells(&self) -> Vec<&str> {
        match self {
            Record::Job(j) => j.row().to_vec(),
            Record::Person(p) => p.row().to_vec(),
        }
    }
}

fn prefer(primary: &str, fallback: &str) -> String {
    let p = primary.trim();
    if p.is_empty() {
        fallback.trim().to_string()
    } else {
        p.to_string()
    }
}

fn job_view_url(id: &str, card_link: &str) -> String {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        return format!("https://www.linkedin.com/jobs/view/{}/", id);
    }
    strip_tracking(card_link)
}

/// Drop query and fragment from a profile / job link.
pub fn strip_tracking(link: &str) -> String {
    match Url::parse(link.trim()) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => link.trim().to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the controller needs to pick a run back up, minus the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCursor {
    pub active: bool,
    pub mode: Mode,
    pub start_page: u32,
    pub current_page: u32,
    pub target_pages: u32,
    pub base_url: String,
    pub formats: Vec<ExportFormat>,
    pub item_index: usize,
    pub item_ids: Vec<String>,
    /// Page the cached `item_ids` were discovered on.
    pub item_ids_page: Option<u32>,
    pub started_at: DateTime<Utc>,
}

impl SessionCursor {
    /// Pages finished or in progress, counting the current one.
    pub fn pages_done(&self) -> u32 {
        self.current_page.saturating_sub(self.start_page) + 1
    }

    /// Identifiers cached for the page the session is on, if discovery ran.
    pub fn cached_ids(&self) -> Option<&[String]> {
        match self.item_ids_page {
            Some(page) if page == self.current_page && !self.item_ids.is_empty() => {
                Some(&self.item_ids)
            }
            _ => None,
        }
    }

    pub fn current_page_url(&self) -> String {
        self.mode.page_url(&self.base_url, self.current_page)
    }
}

/// One scraping run as persisted in the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(flatten)]
    pub cursor: SessionCursor,
    pub results: Vec<Record>,
}

impl Session {
    pub fn new(mode: Mode, url: &str, target_pages: u32, formats: Vec<ExportFormat>) -> Self {
        let start_page = mode.page_from_url(url);
        Self {
            cursor: SessionCursor {
                active: true,
                mode,
                start_page,
                current_page: start_page,
                target_pages: target_pages.max(1),
                base_url: mode.base_url(url),
                formats,
                item_index: 0,
                item_ids: Vec::new(),
                item_ids_page: None,
                started_at: Utc::now(),
            },
            results: Vec::new(),
        }
    }
}
