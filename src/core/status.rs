use crate::core::types::Mode;
use tokio::sync::watch;

/// The one-line status shown to the user. Every controller transition
/// publishes a new value.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    WrongPage { expected: Option<Mode> },
    Discovering { page: u32 },
    NoItems { page: u32 },
    Processing {
        page: u32,
        pages_total: u32,
        item: usize,
        items: usize,
        collected: usize,
    },
    Advancing { next_page: u32 },
    Stopping,
    Done { records: usize },
    Error(String),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::WrongPage { expected: Some(mode) } => {
                write!(f, "wrong page: open a {} search results page", mode)
            }
            Status::WrongPage { expected: None } => {
                write!(f, "no page found: open a people or jobs search results page")
            }
            Status::Discovering { page } => write!(f, "page {}: discovering items", page),
            Status::NoItems { page } => write!(f, "page {}: no items found", page),
            Status::Processing {
                page,
                pages_total,
                item,
                items,
                collected,
            } => write!(
                f,
                "page {} of {} | item {}/{} | {} collected",
                page,
                pages_total,
                item + 1,
                items,
                collected
            ),
            Status::Advancing { next_page } => write!(f, "moving to page {}", next_page),
            Status::Stopping => write!(f, "stopping: saving collected data"),
            Status::Done { records } => write!(f, "done: {} records", records),
            Status::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Sending half of the status line; cheap to clone.
#[derive(Clone)]
pub struct StatusLine {
    tx: watch::Sender<Status>,
}

impl StatusLine {
    pub fn new() -> (Self, watch::Receiver<Status>) {
        let (tx, rx) = watch::channel(Status::Idle);
        (Self { tx }, rx)
    }

    pub fn set(&self, status: Status) {
        tracing::info!("status: {}", status);
        self.tx.send_replace(status);
    }

    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new().0
    }
}
