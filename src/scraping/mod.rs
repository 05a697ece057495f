pub mod browser_manager;
pub mod cdp_host;
pub mod discovery;
pub mod extract;
pub mod host;
pub mod humanize;
pub mod poll;

pub use cdp_host::CdpHost;
pub use host::{DetachedHost, HostPage, ScrollRegion};
