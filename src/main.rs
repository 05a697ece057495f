use anyhow::{anyhow, bail, Context};
use listing_scout::core::config::{self, EvaluatorMode, ScoutConfig};
use listing_scout::features::session_store::SessionStore;
use listing_scout::scraping::browser_manager::BrowserSession;
use listing_scout::{
    CdpHost, Controller, Evaluator, ExportFormat, FileSink, LlmEvaluator, NoEvaluator,
    RunOutcome, StartRequest, StatusLine,
};
use std::sync::Arc;
use tracing::{info, warn};

const USAGE: &str = "\
Usage:
  listing-scout start --pages N [--formats xlsx,csv,md] [--url URL]
  listing-scout resume
  listing-scout stop
  listing-scout config show
  listing-scout config set KEY=VALUE

Env:
  CHROME_WS_URL=ws://... or http://127.0.0.1:9222  (attach to a running browser)
  CHROME_EXECUTABLE=/path/to/chrome                (launch this browser)
  LISTING_SCOUT_CONFIG / LISTING_SCOUT_STATE / LISTING_SCOUT_OUTPUT_DIR
  OPENAI_API_KEY / OPENAI_BASE_URL                  (evaluator)";

#[derive(Debug, PartialEq)]
enum Command {
    Start {
        pages: u32,
        formats: Vec<ExportFormat>,
        url: Option<String>,
    },
    Resume,
    Stop,
    ConfigShow,
    ConfigSet { key: String, value: String },
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == name {
            return it.next().cloned();
        }
        if let Some(rest) = a.strip_prefix(&prefix) {
            return Some(rest.to_string());
        }
    }
    None
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        Some("start") => {
            let rest = &args[1..];
            let pages = match flag_value(rest, "--pages") {
                Some(v) => v
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| anyhow!("--pages must be a positive integer, got {:?}", v))?,
                None => 1,
            };
            let formats = match flag_value(rest, "--formats") {
                Some(v) => ExportFormat::parse_list(&v).map_err(|e| anyhow!(e))?,
                None => vec![ExportFormat::Xlsx],
            };
            Ok(Command::Start {
                pages,
                formats,
                url: flag_value(rest, "--url"),
            })
        }
        Some("resume") => Ok(Command::Resume),
        Some("stop") => Ok(Command::Stop),
        Some("config") => match args.get(1).map(String::as_str) {
            Some("show") | None => Ok(Command::ConfigShow),
            Some("set") => {
                let pair = args.get(2).ok_or_else(|| anyhow!("config set needs KEY=VALUE"))?;
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected KEY=VALUE, got {:?}", pair))?;
                Ok(Command::ConfigSet {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                })
            }
            Some(other) => bail!("unknown config command {:?}\n\n{}", other, USAGE),
        },
        Some(other) => bail!("unknown command {:?}\n\n{}", other, USAGE),
        None => bail!("{}", USAGE),
    }
}

fn open_store() -> anyhow::Result<SessionStore> {
    let path = config::state_path().ok_or_else(|| anyhow!("cannot locate home directory"))?;
    Ok(SessionStore::open_file(path))
}

fn build_evaluator(cfg: &ScoutConfig) -> anyhow::Result<Arc<dyn Evaluator>> {
    if cfg.evaluator.mode == EvaluatorMode::Off {
        return Ok(Arc::new(NoEvaluator));
    }
    let http = reqwest::Client::builder()
        .timeout(cfg.evaluator.resolve_timeout())
        .build()?;
    let evaluator = LlmEvaluator::new(http, cfg.evaluator.clone());
    if !evaluator.is_available() {
        warn!("evaluator: no API key configured, every item will be kept");
    }
    Ok(Arc::new(evaluator))
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(s) | RunOutcome::Stopped(s) | RunOutcome::Aborted { summary: s, .. } => {
            println!("{} record(s)", s.records);
            for f in &s.files {
                println!("  {}", f.display());
            }
            if let RunOutcome::Aborted { reason, .. } = outcome {
                println!("aborted: {}", reason);
            }
        }
        RunOutcome::WrongPage { found } => {
            println!("wrong page ({:?}): open a people or jobs search results page", found)
        }
        RunOutcome::NoSession => println!("no session in progress"),
    }
}

async fn drive(cfg: ScoutConfig, command: Command) -> anyhow::Result<()> {
    let store = open_store()?;

    let start_url = match &command {
        Command::Start { url, .. } => url.clone(),
        Command::Resume => match store.load_session() {
            Some(session) => {
                println!(
                    "resuming {} run on page {} with {} record(s) collected",
                    session.cursor.mode,
                    session.cursor.current_page,
                    session.results.len()
                );
                Some(session.cursor.current_page_url())
            }
            None => {
                println!("no session in progress");
                return Ok(());
            }
        },
        _ => None,
    };

    let browser = BrowserSession::open(&cfg.browser, start_url.as_deref())
        .await
        .context("opening browser")?;
    let host = Arc::new(CdpHost::new(browser.page()));
    let sink = Arc::new(FileSink::new(cfg.resolve_output_dir()));
    info!("main: exports go to {}", sink.dir().display());
    let evaluator = build_evaluator(&cfg)?;

    let (status, mut status_rx) = StatusLine::new();
    let printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            println!("[status] {}", *status_rx.borrow_and_update());
        }
    });

    let controller = Controller::new(host, store, evaluator, sink, cfg, status);
    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c: stopping after the current step");
            cancel.cancel();
        }
    });

    let outcome = match command {
        Command::Start { pages, formats, .. } => {
            controller.start(StartRequest { pages, formats }).await?
        }
        _ => controller.resume().await?,
    };
    print_outcome(&outcome);

    drop(controller);
    let _ = printer.await;
    browser.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    let mut cfg = config::load_config();

    match command {
        Command::ConfigShow => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
        Command::ConfigSet { key, value } => {
            cfg.set(&key, &value)?;
            config::save_config(&cfg)?;
            println!("{} = {}", key, value);
        }
        Command::Stop => {
            let store = open_store()?;
            let sink = Arc::new(FileSink::new(cfg.resolve_output_dir()));
            let host = Arc::new(listing_scout::scraping::DetachedHost);
            let (status, _rx) = StatusLine::new();
            let controller = Controller::new(host, store, Arc::new(NoEvaluator), sink, cfg, status);
            print_outcome(&controller.abandon().await);
        }
        command => drive(cfg, command).await?,
    }
    Ok(())
}
