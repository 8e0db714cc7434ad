use anyhow::Context;
use clap::Parser;
use coco_remote::Notifier;
use coco_remote::Remote;
use coco_remote::RemoteConfig;
use coco_remote::TimeRange;
use coco_taxonomy::CoCo;
use coco_taxonomy::Record;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

pub mod replay;

/// Offline and online tooling for CoCo taxonomies.
#[derive(Debug, Parser)]
#[command(author, version, about = "CoCo taxonomy client")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, clap::Args)]
pub struct SourceArgs {
    /// JSONL log of taxonomy update messages
    #[arg(long)]
    pub input: PathBuf,

    /// Fail on the first message the registry rejects
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, clap::Args)]
pub struct ServerArgs {
    /// Server base URL; overrides COCO_HOST
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Replay a message log and print the resulting taxonomy.
    Replay {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Fetch an item's history from the server.
    History {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        server: ServerArgs,
        #[arg(long)]
        item: String,
        /// Size of the trailing window, in days
        #[arg(long, default_value_t = 14)]
        days: i64,
    },
    /// Publish values for an item.
    Publish {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        server: ServerArgs,
        #[arg(long)]
        item: String,
        /// JSON object of property values
        #[arg(long)]
        data: String,
    },
    /// Ask the server for sample values of a type.
    Fake {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        server: ServerArgs,
        #[arg(long = "type")]
        type_name: String,
        /// Restrict the sample to these properties
        #[arg(long = "param")]
        params: Vec<String>,
    },
}

/// Prints toasts to stderr and remembers them so the command can fail.
#[derive(Default)]
struct StderrNotifier {
    toasts: Mutex<Vec<String>>,
}

impl Notifier for StderrNotifier {
    fn toast(&self, message: &str) {
        eprintln!("{message}");
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

impl StderrNotifier {
    fn check(&self) -> anyhow::Result<()> {
        let toasts = self.toasts.lock().unwrap_or_else(PoisonError::into_inner);
        match toasts.last() {
            Some(last) => anyhow::bail!("request failed: {last}"),
            None => Ok(()),
        }
    }
}

fn load(source: &SourceArgs) -> anyhow::Result<CoCo> {
    let coco = CoCo::new();
    let stats = replay::load_stream(&coco, &source.input, source.strict)?;
    tracing::info!(
        "replayed {} messages ({} rejected)",
        stats.applied + stats.failed,
        stats.failed
    );
    Ok(coco)
}

fn connect(server: &ServerArgs) -> (Remote, Arc<StderrNotifier>) {
    let config = match &server.host {
        Some(host) => RemoteConfig {
            host: RemoteConfig::new(host.as_str()).host,
            ..RemoteConfig::from_env()
        },
        None => RemoteConfig::from_env(),
    };
    let notifier = Arc::new(StderrNotifier::default());
    (Remote::new(config, notifier.clone()), notifier)
}

fn parse_record(text: &str) -> anyhow::Result<Record> {
    match serde_json::from_str::<Value>(text).context("--data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--data must be a JSON object, got {other}"),
    }
}

fn write_report_to_stdout(coco: &CoCo) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    replay::write_report(coco, &mut out)?;
    Ok(())
}

/// Execute a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.cmd {
        Command::Replay { source } => {
            let coco = load(&source)?;
            write_report_to_stdout(&coco)?;
        }
        Command::History {
            source,
            server,
            item,
            days,
        } => {
            let coco = load(&source)?;
            let item = coco.require_item(&item)?;
            let (remote, notifier) = connect(&server);
            remote
                .load_data(&item, Some(trailing_days(days)?))
                .await;
            notifier.check()?;
            for datum in item.history() {
                println!("{} {}", datum.timestamp, Value::Object(datum.data));
            }
        }
        Command::Publish {
            source,
            server,
            item,
            data,
        } => {
            let coco = load(&source)?;
            let item = coco.require_item(&item)?;
            let data = parse_record(&data)?;
            let (remote, notifier) = connect(&server);
            remote.publish(&item, &data).await;
            notifier.check()?;
            println!("Published data for {}", item.id());
        }
        Command::Fake {
            source,
            server,
            type_name,
            params,
        } => {
            let coco = load(&source)?;
            let tp = coco.require_type(&type_name)?;
            let (remote, notifier) = connect(&server);
            let parameters = (!params.is_empty()).then_some(params.as_slice());
            let values = remote.fake_data(&tp, parameters).await;
            notifier.check()?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(values))?);
        }
    }
    Ok(())
}

fn trailing_days(days: i64) -> anyhow::Result<TimeRange> {
    TimeRange::trailing_days(days).context("--days is out of range")
}
