//! CLI entry point for `mboxsave`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use mboxsave::config::Config;
use mboxsave::export::suggest::suggest_filename;
use mboxsave::export::task::ProgressCallback;
use mboxsave::export::{save_async, Priority, SaveProgress, SaveStats};
use mboxsave::i18n;
use mboxsave::store::{MaildirStore, MessageStore};

#[derive(Parser)]
#[command(name = "mboxsave", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Language (en, es). Defaults to system locale.
    #[arg(long, value_name = "LANG", global = true)]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Save messages to an mbox file
    Save {
        /// Maildir folder or directory of .eml files
        #[arg(short, long, value_name = "DIR")]
        store: PathBuf,
        /// Destination file (default: suggested name in the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Scheduling hint: low, default, high
        #[arg(long)]
        priority: Option<Priority>,
        /// Message identifiers, in archive order (default: every message)
        uids: Vec<String>,
    },
    /// Print the suggested archive file name
    Suggest {
        #[arg(short, long, value_name = "DIR")]
        store: PathBuf,
        uids: Vec<String>,
    },
    /// List message identifiers and subjects
    List {
        #[arg(short, long, value_name = "DIR")]
        store: PathBuf,
    },
}

/// Detect language from `--lang` or the environment before clap renders `--help`.
fn detect_lang_early() -> i18n::Lang {
    let args: Vec<String> = std::env::args().collect();
    for (i, arg) in args.iter().enumerate() {
        let code = if arg == "--lang" {
            args.get(i + 1).map(String::as_str)
        } else {
            arg.strip_prefix("--lang=")
        };
        if let Some(lang) = code.and_then(i18n::Lang::from_code) {
            return lang;
        }
    }
    i18n::detect_system_lang()
}

fn build_localized_command() -> clap::Command {
    let mut cmd = Cli::command().about(i18n::app_about());
    for (name, about) in [
        ("save", i18n::help_cmd_save()),
        ("suggest", i18n::help_cmd_suggest()),
        ("list", i18n::help_cmd_list()),
    ] {
        cmd = cmd.mut_subcommand(name, |sub| sub.about(about));
    }
    cmd
}

fn main() -> anyhow::Result<()> {
    i18n::set_lang(detect_lang_early());

    let matches = build_localized_command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let config = mboxsave::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Save {
            store,
            output,
            priority,
            uids,
        } => cmd_save(&store, output, priority, uids, &config),
        Commands::Suggest { store, uids } => cmd_suggest(&store, uids, &config),
        Commands::List { store } => cmd_list(&store),
    }
}

/// Set up tracing with stderr output and, when possible, a log file.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mboxsave::config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxsave.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn open_store(path: &Path) -> anyhow::Result<MaildirStore> {
    if !path.is_dir() {
        anyhow::bail!("{}: {}", i18n::err_store_not_found(), path.display());
    }
    Ok(MaildirStore::open(path)?)
}

/// Identifiers given on the command line, or every message in the store.
fn select_uids(store: &dyn MessageStore, uids: Vec<String>) -> Vec<String> {
    if uids.is_empty() {
        store.uids()
    } else {
        uids
    }
}

fn cmd_save(
    store_path: &Path,
    output: Option<PathBuf>,
    priority: Option<Priority>,
    uids: Vec<String>,
    config: &Config,
) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let uids = select_uids(&store, uids);
    if uids.is_empty() {
        println!("  {}", i18n::msg_no_messages());
        return Ok(());
    }

    let output = output.unwrap_or_else(|| {
        let name = suggest_filename(&store, &uids, &config.export.extension);
        config
            .export
            .default_output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(name)
    });
    let priority = priority.unwrap_or(config.export.priority);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}% ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    let bar = pb.clone();
    let progress: ProgressCallback = Arc::new(move |event: SaveProgress| match event {
        SaveProgress::Started { total } => bar.set_message(i18n::saving_messages(total)),
        SaveProgress::Percent(p) => bar.set_position(u64::from(p)),
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let cancel = CancellationToken::new();
    let store: Arc<dyn MessageStore> = Arc::new(store);
    let start = Instant::now();

    let outcome = runtime.block_on(async {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = save_async(
            store,
            uids,
            output.clone(),
            priority,
            cancel.clone(),
            progress,
            move |outcome| {
                let _ = tx.send(outcome);
            },
        )?;

        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        handle.await?;
        anyhow::Ok(rx.await?)
    })?;

    pb.finish_and_clear();

    match outcome {
        Ok(stats) => {
            print_summary(&output, &stats, start.elapsed());
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            eprintln!("  {}", i18n::msg_cancelled());
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context(i18n::err_save_failed())),
    }
}

fn cmd_suggest(store_path: &Path, uids: Vec<String>, config: &Config) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let uids = select_uids(&store, uids);
    println!(
        "{}",
        suggest_filename(&store, &uids, &config.export.extension)
    );
    Ok(())
}

fn cmd_list(store_path: &Path) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let uids = store.uids();
    if uids.is_empty() {
        println!("  {}", i18n::msg_no_messages());
        return Ok(());
    }

    let width = uids.iter().map(|u| u.chars().count()).max().unwrap_or(0);
    for uid in &uids {
        let subject = store.subject(uid).unwrap_or_default();
        let subject: String = subject.chars().take(72).collect();
        println!("  {uid:<width$}  {subject}");
    }
    Ok(())
}

fn print_summary(output: &Path, stats: &SaveStats, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {}:", i18n::msg_save_complete());
    println!("  {:<20} {}", i18n::msg_messages(), stats.messages);
    println!(
        "  {:<20} {}",
        i18n::msg_output_size(),
        format_size(stats.bytes_written, BINARY)
    );
    println!("  {:<20} {}", i18n::msg_output_file(), output.display());
    println!("  {:<20} {:.2?}", i18n::msg_elapsed(), elapsed);
    println!();
}
