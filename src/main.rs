use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use intake::artifact::{names, ActionArtifact};
use intake::core::state::{IntakeConfig, INTAKE_DIR};
use intake::core::watcher::Watcher;
use intake::io::mail::{ImapConnector, MailCredentials};
use intake::vault::Vault;
use intake::watchers::{FileDropWatcher, InboxWatcher, MailboxWatcher};

const PASSWORD_ENV: &str = "INTAKE_MAIL_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "intake", version, about = "Turns dropped files and unread mail into action items")]
struct Cli {
    /// Vault root directory
    #[arg(long, default_value = ".")]
    vault: PathBuf,

    /// Config file (defaults to <vault>/.intake/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the vault layout and a default config
    Init,
    /// Run every enabled watcher until Ctrl-C
    Run,
    /// Run a single watcher until Ctrl-C
    Watch {
        #[arg(value_enum)]
        source: Source,
    },
    /// Write a test item into Needs_Action
    Probe,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Drop,
    Inbox,
    Mail,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let vault = Vault::new(cli.vault.clone());
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| IntakeConfig::path_for_vault(vault.root()));

    match cli.command {
        Command::Init => init_vault(&vault, &config_path),
        Command::Probe => {
            let path = probe(&vault)?;
            println!("{} {}", "Probe written:".green(), path.display());
            Ok(())
        }
        Command::Run => {
            let config = IntakeConfig::load(&config_path)?;
            let watchers = build_watchers(&vault, &config, None).await?;
            run_all(watchers).await
        }
        Command::Watch { source } => {
            let config = IntakeConfig::load(&config_path)?;
            let watchers = build_watchers(&vault, &config, Some(source)).await?;
            run_all(watchers).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer())
        .init();
}

fn init_vault(vault: &Vault, config_path: &Path) -> Result<()> {
    vault
        .ensure_layout()
        .with_context(|| format!("Failed to create vault layout in {}", vault.root().display()))?;
    if config_path.exists() {
        println!("{}", "Vault already initialized.".green());
        return Ok(());
    }
    IntakeConfig::default().save(config_path)?;

    let gitignore_path = vault.root().join(".gitignore");
    let mut gitignore = std::fs::read_to_string(&gitignore_path).unwrap_or_default();
    if !gitignore.contains(INTAKE_DIR) {
        gitignore.push_str(&format!("\n# Intake state\n{INTAKE_DIR}/\n"));
        std::fs::write(&gitignore_path, gitignore)?;
    }
    println!("{}", "Vault initialized.".green().bold());
    println!("  config: {}", config_path.display().to_string().cyan());
    Ok(())
}

fn probe(vault: &Vault) -> Result<PathBuf> {
    std::fs::create_dir_all(vault.needs_action())?;
    let path = vault.needs_action().join(names::PROBE);
    let written = ActionArtifact::test_item(&Local::now()).persist(vault, &path)?;
    Ok(written)
}

/// `only` narrows to one source and starts it even when disabled in config.
async fn build_watchers(
    vault: &Vault,
    config: &IntakeConfig,
    only: Option<Source>,
) -> Result<Vec<Box<dyn Watcher>>> {
    let wanted = |source: Source, enabled: bool| match only {
        Some(s) => s == source,
        None => enabled,
    };
    let mut watchers: Vec<Box<dyn Watcher>> = Vec::new();

    if wanted(Source::Drop, config.drop.enabled) {
        watchers.push(Box::new(FileDropWatcher::from_config(vault.clone(), &config.drop)?));
    }
    if wanted(Source::Inbox, config.inbox.enabled) {
        watchers.push(Box::new(InboxWatcher::from_config(vault.clone(), &config.inbox)?));
    }
    if wanted(Source::Mail, config.mail.enabled) {
        if config.mail.account.is_empty() {
            bail!("mail watcher needs [mail] account in config");
        }
        let secret = std::env::var(PASSWORD_ENV)
            .with_context(|| format!("{PASSWORD_ENV} is not set"))?;
        let credentials = MailCredentials {
            account: config.mail.account.clone(),
            secret,
        };
        let connector = ImapConnector::new(&config.mail, credentials);
        let watcher = MailboxWatcher::connect(vault.clone(), &config.mail, Box::new(connector))
            .await
            .context("Failed to start mail watcher")?;
        watchers.push(Box::new(watcher));
    }

    if watchers.is_empty() {
        bail!("no watchers enabled");
    }
    Ok(watchers)
}

async fn run_all(watchers: Vec<Box<dyn Watcher>>) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for mut watcher in watchers {
        let token = cancel.child_token();
        handles.push(tokio::spawn(async move {
            let name = watcher.name();
            if let Err(e) = watcher.start_watching(token).await {
                error!(watcher = name, error = %e, "watcher exited with error");
            }
        }));
    }
    info!(count = handles.len(), "watchers started, press Ctrl-C to stop");

    let all_done = async {
        for handle in handles.iter_mut() {
            if let Err(e) = handle.await {
                error!(error = %e, "watcher task panicked");
            }
        }
    };
    tokio::pin!(all_done);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            cancel.cancel();
            (&mut all_done).await;
        }
        _ = &mut all_done => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake::artifact::parse_front_matter;

    #[test]
    fn probe_writes_test_item() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::new(tmp.path());
        let path = probe(&vault).unwrap();
        assert_eq!(path, vault.needs_action().join("TEST_intake_probe.md"));
        let fm = parse_front_matter(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(fm.get("type"), Some("test_item"));
    }

    #[test]
    fn init_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::new(tmp.path());
        let config = IntakeConfig::path_for_vault(vault.root());
        init_vault(&vault, &config).unwrap();
        init_vault(&vault, &config).unwrap();
        assert!(vault.inbox().is_dir());
        assert_eq!(IntakeConfig::load(&config).unwrap(), IntakeConfig::default());
        let gitignore = std::fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".intake/").count(), 1);
    }

    #[tokio::test]
    async fn watch_mail_without_account_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::new(tmp.path());
        let result = build_watchers(&vault, &IntakeConfig::default(), Some(Source::Mail)).await;
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_watch() {
        let cli = Cli::parse_from(["intake", "--vault", "/tmp/v", "watch", "inbox"]);
        assert!(matches!(cli.command, Command::Watch { source: Source::Inbox }));
        assert_eq!(cli.vault, PathBuf::from("/tmp/v"));
    }
}
