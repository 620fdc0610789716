//! Polls a remote mailbox for unread messages and writes one `EMAIL_<id>.md`
//! artifact per message.
//!
//! The watcher never clears the unread flag, so it keeps its own record of ids
//! it already handled. Ids are recorded when they are first listed, not when the
//! artifact lands: a message whose fetch or parse fails is not retried during
//! this process's lifetime.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifact::{names, ActionArtifact};
use crate::core::dedup::DedupTracker;
use crate::core::error::WatchError;
use crate::core::signal::Signal;
use crate::core::state::MailConfig;
use crate::core::watcher::{run_polling_loop, Lifecycle, Watcher, WatcherPhase};
use crate::io::mail::{MailConnector, MailSession};
use crate::io::message::parse_message;
use crate::vault::Vault;

const NAME: &str = "mailbox";
const SUBJECT_LOG_CHARS: usize = 50;

pub struct MailboxWatcher {
    vault: Vault,
    connector: Box<dyn MailConnector>,
    session: Option<Box<dyn MailSession>>,
    seen: DedupTracker,
    interval: Duration,
    lifecycle: Lifecycle,
}

impl MailboxWatcher {
    /// Logs in right away. A failure here is returned to the caller.
    pub async fn connect(vault: Vault, config: &MailConfig, connector: Box<dyn MailConnector>) -> Result<Self> {
        std::fs::create_dir_all(vault.needs_action())
            .with_context(|| format!("Failed to create {}", vault.needs_action().display()))?;
        let seen = match &config.dedup_state {
            Some(path) => DedupTracker::persisted(config.dedup_capacity, &vault.resolve(path))?,
            None => DedupTracker::new(config.dedup_capacity),
        };
        let session = connector.connect().await.map_err(|e| {
            error!(watcher = NAME, error = %e, "failed to connect to mail store");
            e
        })?;
        info!(watcher = NAME, account = %config.account, "connected to mail store");
        Ok(Self {
            vault,
            connector,
            session: Some(session),
            seen,
            interval: Duration::from_secs(config.check_interval_secs),
            lifecycle: Lifecycle::new(NAME),
        })
    }

    pub fn seen(&self) -> &DedupTracker {
        &self.seen
    }

    async fn reconnect(&mut self) {
        // The old session is presumed dead; logging it out could block until timeout.
        self.session = None;
        match self.connector.connect().await {
            Ok(session) => {
                info!(watcher = NAME, "reconnected to mail store");
                self.session = Some(session);
            }
            Err(e) => error!(watcher = NAME, error = %e, "failed to reconnect"),
        }
    }

    async fn search(&mut self) -> Result<Vec<String>, WatchError> {
        match self.session.as_mut() {
            Some(session) => session.search_unseen().await,
            None => Err(WatchError::Connectivity("not connected".to_string())),
        }
    }

    async fn fetch_artifact(&mut self, id: &str) -> Result<PathBuf, WatchError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| WatchError::Connectivity("not connected".to_string()))?;
        let raw = session.fetch(id).await?;
        let message = parse_message(id, &raw)?;
        let path = self.vault.needs_action().join(names::email(id));
        let written = ActionArtifact::email(&message).persist(&self.vault, &path)?;
        let subject: String = message.subject.chars().take(SUBJECT_LOG_CHARS).collect();
        info!(watcher = NAME, %id, %subject, priority = %message.priority(), "created action file for email");
        Ok(written)
    }

    fn save_seen(&mut self) {
        if let Err(e) = self.seen.flush() {
            warn!(watcher = NAME, error = %e, "failed to save seen ids");
        }
    }

    pub async fn close(&mut self) {
        self.save_seen();
        if let Some(mut session) = self.session.take() {
            session.logout().await;
        }
    }
}

#[async_trait]
impl Watcher for MailboxWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    fn phase(&self) -> WatcherPhase {
        self.lifecycle.phase()
    }

    async fn check_for_updates(&mut self) -> Vec<Signal> {
        let ids = match self.search().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(watcher = NAME, error = %e, "error checking for emails");
                self.lifecycle.fail();
                self.reconnect().await;
                return Vec::new();
            }
        };
        self.lifecycle.recover();

        // Everything still tracked is still unread, so a full tracker defers new
        // ids instead of evicting ones the server would report again.
        self.seen.retain_live(&ids);
        let mut fresh = Vec::new();
        let mut deferred = 0;
        for id in ids {
            if self.seen.has_seen(&id) {
                continue;
            }
            if self.seen.is_full() {
                deferred += 1;
                continue;
            }
            self.seen.mark_seen(&id);
            fresh.push(Signal::Mail { id });
        }
        if deferred > 0 {
            warn!(
                watcher = NAME,
                deferred,
                capacity = self.seen.capacity(),
                "dedup tracker full, deferring unread messages"
            );
        }
        fresh
    }

    async fn finish_tick(&mut self) {
        self.save_seen();
    }

    async fn create_action_file(&mut self, signal: &Signal) -> Option<PathBuf> {
        let Signal::Mail { id } = signal else {
            warn!(watcher = NAME, id = %signal.id(), "not a mail signal");
            return None;
        };
        match self.fetch_artifact(id).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(watcher = NAME, %id, error = %e, "error creating action file");
                None
            }
        }
    }

    async fn start_watching(&mut self, cancel: CancellationToken) -> Result<()> {
        self.lifecycle.start();
        info!(watcher = NAME, interval = ?self.interval, "polling mailbox");
        let interval = self.interval;
        run_polling_loop(self, interval, &cancel).await;
        self.close().await;
        self.lifecycle.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::parse_front_matter;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockState {
        unseen: Vec<String>,
        messages: HashMap<String, Vec<u8>>,
        fail_searches: usize,
        fail_connects: usize,
        connects: usize,
        logouts: usize,
        fetches: usize,
    }

    #[derive(Clone, Default)]
    struct MockStore(Arc<Mutex<MockState>>);

    impl MockStore {
        fn deliver(&self, id: &str, subject: &str) {
            let raw = format!(
                "From: sender{id}@example.com\r\nSubject: {subject}\r\nDate: Mon, 9 Mar 2026 10:00:00 +0000\r\n\r\nBody of {id}\r\n"
            );
            let mut state = self.0.lock().unwrap();
            state.unseen.push(id.to_string());
            state.messages.insert(id.to_string(), raw.into_bytes());
        }

        fn mark_read(&self, id: &str) {
            self.state().unseen.retain(|u| u != id);
        }

        fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.0.lock().unwrap()
        }
    }

    struct MockSession(MockStore);

    #[async_trait]
    impl MailConnector for MockStore {
        async fn connect(&self) -> Result<Box<dyn MailSession>, WatchError> {
            let mut state = self.state();
            state.connects += 1;
            if state.fail_connects > 0 {
                state.fail_connects -= 1;
                return Err(WatchError::Connectivity("login refused".into()));
            }
            Ok(Box::new(MockSession(self.clone())))
        }
    }

    #[async_trait]
    impl MailSession for MockSession {
        async fn search_unseen(&mut self) -> Result<Vec<String>, WatchError> {
            let mut state = self.0.state();
            if state.fail_searches > 0 {
                state.fail_searches -= 1;
                return Err(WatchError::Connectivity("connection reset".into()));
            }
            Ok(state.unseen.clone())
        }

        async fn fetch(&mut self, id: &str) -> Result<Vec<u8>, WatchError> {
            let mut state = self.0.state();
            state.fetches += 1;
            state
                .messages
                .get(id)
                .cloned()
                .ok_or_else(|| WatchError::malformed(id, "no such message"))
        }

        async fn logout(&mut self) {
            self.0.state().logouts += 1;
        }
    }

    fn config() -> MailConfig {
        MailConfig {
            enabled: true,
            account: "ops@example.com".into(),
            check_interval_secs: 1,
            ..MailConfig::default()
        }
    }

    async fn watcher(store: &MockStore) -> (tempfile::TempDir, Vault, MailboxWatcher) {
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::new(tmp.path());
        let w = MailboxWatcher::connect(vault.clone(), &config(), Box::new(store.clone()))
            .await
            .unwrap();
        (tmp, vault, w)
    }

    fn ids(signals: &[Signal]) -> Vec<String> {
        signals.iter().map(Signal::id).collect()
    }

    #[tokio::test]
    async fn each_id_is_reported_once() {
        let store = MockStore::default();
        store.deliver("1", "hello");
        store.deliver("2", "status");
        store.deliver("3", "lunch");
        let (_tmp, _vault, mut w) = watcher(&store).await;

        assert_eq!(ids(&w.check_for_updates().await), ["1", "2", "3"]);
        assert!(w.check_for_updates().await.is_empty());
        assert!(w.check_for_updates().await.is_empty());

        store.deliver("4", "new one");
        assert_eq!(ids(&w.check_for_updates().await), ["4"]);
        assert_eq!(w.seen().len(), 4);
    }

    #[tokio::test]
    async fn backlog_beyond_capacity_is_not_repeated() {
        let store = MockStore::default();
        for id in ["1", "2", "3"] {
            store.deliver(id, "backlog");
        }
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.dedup_capacity = 2;
        let mut w = MailboxWatcher::connect(Vault::new(tmp.path()), &cfg, Box::new(store.clone()))
            .await
            .unwrap();

        assert_eq!(ids(&w.check_for_updates().await), ["1", "2"]);
        assert!(w.check_for_updates().await.is_empty());
        assert!(w.check_for_updates().await.is_empty());

        // Reading one frees a slot for the deferred message, and only that one.
        store.mark_read("1");
        assert_eq!(ids(&w.check_for_updates().await), ["3"]);
        assert!(w.check_for_updates().await.is_empty());
    }

    #[tokio::test]
    async fn read_messages_leave_the_tracker() {
        let store = MockStore::default();
        store.deliver("1", "a");
        store.deliver("2", "b");
        let (_tmp, _vault, mut w) = watcher(&store).await;

        assert_eq!(w.check_for_updates().await.len(), 2);
        store.mark_read("1");
        assert!(w.check_for_updates().await.is_empty());
        assert_eq!(w.seen().len(), 1);
        assert!(w.seen().has_seen("2"));
    }

    #[tokio::test]
    async fn seen_ids_are_saved_after_the_tick() {
        let store = MockStore::default();
        store.deliver("40", "hello");
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::new(tmp.path());
        let mut cfg = config();
        cfg.dedup_state = Some(PathBuf::from(".intake/mail_seen.json"));
        let state = vault.resolve(cfg.dedup_state.as_deref().unwrap());
        let mut w = MailboxWatcher::connect(vault, &cfg, Box::new(store.clone()))
            .await
            .unwrap();

        let signals = w.check_for_updates().await;
        assert_eq!(signals.len(), 1);
        assert!(!state.exists());

        w.create_action_file(&signals[0]).await.unwrap();
        w.finish_tick().await;
        assert!(fs::read_to_string(&state).unwrap().contains("40"));
    }

    #[tokio::test]
    async fn urgent_payment_is_high_priority() {
        let store = MockStore::default();
        store.deliver("17", "URGENT: payment due");
        let (_tmp, vault, mut w) = watcher(&store).await;

        let signals = w.check_for_updates().await;
        assert_eq!(signals.len(), 1);
        let path = w.create_action_file(&signals[0]).await.unwrap();
        assert_eq!(path, vault.needs_action().join("EMAIL_17.md"));

        let fm = parse_front_matter(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(fm.get("type"), Some("email"));
        assert_eq!(fm.get("from"), Some("sender17@example.com"));
        assert_eq!(fm.get("subject"), Some("URGENT: payment due"));
        assert_eq!(fm.get("priority"), Some("high"));
        assert_eq!(fm.get("status"), Some("pending"));
    }

    #[tokio::test]
    async fn reconnects_after_failed_tick() {
        let store = MockStore::default();
        store.deliver("5", "weekly report");
        store.deliver("6", "invoice attached");
        let (_tmp, vault, mut w) = watcher(&store).await;
        w.lifecycle.start();
        store.state().fail_searches = 1;

        // Tick T: the search fails, one reconnect, nothing produced.
        assert!(w.check_for_updates().await.is_empty());
        assert_eq!(w.phase(), WatcherPhase::Failed);
        assert_eq!(store.state().connects, 2);
        assert_eq!(fs::read_dir(vault.needs_action()).unwrap().count(), 0);

        // Tick T+1: back to normal.
        let signals = w.check_for_updates().await;
        assert_eq!(ids(&signals), ["5", "6"]);
        assert_eq!(w.phase(), WatcherPhase::Running);
        for s in &signals {
            assert!(w.create_action_file(s).await.is_some());
        }

        // Tick T+2: no duplicates.
        assert!(w.check_for_updates().await.is_empty());
        assert_eq!(fs::read_dir(vault.needs_action()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn failed_reconnect_retries_next_tick() {
        let store = MockStore::default();
        store.deliver("8", "hi");
        let (_tmp, _vault, mut w) = watcher(&store).await;
        {
            let mut state = store.state();
            state.fail_searches = 1;
            state.fail_connects = 1;
        }

        assert!(w.check_for_updates().await.is_empty());
        // No session now: the next tick reconnects instead of searching.
        assert!(w.check_for_updates().await.is_empty());
        assert_eq!(ids(&w.check_for_updates().await), ["8"]);
        assert_eq!(store.state().connects, 3);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_retried() {
        let store = MockStore::default();
        store.deliver("9", "hello");
        store.state().messages.remove("9");
        let (_tmp, vault, mut w) = watcher(&store).await;

        let signals = w.check_for_updates().await;
        assert!(w.create_action_file(&signals[0]).await.is_none());
        assert!(!vault.needs_action().join("EMAIL_9.md").exists());
        assert!(w.check_for_updates().await.is_empty());
    }

    #[tokio::test]
    async fn initial_login_failure_propagates() {
        let store = MockStore::default();
        store.state().fail_connects = 1;
        let tmp = tempfile::tempdir().unwrap();
        let result = MailboxWatcher::connect(Vault::new(tmp.path()), &config(), Box::new(store.clone())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn persisted_ids_survive_restart() {
        let store = MockStore::default();
        store.deliver("21", "one");
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::new(tmp.path());
        let mut cfg = config();
        cfg.dedup_state = Some(PathBuf::from(".intake/mail_seen.json"));

        let mut first = MailboxWatcher::connect(vault.clone(), &cfg, Box::new(store.clone()))
            .await
            .unwrap();
        assert_eq!(first.check_for_updates().await.len(), 1);
        first.close().await;

        let mut second = MailboxWatcher::connect(vault, &cfg, Box::new(store.clone()))
            .await
            .unwrap();
        assert!(second.check_for_updates().await.is_empty());
    }

    #[tokio::test]
    async fn start_watching_runs_until_cancelled() {
        let store = MockStore::default();
        store.deliver("30", "Critical: server down");
        let (_tmp, vault, mut w) = watcher(&store).await;

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let task = tokio::spawn(async move {
            w.start_watching(stop).await.unwrap();
            w
        });

        let artifact = vault.needs_action().join("EMAIL_30.md");
        tokio::time::timeout(Duration::from_secs(5), async {
            while !artifact.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        let w = task.await.unwrap();

        assert_eq!(w.phase(), WatcherPhase::Stopped);
        assert_eq!(store.state().logouts, 1);
        assert_eq!(store.state().fetches, 1);
    }
}
