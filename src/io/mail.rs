//! Remote mail store access.
//!
//! The IMAP client is blocking, so every call runs on the blocking pool and is
//! bounded by a timeout. A call that times out takes its session with it; the
//! mailbox watcher notices on its next tick and reconnects.

use async_trait::async_trait;
use std::net::TcpStream;
use std::time::Duration;
use tracing::debug;

use crate::core::error::WatchError;
use crate::core::state::MailConfig;

/// Account credentials, resolved by the caller.
#[derive(Clone)]
pub struct MailCredentials {
    pub account: String,
    pub secret: String,
}

impl std::fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailCredentials")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Opens an authenticated session with the watched mailbox selected.
    async fn connect(&self) -> Result<Box<dyn MailSession>, WatchError>;
}

#[async_trait]
pub trait MailSession: Send {
    /// Ids of messages still flagged unread, in ascending order.
    async fn search_unseen(&mut self) -> Result<Vec<String>, WatchError>;

    /// Full RFC 822 bytes of one message. Must not mark it read.
    async fn fetch(&mut self, id: &str) -> Result<Vec<u8>, WatchError>;

    async fn logout(&mut self);
}

type ImapInner = imap::Session<native_tls::TlsStream<TcpStream>>;

pub struct ImapConnector {
    server: String,
    port: u16,
    mailbox: String,
    credentials: MailCredentials,
    timeout: Duration,
}

impl ImapConnector {
    pub fn new(config: &MailConfig, credentials: MailCredentials) -> Self {
        Self {
            server: config.server.clone(),
            port: config.port,
            mailbox: config.mailbox.clone(),
            credentials,
            timeout: config.timeout(),
        }
    }
}

async fn bounded<T, F>(op: &'static str, timeout: Duration, f: F) -> Result<T, WatchError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join)) => Err(WatchError::Connectivity(format!("{op} aborted: {join}"))),
        Err(_) => Err(WatchError::Timeout { op, after: timeout }),
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(&self) -> Result<Box<dyn MailSession>, WatchError> {
        let server = self.server.clone();
        let port = self.port;
        let mailbox = self.mailbox.clone();
        let creds = self.credentials.clone();

        let session = bounded("connect", self.timeout, move || {
            let tls = native_tls::TlsConnector::builder()
                .build()
                .map_err(|e| WatchError::Connectivity(format!("TLS setup failed: {e}")))?;
            let client = imap::connect((server.as_str(), port), server.as_str(), &tls)
                .map_err(|e| WatchError::Connectivity(format!("connect to {server}:{port}: {e}")))?;
            let mut session = client
                .login(&creds.account, &creds.secret)
                .map_err(|(e, _)| WatchError::Connectivity(format!("login as {}: {e}", creds.account)))?;
            session
                .select(&mailbox)
                .map_err(|e| WatchError::Connectivity(format!("select {mailbox}: {e}")))?;
            Ok::<_, WatchError>(session)
        })
        .await??;

        debug!(server = %self.server, "mail session opened");
        Ok(Box::new(ImapSession {
            inner: Some(session),
            timeout: self.timeout,
        }))
    }
}

pub struct ImapSession {
    // Taken while a blocking call is in flight; left empty if that call timed out.
    inner: Option<ImapInner>,
    timeout: Duration,
}

impl ImapSession {
    async fn call<T, F>(&mut self, op: &'static str, f: F) -> Result<T, WatchError>
    where
        F: FnOnce(&mut ImapInner) -> imap::error::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut session = self
            .inner
            .take()
            .ok_or_else(|| WatchError::Connectivity("session closed".to_string()))?;
        let (session, result) = bounded(op, self.timeout, move || {
            let result = f(&mut session);
            (session, result)
        })
        .await?;
        self.inner = Some(session);
        result.map_err(|e| WatchError::Connectivity(format!("{op}: {e}")))
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn search_unseen(&mut self) -> Result<Vec<String>, WatchError> {
        let uids = self.call("search", |s| s.uid_search("UNSEEN")).await?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids.into_iter().map(|uid| uid.to_string()).collect())
    }

    async fn fetch(&mut self, id: &str) -> Result<Vec<u8>, WatchError> {
        let uid = id.to_string();
        let body = self
            .call("fetch", move |s| {
                let fetches = s.uid_fetch(&uid, "BODY.PEEK[]")?;
                Ok(fetches.iter().find_map(|f| f.body().map(<[u8]>::to_vec)))
            })
            .await?;
        body.ok_or_else(|| WatchError::malformed(id, "server returned no message body"))
    }

    async fn logout(&mut self) {
        if self.inner.is_some() {
            let _ = self.call("logout", |s| s.logout()).await;
        }
        self.inner = None;
    }
}
