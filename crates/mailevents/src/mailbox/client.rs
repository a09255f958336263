//! IMAP implementation of the mailbox traits.

use std::future::Future;
use std::net::TcpStream;
use std::time::Duration;

use async_imap::types::Fetch;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use mail_parser::MessageParser;
use secrecy::ExposeSecret;

use crate::config::{MailboxConfig, Settings};

use super::error::{MailboxError, Result};
use super::{MailboxConnector, MailboxSession, MailboxSummary, MessageSummary};

/// Type alias for the underlying async stream (async-io wrapped std TcpStream).
type AsyncTcpStream = async_io::Async<TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

type ImapSession = async_imap::Session<TlsStream>;

const HEADER_QUERY: &str = "(UID INTERNALDATE BODY.PEEK[HEADER])";

/// UIDs per header FETCH while listing.
const HEADER_CHUNK: usize = 200;
const BODY_QUERY: &str = "(UID BODY.PEEK[])";

/// Identity of a message inside a mailbox: folder, UIDVALIDITY and UID.
///
/// Rendered as `folder:uidvalidity:uid`, which stays unique across folder
/// recreation because UIDVALIDITY changes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    pub folder: String,
    pub uid_validity: u32,
    pub uid: u32,
}

impl MessageKey {
    pub fn to_message_id(&self) -> String {
        format!("{}:{}:{}", self.folder, self.uid_validity, self.uid)
    }
}

/// Parses a `folder:uidvalidity:uid` message id. Folder names may contain `:`.
pub fn parse_message_id(message_id: &str) -> Option<MessageKey> {
    let mut parts = message_id.rsplitn(3, ':');
    let uid = parts.next()?.parse().ok()?;
    let uid_validity = parts.next()?.parse().ok()?;
    let folder = parts.next().filter(|f| !f.is_empty())?;
    Some(MessageKey {
        folder: folder.to_string(),
        uid_validity,
        uid,
    })
}

/// Connects to IMAP servers over TLS.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    timeout: Duration,
    unseen_only: bool,
}

impl ImapConnector {
    pub fn new(timeout: Duration, unseen_only: bool) -> Self {
        Self {
            timeout,
            unseen_only,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Duration::from_secs(settings.imap_timeout_secs),
            settings.unseen_only,
        )
    }

    /// Establishes TCP + TLS and logs in.
    async fn open_session(&self, config: &MailboxConfig) -> Result<ImapSession> {
        if !config.use_tls {
            return Err(MailboxError::Config(
                "TLS is required for mailbox connections".to_string(),
            ));
        }
        if config.server.trim().is_empty() {
            return Err(MailboxError::Config("server is not set".to_string()));
        }

        info!("Connecting to IMAP server at {}:{}", config.server, config.port);

        // Resolution and the TCP handshake share the connect timeout.
        let tcp_stream: AsyncTcpStream = with_timeout(self.timeout, "connect", async {
            let addr = tokio::net::lookup_host((config.server.as_str(), config.port))
                .await
                .map_err(|e| MailboxError::Connection(format!("cannot resolve host: {}", e)))?
                .next()
                .ok_or_else(|| {
                    MailboxError::Connection("host resolved to no address".to_string())
                })?;
            async_io::Async::<TcpStream>::connect(addr)
                .await
                .map_err(|e| MailboxError::Connection(e.to_string()))
        })
        .await?;

        let session = with_timeout(self.timeout, "connect", async {
            let tls_stream = TlsConnector::new()
                .connect(config.server.as_str(), tcp_stream)
                .await?;

            let client = async_imap::Client::new(tls_stream);
            client
                .login(&config.username, config.password.expose_secret())
                .await
                .map_err(|(e, _)| MailboxError::Connection(format!("login rejected: {}", e)))
        })
        .await?;

        info!("Authenticated to IMAP server as {}", crate::sanitize::redact_address(&config.username));
        Ok(session)
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self, config: &MailboxConfig) -> Result<Box<dyn MailboxSession>> {
        let session = self.open_session(config).await?;
        Ok(Box::new(ImapMailboxSession {
            session: Some(session),
            timeout: self.timeout,
            unseen_only: self.unseen_only,
            read_write: config.mark_as_read,
            selected: None,
        }))
    }

    async fn probe(&self, config: &MailboxConfig) -> Result<MailboxSummary> {
        let mut session = self.open_session(config).await?;
        let timeout = self.timeout;
        let folder = config.folder.as_str();

        let result = with_timeout(timeout, "probe", async {
            let mailbox = session
                .examine(folder)
                .await
                .map_err(|e| folder_error(folder, e))?;
            let unread = session
                .uid_search("UNSEEN")
                .await
                .map_err(|e| MailboxError::Protocol(e.to_string()))?;
            Ok(MailboxSummary {
                total_messages: mailbox.exists,
                unread_count: unread.len() as u32,
            })
        })
        .await;

        if let Err(e) = with_timeout(timeout, "logout", async {
            session
                .logout()
                .await
                .map_err(|e| MailboxError::Protocol(e.to_string()))
        })
        .await
        {
            debug!("Logout after probe failed: {}", e);
        }

        result
    }
}

/// An open IMAP session bound to one folder at a time.
struct ImapMailboxSession {
    session: Option<ImapSession>,
    timeout: Duration,
    unseen_only: bool,
    /// SELECT (read-write) when messages get flagged, EXAMINE otherwise.
    read_write: bool,
    selected: Option<(String, u32)>,
}

impl ImapMailboxSession {
    fn session_mut(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| MailboxError::Connection("Not connected".to_string()))
    }

    /// Resolves a message id against the currently selected folder.
    fn uid_for(&self, message_id: &str) -> std::result::Result<u32, String> {
        let key = parse_message_id(message_id).ok_or("malformed message id")?;
        match &self.selected {
            Some((folder, validity)) if *folder == key.folder && *validity == key.uid_validity => {
                Ok(key.uid)
            }
            Some((folder, _)) if *folder == key.folder => {
                Err("UIDVALIDITY changed since listing".to_string())
            }
            _ => Err("folder is not selected".to_string()),
        }
    }
}

#[async_trait]
impl MailboxSession for ImapMailboxSession {
    async fn list_candidates(&mut self, folder: &str) -> Result<Vec<MessageSummary>> {
        let timeout = self.timeout;
        let read_write = self.read_write;
        let query = if self.unseen_only { "UNSEEN" } else { "ALL" };
        let session = self.session_mut()?;

        let mailbox = with_timeout(timeout, "list", async {
            let opened = if read_write {
                session.select(folder).await
            } else {
                session.examine(folder).await
            };
            opened.map_err(|e| folder_error(folder, e))
        })
        .await?;

        let uid_validity = mailbox.uid_validity.ok_or_else(|| {
            MailboxError::Protocol("Server did not provide UIDVALIDITY".to_string())
        })?;

        let mut uids: Vec<u32> = with_timeout(timeout, "list", async {
            session
                .uid_search(query)
                .await
                .map_err(|e| MailboxError::Protocol(e.to_string()))
        })
        .await?
        .into_iter()
        .collect();
        uids.sort_unstable();

        debug!(
            "Folder '{}' (UIDVALIDITY={}) has {} candidate(s)",
            folder,
            uid_validity,
            uids.len()
        );

        // Headers only; the caller decides how many bodies to fetch.
        let mut fetches: Vec<Fetch> = Vec::with_capacity(uids.len());
        for chunk in uids.chunks(HEADER_CHUNK) {
            let uid_set = chunk
                .iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let batch: Vec<Fetch> = with_timeout(timeout, "list", async {
                session
                    .uid_fetch(&uid_set, HEADER_QUERY)
                    .await
                    .map_err(|e| MailboxError::Protocol(e.to_string()))?
                    .try_collect()
                    .await
                    .map_err(|e| MailboxError::Protocol(e.to_string()))
            })
            .await?;
            fetches.extend(batch);
        }

        let mut listed: Vec<(Option<DateTime<Utc>>, u32, MessageSummary)> = fetches
            .iter()
            .filter_map(|fetch| {
                let Some(uid) = fetch.uid else {
                    warn!("FETCH response without UID skipped");
                    return None;
                };
                let summary = summarize(
                    folder,
                    uid_validity,
                    uid,
                    fetch.header().unwrap_or_default(),
                    fetch.internal_date(),
                );
                Some((summary.received_at, uid, summary))
            })
            .collect();
        listed.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        self.selected = Some((folder.to_string(), uid_validity));
        Ok(listed.into_iter().map(|(_, _, s)| s).collect())
    }

    async fn fetch_body(&mut self, message_id: &str) -> Result<Vec<u8>> {
        let uid = self.uid_for(message_id).map_err(|reason| MailboxError::Fetch {
            message_id: message_id.to_string(),
            reason,
        })?;
        let timeout = self.timeout;
        let session = self.session_mut()?;

        debug!("Fetching message UID {}", uid);

        let fetches: Vec<Fetch> = with_timeout(timeout, "fetch", async {
            session
                .uid_fetch(uid.to_string(), BODY_QUERY)
                .await
                .map_err(|e| fetch_error(message_id, e))?
                .try_collect()
                .await
                .map_err(|e| fetch_error(message_id, e))
        })
        .await?;

        fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .and_then(|f| f.body())
            .map(|body| body.to_vec())
            .ok_or_else(|| MailboxError::Fetch {
                message_id: message_id.to_string(),
                reason: "message no longer exists".to_string(),
            })
    }

    async fn mark_read(&mut self, message_id: &str) -> Result<()> {
        if !self.read_write {
            return Err(MailboxError::Flag {
                message_id: message_id.to_string(),
                reason: "folder opened read-only".to_string(),
            });
        }
        let uid = self.uid_for(message_id).map_err(|reason| MailboxError::Flag {
            message_id: message_id.to_string(),
            reason,
        })?;
        let timeout = self.timeout;
        let session = self.session_mut()?;

        let flag_error = |e: async_imap::error::Error| MailboxError::Flag {
            message_id: message_id.to_string(),
            reason: e.to_string(),
        };

        let _updates: Vec<Fetch> = with_timeout(timeout, "mark_read", async {
            session
                .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
                .await
                .map_err(flag_error)?
                .try_collect()
                .await
                .map_err(flag_error)
        })
        .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.selected = None;
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from IMAP server");
            with_timeout(self.timeout, "logout", async {
                session
                    .logout()
                    .await
                    .map_err(|e| MailboxError::Protocol(e.to_string()))
            })
            .await?;
        }
        Ok(())
    }
}

impl Drop for ImapMailboxSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("IMAP session dropped without explicit close - connection will be reset");
        }
    }
}

/// Builds a summary from a header-only fetch. INTERNALDATE wins over the
/// `Date:` header for ordering.
pub(crate) fn summarize(
    folder: &str,
    uid_validity: u32,
    uid: u32,
    header: &[u8],
    internal_date: Option<DateTime<FixedOffset>>,
) -> MessageSummary {
    let parsed = MessageParser::default().parse(header);

    let from_address = parsed
        .as_ref()
        .and_then(|m| m.from())
        .and_then(|addr| addr.first())
        .and_then(|addr| addr.address())
        .unwrap_or_default()
        .to_string();
    let subject = parsed
        .as_ref()
        .and_then(|m| m.subject())
        .unwrap_or_default()
        .trim()
        .to_string();
    let header_date = parsed
        .as_ref()
        .and_then(|m| m.date())
        .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok());

    MessageSummary {
        message_id: MessageKey {
            folder: folder.to_string(),
            uid_validity,
            uid,
        }
        .to_message_id(),
        from_address,
        subject,
        received_at: internal_date.or(header_date).map(|d| d.with_timezone(&Utc)),
    }
}

async fn with_timeout<T, F>(timeout: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| MailboxError::Timeout {
            operation,
            secs: timeout.as_secs(),
        })?
}

/// A tagged NO answer to SELECT/EXAMINE means the folder cannot be opened.
fn folder_error(folder: &str, e: async_imap::error::Error) -> MailboxError {
    match e {
        async_imap::error::Error::No(_) => MailboxError::FolderNotFound(folder.to_string()),
        other => MailboxError::Protocol(other.to_string()),
    }
}

fn fetch_error(message_id: &str, e: async_imap::error::Error) -> MailboxError {
    MailboxError::Fetch {
        message_id: message_id.to_string(),
        reason: e.to_string(),
    }
}
