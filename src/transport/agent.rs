use async_trait::async_trait;
use std::net::IpAddr;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{
    error::{AchError, Result},
    transport::{allowlist::IpAllowlist, path, RemoteFile, Transport},
};

/// One established connection to the ODFI file host.
#[async_trait]
pub trait RemoteSession: Send {
    fn peer_addr(&self) -> Option<IpAddr>;

    async fn ping(&mut self) -> Result<()>;

    /// File names directly inside `dir`. A missing directory is empty.
    async fn list(&mut self, dir: &str) -> Result<Vec<String>>;

    async fn read(&mut self, path: &str) -> Result<Vec<u8>>;

    async fn write(&mut self, path: &str, contents: &[u8]) -> Result<()>;

    async fn remove(&mut self, path: &str) -> Result<()>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Session: RemoteSession + 'static;

    async fn connect(&self) -> Result<Self::Session>;
}

#[derive(Debug, Clone)]
pub struct TransportPaths {
    pub inbound: String,
    pub outbound: String,
    pub returned: String,
}

impl TransportPaths {
    pub fn new(inbound: &str, outbound: &str, returned: &str) -> Result<Self> {
        for p in [inbound, outbound, returned] {
            path::validate(p.trim_end_matches('/'))?;
        }
        Ok(Self {
            inbound: inbound.trim_end_matches('/').to_string(),
            outbound: outbound.trim_end_matches('/').to_string(),
            returned: returned.trim_end_matches('/').to_string(),
        })
    }
}

/// Transport over a lazily established, health-checked session.
///
/// The session is shared behind one async mutex. The IP allowlist is checked
/// every time a new session is established; with a non-empty allowlist a
/// session that cannot report its peer is refused.
pub struct AgentTransport<C: Connector> {
    connector: C,
    allowlist: IpAllowlist,
    paths: TransportPaths,
    session: Mutex<Option<C::Session>>,
}

impl<C: Connector> AgentTransport<C> {
    pub fn new(connector: C, allowlist: IpAllowlist, paths: TransportPaths) -> Self {
        Self {
            connector,
            allowlist,
            paths,
            session: Mutex::new(None),
        }
    }

    async fn session(&self) -> Result<MutexGuard<'_, Option<C::Session>>> {
        let mut guard = self.session.lock().await;

        let healthy = match guard.as_mut() {
            Some(session) => match session.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Transport session failed health check, reconnecting");
                    false
                }
            },
            None => false,
        };

        if !healthy {
            *guard = None;
            let session = self.connector.connect().await?;
            match session.peer_addr() {
                Some(addr) => self.allowlist.check(&addr)?,
                None if !self.allowlist.is_empty() => {
                    return Err(AchError::IpNotAllowed("unknown peer address".to_string()));
                }
                None => {}
            }
            info!(peer = ?session.peer_addr(), "Transport session established");
            *guard = Some(session);
        }

        Ok(guard)
    }

    async fn fetch_dir(&self, dir: &str) -> Result<Vec<RemoteFile>> {
        let mut guard = self.session().await?;
        let session = active(&mut guard)?;

        let mut files = Vec::new();
        for name in session.list(dir).await? {
            let remote = path::safe_join(dir, &name)?;
            let contents = session.read(&remote).await?;
            debug!(path = %remote, bytes = contents.len(), "Fetched remote file");
            files.push(RemoteFile {
                path: remote,
                name,
                contents,
            });
        }
        Ok(files)
    }
}

fn active<S>(guard: &mut Option<S>) -> Result<&mut S> {
    guard
        .as_mut()
        .ok_or_else(|| AchError::Transport("no active session".to_string()))
}

#[async_trait]
impl<C: Connector> Transport for AgentTransport<C> {
    async fn get_inbound_files(&self) -> Result<Vec<RemoteFile>> {
        self.fetch_dir(&self.paths.inbound).await
    }

    async fn get_return_files(&self) -> Result<Vec<RemoteFile>> {
        self.fetch_dir(&self.paths.returned).await
    }

    async fn upload_file(&self, name: &str, contents: &[u8]) -> Result<()> {
        let remote = path::safe_join(&self.paths.outbound, name)?;
        let mut guard = self.session().await?;
        active(&mut guard)?.write(&remote, contents).await?;
        info!(path = %remote, bytes = contents.len(), "Uploaded file");
        Ok(())
    }

    /// Removes a file previously fetched from the inbound or return directory.
    async fn delete(&self, remote: &str) -> Result<()> {
        path::validate(remote)?;
        let fetched = [&self.paths.inbound, &self.paths.returned].iter().any(|dir| {
            remote
                .strip_prefix(dir.as_str())
                .map_or(false, |rest| rest.starts_with('/'))
        });
        if !fetched {
            return Err(AchError::PathEscape(remote.to_string()));
        }
        let mut guard = self.session().await?;
        active(&mut guard)?.remove(remote).await
    }

    fn inbound_path(&self) -> &str {
        &self.paths.inbound
    }

    fn outbound_path(&self) -> &str {
        &self.paths.outbound
    }

    fn return_path(&self) -> &str {
        &self.paths.returned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Default)]
    struct Shared {
        connects: AtomicUsize,
        healthy: StdMutex<bool>,
        files: StdMutex<HashMap<String, Vec<u8>>>,
    }

    struct FakeConnector {
        addr: Option<IpAddr>,
        shared: Arc<Shared>,
    }

    struct FakeSession {
        addr: Option<IpAddr>,
        shared: Arc<Shared>,
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        fn peer_addr(&self) -> Option<IpAddr> {
            self.addr
        }

        async fn ping(&mut self) -> Result<()> {
            if *self.shared.healthy.lock().unwrap() {
                Ok(())
            } else {
                Err(AchError::Transport("connection reset".to_string()))
            }
        }

        async fn list(&mut self, dir: &str) -> Result<Vec<String>> {
            let prefix = format!("{}/", dir);
            let mut names: Vec<String> = self
                .shared
                .files
                .lock()
                .unwrap()
                .keys()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect();
            names.sort();
            Ok(names)
        }

        async fn read(&mut self, path: &str) -> Result<Vec<u8>> {
            self.shared
                .files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| AchError::NotFound(path.to_string()))
        }

        async fn write(&mut self, path: &str, contents: &[u8]) -> Result<()> {
            self.shared
                .files
                .lock()
                .unwrap()
                .insert(path.to_string(), contents.to_vec());
            Ok(())
        }

        async fn remove(&mut self, path: &str) -> Result<()> {
            self.shared.files.lock().unwrap().remove(path);
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Session = FakeSession;

        async fn connect(&self) -> Result<FakeSession> {
            self.shared.connects.fetch_add(1, Ordering::SeqCst);
            *self.shared.healthy.lock().unwrap() = true;
            Ok(FakeSession {
                addr: self.addr,
                shared: self.shared.clone(),
            })
        }
    }

    fn fake_transport(
        addr: &str,
        allowed: &[&str],
    ) -> (AgentTransport<FakeConnector>, Arc<Shared>) {
        transport_with_peer(Some(addr.parse().unwrap()), allowed)
    }

    fn transport_with_peer(
        addr: Option<IpAddr>,
        allowed: &[&str],
    ) -> (AgentTransport<FakeConnector>, Arc<Shared>) {
        let shared = Arc::new(Shared::default());
        let connector = FakeConnector {
            addr,
            shared: shared.clone(),
        };
        let allowlist =
            IpAllowlist::parse(&allowed.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap();
        let paths = TransportPaths::new("inbound", "outbound", "returned").unwrap();
        (AgentTransport::new(connector, allowlist, paths), shared)
    }

    #[tokio::test]
    async fn test_connects_lazily_and_reuses_session() {
        let (transport, shared) = fake_transport("10.0.0.5", &["10.0.0.0/24"]);
        assert_eq!(shared.connects.load(Ordering::SeqCst), 0);

        transport.upload_file("a.ach", b"abc").await.unwrap();
        transport.upload_file("b.ach", b"def").await.unwrap();
        assert_eq!(shared.connects.load(Ordering::SeqCst), 1);
        assert!(shared.files.lock().unwrap().contains_key("outbound/a.ach"));

        *shared.healthy.lock().unwrap() = false;
        transport.get_inbound_files().await.unwrap();
        assert_eq!(shared.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_and_delete() {
        let (transport, shared) = fake_transport("10.0.0.5", &[]);
        shared
            .files
            .lock()
            .unwrap()
            .insert("returned/r1.ach".to_string(), b"101".to_vec());

        let files = transport.get_return_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "returned/r1.ach");
        assert_eq!(files[0].name, "r1.ach");

        transport.delete(&files[0].path).await.unwrap();
        assert!(transport.get_return_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_disallowed_peer_and_escapes() {
        let (transport, _) = fake_transport("192.168.1.1", &["10.0.0.0/8"]);
        assert!(matches!(
            transport.upload_file("a.ach", b"x").await,
            Err(AchError::IpNotAllowed(_))
        ));

        let (transport, _) = fake_transport("10.0.0.1", &[]);
        assert!(matches!(
            transport.upload_file("../a.ach", b"x").await,
            Err(AchError::PathEscape(_))
        ));
        assert!(matches!(
            transport.delete("/etc/passwd").await,
            Err(AchError::PathEscape(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_peer_needs_empty_allowlist() {
        let (transport, shared) = transport_with_peer(None, &["10.0.0.0/8"]);
        assert!(matches!(
            transport.upload_file("a.ach", b"x").await,
            Err(AchError::IpNotAllowed(_))
        ));
        assert!(shared.files.lock().unwrap().is_empty());

        let (transport, shared) = transport_with_peer(None, &[]);
        transport.upload_file("a.ach", b"x").await.unwrap();
        assert!(shared.files.lock().unwrap().contains_key("outbound/a.ach"));
    }

    #[tokio::test]
    async fn test_delete_only_inside_fetched_dirs() {
        let (transport, shared) = fake_transport("10.0.0.5", &[]);
        for path in ["outbound/a.ach", "inbound/i.ach", "returned/r.ach", "returnedx/r.ach"] {
            shared
                .files
                .lock()
                .unwrap()
                .insert(path.to_string(), b"101".to_vec());
        }

        for path in ["outbound/a.ach", "returnedx/r.ach", "config.toml", "inbound"] {
            assert!(
                matches!(transport.delete(path).await, Err(AchError::PathEscape(_))),
                "{:?} should be refused",
                path
            );
        }
        transport.delete("inbound/i.ach").await.unwrap();
        transport.delete("returned/r.ach").await.unwrap();

        let left = shared.files.lock().unwrap();
        assert!(left.contains_key("outbound/a.ach"));
        assert!(left.contains_key("returnedx/r.ach"));
        assert_eq!(left.len(), 2);
    }
}
