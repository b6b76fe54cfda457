pub mod agent;
pub mod allowlist;
pub mod mailbox;
pub mod path;

pub use agent::{AgentTransport, Connector, RemoteSession, TransportPaths};
pub use allowlist::IpAllowlist;
pub use mailbox::DirectoryConnector;

use async_trait::async_trait;

use crate::error::Result;

/// A file fetched from the ODFI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Path relative to the transport root, usable with [`Transport::delete`].
    pub path: String,
    pub name: String,
    pub contents: Vec<u8>,
}

/// File exchange with the ODFI.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_inbound_files(&self) -> Result<Vec<RemoteFile>>;

    async fn get_return_files(&self) -> Result<Vec<RemoteFile>>;

    async fn upload_file(&self, name: &str, contents: &[u8]) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    fn inbound_path(&self) -> &str;

    fn outbound_path(&self) -> &str;

    fn return_path(&self) -> &str;
}
