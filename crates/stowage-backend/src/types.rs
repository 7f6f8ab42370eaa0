use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Filesystem,
    CloudSync,
    MeshPeer,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [Self::Filesystem, Self::CloudSync, Self::MeshPeer];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::CloudSync => "cloud-sync",
            Self::MeshPeer => "mesh-peer",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "filesystem" => Some(Self::Filesystem),
            "cloud-sync" => Some(Self::CloudSync),
            "mesh-peer" => Some(Self::MeshPeer),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    pub display_name: &'static str,
    pub description: &'static str,
    pub required_tools: &'static [&'static str],
}

impl BackendDescriptor {
    #[must_use]
    pub const fn id(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub repository_path: String,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

impl BackendConfig {
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            repository_path: String::new(),
            credentials: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.repository_path = path.into();
        self
    }

    #[must_use]
    pub fn with_credential(mut self, key: &str, value: impl Into<String>) -> Self {
        self.credentials.insert(key.to_string(), value.into());
        self
    }

    /// Credential value, treating blank entries as absent.
    #[must_use]
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn require(&mut self, condition: bool, error: impl Into<String>) {
        if !condition {
            self.push(error);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailscalePeer {
    pub hostname: String,
    pub ip: String,
    pub online: bool,
    pub os: String,
    pub latency_ms: Option<f64>,
    pub free_space_gb: Option<u64>,
}

impl TailscalePeer {
    #[must_use]
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>, online: bool) -> Self {
        Self {
            hostname: hostname.into(),
            ip: ip.into(),
            online,
            os: String::new(),
            latency_ms: None,
            free_space_gb: None,
        }
    }
}
