use std::fmt;
use std::path::Path;

const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Debian,
    Arch,
    Fedora,
    Unsupported,
}

impl OsFamily {
    fn from_id(id: &str) -> Option<Self> {
        match id {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" | "pop" => Some(Self::Debian),
            "arch" | "manjaro" | "endeavouros" => Some(Self::Arch),
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => Some(Self::Fedora),
            _ => None,
        }
    }

    #[must_use]
    pub const fn package_manager(self) -> PackageManager {
        match self {
            Self::Debian => PackageManager::Apt,
            Self::Arch => PackageManager::Pacman,
            Self::Fedora => PackageManager::Dnf,
            Self::Unsupported => PackageManager::None,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debian => "Debian family",
            Self::Arch => "Arch Linux",
            Self::Fedora => "Fedora family",
            Self::Unsupported => "unsupported",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Pacman,
    Dnf,
    None,
}

impl PackageManager {
    #[must_use]
    pub const fn binary(self) -> Option<&'static str> {
        match self {
            Self::Apt => Some("apt-get"),
            Self::Pacman => Some("pacman"),
            Self::Dnf => Some("dnf"),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInfo {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_id: Option<String>,
    pub version_codename: Option<String>,
    pub pretty_name: Option<String>,
    pub family: OsFamily,
}

impl OsInfo {
    /// Probe the running host. Hosts without a readable `os-release` file are
    /// reported as [`OsFamily::Unsupported`].
    #[must_use]
    pub fn detect() -> Self {
        for path in OS_RELEASE_PATHS {
            if let Some(info) = Self::read(Path::new(path)) {
                log::debug!(
                    "Detected host OS: id={}, family={}, codename={:?}",
                    info.id,
                    info.family,
                    info.version_codename
                );
                return info;
            }
        }

        log::warn!("No os-release file found, treating host as unsupported");
        Self::unknown()
    }

    fn read(path: &Path) -> Option<Self> {
        std::fs::read_to_string(path)
            .ok()
            .map(|content| Self::parse(&content))
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self {
            id: "unknown".to_string(),
            id_like: Vec::new(),
            version_id: None,
            version_codename: None,
            pretty_name: None,
            family: OsFamily::Unsupported,
        }
    }

    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut id = None;
        let mut id_like = Vec::new();
        let mut version_id = None;
        let mut version_codename = None;
        let mut ubuntu_codename = None;
        let mut pretty_name = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value);

            match key {
                "ID" => id = Some(value.to_ascii_lowercase()),
                "ID_LIKE" => {
                    id_like = value
                        .split_whitespace()
                        .map(str::to_ascii_lowercase)
                        .collect();
                }
                "VERSION_ID" if !value.is_empty() => version_id = Some(value.to_string()),
                "VERSION_CODENAME" if !value.is_empty() => {
                    version_codename = Some(value.to_string());
                }
                "UBUNTU_CODENAME" if !value.is_empty() => {
                    ubuntu_codename = Some(value.to_string());
                }
                "PRETTY_NAME" => pretty_name = Some(value.to_string()),
                _ => {}
            }
        }

        let id = id.unwrap_or_else(|| "linux".to_string());
        let family = std::iter::once(id.as_str())
            .chain(id_like.iter().map(String::as_str))
            .find_map(OsFamily::from_id)
            .unwrap_or(OsFamily::Unsupported);

        Self {
            id,
            id_like,
            version_id,
            version_codename: version_codename.or(ubuntu_codename),
            pretty_name,
            family,
        }
    }

    /// Leading number of `VERSION_ID`, e.g. `41` for Fedora 41 or `22` for
    /// Ubuntu 22.04.
    #[must_use]
    pub fn major_version(&self) -> Option<u32> {
        self.version_id
            .as_deref()?
            .split('.')
            .next()?
            .parse()
            .ok()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.pretty_name.as_deref().unwrap_or(&self.id)
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}
