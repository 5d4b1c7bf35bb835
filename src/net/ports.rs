//! Port occupancy inspection.
//!
//! # Responsibilities
//! - Decide whether a `"port:protocol"` token is bound by another process
//! - Resolve the owning process name and PID when possible
//!
//! # Design Decisions
//! - Reads `/proc/net/*` and `/proc/<pid>/fd` directly (Linux)
//! - Owner lookup is best effort: a socket without a resolvable owner is
//!   still reported as occupied

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("invalid port token '{0}', expected \"port:protocol\"")]
    InvalidToken(String),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A process owning a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
}

/// A bound socket matching a queried token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupiedSocket {
    pub port: u16,
    pub protocol: String,
    pub inode: u64,
    /// Owning process, when it could be resolved.
    pub owner: Option<ProcessInfo>,
}

impl OccupiedSocket {
    pub fn process(&self) -> Option<&ProcessInfo> {
        self.owner.as_ref()
    }
}

/// Answers whether ports are already bound.
pub trait PortInspector: Send + Sync {
    /// Check every `"port:protocol"` token. Returns whether any is occupied
    /// together with the matching sockets.
    fn is_port_occupied(&self, tokens: &[String]) -> Result<(bool, Vec<OccupiedSocket>), PortError>;
}

/// [`PortInspector`] backed by the proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcNetInspector {
    root: PathBuf,
}

impl Default for ProcNetInspector {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcNetInspector {
    /// Inspect an alternative proc root (used by tests).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tables(protocol: &str) -> Option<&'static [&'static str]> {
        match protocol {
            "tcp" => Some(&["net/tcp", "net/tcp6"]),
            "udp" => Some(&["net/udp", "net/udp6"]),
            _ => None,
        }
    }

    fn read_optional(path: &Path) -> Result<Option<String>, PortError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PortError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Find the process holding `socket:[inode]` among its file descriptors.
    fn owner_of(&self, inode: u64) -> Option<ProcessInfo> {
        let needle = format!("socket:[{}]", inode);
        let entries = fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            let holds = fds.flatten().any(|fd| {
                fs::read_link(fd.path())
                    .map(|target| target.to_string_lossy() == needle)
                    .unwrap_or(false)
            });
            if holds {
                let name = fs::read_to_string(entry.path().join("comm"))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                return Some(ProcessInfo { name, pid });
            }
        }
        None
    }
}

impl PortInspector for ProcNetInspector {
    fn is_port_occupied(&self, tokens: &[String]) -> Result<(bool, Vec<OccupiedSocket>), PortError> {
        let mut sockets = Vec::new();
        for token in tokens {
            let (port, protocol) = parse_token(token)?;
            let tables =
                Self::tables(&protocol).ok_or_else(|| PortError::InvalidToken(token.clone()))?;
            let listen_only = protocol == "tcp";

            for table in tables {
                let Some(content) = Self::read_optional(&self.root.join(table))? else {
                    continue;
                };
                for inode in bound_inodes(&content, port, listen_only) {
                    sockets.push(OccupiedSocket {
                        port,
                        protocol: protocol.clone(),
                        inode,
                        owner: self.owner_of(inode),
                    });
                }
            }
        }
        Ok((!sockets.is_empty(), sockets))
    }
}

/// Split `"2017:tcp"` into port and lowercase protocol.
pub fn parse_token(token: &str) -> Result<(u16, String), PortError> {
    let (port, protocol) = token
        .split_once(':')
        .ok_or_else(|| PortError::InvalidToken(token.to_string()))?;
    let port = port
        .parse()
        .map_err(|_| PortError::InvalidToken(token.to_string()))?;
    Ok((port, protocol.to_ascii_lowercase()))
}

/// Inodes of sockets in a `/proc/net/*` table bound to `port`.
///
/// With `listen_only`, only sockets in the LISTEN state (`0A`) count.
pub fn bound_inodes(table: &str, port: u16, listen_only: bool) -> Vec<u64> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let local_port = fields[1]
                .rsplit_once(':')
                .and_then(|(_, p)| u16::from_str_radix(p, 16).ok())?;
            if local_port != port || (listen_only && fields[3] != "0A") {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}
