//! SSH + SFTP transport built on `ssh2`.
//!
//! One TCP connection, one SSH session and one SFTP channel per
//! [`SftpRemote`]. The SFTP channel is shared by every concurrent discovery
//! and download task behind a mutex: the lock covers the request that opens,
//! lists or stats a path, while file bodies stream outside it.

use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ssh2::{HashType, Session, Sftp};

use super::{RemoteEntry, RemoteError, RemoteFs, RemoteStat, mtime_to_utc};
use crate::config::RemoteConfig;

/// A connected SFTP client.
pub struct SftpRemote {
    // Kept alive for the lifetime of the SFTP channel.
    _session: Session,
    sftp: Mutex<Sftp>,
}

impl SftpRemote {
    /// Connect and authenticate using `config`.
    pub fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let start = Instant::now();
        let timeout = config.connect_timeout();
        let address = config.address.clone();

        let socket = resolve(&address)?;
        let tcp = TcpStream::connect_timeout(&socket, timeout).map_err(|e| {
            RemoteError::Connect {
                address: address.clone(),
                message: e.to_string(),
            }
        })?;

        let handshake_err = |e: ssh2::Error| RemoteError::Handshake {
            address: address.clone(),
            message: e.to_string(),
        };

        let mut session = Session::new().map_err(handshake_err)?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout_millis(timeout));
        session.handshake().map_err(handshake_err)?;

        if let Some(expected) = config.host_fingerprint.as_deref() {
            verify_host_key(&session, &address, expected)?;
        }

        authenticate(&session, config)?;

        let sftp = session.sftp().map_err(handshake_err)?;

        tracing::info!(
            address = %address,
            user = %config.username,
            duration_ms = start.elapsed().as_millis() as u64,
            "sftp session established"
        );

        Ok(Self {
            _session: session,
            sftp: Mutex::new(sftp),
        })
    }
}

impl RemoteFs for SftpRemote {
    fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        tracing::debug!(dir, "sftp readdir");
        let listing = self
            .sftp
            .lock()
            .readdir(Path::new(dir))
            .map_err(|e| RemoteError::List {
                path: dir.to_string(),
                message: e.to_string(),
            })?;

        let entries = listing
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    name,
                    is_dir: stat.is_dir(),
                    modified_at: mtime_to_utc(stat.mtime),
                    size: stat.size,
                })
            })
            .collect();
        Ok(entries)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, RemoteError> {
        tracing::debug!(path, "sftp open");
        let file = self
            .sftp
            .lock()
            .open(Path::new(path))
            .map_err(|e| RemoteError::Open {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(file))
    }

    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteError> {
        tracing::debug!(path, "sftp stat");
        let stat = self
            .sftp
            .lock()
            .stat(Path::new(path))
            .map_err(|e| RemoteError::Stat {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(RemoteStat {
            modified_at: mtime_to_utc(stat.mtime),
            size: stat.size,
        })
    }
}

fn resolve(address: &str) -> Result<SocketAddr, RemoteError> {
    let connect_err = |message: String| RemoteError::Connect {
        address: address.to_string(),
        message,
    };
    address
        .to_socket_addrs()
        .map_err(|e| connect_err(e.to_string()))?
        .next()
        .ok_or_else(|| connect_err("address resolved to nothing".to_string()))
}

fn authenticate(session: &Session, config: &RemoteConfig) -> Result<(), RemoteError> {
    let auth_err = |message: String| RemoteError::Auth {
        username: config.username.clone(),
        message,
    };

    if let Some(key) = config.private_key.as_deref() {
        session
            .userauth_pubkey_file(&config.username, None, key, config.password.as_deref())
            .map_err(|e| auth_err(e.to_string()))?;
    } else if let Some(password) = config.password.as_deref() {
        session
            .userauth_password(&config.username, password)
            .map_err(|e| auth_err(e.to_string()))?;
    } else {
        return Err(auth_err("no password or private key configured".to_string()));
    }

    if !session.authenticated() {
        return Err(auth_err("server rejected credentials".to_string()));
    }
    Ok(())
}

fn verify_host_key(session: &Session, address: &str, expected: &str) -> Result<(), RemoteError> {
    let actual = session
        .host_key_hash(HashType::Sha256)
        .map(hex::encode)
        .unwrap_or_default();
    if fingerprints_match(expected, &actual) {
        Ok(())
    } else {
        Err(RemoteError::HostKeyMismatch {
            address: address.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Compare hex fingerprints, ignoring case and `:` separators.
fn fingerprints_match(expected: &str, actual: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| *c != ':')
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>()
    };
    !actual.is_empty() && normalize(expected) == normalize(actual)
}

fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}
