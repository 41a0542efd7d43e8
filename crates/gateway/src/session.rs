use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use snafu::{ResultExt, Snafu};

pub const SESSION_DIRECTORY_NAME: &str = "ragchat";
pub const TOKEN_FILE_NAME: &str = "session.token";

/// On-disk home of the bearer token between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SESSION_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".ragchat"))
            .join(TOKEN_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<String>, SessionError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::ReadToken {
                    stage: "token-file-read",
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let token = contents.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn write(&self, token: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "token-file-create-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let temp_path = self.path.with_extension("token.tmp");
        write_private(&temp_path, token).context(WriteTokenSnafu {
            stage: "token-file-write-temporary",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(WriteTokenSnafu {
            stage: "token-file-replace",
            path: self.path.clone(),
        })
    }

    pub fn remove(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::RemoveToken {
                stage: "token-file-remove",
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Writes `contents` readable by the owner only.
#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write as _;
    use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // A leftover file keeps its old mode on open.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("failed to create session directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read session token at {path:?} on `{stage}`: {source}"))]
    ReadToken {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to write session token at {path:?} on `{stage}`: {source}"))]
    WriteToken {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to remove session token at {path:?} on `{stage}`: {source}"))]
    RemoveToken {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Process-wide credential cache shared by the gateway and the application.
///
/// The in-memory token is authoritative. Mirroring to the token file is best effort:
/// a failed write is logged and otherwise ignored.
pub struct Session {
    token: ArcSwapOption<String>,
    persistence: Option<TokenFile>,
}

impl Session {
    pub fn in_memory() -> Self {
        Self {
            token: ArcSwapOption::empty(),
            persistence: None,
        }
    }

    pub fn load(persistence: TokenFile) -> Self {
        let token = match persistence.read() {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(error = %error, "ignoring unreadable session token");
                None
            }
        };

        tracing::debug!(
            path = %persistence.path().display(),
            authenticated = token.is_some(),
            "loaded session"
        );

        Self {
            token: ArcSwapOption::new(token.map(Arc::new)),
            persistence: Some(persistence),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            self.clear();
            return;
        }

        if let Some(persistence) = &self.persistence
            && let Err(error) = persistence.write(&token)
        {
            tracing::warn!(error = %error, "failed to persist session token");
        }

        self.token.store(Some(Arc::new(token)));
    }

    pub fn clear(&self) {
        if let Some(persistence) = &self.persistence
            && let Err(error) = persistence.remove()
        {
            tracing::warn!(error = %error, "failed to remove persisted session token");
        }

        self.token.store(None);
    }

    pub fn get(&self) -> Option<String> {
        self.token.load().as_deref().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.load().is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("persistence", &self.persistence)
            .finish()
    }
}
