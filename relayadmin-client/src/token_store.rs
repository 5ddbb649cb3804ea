use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use tracing::{debug, warn};

/// The session file only ever holds a token and the server that issued it.
pub const MAX_STORE_BYTES: u64 = 64 * 1024;

/// Key the auth token is persisted under.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Key of the API base the persisted token was issued by.
pub const SERVER_URL_KEY: &str = "serverUrl";

/// Persistence behind the [`TokenStore`].
///
/// Saves run on async request paths: one small local write, no sleep or retry.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StoreLoadError>;

    /// `None` removes the key.
    fn save(&self, key: &str, value: Option<&str>) -> Result<(), StoreSaveError> {
        self.save_all(&[(key, value)])
    }

    /// Applies every change in one write.
    fn save_all(&self, changes: &[(&str, Option<&str>)]) -> Result<(), StoreSaveError>;
}

#[derive(Debug)]
pub enum StoreLoadError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for StoreLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLoadError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            StoreLoadError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            StoreLoadError::Read(e) => write!(f, "read failed: {e}"),
            StoreLoadError::Parse(e) => write!(f, "parse failed: {e}"),
        }
    }
}

impl std::error::Error for StoreLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreLoadError::Metadata(e) => Some(e),
            StoreLoadError::Read(e) => Some(e),
            StoreLoadError::Parse(e) => Some(e),
            StoreLoadError::TooLarge { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum StoreSaveError {
    Serialize(serde_json::Error),
    CreateDir(io::Error),
    WriteTmp(io::Error),
    Permissions(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for StoreSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreSaveError::Serialize(e) => write!(f, "serialize failed: {e}"),
            StoreSaveError::CreateDir(e) => write!(f, "create dir failed: {e}"),
            StoreSaveError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            StoreSaveError::Permissions(e) => write!(f, "set permissions failed: {e}"),
            StoreSaveError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for StoreSaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreSaveError::Serialize(e) => Some(e),
            StoreSaveError::CreateDir(e) => Some(e),
            StoreSaveError::WriteTmp(e) => Some(e),
            StoreSaveError::Permissions(e) => Some(e),
            StoreSaveError::Rename(e) => Some(e),
        }
    }
}

pub type Entries = BTreeMap<String, String>;

/// Flat JSON object on disk, rewritten atomically on every save.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Entries, StoreLoadError> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }
        load_entries_from_path(&self.path)
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreLoadError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn save_all(&self, changes: &[(&str, Option<&str>)]) -> Result<(), StoreSaveError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), "replacing unreadable store: {err}");
                Entries::new()
            }
        };
        apply_changes(&mut entries, changes);

        save_entries_to_path(&self.path, &entries)
    }
}

fn apply_changes(entries: &mut Entries, changes: &[(&str, Option<&str>)]) {
    for (key, value) in changes {
        match value {
            Some(value) => entries.insert((*key).to_owned(), (*value).to_owned()),
            None => entries.remove(*key),
        };
    }
}

pub fn load_entries_from_path(path: &Path) -> Result<Entries, StoreLoadError> {
    let meta = fs::metadata(path).map_err(StoreLoadError::Metadata)?;
    if meta.len() > MAX_STORE_BYTES {
        return Err(StoreLoadError::TooLarge {
            size: meta.len(),
            max: MAX_STORE_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(StoreLoadError::Read)?;
    serde_json::from_str::<Entries>(&data).map_err(StoreLoadError::Parse)
}

pub fn save_entries_to_path(path: &Path, entries: &Entries) -> Result<(), StoreSaveError> {
    let payload = serde_json::to_string_pretty(entries).map_err(StoreSaveError::Serialize)?;
    write_file_atomic(path, payload.as_bytes())
}

/// Writes `payload` to a sibling tmp file (owner-only on unix) and renames it
/// over `path`, creating the parent directory first.
pub fn write_file_atomic(path: &Path, payload: &[u8]) -> Result<(), StoreSaveError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(StoreSaveError::CreateDir)?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload).map_err(StoreSaveError::WriteTmp)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
            .map_err(StoreSaveError::Permissions)?;
    }

    if path.exists() {
        let _ = fs::remove_file(path);
    }

    fs::rename(&tmp, path).map_err(StoreSaveError::Rename)?;
    debug!(path = %path.display(), bytes = payload.len(), "file saved");
    Ok(())
}

/// In-process store for tests and sessions that should not outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreLoadError> {
        Ok(self.get(key))
    }

    fn save_all(&self, changes: &[(&str, Option<&str>)]) -> Result<(), StoreSaveError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        apply_changes(&mut entries, changes);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<String>,
    /// API base this store is bound to; persisted next to the token.
    server: Option<String>,
}

/// Single source of truth for "am I logged in".
///
/// The in-memory value is authoritative; persistence failures are logged and
/// never roll it back. Memory and persistence change under the same lock.
pub struct TokenStore {
    state: RwLock<TokenState>,
    persistence: Box<dyn KeyValueStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(persistence: impl KeyValueStore + 'static) -> Self {
        Self {
            state: RwLock::new(TokenState::default()),
            persistence: Box::new(persistence),
        }
    }

    /// Loads the persisted token into memory. Unreadable state starts the
    /// session logged out.
    pub fn restore(&self) -> Option<String> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.token = self.load_token();
        debug!(authenticated = state.token.is_some(), "auth token restored");
        state.token.clone()
    }

    /// Binds the store to `server` and restores the token only when it was
    /// issued by that same server. Later saves record `server` with the token.
    pub fn restore_for(&self, server: &str) -> Option<String> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.server = Some(server.to_owned());
        state.token = None;

        let Some(token) = self.load_token() else {
            debug!(server, authenticated = false, "auth token restored");
            return None;
        };
        let issuer = match self.persistence.load(SERVER_URL_KEY) {
            Ok(issuer) => issuer,
            Err(err) => {
                warn!("failed to read token issuer: {err}");
                None
            }
        };
        if issuer.as_deref() != Some(server) {
            warn!(
                server,
                issuer = issuer.as_deref().unwrap_or("unknown"),
                "saved token belongs to another server, starting logged out"
            );
            return None;
        }

        debug!(server, authenticated = true, "auth token restored");
        state.token = Some(token);
        state.token.clone()
    }

    pub fn auth_token(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .token
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .token
            .is_some()
    }

    pub fn set_auth_token(&self, token: Option<String>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let token = token.filter(|t| !t.is_empty());
        // Already logged out: leave any other server's token on disk.
        if token.is_none() && state.token.is_none() {
            return;
        }
        state.token = token;

        let token = state.token.as_deref();
        let issuer = token.and(state.server.as_deref());
        if let Err(err) = self
            .persistence
            .save_all(&[(AUTH_TOKEN_KEY, token), (SERVER_URL_KEY, issuer)])
        {
            warn!("failed to persist auth token: {err}");
        }
    }

    fn load_token(&self) -> Option<String> {
        match self.persistence.load(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(err) => {
                warn!("failed to restore auth token: {err}");
                None
            }
        }
    }
}
