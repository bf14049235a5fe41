//! Configuration store: the persisted document plus total, defaulted lookups.

mod document;
pub mod keys;
mod storage;

use alloc::{string::String, sync::Arc};
use core::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use embassy_sync::blocking_mutex::{Mutex as BlockingMutex, raw::RawMutex};
use log::{debug, error, info};

pub use document::{ConfigAccessor, ConfigDocument};
#[cfg(any(test, feature = "std"))]
pub use storage::FileStorage;
pub use storage::{
    CONFIG_PATH, ConfigStorage, ConfigWriter, MAX_CONFIG_BYTES, MemoryStorage, MemoryWriter,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError<E> {
    Read(E),
    Open(E),
    Write(E),
    TooLarge { len: usize },
    Parse { line: usize, column: usize },
    NotAnObject,
}

impl<E: fmt::Debug> fmt::Display for ConfigError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(err) => write!(f, "failed to read {}: {:?}", CONFIG_PATH, err),
            Self::Open(err) => write!(f, "failed to open {}: {:?}", CONFIG_PATH, err),
            Self::Write(err) => write!(f, "failed to write {}: {:?}", CONFIG_PATH, err),
            Self::TooLarge { len } => write!(
                f,
                "{} is {} bytes, limit is {}",
                CONFIG_PATH, len, MAX_CONFIG_BYTES
            ),
            Self::Parse { line, column } => {
                write!(f, "error parsing config file at {}:{}", line, column)
            }
            Self::NotAnObject => f.write_str("config file is not a JSON object"),
        }
    }
}

/// Result of [`ConfigStore::load`]; never an error for the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    /// A new document was parsed and installed.
    Loaded,
    /// No file yet; provisioning is expected to deliver one.
    Absent,
    /// The file could not be read or parsed. An unreadable file leaves the
    /// previous document in place; unparseable contents clear it.
    Invalid,
}

/// Owner of the in-memory configuration document.
///
/// Readers get snapshots: a reconfiguration may swap the document between two
/// calls, never during one.
pub struct ConfigStore<M: RawMutex> {
    document: BlockingMutex<M, RefCell<Option<Arc<ConfigDocument>>>>,
    valid: AtomicBool,
}

impl<M: RawMutex> ConfigStore<M> {
    pub const fn new() -> Self {
        Self {
            document: BlockingMutex::new(RefCell::new(None)),
            valid: AtomicBool::new(false),
        }
    }

    /// Whether the installed document came from a file that parsed.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Option<Arc<ConfigDocument>> {
        self.document.lock(|cell| cell.borrow().clone())
    }

    pub fn load<S: ConfigStorage>(&self, storage: &mut S) -> LoadOutcome {
        match read_document(storage) {
            Ok(Some(document)) => {
                info!("parsed config file: {}", document);
                self.install(document);
                LoadOutcome::Loaded
            }
            Ok(None) => {
                info!("{} does not exist, waiting for provisioning", CONFIG_PATH);
                LoadOutcome::Absent
            }
            Err(err @ ConfigError::Read(_)) => {
                error!("{}", err);
                LoadOutcome::Invalid
            }
            Err(err) => {
                error!("{}", err);
                self.invalidate();
                LoadOutcome::Invalid
            }
        }
    }

    /// Overwrites the persisted file with `text` and reloads it.
    ///
    /// The text is written verbatim; nothing is merged with the previous
    /// document. If the file cannot be opened there is nothing to close.
    pub fn write<S: ConfigStorage>(
        &self,
        storage: &mut S,
        text: &str,
    ) -> Result<LoadOutcome, ConfigError<S::Error>> {
        let mut writer = storage.open_truncate().map_err(ConfigError::Open)?;
        let written = writer.write_all(text.as_bytes());
        let closed = writer.close();
        written.map_err(ConfigError::Write)?;
        closed.map_err(ConfigError::Write)?;

        info!("{} updated ({} bytes)", CONFIG_PATH, text.len());
        Ok(self.load(storage))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let value = self.with_accessor(|view| view.get_bool(key, default));
        debug!("config_get_bool({}): {}", key, value);
        value
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        let value = self.with_accessor(|view| view.get_string(key, default));
        debug!("config_get_string({}): {}", key, value);
        value
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        let value = self.with_accessor(|view| view.get_int(key, default));
        debug!("config_get_int({}): {}", key, value);
        value
    }

    /// Non-negative millisecond setting; anything else resolves to `default`.
    pub fn get_millis(&self, key: &str, default: u32) -> u32 {
        let fallback = i32::try_from(default).unwrap_or(i32::MAX);
        u32::try_from(self.get_int(key, fallback)).unwrap_or(default)
    }

    fn with_accessor<R>(&self, f: impl FnOnce(ConfigAccessor<'_>) -> R) -> R {
        let snapshot = self.snapshot();
        f(ConfigAccessor::new(snapshot.as_deref()))
    }

    fn install(&self, document: ConfigDocument) {
        let next = Arc::new(document);
        self.document.lock(|cell| {
            cell.replace(Some(next));
        });
        self.valid.store(true, Ordering::Release);
    }

    /// Drops the document so every getter falls back to its default.
    fn invalidate(&self) {
        self.document.lock(|cell| {
            cell.replace(None);
        });
        self.valid.store(false, Ordering::Release);
    }
}

impl<M: RawMutex> Default for ConfigStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn read_document<S: ConfigStorage>(
    storage: &mut S,
) -> Result<Option<ConfigDocument>, ConfigError<S::Error>> {
    let Some(bytes) = storage.read().map_err(ConfigError::Read)? else {
        return Ok(None);
    };
    if bytes.len() > MAX_CONFIG_BYTES {
        return Err(ConfigError::TooLarge { len: bytes.len() });
    }
    debug!("config file size: {}", bytes.len());
    ConfigDocument::parse(&bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::*;

    type Store = ConfigStore<CriticalSectionRawMutex>;

    struct BrokenStorage;

    struct BrokenWriter;

    impl ConfigWriter for BrokenWriter {
        type Error = &'static str;

        fn write_all(&mut self, _bytes: &[u8]) -> Result<(), Self::Error> {
            Err("write failed")
        }

        fn close(self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl ConfigStorage for BrokenStorage {
        type Error = &'static str;
        type Writer<'a> = BrokenWriter;

        fn read(&mut self) -> Result<Option<alloc::vec::Vec<u8>>, Self::Error> {
            Err("sector read failed")
        }

        fn open_truncate(&mut self) -> Result<Self::Writer<'_>, Self::Error> {
            Err("partition is read-only")
        }
    }

    /// Opens fine, then rejects every write.
    struct FailingWrites;

    impl ConfigStorage for FailingWrites {
        type Error = &'static str;
        type Writer<'a> = BrokenWriter;

        fn read(&mut self) -> Result<Option<alloc::vec::Vec<u8>>, Self::Error> {
            Ok(None)
        }

        fn open_truncate(&mut self) -> Result<Self::Writer<'_>, Self::Error> {
            Ok(BrokenWriter)
        }
    }

    #[test]
    fn missing_file_leaves_document_absent() {
        let store = Store::new();
        let mut storage = MemoryStorage::new();

        assert_eq!(store.load(&mut storage), LoadOutcome::Absent);
        assert!(!store.is_valid());
        assert!(store.snapshot().is_none());
        assert_eq!(store.get_int("display_timeout", 15000), 15000);
    }

    #[test]
    fn persisted_value_overrides_default() {
        let store = Store::new();
        let mut storage = MemoryStorage::with_contents(br#"{"display_timeout": 5000}"#);

        assert_eq!(store.load(&mut storage), LoadOutcome::Loaded);
        assert!(store.is_valid());
        assert_eq!(store.get_int("display_timeout", 15000), 5000);
        assert!(store.get_bool("some_flag", true));
    }

    #[test]
    fn absent_keys_return_default_for_every_kind() {
        let store = Store::new();
        let mut storage = MemoryStorage::with_contents(br#"{"wake_word": "hi willow"}"#);
        store.load(&mut storage);

        for key in ["missing", "also_missing", "WAKE_WORD"] {
            assert!(store.get_bool(key, true));
            assert!(!store.get_bool(key, false));
            assert_eq!(store.get_int(key, 42), 42);
            assert_eq!(store.get_string(key, "dflt"), "dflt");
        }
    }

    #[test]
    fn mismatched_kinds_are_not_coerced() {
        let store = Store::new();
        let mut storage = MemoryStorage::with_contents(
            br#"{"display_timeout": "5000", "mute": "true", "hostname": 12}"#,
        );
        store.load(&mut storage);

        assert_eq!(store.get_int("display_timeout", 15000), 15000);
        assert!(!store.get_bool("mute", false));
        assert_eq!(store.get_string("hostname", "willow"), "willow");
    }

    #[test]
    fn loading_twice_yields_identical_document() {
        let store = Store::new();
        let mut storage =
            MemoryStorage::with_contents(br#"{"a": 1, "b": "two", "c": false, "d": [1]}"#);

        store.load(&mut storage);
        let first = store.snapshot().unwrap();
        store.load(&mut storage);
        let second = store.snapshot().unwrap();

        assert_eq!(*first, *second);
        assert_eq!(
            first.keys().collect::<alloc::vec::Vec<_>>(),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn parse_failure_keeps_defaults() {
        let store = Store::new();
        let mut storage = MemoryStorage::with_contents(b"{\"display_timeout\": ");

        assert_eq!(store.load(&mut storage), LoadOutcome::Invalid);
        assert!(!store.is_valid());
        assert_eq!(store.get_int("display_timeout", 15000), 15000);
    }

    // The bytes on flash were never seen, so the last good document still
    // describes the file. Contents that were read but rejected replace it.
    #[test]
    fn failed_reload_keeps_previous_document() {
        let store = Store::new();
        store.load(&mut MemoryStorage::with_contents(br#"{"display_timeout": 5000}"#));

        assert_eq!(store.load(&mut BrokenStorage), LoadOutcome::Invalid);
        assert_eq!(store.get_int("display_timeout", 15000), 5000);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let store = Store::new();
        let mut text = alloc::string::String::from("{\"pad\": \"");
        text.extend(core::iter::repeat_n('x', MAX_CONFIG_BYTES));
        text.push_str("\"}");

        assert_eq!(
            store.load(&mut MemoryStorage::with_contents(text.as_bytes())),
            LoadOutcome::Invalid
        );
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn write_persists_verbatim_and_swaps_document() {
        let store = Store::new();
        let mut storage = MemoryStorage::with_contents(br#"{"display_timeout": 5000}"#);
        store.load(&mut storage);
        let before = store.snapshot().unwrap();

        let text = "{ \"display_timeout\" : 2500 }\n";
        assert_eq!(store.write(&mut storage, text), Ok(LoadOutcome::Loaded));

        assert_eq!(storage.contents(), Some(text.as_bytes()));
        assert_eq!(store.get_int("display_timeout", 15000), 2500);
        assert_eq!(before.get_int("display_timeout"), Some(5000));
    }

    #[test]
    fn write_of_unparseable_text_is_still_persisted() {
        let store = Store::new();
        let mut storage = MemoryStorage::new();

        assert_eq!(store.write(&mut storage, "not json"), Ok(LoadOutcome::Invalid));
        assert_eq!(storage.contents(), Some(&b"not json"[..]));
        assert!(!store.is_valid());
        assert_eq!(store.get_int("display_timeout", 15000), 15000);
        assert_eq!(store.get_string("wake_word", "hi willow"), "hi willow");
    }

    #[test]
    fn unparseable_rewrite_drops_previous_document() {
        let store = Store::new();
        let mut storage = MemoryStorage::with_contents(br#"{"display_timeout": 5000}"#);
        assert_eq!(store.load(&mut storage), LoadOutcome::Loaded);

        assert_eq!(store.write(&mut storage, "not json"), Ok(LoadOutcome::Invalid));

        assert!(!store.is_valid());
        assert!(store.snapshot().is_none());
        assert_eq!(store.get_int("display_timeout", 15000), 15000);
    }

    #[test]
    fn non_object_rewrite_drops_previous_document() {
        let store = Store::new();
        let mut storage = MemoryStorage::with_contents(br#"{"display_timeout": 5000}"#);
        store.load(&mut storage);

        assert_eq!(store.write(&mut storage, "[1, 2]"), Ok(LoadOutcome::Invalid));

        assert!(!store.is_valid());
        assert_eq!(store.get_millis("display_timeout", 10_000), 10_000);
    }

    #[test]
    fn open_failure_is_reported() {
        let store = Store::new();
        assert_eq!(
            store.write(&mut BrokenStorage, "{}"),
            Err(ConfigError::Open("partition is read-only"))
        );
    }

    #[test]
    fn write_failure_keeps_previous_document() {
        let store = Store::new();
        store.load(&mut MemoryStorage::with_contents(br#"{"display_timeout": 5000}"#));

        assert_eq!(
            store.write(&mut FailingWrites, r#"{"display_timeout": 1}"#),
            Err(ConfigError::Write("write failed"))
        );
        assert_eq!(store.get_int("display_timeout", 0), 5000);
    }

    #[test]
    fn millis_reject_negative_values() {
        let store = Store::new();
        store.load(&mut MemoryStorage::with_contents(
            br#"{"display_timeout": -1, "lvgl_lock_timeout": 250}"#,
        ));
        assert_eq!(store.get_millis("display_timeout", 10_000), 10_000);
        assert_eq!(store.get_millis("lvgl_lock_timeout", 500), 250);
    }

    #[test]
    fn file_backed_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("willow.json"));
        let store = Store::new();

        assert_eq!(store.load(&mut storage), LoadOutcome::Absent);
        store
            .write(&mut storage, r#"{"display_timeout": 5000}"#)
            .unwrap();

        let fresh = Store::new();
        assert_eq!(fresh.load(&mut storage), LoadOutcome::Loaded);
        assert_eq!(fresh.get_int("display_timeout", 15000), 5000);
    }
}
