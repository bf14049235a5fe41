//! Persistence backends for the configuration file.

use alloc::vec::Vec;
use core::{convert::Infallible, fmt::Debug};

/// Well-known location of the persisted configuration document.
pub const CONFIG_PATH: &str = "/spiffs/user/config/willow.json";

/// Upper bound on the persisted document size.
pub const MAX_CONFIG_BYTES: usize = 16 * 1024;

/// Backend holding the single persisted configuration file.
pub trait ConfigStorage {
    type Error: Debug;
    type Writer<'a>: ConfigWriter<Error = Self::Error>
    where
        Self: 'a;

    /// Returns `Ok(None)` when nothing has been persisted yet.
    fn read(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Opens the file for writing, discarding its previous contents.
    fn open_truncate(&mut self) -> Result<Self::Writer<'_>, Self::Error>;
}

/// Handle returned by [`ConfigStorage::open_truncate`].
///
/// Dropping it without calling [`ConfigWriter::close`] may leave the file
/// incomplete.
pub trait ConfigWriter {
    type Error: Debug;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
    fn close(self) -> Result<(), Self::Error>;
}

/// RAM-backed configuration file.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    contents: Option<Vec<u8>>,
}

impl MemoryStorage {
    pub const fn new() -> Self {
        Self { contents: None }
    }

    pub fn with_contents(contents: &[u8]) -> Self {
        Self {
            contents: Some(contents.to_vec()),
        }
    }

    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_deref()
    }
}

pub struct MemoryWriter<'a> {
    target: &'a mut Option<Vec<u8>>,
    staged: Vec<u8>,
}

impl ConfigWriter for MemoryWriter<'_> {
    type Error = Infallible;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.staged.extend_from_slice(bytes);
        Ok(())
    }

    fn close(self) -> Result<(), Self::Error> {
        *self.target = Some(self.staged);
        Ok(())
    }
}

impl ConfigStorage for MemoryStorage {
    type Error = Infallible;
    type Writer<'a> = MemoryWriter<'a>;

    fn read(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.contents.clone())
    }

    fn open_truncate(&mut self) -> Result<Self::Writer<'_>, Self::Error> {
        self.contents = Some(Vec::new());
        Ok(MemoryWriter {
            target: &mut self.contents,
            staged: Vec::new(),
        })
    }
}

#[cfg(any(test, feature = "std"))]
pub use file::FileStorage;

#[cfg(any(test, feature = "std"))]
mod file {
    use std::{
        fs::{self, File},
        io::{self, Write},
        path::{Path, PathBuf},
    };

    use alloc::vec::Vec;

    use super::{ConfigStorage, ConfigWriter};

    /// Configuration file on a host filesystem.
    #[derive(Clone, Debug)]
    pub struct FileStorage {
        path: PathBuf,
    }

    impl FileStorage {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    pub struct FileWriter {
        file: File,
    }

    impl ConfigWriter for FileWriter {
        type Error = io::Error;

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
            self.file.write_all(bytes)
        }

        fn close(mut self) -> Result<(), Self::Error> {
            self.file.flush()?;
            self.file.sync_all()
        }
    }

    impl ConfigStorage for FileStorage {
        type Error = io::Error;
        type Writer<'a> = FileWriter;

        fn read(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
            match fs::read(&self.path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err),
            }
        }

        fn open_truncate(&mut self) -> Result<Self::Writer<'_>, Self::Error> {
            let file = File::create(&self.path)?;
            Ok(FileWriter { file })
        }
    }
}
