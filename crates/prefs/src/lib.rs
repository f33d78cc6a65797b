use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const PREFS_DIRECTORY_NAME: &str = "saga";
pub const PREFS_FILE_NAME: &str = "preferences.json";

/// Display theme selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

/// Reader text size preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSize {
    Sm,
    Md,
    #[default]
    Lg,
    Xl,
}

impl TextSize {
    /// Root font size in pixels for this step.
    pub fn font_px(self) -> u32 {
        match self {
            Self::Sm => 15,
            Self::Md => 18,
            Self::Lg => 21,
            Self::Xl => 24,
        }
    }
}

/// Presentation preferences scoped to one view tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub theme: ThemeMode,
    #[serde(default)]
    pub text_size: TextSize,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PrefsError {
    #[snafu(display("failed to create preferences directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize preferences on `{stage}`: {source}"))]
    SerializePrefs {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write preferences file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace preferences file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type PrefsResult<T> = Result<T, PrefsError>;

/// Persistence seam for preference payloads.
///
/// The store never touches the filesystem directly; injecting a backend keeps
/// view-tree code free of ambient storage access.
pub trait PrefsBackend: Send + Sync {
    /// Returns the raw persisted payload, or `None` when nothing was saved yet.
    fn load(&self) -> Option<String>;
    fn store(&self, payload: &str) -> PrefsResult<()>;
}

/// File-backed preference persistence with atomic replacement.
pub struct FilePrefs {
    path: PathBuf,
}

impl FilePrefs {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(PREFS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".saga"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(PREFS_FILE_NAME)
    }
}

impl PrefsBackend for FilePrefs {
    fn load(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    fn store(&self, payload: &str) -> PrefsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-prefs-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, payload).context(WriteFileSnafu {
            stage: "write-temporary-prefs-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(RenameTempFileSnafu {
            stage: "rename-temporary-prefs-file",
            from: temp_path,
            to: self.path.clone(),
        })?;

        Ok(())
    }
}

/// In-memory backend for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryPrefs {
    payload: Mutex<Option<String>>,
}

impl PrefsBackend for MemoryPrefs {
    fn load(&self) -> Option<String> {
        self.payload.lock().expect("prefs payload lock poisoned").clone()
    }

    fn store(&self, payload: &str) -> PrefsResult<()> {
        *self.payload.lock().expect("prefs payload lock poisoned") = Some(payload.to_string());
        Ok(())
    }
}

/// Scoped preference store with lock-free snapshot reads.
pub struct PrefsStore {
    backend: Arc<dyn PrefsBackend>,
    current: ArcSwap<Preferences>,
}

impl PrefsStore {
    pub fn new(backend: Arc<dyn PrefsBackend>) -> Self {
        let preferences = Self::load_from_backend(backend.as_ref());
        Self {
            backend,
            current: ArcSwap::from_pointee(preferences),
        }
    }

    /// Opens the store over the default per-user config file.
    pub fn load() -> Self {
        Self::new(Arc::new(FilePrefs::new(FilePrefs::default_config_path())))
    }

    pub fn snapshot(&self) -> Arc<Preferences> {
        self.current.load_full()
    }

    /// Persists then publishes the new preferences.
    pub fn update(&self, preferences: Preferences) -> PrefsResult<()> {
        let payload = serde_json::to_string_pretty(&preferences).context(SerializePrefsSnafu {
            stage: "serialize-prefs-json",
        })?;
        self.backend.store(&payload)?;
        self.current.store(Arc::new(preferences));
        Ok(())
    }

    pub fn set_theme(&self, theme: ThemeMode) -> PrefsResult<()> {
        let mut preferences = (*self.snapshot()).clone();
        preferences.theme = theme;
        self.update(preferences)
    }

    pub fn set_text_size(&self, text_size: TextSize) -> PrefsResult<()> {
        let mut preferences = (*self.snapshot()).clone();
        preferences.text_size = text_size;
        self.update(preferences)
    }

    fn load_from_backend(backend: &dyn PrefsBackend) -> Preferences {
        let Some(payload) = backend.load() else {
            tracing::info!("no saved preferences, using defaults");
            return Preferences::default();
        };

        let figment = Figment::from(Serialized::defaults(Preferences::default()))
            .merge(Json::string(&payload));

        match figment.extract::<Preferences>() {
            Ok(preferences) => preferences,
            Err(error) => {
                tracing::warn!("failed to parse saved preferences: {}. using defaults", error);
                Preferences::default()
            }
        }
    }
}
