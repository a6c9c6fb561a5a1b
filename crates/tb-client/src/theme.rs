//! Persisted light/dark preference.

use std::fmt;
use std::sync::Arc;
use tb_storage::LocalStore;
use tracing::warn;

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    /// Unknown values fall back to the default.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "light" => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ThemePreference {
    store: Arc<dyn LocalStore>,
}

impl ThemePreference {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Theme {
        match self.store.get(THEME_KEY) {
            Ok(value) => value.as_deref().map(Theme::parse).unwrap_or_default(),
            Err(err) => {
                warn!("theme read failed: {err:#}");
                Theme::default()
            }
        }
    }

    pub fn set(&self, theme: Theme) {
        if let Err(err) = self.store.set(THEME_KEY, theme.as_str()) {
            warn!("theme write failed: {err:#}");
        }
    }

    /// Flips the stored theme and returns the new one.
    pub fn toggle(&self) -> Theme {
        let next = self.load().toggled();
        self.set(next);
        next
    }
}
