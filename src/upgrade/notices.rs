//! When each update channel last showed a notice.
//!
//! Stored in `<config dir>/.nvm/.updates.json` so the hourly check tasks do not
//! repeat a notification for a release the user has already been told about.

use crate::upgrade::scheduler::UpdateChannel;
use crate::utils::fs::{read_json_file, set_hidden, write_json_file};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lts: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvm4w: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<NaiveDate>,
}

impl LastNotification {
    pub fn default_path() -> Result<PathBuf> {
        let config = dirs::config_dir().context("Unable to determine config directory")?;
        Ok(config.join(".nvm").join(".updates.json"))
    }

    /// Load from `path`. A missing or unreadable file yields empty state.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match read_json_file(path) {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable notice state: {:#}", e);
                Self::default()
            }
        }
    }

    /// Write to `path` and hide its directory.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        write_json_file(path, self)?;
        if let Some(dir) = path.parent()
            && let Err(e) = set_hidden(dir)
        {
            debug!("Could not hide {}: {:#}", dir.display(), e);
        }
        Ok(())
    }

    #[must_use]
    pub const fn get(&self, channel: UpdateChannel) -> Option<NaiveDate> {
        match channel {
            UpdateChannel::Lts => self.lts,
            UpdateChannel::Current => self.current,
            UpdateChannel::SelfUpdate => self.nvm4w,
            UpdateChannel::Vendor => self.author,
        }
    }

    /// Last notice date for `channel`; an unset channel reads as `today`.
    #[must_use]
    pub fn last(&self, channel: UpdateChannel, today: NaiveDate) -> NaiveDate {
        self.get(channel).unwrap_or(today)
    }

    pub fn record(&mut self, channel: UpdateChannel, date: NaiveDate) {
        let slot = match channel {
            UpdateChannel::Lts => &mut self.lts,
            UpdateChannel::Current => &mut self.current,
            UpdateChannel::SelfUpdate => &mut self.nvm4w,
            UpdateChannel::Vendor => &mut self.author,
        };
        *slot = Some(date);
    }

    /// Whether a release published on `published` still deserves a notice.
    ///
    /// Releases newer than the last notice are due. With no notice on record
    /// only a release published today is.
    #[must_use]
    pub fn is_due(&self, channel: UpdateChannel, published: NaiveDate, today: NaiveDate) -> bool {
        match self.get(channel) {
            Some(last) => published > last,
            None => published >= self.last(channel, today),
        }
    }
}
