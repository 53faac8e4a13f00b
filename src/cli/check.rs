//! `nvmw check-for-updates <channel>`, the command the hourly tasks run.

use crate::cli::CliConfig;
use crate::upgrade::metadata::{HttpTransport, Transport, UpdateMetadataFetcher};
use crate::upgrade::notices::LastNotification;
use crate::upgrade::notify::{
    BridgeNotifier, LaunchSignal, NotificationAction, NotificationPayload, Notifier,
};
use crate::upgrade::scheduler::UpdateChannel;
use crate::utils::platform::install_dir;
use crate::version::Version;
use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::Args;
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Release channel to check
    #[arg(value_enum)]
    pub channel: UpdateChannel,
}

impl CheckCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        if self.channel != UpdateChannel::SelfUpdate {
            println!("No release source configured for the {} channel", self.channel);
            return Ok(());
        }

        let global = config.load_global().await?;
        let fetcher = UpdateMetadataFetcher::new(HttpTransport::new(&global.upgrade)?, &global.upgrade);
        let notifier = BridgeNotifier::in_dir(&install_dir()?);
        let current = Version::parse(env!("CARGO_PKG_VERSION"))?;

        let path = LastNotification::default_path()?;
        let mut notices = LastNotification::load_from(&path);
        let today = Local::now().date_naive();

        if let Some(version) = notify_if_due(&fetcher, &notifier, &mut notices, &current, today).await? {
            info!("Notified about nvm {}", version);
            notices.save_to(&path)?;
        }
        Ok(())
    }
}

/// Notify about a newer release unless it was already announced.
///
/// Returns the announced version. `notices` is updated but not saved.
async fn notify_if_due<T: Transport, N: Notifier>(
    fetcher: &UpdateMetadataFetcher<T>,
    notifier: &N,
    notices: &mut LastNotification,
    current: &Version,
    today: NaiveDate,
) -> Result<Option<String>> {
    let descriptor = fetcher.fetch().await?;
    let (version, newer) = descriptor.available(current);
    if !newer {
        debug!("nvm {} is current", current);
        return Ok(None);
    }

    let published = descriptor
        .published_at
        .map_or(today, |published| published.with_timezone(&Local).date_naive());
    if !notices.is_due(UpdateChannel::SelfUpdate, published, today) {
        debug!("nvm {} was already announced", version);
        return Ok(None);
    }

    let mut payload = NotificationPayload::new(
        "NVM for Windows Update Available",
        format!("nvm {version} is available (you have {current})."),
    )
    .with_action(NotificationAction::protocol("Upgrade Now", &LaunchSignal::upgrade(&version)))
    .long();
    if let Some(page) = &descriptor.release_page {
        payload = payload.with_link(page.clone());
    }

    if let Err(e) = notifier.notify(&payload).await {
        warn!("Could not show update notification: {:#}", e);
        return Ok(None);
    }

    notices.record(UpdateChannel::SelfUpdate, today);
    Ok(Some(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingNotifier, StaticTransport, release_json};
    use crate::upgrade::config::UpgradeConfig;

    const RELEASE_URL: &str = "https://feed.test/latest";

    fn fetcher(version: &str) -> UpdateMetadataFetcher<StaticTransport> {
        let config = UpgradeConfig {
            release_url: RELEASE_URL.to_string(),
            advisory_url: "https://feed.test/alerts".to_string(),
            ..UpgradeConfig::default()
        };
        let transport =
            StaticTransport::new().with_body(RELEASE_URL, release_json(version, "https://dl.test"));
        UpdateMetadataFetcher::new(transport, &config)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_announces_newer_release_once() {
        let notifier = RecordingNotifier::default();
        let mut notices = LastNotification {
            nvm4w: Some(day(2024, 11, 1)),
            ..LastNotification::default()
        };
        let current = Version::parse("1.1.12").unwrap();
        let today = day(2024, 11, 21);

        let announced =
            notify_if_due(&fetcher("1.2.0"), &notifier, &mut notices, &current, today).await.unwrap();
        assert_eq!(announced.as_deref(), Some("1.2.0"));
        assert_eq!(notices.nvm4w, Some(today));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].actions[0].uri, "nvm://launch?action=upgrade&version=1.2.0");
        assert_eq!(
            sent[0].link.as_deref(),
            Some("https://github.com/coreybutler/nvm-windows/releases/tag/1.2.0")
        );

        let again =
            notify_if_due(&fetcher("1.2.0"), &notifier, &mut notices, &current, today).await.unwrap();
        assert!(again.is_none());
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_current_version_is_not_announced() {
        let notifier = RecordingNotifier::default();
        let mut notices = LastNotification::default();
        let current = Version::parse("1.2.0").unwrap();

        let announced = notify_if_due(&fetcher("1.2.0"), &notifier, &mut notices, &current, day(2024, 11, 21))
            .await
            .unwrap();
        assert!(announced.is_none());
        assert!(notifier.sent().is_empty());
        assert_eq!(notices, LastNotification::default());
    }
}
