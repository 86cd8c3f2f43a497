//! Notification sink.
//!
//! Handlers and the session tracker raise notifications through the
//! [`Notifier`] trait. Delivery is fire-and-forget: failures are logged and
//! never reach the caller.

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Image URL shown next to the text, when the platform supports it
    pub image: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Shows notifications on the desktop through the platform service.
#[cfg(feature = "desktop-notifications")]
pub struct DesktopNotifier {
    app_name: String,
}

#[cfg(feature = "desktop-notifications")]
impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[cfg(feature = "desktop-notifications")]
impl Notifier for DesktopNotifier {
    fn notify(&self, notification: Notification) {
        let app_name = self.app_name.clone();
        run_off_runtime(move || {
            let mut desktop = notify_rust::Notification::new();
            desktop
                .appname(&app_name)
                .summary(&notification.title)
                .body(&notification.body)
                .timeout(notify_rust::Timeout::Milliseconds(5000));
            if let Some(icon) = notification.image.as_deref().and_then(local_icon) {
                desktop.icon(&icon);
            }

            if let Err(e) = desktop.show() {
                tracing::warn!(error = %e, title = %notification.title, "could not show notification");
            }
        });
    }
}

/// Icon argument for the platform service, which takes an icon name or a
/// local path. Remote images are skipped.
#[cfg(any(test, feature = "desktop-notifications"))]
fn local_icon(image: &str) -> Option<String> {
    match url::Url::parse(image) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .ok()
            .map(|path| path.display().to_string()),
        Ok(url) if matches!(url.scheme(), "http" | "https") => None,
        _ => Some(image.to_string()),
    }
}

/// Runs a blocking delivery on the blocking pool when called from the runtime.
#[cfg(any(test, feature = "desktop-notifications"))]
fn run_off_runtime<F>(deliver: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => drop(handle.spawn_blocking(deliver)),
        Err(_) => deliver(),
    }
}

/// Writes notifications to the log only.
#[cfg(any(test, not(feature = "desktop-notifications")))]
pub struct LogNotifier;

#[cfg(any(test, not(feature = "desktop-notifications")))]
impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            "notification"
        );
    }
}

/// Default sink for this build.
pub fn default_notifier() -> Box<dyn Notifier> {
    #[cfg(feature = "desktop-notifications")]
    {
        Box::new(DesktopNotifier::new("Hydra"))
    }
    #[cfg(not(feature = "desktop-notifications"))]
    {
        Box::new(LogNotifier)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every notification for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }
}
