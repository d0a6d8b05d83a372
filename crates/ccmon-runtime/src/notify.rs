//! Notification gateway: the `Notifier` seam, the OS-backed notifier, and the
//! registry listener that turns waiting/prompt changes into alerts.

use std::sync::{Arc, Once};
use std::time::Duration;

use ccmon_core::{ChangeListener, EventKind, RegistryChange};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::{DaemonConfig, Scenario};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub sound: String,
    /// Overlay display time in ms; 0 keeps it until dismissed.
    pub display_ms: u64,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification backend error: {0}")]
    Backend(String),

    #[error("notification timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0} notifications still in flight, dropping")]
    Busy(usize),

    #[error("notification task failed: {0}")]
    Join(String),
}

/// Trait for showing a notification. Enables mock injection for testing.
/// Implementations may block; the gateway runs them on the blocking pool.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

// ─── System notifier ──────────────────────────────────────────────

const APP_NAME: &str = "ccmon";

static MACOS_APP_INIT: Once = Once::new();

/// On macOS a CLI tool has no bundle, so notifications are sent on behalf
/// of Terminal.
fn ensure_notifications_initialized() {
    MACOS_APP_INIT.call_once(|| {
        #[cfg(target_os = "macos")]
        {
            if let Err(e) = notify_rust::set_application("com.apple.Terminal") {
                tracing::warn!(error = %e, "failed to set notification application");
            }
        }
    });
}

/// Native desktop notifications through `notify-rust` (D-Bus on Linux and
/// the BSDs, the notification center on macOS).
#[derive(Debug, Default)]
pub struct SystemNotifier;

impl Notifier for SystemNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        ensure_notifications_initialized();
        toast(notification)
            .show()
            .map_err(|e| NotifyError::Backend(e.to_string()))?;
        Ok(())
    }
}

fn toast(n: &Notification) -> notify_rust::Notification {
    let mut toast = notify_rust::Notification::new();
    toast
        .appname(APP_NAME)
        .summary(&strip_control(&n.title))
        .body(&body_text(&n.message))
        .timeout(display_timeout(n.display_ms));
    if !n.sound.is_empty() {
        toast.sound_name(&strip_control(&n.sound));
    }
    toast
}

fn display_timeout(display_ms: u64) -> notify_rust::Timeout {
    match display_ms {
        0 => notify_rust::Timeout::Never,
        ms => notify_rust::Timeout::Milliseconds(u32::try_from(ms).unwrap_or(u32::MAX)),
    }
}

fn strip_control(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Freedesktop servers render a markup subset in the body.
fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn body_text(text: &str) -> String {
    let text = strip_control(text);
    if cfg!(all(unix, not(target_os = "macos"))) {
        escape_markup(&text)
    } else {
        text
    }
}

/// Logs alerts instead of showing them (`--no-notify`).
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            title = %notification.title,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

// ─── Gateway ──────────────────────────────────────────────────────

/// Blocking deliveries allowed at once, counting ones that already timed out.
pub const MAX_IN_FLIGHT_NOTIFICATIONS: usize = 4;

/// Async front for a blocking [`Notifier`], bounded by a timeout.
#[derive(Clone)]
pub struct NotificationGateway {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    in_flight: Arc<Semaphore>,
}

impl NotificationGateway {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            notifier,
            timeout,
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT_NOTIFICATIONS)),
        }
    }

    /// Deliver and wait for the outcome. On timeout the blocking call is
    /// left to finish in the background and keeps its slot until it does,
    /// so a hung backend holds at most `MAX_IN_FLIGHT_NOTIFICATIONS` threads.
    pub async fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        let Ok(permit) = Arc::clone(&self.in_flight).try_acquire_owned() else {
            return Err(NotifyError::Busy(MAX_IN_FLIGHT_NOTIFICATIONS));
        };
        let notifier = Arc::clone(&self.notifier);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            notifier.notify(&notification)
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(NotifyError::Join(e.to_string())),
            Err(_) => Err(NotifyError::TimedOut(self.timeout)),
        }
    }

    /// Fire-and-forget delivery; failures are logged.
    pub fn dispatch(&self, notification: Notification) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(title = %notification.title, "no runtime, dropping notification");
            return;
        };
        let gateway = self.clone();
        handle.spawn(async move {
            if let Err(e) = gateway.deliver(notification).await {
                tracing::warn!(error = %e, "notification failed");
            }
        });
    }
}

// ─── Alert listener ───────────────────────────────────────────────

const PROMPT_PREVIEW_CHARS: usize = 80;

/// Registry listener for the waiting-input and prompt-submit alerts.
pub struct AlertListener {
    gateway: NotificationGateway,
    config: Arc<DaemonConfig>,
}

impl AlertListener {
    pub fn new(gateway: NotificationGateway, config: Arc<DaemonConfig>) -> Self {
        Self { gateway, config }
    }

    fn alert_for(&self, change: &RegistryChange) -> Option<Notification> {
        match change {
            RegistryChange::EventAppended(event) if event.kind == EventKind::Waiting => {
                let message = match &event.message {
                    Some(m) => format!("{}: {m}", event.project),
                    None => format!("{} needs your input", event.project),
                };
                self.config.alert(
                    Scenario::WaitingInput,
                    "Claude Monitor - Waiting for input",
                    &message,
                )
            }
            RegistryChange::PromptAdded { pid, prompt } => {
                let mut preview: String = prompt.prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
                if prompt.prompt.chars().count() > PROMPT_PREVIEW_CHARS {
                    preview.push_str("...");
                }
                self.config.alert(
                    Scenario::PromptSubmit,
                    "Claude Monitor - Prompt submitted",
                    &format!("PID {pid}: {preview}"),
                )
            }
            _ => None,
        }
    }
}

impl ChangeListener for AlertListener {
    fn on_change(&self, change: &RegistryChange) {
        if let Some(notification) = self.alert_for(change) {
            self.gateway.dispatch(notification);
        }
    }
}

// ─── Test support ─────────────────────────────────────────────────
