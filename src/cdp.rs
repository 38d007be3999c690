//! Chrome DevTools Protocol steps over a single `headless_chrome` tab.
//!
//! Everything here except [`await_milestone`] blocks on CDP round trips and is
//! meant to run on a blocking thread. The async side of a rendering session
//! lives in [`crate::browser`].

use crate::{Error, Orientation, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::PrintToPdfOptions;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Lifecycle milestone that marks a fully loaded report page. Earlier
/// milestones such as `firstPaint` or `load` can fire before every image has
/// been decoded.
pub const NETWORK_IDLE: &str = "networkIdle";

/// A `Page.lifecycleEvent` notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub loader_id: String,
    pub name: String,
}

/// Enable the network domain and send `headers` with every request of the tab
pub fn configure_network(tab: &Tab, headers: &HashMap<String, String>) -> Result<()> {
    let headers: HashMap<&str, &str> = headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    tab.set_extra_http_headers(headers)
        .map_err(|e| Error::render("configure network", e))
}

/// Turn on lifecycle notifications and subscribe to them.
///
/// Must run before navigation, otherwise the milestone may fire before anyone
/// listens for it.
pub fn track_lifecycle(tab: &Tab) -> Result<UnboundedReceiver<LifecycleEvent>> {
    tab.call_method(Page::SetLifecycleEventsEnabled { enabled: true })
        .map_err(|e| Error::render("enable lifecycle events", e))?;

    let (tx, rx) = mpsc::unbounded_channel();
    tab.add_event_listener(Arc::new(move |event: &Event| {
        if let Event::PageLifecycleEvent(ev) = event {
            // Receiver gone means the session is over
            let _ = tx.send(LifecycleEvent {
                loader_id: ev.params.loader_id.clone(),
                name: ev.params.name.clone(),
            });
        }
    }))
    .map_err(|e| Error::render("enable lifecycle events", e))?;

    Ok(rx)
}

/// Navigate the tab and return the loader ID of the new document, if any
pub fn navigate(tab: &Tab, url: &str) -> Result<Option<String>> {
    let ret = tab
        .call_method(Page::Navigate {
            url: url.to_string(),
            referrer: None,
            transition_Type: None,
            frame_id: None,
            referrer_policy: None,
        })
        .map_err(|e| Error::render("navigate", e))?;

    if let Some(text) = ret.error_text {
        return Err(Error::render("navigate", text));
    }
    debug!("Navigated, loader {:?}", ret.loader_id);
    Ok(ret.loader_id)
}

/// Wait until `milestone` is reported for the document loaded by `loader_id`.
///
/// Events of other documents (the blank page a tab starts on) are skipped.
/// Callers bound the wait with [`crate::Deadline::run`].
pub async fn await_milestone(
    events: &mut UnboundedReceiver<LifecycleEvent>,
    loader_id: Option<&str>,
    milestone: &str,
) -> Result<()> {
    while let Some(ev) = events.recv().await {
        let same_document = loader_id.map_or(true, |id| id == ev.loader_id);
        if same_document && ev.name == milestone {
            debug!("Reached lifecycle milestone {}", milestone);
            return Ok(());
        }
    }
    Err(Error::render(
        "await ready",
        format!("tab closed before {} was reached", milestone),
    ))
}

/// Print the loaded page to PDF
pub fn print_pdf(tab: &Tab, orientation: Orientation, header: &str, footer: &str) -> Result<Vec<u8>> {
    let options = PrintToPdfOptions {
        landscape: Some(orientation == Orientation::Landscape),
        display_header_footer: Some(true),
        print_background: Some(true),
        header_template: Some(header.to_string()),
        footer_template: Some(footer.to_string()),
        margin_top: Some(0.9),
        margin_bottom: Some(0.6),
        ..Default::default()
    };

    tab.print_to_pdf(Some(options))
        .map_err(|e| Error::render("capture", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Deadline;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;

    fn event(tx: &UnboundedSender<LifecycleEvent>, loader: &str, name: &str) {
        tx.send(LifecycleEvent {
            loader_id: loader.to_string(),
            name: name.to_string(),
        })
        .unwrap();
    }

    #[tokio::test]
    async fn waits_for_named_milestone_of_current_document() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        event(&tx, "blank", NETWORK_IDLE);
        event(&tx, "report", "firstPaint");
        event(&tx, "report", "load");
        event(&tx, "report", NETWORK_IDLE);

        await_milestone(&mut rx, Some("report"), NETWORK_IDLE)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn accepts_any_document_without_loader_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        event(&tx, "whatever", NETWORK_IDLE);
        assert!(await_milestone(&mut rx, None, NETWORK_IDLE).await.is_ok());
    }

    #[tokio::test]
    async fn closed_stream_is_a_render_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        event(&tx, "report", "load");
        drop(tx);
        let res = await_milestone(&mut rx, Some("report"), NETWORK_IDLE).await;
        assert!(matches!(res, Err(Error::Render { stage: "await ready", .. })));
    }

    #[tokio::test]
    async fn cancelled_wait_returns_without_hanging() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<LifecycleEvent>();
        let deadline = Deadline::never();
        deadline.cancel();

        let res = tokio::time::timeout(
            Duration::from_secs(1),
            deadline.run(await_milestone(&mut rx, Some("report"), NETWORK_IDLE)),
        )
        .await
        .expect("wait must not hang");
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn wait_times_out_at_deadline() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<LifecycleEvent>();
        let deadline = Deadline::never().with_timeout(Duration::from_millis(30));
        let res = deadline
            .run(await_milestone(&mut rx, None, NETWORK_IDLE))
            .await;
        assert!(matches!(res, Err(Error::Timeout(30))));
    }
}
