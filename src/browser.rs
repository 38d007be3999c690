use crate::{cdp, Deadline, Error, Orientation, ReportConfig, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::LaunchOptions;
use log::{debug, warn};
use std::collections::HashMap;
use std::io::Write;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use url::Url;

/// How long Chrome may sit without protocol traffic before the connection is
/// dropped. Browsers are shared across reports, so this is generous.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

enum Command {
    NewTab(oneshot::Sender<Result<Arc<Tab>>>),
    OpenTabs(oneshot::Sender<usize>),
    Close(oneshot::Sender<Result<()>>),
}

/// Templated sections of a report and how to print them
#[derive(Debug, Clone, Default)]
pub struct PdfOptions {
    /// Chrome header template, repeated on every page
    pub header: String,
    /// Full HTML document with the report content
    pub body: String,
    /// Chrome footer template, repeated on every page
    pub footer: String,
    pub orientation: Orientation,
    /// Extra HTTP headers sent with every request of the rendering tab
    pub extra_headers: HashMap<String, String>,
}

/// An async handle to a shared headless Chrome.
///
/// A dedicated worker thread owns the `headless_chrome::Browser` and hands
/// out tabs on request. Every [`Browser::render_document`] call gets its own
/// tab, so a failed or timed-out render cannot disturb another report.
#[derive(Clone)]
pub struct Browser {
    cmd_tx: Sender<Command>,
    remote: bool,
    sessions: SessionLimit,
}

/// Caps how many rendering sessions hold a tab at the same time
#[derive(Debug, Clone)]
pub(crate) struct SessionLimit {
    permits: Arc<Semaphore>,
}

impl SessionLimit {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max.max(1))),
        }
    }

    /// Wait for a free slot. The wait itself is bounded by `deadline`.
    pub(crate) async fn acquire(&self, deadline: &Deadline) -> Result<OwnedSemaphorePermit> {
        let permits = self.permits.clone();
        deadline
            .run(async move {
                permits
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::render("initialize", e))
            })
            .await
    }
}

fn start_chrome(remote_url: Option<&str>) -> Result<headless_chrome::Browser> {
    match remote_url {
        Some(ws) => headless_chrome::Browser::connect_with_timeout(ws.to_string(), IDLE_BROWSER_TIMEOUT)
            .map_err(|e| Error::InitializationError(format!("Failed to connect to browser at {}: {}", ws, e))),
        None => {
            let launch_options = LaunchOptions::default_builder()
                .headless(true)
                .window_size(Some((1920, 1080)))
                .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
                .build()
                .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

            headless_chrome::Browser::new(launch_options)
                .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))
        }
    }
}

impl Browser {
    /// Launch a local headless Chrome, or connect to `remote_chrome_url` when
    /// the config names one.
    pub async fn launch(config: &ReportConfig) -> Result<Self> {
        let remote_url = config.remote_chrome_url.clone().filter(|u| !u.is_empty());
        let remote = remote_url.is_some();

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::Builder::new()
            .name("dashreport-chrome".into())
            .spawn(move || {
                let browser = match start_chrome(remote_url.as_deref()) {
                    Ok(b) => b,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::NewTab(resp) => {
                            let res = browser
                                .new_tab()
                                .map_err(|e| Error::render("initialize", e));
                            // Requester gave up while the tab was opening
                            if let Err(Ok(tab)) = resp.send(res) {
                                debug!("Closing tab nobody is waiting for");
                                if let Err(e) = close_tab(&tab) {
                                    warn!("Failed to close orphaned tab: {}", e);
                                }
                            }
                        }
                        Command::OpenTabs(resp) => {
                            let count = browser.get_tabs().lock().map(|t| t.len()).unwrap_or(0);
                            let _ = resp.send(count);
                        }
                        Command::Close(resp) => {
                            drop(browser);
                            let _ = resp.send(Ok(()));
                            break;
                        }
                    }
                }
            })
            .map_err(|e| Error::InitializationError(format!("Failed to spawn browser worker: {}", e)))?;

        init_rx
            .await
            .map_err(|e| Error::InitializationError(format!("Browser worker init canceled: {}", e)))??;

        Ok(Self {
            cmd_tx,
            remote,
            sessions: SessionLimit::new(config.max_browser_workers),
        })
    }

    /// Shut down the worker and the browser it owns
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }

    /// Number of tabs currently open in the shared browser
    pub async fn open_tabs(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::OpenTabs(tx))
            .map_err(|_| Error::Other("browser worker has shut down".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("OpenTabs canceled: {}", e)))
    }

    async fn new_tab(&self) -> Result<Arc<Tab>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::NewTab(tx))
            .map_err(|_| Error::render("initialize", "browser worker has shut down"))?;
        rx.await
            .map_err(|e| Error::render("initialize", format!("NewTab canceled: {}", e)))?
    }

    /// Print `doc` to PDF in a fresh tab.
    ///
    /// At most `max_browser_workers` documents render at once; further calls
    /// wait for a slot. Every stage, including that wait, runs under
    /// `deadline`. Whatever happens, the tab is closed and no partial
    /// document is returned.
    pub async fn render_document(&self, doc: &PdfOptions, deadline: &Deadline) -> Result<Vec<u8>> {
        let _slot = self.sessions.acquire(deadline).await?;
        let source = DocumentSource::new(&doc.body, self.remote)?;
        let tab = deadline.run(self.new_tab()).await?;
        let session = TabSession::new(tab);

        let res = self.drive(&session, &source, doc, deadline).await;
        session.close().await;
        res
    }

    async fn drive(
        &self,
        session: &TabSession,
        source: &DocumentSource,
        doc: &PdfOptions,
        deadline: &Deadline,
    ) -> Result<Vec<u8>> {
        let tab = session.tab.clone();
        let headers = doc.extra_headers.clone();
        let url = source.url().to_string();
        let (mut events, loader_id) = deadline
            .run(blocking(move || {
                cdp::configure_network(&tab, &headers)?;
                let events = cdp::track_lifecycle(&tab)?;
                let loader_id = cdp::navigate(&tab, &url)?;
                Ok((events, loader_id))
            }))
            .await?;

        deadline
            .run(cdp::await_milestone(
                &mut events,
                loader_id.as_deref(),
                cdp::NETWORK_IDLE,
            ))
            .await?;

        let tab = session.tab.clone();
        let (orientation, header, footer) = (doc.orientation, doc.header.clone(), doc.footer.clone());
        deadline
            .run(blocking(move || {
                cdp::print_pdf(&tab, orientation, &header, &footer)
            }))
            .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::render("browser task", e))?
}

/// Owns a tab for one rendering session and closes it on every exit path
struct TabSession {
    tab: Arc<Tab>,
    closed: bool,
}

impl TabSession {
    fn new(tab: Arc<Tab>) -> Self {
        Self { tab, closed: false }
    }

    async fn close(mut self) {
        self.closed = true;
        let tab = self.tab.clone();
        if let Err(e) = blocking(move || close_tab(&tab)).await {
            warn!("Failed to close tab: {}", e);
        }
    }
}

fn close_tab(tab: &Tab) -> Result<()> {
    tab.close(true)
        .map(|_| ())
        .map_err(|e| Error::render("teardown", e))
}

impl Drop for TabSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Dropped mid-render (caller cancelled): close in the background
        let tab = self.tab.clone();
        let close = move || {
            if let Err(e) = close_tab(&tab) {
                warn!("Failed to close abandoned tab: {}", e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}

/// Where the browser loads the report body from. A local browser reads a
/// temporary file, which avoids Chrome's URL length limit for documents with
/// many embedded images. A remote browser cannot see local files and gets a
/// data URL instead.
enum DocumentSource {
    File {
        _file: tempfile::NamedTempFile,
        url: Url,
    },
    Inline(String),
}

impl DocumentSource {
    fn new(html: &str, remote: bool) -> Result<Self> {
        if remote {
            return Ok(DocumentSource::Inline(html_data_url(html)));
        }

        let mut file = tempfile::Builder::new()
            .prefix("dashreport-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| Error::render("initialize", format!("Failed to create document file: {}", e)))?;
        file.write_all(html.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::render("initialize", format!("Failed to write document file: {}", e)))?;
        let url = Url::from_file_path(file.path())
            .map_err(|_| Error::render("initialize", "document path is not absolute"))?;
        debug!("Report document written to {}", file.path().display());

        Ok(DocumentSource::File { _file: file, url })
    }

    fn url(&self) -> &str {
        match self {
            DocumentSource::File { url, .. } => url.as_str(),
            DocumentSource::Inline(url) => url,
        }
    }
}

/// `data:` URL carrying `html`
pub fn html_data_url(html: &str) -> String {
    use base64::Engine as Base64Engine;
    format!(
        "data:text/html;charset=utf-8;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(html)
    )
}
