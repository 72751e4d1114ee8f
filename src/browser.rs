//! Chrome-backed [`PageRenderer`]
//!
//! One Chrome process serves every request. Each render opens its own page,
//! and the page is closed on every exit path through [`ScopedPage`]. If the
//! DevTools handler task dies, the next render relaunches Chrome.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{
    create_browser_config, new_profile_dir, Config, ContentSource, ImageType, NavigationOptions,
    PageRenderer, PdfOptions, RenderError, ScreenshotOptions,
};

const PROCESS_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

struct ChromeProcess {
    browser: Browser,
    handler: JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
    profile_dir: PathBuf,
}

impl ChromeProcess {
    async fn launch(config: &Config) -> Result<Self, RenderError> {
        let profile_dir = new_profile_dir();
        let browser_config = create_browser_config(config, &profile_dir)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is a Stream that drives the DevTools connection; it must
        // be polled for the browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser handler error: {}", e);
                    return Err(e);
                }
            }
            info!("Browser handler stream ended");
            Ok(())
        });

        Ok(Self {
            browser,
            handler,
            profile_dir,
        })
    }

    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn shutdown(mut self) {
        let _ = self.browser.close().await;
        if timeout(PROCESS_EXIT_TIMEOUT, self.browser.wait()).await.is_err() {
            let _ = self.browser.kill().await;
        }
        self.handler.abort();
        remove_profile_dir(&self.profile_dir).await;
    }
}

async fn remove_profile_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed Chrome profile {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove Chrome profile {}: {}", path.display(), e),
    }
}

/// A browser page that is closed when it goes out of scope.
///
/// Call [`ScopedPage::close`] on the normal path; dropping it (error, panic
/// or cancelled future) schedules the close on the runtime instead.
pub struct ScopedPage {
    page: Option<Page>,
}

impl ScopedPage {
    fn new(page: Page) -> Self {
        Self { page: Some(page) }
    }

    fn page(&self) -> Result<&Page, RenderError> {
        self.page.as_ref().ok_or(RenderError::BrowserUnavailable)
    }

    pub async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }
    }
}

impl Drop for ScopedPage {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}

pub struct ChromeRenderer {
    config: Config,
    process: Mutex<Option<ChromeProcess>>,
}

impl ChromeRenderer {
    /// Launch Chrome eagerly so configuration problems surface at startup.
    pub async fn launch(config: Config) -> Result<Self, RenderError> {
        let process = ChromeProcess::launch(&config).await?;
        info!("Chrome launched");

        Ok(Self {
            config,
            process: Mutex::new(Some(process)),
        })
    }

    pub async fn shutdown(&self) {
        if let Some(process) = self.process.lock().await.take() {
            process.shutdown().await;
            info!("Chrome shut down");
        }
    }

    async fn open_page(&self) -> Result<ScopedPage, RenderError> {
        let mut process = self.process.lock().await;

        let healthy = process.as_ref().is_some_and(ChromeProcess::is_alive);
        if !healthy {
            if let Some(dead) = process.take() {
                warn!("Browser handler has stopped, relaunching Chrome");
                dead.shutdown().await;
            }
            *process = Some(ChromeProcess::launch(&self.config).await?);
        }

        let browser = &process.as_ref().ok_or(RenderError::BrowserUnavailable)?.browser;
        let page = browser.new_page("about:blank").await?;
        Ok(ScopedPage::new(page))
    }

    /// Open a page, load `source`, run `action`, close the page.
    async fn with_loaded_page<T, F, Fut>(
        &self,
        source: &ContentSource,
        navigation: &NavigationOptions,
        action: F,
    ) -> Result<T, RenderError>
    where
        F: FnOnce(Page) -> Fut,
        Fut: Future<Output = Result<T, RenderError>>,
    {
        let scoped = self.open_page().await?;
        let page = scoped.page()?.clone();

        let result = match load(&page, source, navigation).await {
            Ok(()) => action(page).await,
            Err(e) => Err(e),
        };

        scoped.close().await;
        result
    }
}

async fn load(
    page: &Page,
    source: &ContentSource,
    navigation: &NavigationOptions,
) -> Result<(), RenderError> {
    debug!("Loading {}", source.describe());

    let idle_event = navigation.wait_until.lifecycle_event();

    let navigate = async {
        // Subscribe before navigating so no lifecycle event is missed.
        let mut lifecycle = match idle_event {
            Some(_) => {
                page.execute(SetLifecycleEventsEnabledParams::new(true)).await?;
                Some(page.event_listener::<EventLifecycleEvent>().await?)
            }
            None => None,
        };

        match source {
            ContentSource::Url(url) => {
                page.goto(url.as_str()).await?;
            }
            ContentSource::InlineMarkup(html) => {
                page.set_content(html.as_str()).await?;
            }
        }

        if let (Some(target), Some(events)) = (idle_event, lifecycle.as_mut()) {
            let frame = page
                .mainframe()
                .await?
                .ok_or_else(|| RenderError::RenderFailed("page has no main frame".into()))?;
            let mut watch = IdleWatch::new(
                frame.as_ref(),
                target,
                matches!(source, ContentSource::Url(_)),
            );

            loop {
                let event = events.next().await.ok_or_else(|| {
                    RenderError::RenderFailed(format!("page closed before {target}"))
                })?;
                if watch.observe(event.frame_id.as_ref(), event.loader_id.as_ref(), &event.name) {
                    debug!("Reached {}", target);
                    break;
                }
            }
        }
        Ok::<(), RenderError>(())
    };

    timeout(navigation.timeout, navigate)
        .await
        .map_err(|_| RenderError::Timeout(navigation.timeout))?
}

/// Waits for one lifecycle event of the main frame's current document.
///
/// A navigation starts a new document with an `init` event; events from the
/// document it replaced carry the old loader id and are skipped. Inline markup
/// is written into the existing document, so no `init` is required there.
struct IdleWatch {
    frame: String,
    target: &'static str,
    requires_new_document: bool,
    loader: Option<String>,
}

impl IdleWatch {
    fn new(frame: &str, target: &'static str, requires_new_document: bool) -> Self {
        Self {
            frame: frame.to_string(),
            target,
            requires_new_document,
            loader: None,
        }
    }

    /// Feed one event; true once the target event has been reached.
    fn observe(&mut self, frame: &str, loader: &str, name: &str) -> bool {
        if frame != self.frame {
            return false;
        }
        if name == "init" {
            self.loader = Some(loader.to_string());
            return false;
        }
        if name != self.target {
            return false;
        }
        match &self.loader {
            Some(current) => current == loader,
            None => !self.requires_new_document,
        }
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn html(
        &self,
        source: &ContentSource,
        navigation: &NavigationOptions,
    ) -> Result<String, RenderError> {
        self.with_loaded_page(source, navigation, |page| async move {
            Ok(page.content().await?)
        })
        .await
    }

    async fn screenshot(
        &self,
        source: &ContentSource,
        navigation: &NavigationOptions,
        options: &ScreenshotOptions,
    ) -> Result<Vec<u8>, RenderError> {
        let device_scale_factor = self.config.viewport.device_scale_factor;

        self.with_loaded_page(source, navigation, |page| async move {
            let emulation = SetDeviceMetricsOverrideParams::builder()
                .width(options.width as i64)
                .height(options.height as i64)
                .device_scale_factor(device_scale_factor)
                .mobile(false)
                .build()
                .map_err(RenderError::RenderFailed)?;
            page.execute(emulation).await?;

            let format = match options.image_type {
                ImageType::Png => CaptureScreenshotFormat::Png,
                ImageType::Jpeg => CaptureScreenshotFormat::Jpeg,
                ImageType::Webp => CaptureScreenshotFormat::Webp,
            };

            let mut params = ScreenshotParams::builder()
                .format(format)
                .full_page(options.full_page)
                .omit_background(options.omit_background);
            // Chrome rejects a quality for lossless formats.
            if !options.image_type.is_lossless() {
                params = params.quality(options.quality as i64);
            }

            Ok(page.screenshot(params.build()).await?)
        })
        .await
    }

    async fn pdf(
        &self,
        source: &ContentSource,
        navigation: &NavigationOptions,
        options: &PdfOptions,
    ) -> Result<Vec<u8>, RenderError> {
        let params = print_params(options);

        self.with_loaded_page(source, navigation, |page| async move {
            Ok(page.pdf(params).await?)
        })
        .await
    }
}

fn print_params(options: &PdfOptions) -> PrintToPdfParams {
    let (paper_width, paper_height) = options.paper.resolve_inches();
    let native = &options.header_footer;

    PrintToPdfParams {
        landscape: Some(options.landscape),
        display_header_footer: Some(native.display),
        print_background: Some(options.print_background),
        scale: Some(options.scale),
        paper_width,
        paper_height,
        margin_top: Some(options.margins.top.to_inches()),
        margin_bottom: Some(options.margins.bottom.to_inches()),
        margin_left: Some(options.margins.left.to_inches()),
        margin_right: Some(options.margins.right.to_inches()),
        header_template: native.header_template.clone(),
        footer_template: native.footer_template.clone(),
        prefer_css_page_size: Some(options.prefer_css_page_size),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Length, Margins, RenderOptions, BLANK_TEMPLATE};

    #[test]
    fn test_idle_watch_skips_replaced_document() {
        let mut watch = IdleWatch::new("main", "networkAlmostIdle", true);

        assert!(!watch.observe("main", "blank", "networkAlmostIdle"));
        assert!(!watch.observe("main", "doc", "init"));
        assert!(!watch.observe("main", "doc", "load"));
        assert!(!watch.observe("child", "doc", "networkAlmostIdle"));
        assert!(!watch.observe("main", "blank", "networkAlmostIdle"));
        assert!(!watch.observe("main", "doc", "networkIdle"));
        assert!(watch.observe("main", "doc", "networkAlmostIdle"));
    }

    #[test]
    fn test_idle_watch_inline_markup_keeps_document() {
        let mut watch = IdleWatch::new("main", "networkIdle", false);

        assert!(!watch.observe("main", "blank", "load"));
        assert!(watch.observe("main", "blank", "networkIdle"));
    }

    #[tokio::test]
    async fn test_remove_profile_dir() {
        let dir = new_profile_dir();
        tokio::fs::create_dir_all(dir.join("Default")).await.unwrap();
        tokio::fs::write(dir.join("Default").join("Preferences"), b"{}")
            .await
            .unwrap();

        remove_profile_dir(&dir).await;
        assert!(!dir.exists());

        // Already gone is not an error.
        remove_profile_dir(&dir).await;
    }

    #[test]
    fn test_print_params_convert_to_inches() {
        let options = PdfOptions {
            margins: Margins {
                top: Length::px(96.0),
                bottom: Length::parse("2.54cm").unwrap(),
                ..Margins::ZERO
            },
            ..PdfOptions::for_overlay(&RenderOptions::default())
        };
        let params = print_params(&options);

        assert_eq!(params.margin_top, Some(1.0));
        assert_eq!(params.margin_bottom, Some(1.0));
        assert_eq!(params.margin_left, Some(0.0));
        assert_eq!(params.display_header_footer, Some(false));
        assert_eq!(params.paper_width, None);
    }

    #[test]
    fn test_print_params_carry_blank_native_slot() {
        let mut base = RenderOptions::default();
        base.display_header_footer = true;
        base.full_html_footer = Some("<p>F</p>".to_string());
        let params = print_params(&PdfOptions::for_document(&base));

        assert_eq!(params.display_header_footer, Some(true));
        assert_eq!(params.footer_template.as_deref(), Some(BLANK_TEMPLATE));
        assert_eq!(params.header_template, None);
    }
}
