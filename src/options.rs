//! Request normalization
//!
//! Incoming parameters arrive as loose strings (`"true"`, `"1.5"`, `"10mm"`).
//! Everything here turns them into typed values exactly once, so the renderer
//! and the compositor never look at raw strings again.

use std::collections::HashMap;
use std::time::Duration;

use crate::{sanitize_filename, Config, RenderError};

/// Raw request parameters, merged from query string and body.
pub type RawParams = HashMap<String, String>;

pub const PAGE_NUMBER_PLACEHOLDER: &str = "{pageNumber}";
pub const TOTAL_PAGES_PLACEHOLDER: &str = "{totalPages}";

const DEFAULT_SCREENSHOT_WIDTH: u32 = 800;
const DEFAULT_SCREENSHOT_HEIGHT: u32 = 600;
const PX_PER_INCH: f64 = 96.0;

/// What the caller wants rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    Url(String),
    InlineMarkup(String),
}

impl ContentSource {
    pub fn describe(&self) -> String {
        match self {
            ContentSource::Url(url) => url.clone(),
            ContentSource::InlineMarkup(html) => format!("inline markup ({} bytes)", html.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Html,
    Screenshot,
    Pdf,
}

impl OutputKind {
    fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("pdf") => OutputKind::Pdf,
            Some("screenshot") => OutputKind::Screenshot,
            _ => OutputKind::Html,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    Inline,
}

/// Load event the navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle0,
    NetworkIdle2,
}

impl WaitUntil {
    fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("load") => WaitUntil::Load,
            Some("domcontentloaded") => WaitUntil::DomContentLoaded,
            Some("networkidle0") => WaitUntil::NetworkIdle0,
            _ => WaitUntil::NetworkIdle2,
        }
    }

    /// Chrome page lifecycle event that must follow the load event, if any.
    ///
    /// `networkIdle` fires after 500ms with no open connections,
    /// `networkAlmostIdle` after 500ms with at most two.
    pub fn lifecycle_event(&self) -> Option<&'static str> {
        match self {
            WaitUntil::Load | WaitUntil::DomContentLoaded => None,
            WaitUntil::NetworkIdle0 => Some("networkIdle"),
            WaitUntil::NetworkIdle2 => Some("networkAlmostIdle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthUnit {
    Px,
    In,
    Cm,
    Mm,
}

/// A CSS-ish length. Bare numbers are pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: LengthUnit,
}

impl Length {
    pub const ZERO: Length = Length {
        value: 0.0,
        unit: LengthUnit::Px,
    };

    pub fn px(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Px,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim().to_ascii_lowercase();
        let (number, unit) = [
            ("px", LengthUnit::Px),
            ("in", LengthUnit::In),
            ("cm", LengthUnit::Cm),
            ("mm", LengthUnit::Mm),
        ]
        .iter()
        .find_map(|(suffix, unit)| trimmed.strip_suffix(suffix).map(|n| (n, *unit)))
        .unwrap_or((trimmed.as_str(), LengthUnit::Px));

        let value: f64 = number.trim().parse().ok()?;
        value.is_finite().then_some(Self { value, unit })
    }

    pub fn to_inches(&self) -> f64 {
        match self.unit {
            LengthUnit::Px => self.value / PX_PER_INCH,
            LengthUnit::In => self.value,
            LengthUnit::Cm => self.value / 2.54,
            LengthUnit::Mm => self.value / 25.4,
        }
    }

    pub fn to_px(&self) -> f64 {
        self.to_inches() * PX_PER_INCH
    }
}

impl Default for Length {
    fn default() -> Self {
        Self::ZERO
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margins {
    pub top: Length,
    pub right: Length,
    pub bottom: Length,
    pub left: Length,
}

impl Margins {
    pub const ZERO: Margins = Margins {
        top: Length::ZERO,
        right: Length::ZERO,
        bottom: Length::ZERO,
        left: Length::ZERO,
    };
}

/// Named paper sizes, dimensions in inches (portrait).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
}

impl PaperFormat {
    pub fn parse(input: &str) -> Option<Self> {
        let format = match input.trim().to_ascii_lowercase().as_str() {
            "letter" => PaperFormat::Letter,
            "legal" => PaperFormat::Legal,
            "tabloid" => PaperFormat::Tabloid,
            "ledger" => PaperFormat::Ledger,
            "a0" => PaperFormat::A0,
            "a1" => PaperFormat::A1,
            "a2" => PaperFormat::A2,
            "a3" => PaperFormat::A3,
            "a4" => PaperFormat::A4,
            "a5" => PaperFormat::A5,
            "a6" => PaperFormat::A6,
            _ => return None,
        };
        Some(format)
    }

    pub fn dimensions_in(&self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Ledger => (17.0, 11.0),
            PaperFormat::A0 => (33.1, 46.8),
            PaperFormat::A1 => (23.4, 33.1),
            PaperFormat::A2 => (16.54, 23.4),
            PaperFormat::A3 => (11.7, 16.54),
            PaperFormat::A4 => (8.27, 11.7),
            PaperFormat::A5 => (5.83, 8.27),
            PaperFormat::A6 => (4.13, 5.83),
        }
    }
}

/// Paper size for print-to-PDF. Explicit width/height win over a named format.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaperSize {
    pub format: Option<PaperFormat>,
    pub width: Option<Length>,
    pub height: Option<Length>,
}

impl PaperSize {
    /// Resolved (width, height) in inches; `None` leaves the browser default.
    pub fn resolve_inches(&self) -> (Option<f64>, Option<f64>) {
        let (format_width, format_height) = match self.format {
            Some(format) => {
                let (w, h) = format.dimensions_in();
                (Some(w), Some(h))
            }
            None => (None, None),
        };

        (
            self.width.map(|w| w.to_inches()).or(format_width),
            self.height.map(|h| h.to_inches()).or(format_height),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
    Webp,
}

impl ImageType {
    fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("jpeg") | Some("jpg") => ImageType::Jpeg,
            Some("webp") => ImageType::Webp,
            _ => ImageType::Png,
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, ImageType::Png)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Webp => "image/webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationOptions {
    pub timeout: Duration,
    pub wait_until: WaitUntil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub width: u32,
    pub height: u32,
    pub image_type: ImageType,
    pub quality: u8,
    pub full_page: bool,
    pub omit_background: bool,
}

/// Canonical rendering configuration for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub navigation: NavigationOptions,
    pub scale: f64,
    pub margins: Margins,
    pub paper: PaperSize,
    pub landscape: bool,
    pub prefer_css_page_size: bool,
    pub print_background: bool,
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub full_html_header: Option<String>,
    pub full_html_footer: Option<String>,
    pub screenshot: ScreenshotOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_params(&RawParams::new(), Duration::from_secs(30))
    }
}

impl RenderOptions {
    pub fn from_params(params: &RawParams, default_timeout: Duration) -> Self {
        let get = |key: &str| params.get(key).map(String::as_str);

        let timeout = get("timeout")
            .and_then(|t| t.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(default_timeout);

        let image_type = ImageType::from_param(get("imageType"));
        let default_quality = if image_type.is_lossless() { 0 } else { 100 };
        let quality = get("quality")
            .and_then(|q| q.trim().parse::<f64>().ok())
            .filter(|q| *q > 0.0)
            .map(|q| q.min(100.0) as u8)
            .unwrap_or(default_quality);

        let pixels = |key: &str, default: u32| {
            get(key)
                .and_then(Length::parse)
                .map(|l| l.to_px())
                .filter(|px| *px >= 1.0)
                .map(|px| px as u32)
                .unwrap_or(default)
        };

        Self {
            navigation: NavigationOptions {
                timeout,
                wait_until: WaitUntil::from_param(get("waitUntil")),
            },
            scale: get("scale")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|s| s.is_finite() && *s != 0.0)
                .unwrap_or(1.0),
            margins: Margins {
                top: length_or_zero(get("marginTop")),
                right: length_or_zero(get("marginRight")),
                bottom: length_or_zero(get("marginBottom")),
                left: length_or_zero(get("marginLeft")),
            },
            paper: PaperSize {
                format: get("format").and_then(PaperFormat::parse),
                width: get("width").and_then(Length::parse),
                height: get("height").and_then(Length::parse),
            },
            landscape: flag(get("landscape")),
            prefer_css_page_size: flag(get("preferCSSPageSize")),
            print_background: flag(get("printBackground")),
            display_header_footer: flag(get("displayHeaderFooter")),
            header_template: get("headerTemplate").map(str::to_string),
            footer_template: get("footerTemplate").map(str::to_string),
            full_html_header: template(get("fullHtmlHeader")),
            full_html_footer: template(get("fullHtmlFooter")),
            screenshot: ScreenshotOptions {
                width: pixels("width", DEFAULT_SCREENSHOT_WIDTH),
                height: pixels("height", DEFAULT_SCREENSHOT_HEIGHT),
                image_type,
                quality,
                full_page: flag(get("fullPage")),
                omit_background: flag(get("omitBackground")),
            },
        }
    }

    /// Whether the full-markup compositor has anything to do.
    pub fn wants_full_markup_overlay(&self) -> bool {
        self.display_header_footer
            && (self.full_html_header.is_some() || self.full_html_footer.is_some())
    }
}

/// A fully normalized render request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub source: ContentSource,
    pub kind: OutputKind,
    /// Download name without the `.pdf` extension.
    pub filename: Option<String>,
    pub disposition: Disposition,
    pub options: RenderOptions,
}

/// Turn raw parameters into a [`RenderRequest`].
///
/// Fails only when the content source or a PDF filename is structurally missing.
pub fn normalize(params: &RawParams, config: &Config) -> Result<RenderRequest, RenderError> {
    let get = |key: &str| {
        params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    };

    let filename = get("filename").map(str::to_string);

    let source = match (get("html"), get("url")) {
        (Some(html), _) => {
            if filename.is_none() {
                return Err(RenderError::InvalidOptions(
                    "Please specify the filename to use for the rendered html".to_string(),
                ));
            }
            ContentSource::InlineMarkup(html.to_string())
        }
        (None, Some(url)) => ContentSource::Url(with_default_scheme(url.trim())),
        (None, None) => {
            return Err(RenderError::InvalidOptions(
                "Search with url parameter. For example, ?url=http://yourdomain".to_string(),
            ))
        }
    };

    let kind = OutputKind::from_param(get("type"));

    let filename = match (&source, filename) {
        (_, Some(name)) => Some(name),
        (ContentSource::Url(url), None) if kind == OutputKind::Pdf => filename_from_url(url),
        _ => None,
    };

    Ok(RenderRequest {
        source,
        kind,
        filename,
        disposition: if flag(get("dispositionInline")) {
            Disposition::Inline
        } else {
            Disposition::Attachment
        },
        options: RenderOptions::from_params(params, config.navigation_timeout),
    })
}

/// Prefix scheme-less URLs with `http://`.
pub fn with_default_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Derive a download name from a URL: the last path segment without its
/// extension, the flattened path, or the host name.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path();

    let name = if path != "/" && !path.is_empty() {
        let last = path.rsplit('/').next().unwrap_or_default();
        let mut name = if last.is_empty() {
            path.replace('/', "")
        } else {
            last.to_string()
        };
        if let Some(dot) = name.rfind('.') {
            if dot > 0 {
                name.truncate(dot);
            }
        }
        name
    } else {
        parsed.host_str()?.to_string()
    };

    let name = sanitize_filename(&name);
    (!name.is_empty()).then_some(name)
}

fn flag(value: Option<&str>) -> bool {
    value == Some("true")
}

fn length_or_zero(value: Option<&str>) -> Length {
    value.and_then(Length::parse).unwrap_or_default()
}

fn template(value: Option<&str>) -> Option<String> {
    value
        .filter(|t| !t.is_empty() && *t != "false")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_empty() {
        let options = RenderOptions::from_params(&RawParams::new(), Duration::from_secs(30));
        assert_eq!(options.scale, 1.0);
        assert_eq!(options.margins, Margins::ZERO);
        assert_eq!(options.navigation.timeout, Duration::from_secs(30));
        assert_eq!(options.navigation.wait_until, WaitUntil::NetworkIdle2);
        assert!(!options.display_header_footer);
        assert!(options.full_html_header.is_none());
        assert_eq!(options.screenshot.width, 800);
        assert_eq!(options.screenshot.height, 600);
        assert_eq!(options.screenshot.image_type, ImageType::Png);
        assert_eq!(options.screenshot.quality, 0);
    }

    #[test]
    fn test_wait_until_lifecycle_events() {
        let wait = |value: &str| {
            RenderOptions::from_params(&params(&[("waitUntil", value)]), Duration::from_secs(1))
                .navigation
                .wait_until
        };

        assert_eq!(wait("load").lifecycle_event(), None);
        assert_eq!(wait("domcontentloaded").lifecycle_event(), None);
        assert_eq!(wait("networkidle0").lifecycle_event(), Some("networkIdle"));
        assert_eq!(wait("networkidle2").lifecycle_event(), Some("networkAlmostIdle"));
        assert_eq!(wait("bogus"), WaitUntil::NetworkIdle2);
    }

    #[test]
    fn test_boolean_coercion() {
        let options = RenderOptions::from_params(
            &params(&[
                ("landscape", "true"),
                ("printBackground", "false"),
                ("preferCSSPageSize", "yes"),
                ("displayHeaderFooter", "TRUE"),
                ("fullPage", "1"),
            ]),
            Duration::from_secs(30),
        );
        assert!(options.landscape);
        assert!(!options.print_background);
        assert!(!options.prefer_css_page_size);
        assert!(!options.display_header_footer);
        assert!(!options.screenshot.full_page);
    }

    #[test]
    fn test_margins_are_independent() {
        let options = RenderOptions::from_params(
            &params(&[("marginTop", "10mm"), ("marginLeft", "1in")]),
            Duration::from_secs(30),
        );
        assert_eq!(options.margins.top.unit, LengthUnit::Mm);
        assert_eq!(options.margins.top.value, 10.0);
        assert_eq!(options.margins.left.to_inches(), 1.0);
        assert_eq!(options.margins.right, Length::ZERO);
        assert_eq!(options.margins.bottom, Length::ZERO);
    }

    #[test]
    fn test_length_parsing() {
        assert_eq!(Length::parse("96").map(|l| l.to_inches()), Some(1.0));
        assert_eq!(Length::parse("96px").map(|l| l.to_inches()), Some(1.0));
        assert_eq!(Length::parse("2.54cm").map(|l| l.to_inches()), Some(1.0));
        assert_eq!(Length::parse(" 25.4MM ").map(|l| l.to_inches()), Some(1.0));
        assert!(Length::parse("wide").is_none());
        assert!(Length::parse("").is_none());
    }

    #[test]
    fn test_quality_defaults_by_image_type() {
        let jpeg = RenderOptions::from_params(
            &params(&[("imageType", "jpeg")]),
            Duration::from_secs(30),
        );
        assert_eq!(jpeg.screenshot.quality, 100);

        let explicit = RenderOptions::from_params(
            &params(&[("imageType", "jpeg"), ("quality", "70")]),
            Duration::from_secs(30),
        );
        assert_eq!(explicit.screenshot.quality, 70);
    }

    #[test]
    fn test_timeout_zero_falls_back_to_default() {
        let options = RenderOptions::from_params(
            &params(&[("timeout", "0")]),
            Duration::from_secs(12),
        );
        assert_eq!(options.navigation.timeout, Duration::from_secs(12));

        let options = RenderOptions::from_params(
            &params(&[("timeout", "5000")]),
            Duration::from_secs(12),
        );
        assert_eq!(options.navigation.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_false_template_means_unset() {
        let options = RenderOptions::from_params(
            &params(&[
                ("displayHeaderFooter", "true"),
                ("fullHtmlHeader", "false"),
                ("fullHtmlFooter", ""),
            ]),
            Duration::from_secs(30),
        );
        assert!(options.full_html_header.is_none());
        assert!(options.full_html_footer.is_none());
        assert!(!options.wants_full_markup_overlay());
    }

    #[test]
    fn test_paper_size_resolution() {
        let a4 = PaperSize {
            format: PaperFormat::parse("A4"),
            ..Default::default()
        };
        assert_eq!(a4.resolve_inches(), (Some(8.27), Some(11.7)));

        let custom = PaperSize {
            format: Some(PaperFormat::Letter),
            width: Length::parse("5in"),
            height: None,
        };
        assert_eq!(custom.resolve_inches(), (Some(5.0), Some(11.0)));
        assert_eq!(PaperSize::default().resolve_inches(), (None, None));
    }

    #[test]
    fn test_scheme_less_url_gets_http() {
        let request = normalize(
            &params(&[("url", "example.com"), ("type", "pdf")]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(
            request.source,
            ContentSource::Url("http://example.com".to_string())
        );
        assert_eq!(request.kind, OutputKind::Pdf);
        assert_eq!(request.filename.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_missing_source_is_invalid() {
        let err = normalize(&params(&[("type", "pdf")]), &Config::default()).unwrap_err();
        assert!(matches!(err, RenderError::InvalidOptions(_)));
    }

    #[test]
    fn test_html_requires_filename() {
        let err = normalize(
            &params(&[("html", "<b>hi</b>"), ("type", "pdf")]),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidOptions(_)));
        assert_eq!(err.status_code(), 400);

        let request = normalize(
            &params(&[("html", "<b>hi</b>"), ("type", "pdf"), ("filename", "out")]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(
            request.source,
            ContentSource::InlineMarkup("<b>hi</b>".to_string())
        );
        assert_eq!(request.filename.as_deref(), Some("out"));
    }

    #[test]
    fn test_html_wins_over_url() {
        let request = normalize(
            &params(&[
                ("html", "<p>x</p>"),
                ("url", "https://example.com"),
                ("filename", "x"),
            ]),
            &Config::default(),
        )
        .unwrap();
        assert!(matches!(request.source, ContentSource::InlineMarkup(_)));
        assert_eq!(request.kind, OutputKind::Html);
    }

    #[test]
    fn test_disposition_flag() {
        let request = normalize(
            &params(&[("url", "example.com"), ("dispositionInline", "true")]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(request.disposition, Disposition::Inline);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/docs/report.html").as_deref(),
            Some("report")
        );
        assert_eq!(
            filename_from_url("https://example.com/docs/").as_deref(),
            Some("docs")
        );
        assert_eq!(
            filename_from_url("https://example.com/").as_deref(),
            Some("example.com")
        );
        assert_eq!(
            filename_from_url("https://example.com/.hidden").as_deref(),
            Some(".hidden")
        );
    }
}
