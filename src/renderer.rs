//! The browser-facing seam of the pipeline
//!
//! [`PageRenderer`] is what the service and the overlay generator talk to. The
//! Chrome implementation lives in [`crate::browser`]; tests substitute a mock.

use async_trait::async_trait;

use crate::{
    ContentSource, Margins, NavigationOptions, PaperSize, RenderError, RenderOptions,
    ScreenshotOptions,
};

/// Native template that prints nothing. Chrome falls back to its own default
/// header/footer for an empty string, so a blank slot needs real markup.
pub const BLANK_TEMPLATE: &str = "<span></span>";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `source` and return the serialized DOM.
    async fn html(
        &self,
        source: &ContentSource,
        navigation: &NavigationOptions,
    ) -> Result<String, RenderError>;

    /// Load `source` and capture it as an image.
    async fn screenshot(
        &self,
        source: &ContentSource,
        navigation: &NavigationOptions,
        options: &ScreenshotOptions,
    ) -> Result<Vec<u8>, RenderError>;

    /// Load `source` and print it to PDF.
    async fn pdf(
        &self,
        source: &ContentSource,
        navigation: &NavigationOptions,
        options: &PdfOptions,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Browser-native header/footer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeHeaderFooter {
    pub display: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
}

impl NativeHeaderFooter {
    pub const OFF: NativeHeaderFooter = NativeHeaderFooter {
        display: false,
        header_template: None,
        footer_template: None,
    };
}

/// Print-to-PDF parameters, already resolved from [`RenderOptions`].
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub scale: f64,
    pub margins: Margins,
    pub paper: PaperSize,
    pub landscape: bool,
    pub prefer_css_page_size: bool,
    pub print_background: bool,
    pub header_footer: NativeHeaderFooter,
}

impl PdfOptions {
    /// Options for the base document.
    ///
    /// A slot with a full-markup template gets a blank native template so the
    /// browser doesn't print its own in that area. The other slot keeps its
    /// native template. With both slots full-markup the native header/footer is
    /// switched off.
    pub fn for_document(options: &RenderOptions) -> Self {
        let header_footer = if !options.display_header_footer {
            NativeHeaderFooter {
                display: false,
                header_template: options.header_template.clone(),
                footer_template: options.footer_template.clone(),
            }
        } else {
            match (&options.full_html_header, &options.full_html_footer) {
                (Some(_), Some(_)) => NativeHeaderFooter::OFF,
                (Some(_), None) => NativeHeaderFooter {
                    display: true,
                    header_template: Some(BLANK_TEMPLATE.to_string()),
                    footer_template: options.footer_template.clone(),
                },
                (None, Some(_)) => NativeHeaderFooter {
                    display: true,
                    header_template: options.header_template.clone(),
                    footer_template: Some(BLANK_TEMPLATE.to_string()),
                },
                (None, None) => NativeHeaderFooter {
                    display: true,
                    header_template: options.header_template.clone(),
                    footer_template: options.footer_template.clone(),
                },
            }
        };

        Self {
            scale: options.scale,
            margins: options.margins,
            paper: options.paper,
            landscape: options.landscape,
            prefer_css_page_size: options.prefer_css_page_size,
            print_background: options.print_background,
            header_footer,
        }
    }

    /// Options for a header/footer overlay page: same paper as the document,
    /// everything else pinned.
    pub fn for_overlay(options: &RenderOptions) -> Self {
        Self {
            scale: 1.0,
            margins: Margins::ZERO,
            paper: options.paper,
            landscape: options.landscape,
            prefer_css_page_size: true,
            print_background: true,
            header_footer: NativeHeaderFooter::OFF,
        }
    }
}
