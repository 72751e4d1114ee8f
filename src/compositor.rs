//! Full-markup header/footer compositing
//!
//! Takes the base PDF the browser printed and stamps the header and footer
//! overlays onto every page. Headers sit flush with the top edge, footers flush
//! with the bottom edge. Page count, size and order are unchanged.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::{
    format_duration, FormXObject, Overlay, OverlayGenerator, OverlaySlot, PageRenderer,
    PageEdit, PdfEditor, RenderError, RenderOptions, SlotKind,
};

pub struct OverlayCompositor {
    generator: OverlayGenerator,
}

/// A slot plus the form its current overlay was imported as.
struct SlotState {
    slot: OverlaySlot,
    imported: Option<(u64, FormXObject)>,
}

impl SlotState {
    fn new(kind: SlotKind, template: &str) -> Self {
        Self {
            slot: OverlaySlot::new(kind, template),
            imported: None,
        }
    }
}

impl OverlayCompositor {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            generator: OverlayGenerator::new(renderer),
        }
    }

    /// Stamp full-markup overlays onto `base`.
    ///
    /// Returns `base` untouched unless header/footer display is on and at
    /// least one full-markup template is set.
    pub async fn compose(
        &self,
        base: Vec<u8>,
        options: &RenderOptions,
    ) -> Result<Vec<u8>, RenderError> {
        if !options.wants_full_markup_overlay() {
            return Ok(base);
        }

        let started = Instant::now();
        let mut editor = PdfEditor::load(&base)?;
        let pages = editor.pages().to_vec();
        let total = pages.len() as u32;

        let mut header = options
            .full_html_header
            .as_deref()
            .map(|t| SlotState::new(SlotKind::Header, t));
        let mut footer = options
            .full_html_footer
            .as_deref()
            .map(|t| SlotState::new(SlotKind::Footer, t));

        for page in &pages {
            let header_overlay = match header.as_mut() {
                Some(state) => Some(self.overlay_for(state, page.index, total, options).await?),
                None => None,
            };
            let footer_overlay = match footer.as_mut() {
                Some(state) => Some(self.overlay_for(state, page.index, total, options).await?),
                None => None,
            };

            let mut edit = editor.edit_page(page.index)?;
            if let (Some(state), Some(overlay)) = (header.as_mut(), header_overlay) {
                let form = import(&mut edit, state, &overlay)?;
                edit.overlay(form, 0.0, -page.height + overlay.height);
            }
            if let (Some(state), Some(overlay)) = (footer.as_mut(), footer_overlay) {
                let form = import(&mut edit, state, &overlay)?;
                edit.overlay(form, 0.0, 0.0);
            }
            edit.end()?;

            metrics::increment_counter!("composed_pages_total");
            debug!(page = page.index, total, "Composed page");
        }

        let output = editor.finish()?;
        info!(
            pages = total,
            elapsed = %format_duration(started.elapsed()),
            "Composed full-markup header/footer"
        );
        Ok(output)
    }

    async fn overlay_for(
        &self,
        state: &mut SlotState,
        page: u32,
        total: u32,
        options: &RenderOptions,
    ) -> Result<Overlay, RenderError> {
        self.generator
            .generate(&mut state.slot, page, total, options)
            .await
            .cloned()
    }
}

/// Import `overlay` unless the form from the same generation is already in
/// the document.
fn import(
    edit: &mut PageEdit<'_>,
    state: &mut SlotState,
    overlay: &Overlay,
) -> Result<FormXObject, RenderError> {
    match state.imported {
        Some((generation, form)) if generation == overlay.generation => Ok(form),
        _ => {
            let form = edit.import_overlay(&overlay.bytes)?;
            state.imported = Some((overlay.generation, form));
            Ok(form)
        }
    }
}
