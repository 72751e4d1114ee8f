//! Header/footer overlay generation
//!
//! A slot is created fresh for each composite operation. Its cache policy is
//! decided on page 1 and never revisited: a template that mentions
//! `{pageNumber}` is rendered for every page, anything else is rendered once
//! and reused.

use std::sync::Arc;

use tracing::debug;

use crate::{
    pdf, ContentSource, PageRenderer, PdfOptions, RenderError, RenderOptions,
    PAGE_NUMBER_PLACEHOLDER, TOTAL_PAGES_PLACEHOLDER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    AlwaysFresh,
    CacheAfterFirst,
}

impl CachePolicy {
    pub fn for_template(template: &str) -> Self {
        if template.contains(PAGE_NUMBER_PLACEHOLDER) {
            CachePolicy::AlwaysFresh
        } else {
            CachePolicy::CacheAfterFirst
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Header,
    Footer,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Header => "header",
            SlotKind::Footer => "footer",
        }
    }
}

/// A rendered one-page overlay.
#[derive(Debug, Clone)]
pub struct Overlay {
    /// Shared so cache hits hand out the same buffer.
    pub bytes: Arc<[u8]>,
    /// Page height of the overlay in PDF points.
    pub height: f32,
    /// Bumped every time the slot renders; equal generations mean equal bytes.
    pub generation: u64,
}

#[derive(Debug)]
pub struct OverlaySlot {
    kind: SlotKind,
    template: String,
    policy: Option<CachePolicy>,
    cached: Option<Overlay>,
    generations: u64,
}

impl OverlaySlot {
    pub fn new(kind: SlotKind, template: impl Into<String>) -> Self {
        Self {
            kind,
            template: template.into(),
            policy: None,
            cached: None,
            generations: 0,
        }
    }

    pub fn policy(&self) -> Option<CachePolicy> {
        self.policy
    }

    /// How many times this slot has been rendered.
    pub fn generations(&self) -> u64 {
        self.generations
    }
}

pub fn substitute_placeholders(template: &str, page: u32, total: u32) -> String {
    template
        .replace(PAGE_NUMBER_PLACEHOLDER, &page.to_string())
        .replace(TOTAL_PAGES_PLACEHOLDER, &total.to_string())
}

pub struct OverlayGenerator {
    renderer: Arc<dyn PageRenderer>,
}

impl OverlayGenerator {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    /// Overlay for `page` of `total`, rendering only when the slot's policy
    /// requires it.
    pub async fn generate<'s>(
        &self,
        slot: &'s mut OverlaySlot,
        page: u32,
        total: u32,
        base: &RenderOptions,
    ) -> Result<&'s Overlay, RenderError> {
        if page == 1 || slot.policy.is_none() {
            slot.policy = Some(CachePolicy::for_template(&slot.template));
        }

        let fresh = matches!(slot.policy, Some(CachePolicy::AlwaysFresh))
            || page == 1
            || slot.cached.is_none();

        if fresh {
            let overlay = self.render(slot, page, total, base).await?;
            metrics::increment_counter!("overlay_generations_total", "slot" => slot.kind.as_str());
            slot.cached = Some(overlay);
        } else {
            metrics::increment_counter!("overlay_cache_hits_total", "slot" => slot.kind.as_str());
        }

        let kind = slot.kind;
        slot.cached.as_ref().ok_or_else(|| {
            RenderError::CompositionFailed(format!("{} overlay missing", kind.as_str()))
        })
    }

    async fn render(
        &self,
        slot: &mut OverlaySlot,
        page: u32,
        total: u32,
        base: &RenderOptions,
    ) -> Result<Overlay, RenderError> {
        let markup = substitute_placeholders(&slot.template, page, total);
        let source = ContentSource::InlineMarkup(markup);

        let bytes = self
            .renderer
            .pdf(&source, &base.navigation, &PdfOptions::for_overlay(base))
            .await
            .map_err(|e| {
                RenderError::CompositionFailed(format!(
                    "{} overlay for page {}: {}",
                    slot.kind.as_str(),
                    page,
                    e
                ))
            })?;

        let height = pdf::read_page_metadata(&bytes)?
            .first()
            .map(|p| p.height)
            .ok_or_else(|| {
                RenderError::CompositionFailed(format!("{} overlay has no pages", slot.kind.as_str()))
            })?;

        slot.generations += 1;
        debug!(
            slot = slot.kind.as_str(),
            page,
            generation = slot.generations,
            "Rendered overlay"
        );

        Ok(Overlay {
            bytes: bytes.into(),
            height,
            generation: slot.generations,
        })
    }
}
