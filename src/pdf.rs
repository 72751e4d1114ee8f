//! Page-level PDF editing on top of `lopdf`
//!
//! The editor exposes exactly what the overlay compositor needs: page
//! metadata, a per-page edit transaction, and "stamp the first page of another
//! PDF onto this page at (x, y)". Overlays are imported once as Form XObjects
//! and can be drawn on any number of pages.
//!
//! # Coordinates
//!
//! Placement offsets follow a y-down convention relative to the page's
//! bottom-left corner: the form is translated by `(x, -y)` in PDF user space.
//! `(0, 0)` puts the overlay's bottom edge on the page's bottom edge, and
//! `(0, -page_height + overlay_height)` puts its top edge on the page's top edge.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

/// Parent chain depth we are willing to follow for inherited page attributes.
const MAX_INHERITANCE_DEPTH: usize = 16;

#[derive(Debug, Clone, Error)]
pub enum PdfEditError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Document has no pages")]
    NoPages,

    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: usize },

    #[error("Page {0} was already edited")]
    PageAlreadyEdited(u32),

    #[error("Malformed page {page}: {reason}")]
    MalformedPage { page: u32, reason: String },

    #[error("Document has an unfinished page edit")]
    Poisoned,

    #[error("Failed to write PDF: {0}")]
    Write(String),
}

/// Size of one page in PDF points, with its 1-based position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetadata {
    pub index: u32,
    pub width: f32,
    pub height: f32,
}

/// An overlay page imported into the document being edited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormXObject {
    id: ObjectId,
    pub width: f32,
    pub height: f32,
}

impl FormXObject {
    fn resource_name(&self) -> String {
        format!("Ovl{}", self.id.0)
    }
}

/// Read page sizes without keeping the document around.
pub fn read_page_metadata(bytes: &[u8]) -> Result<Vec<PageMetadata>, PdfEditError> {
    let document = Document::load_mem(bytes).map_err(|e| PdfEditError::Parse(e.to_string()))?;
    collect_pages(&document).map(|(pages, _)| pages)
}

pub struct PdfEditor {
    document: Document,
    pages: Vec<PageMetadata>,
    page_ids: Vec<ObjectId>,
    edited: Vec<bool>,
    poisoned: bool,
}

impl PdfEditor {
    pub fn load(bytes: &[u8]) -> Result<Self, PdfEditError> {
        let document =
            Document::load_mem(bytes).map_err(|e| PdfEditError::Parse(e.to_string()))?;
        let (pages, page_ids) = collect_pages(&document)?;

        Ok(Self {
            document,
            edited: vec![false; pages.len()],
            pages,
            page_ids,
            poisoned: false,
        })
    }

    pub fn pages(&self) -> &[PageMetadata] {
        &self.pages
    }

    /// Open the edit transaction for page `index` (1-based).
    ///
    /// Each page can be opened once. The returned [`PageEdit`] must be closed
    /// with [`PageEdit::end`]; dropping it open poisons the editor.
    pub fn edit_page(&mut self, index: u32) -> Result<PageEdit<'_>, PdfEditError> {
        let slot = (index as usize)
            .checked_sub(1)
            .filter(|i| *i < self.pages.len())
            .ok_or(PdfEditError::PageOutOfRange {
                page: index,
                total: self.pages.len(),
            })?;

        if self.edited[slot] {
            return Err(PdfEditError::PageAlreadyEdited(index));
        }
        self.edited[slot] = true;

        Ok(PageEdit {
            editor: self,
            index,
            placements: Vec::new(),
            ended: false,
        })
    }

    /// Serialize the edited document.
    pub fn finish(mut self) -> Result<Vec<u8>, PdfEditError> {
        if self.poisoned {
            return Err(PdfEditError::Poisoned);
        }

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|e| PdfEditError::Write(e.to_string()))?;
        Ok(output)
    }

    /// Copy the first page of `bytes` into this document as a Form XObject.
    fn import_form(&mut self, bytes: &[u8]) -> Result<FormXObject, PdfEditError> {
        let mut overlay =
            Document::load_mem(bytes).map_err(|e| PdfEditError::Parse(e.to_string()))?;

        // Shift every object id past ours before anything is copied over.
        overlay.renumber_objects_with(self.document.max_id + 1);

        let page_id = *overlay
            .get_pages()
            .values()
            .next()
            .ok_or(PdfEditError::NoPages)?;

        let media_box = media_box(&overlay, page_id).ok_or(PdfEditError::MalformedPage {
            page: 1,
            reason: "overlay page has no MediaBox".to_string(),
        })?;
        let content = overlay
            .get_page_content(page_id)
            .map_err(|e| PdfEditError::Parse(e.to_string()))?;
        let resources = inherited_attribute(&overlay, page_id, b"Resources")
            .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));
        let content_ids = overlay.get_page_contents(page_id);

        for (object_id, object) in std::mem::take(&mut overlay.objects) {
            if content_ids.contains(&object_id) {
                continue;
            }
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" | b"XRef"
                | b"ObjStm" => {}
                _ => {
                    self.document.objects.insert(object_id, object);
                }
            }
        }
        self.document.max_id = self.document.max_id.max(overlay.max_id);

        let form = Stream::new(
            Dictionary::from_iter([
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Form".to_vec())),
                (
                    "BBox",
                    Object::Array(media_box.iter().map(|v| Object::Real(*v)).collect()),
                ),
                ("Resources", resources),
            ]),
            content,
        );
        let id = self.document.add_object(form);

        Ok(FormXObject {
            id,
            width: media_box[2] - media_box[0],
            height: media_box[3] - media_box[1],
        })
    }

    fn apply_placements(
        &mut self,
        index: u32,
        placements: &[(FormXObject, f32, f32)],
    ) -> Result<(), PdfEditError> {
        if placements.is_empty() {
            return Ok(());
        }

        let page_id = self.page_ids[index as usize - 1];
        let malformed = |reason: &str| PdfEditError::MalformedPage {
            page: index,
            reason: reason.to_string(),
        };

        let mut resources = match inherited_attribute(&self.document, page_id, b"Resources") {
            Some(Object::Dictionary(dict)) => dict,
            Some(_) => return Err(malformed("Resources is not a dictionary")),
            None => Dictionary::new(),
        };
        let mut xobjects = match resources.get(b"XObject") {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(id)) => self
                .document
                .get_dictionary(*id)
                .map_err(|_| malformed("XObject resources are not a dictionary"))?
                .clone(),
            _ => Dictionary::new(),
        };

        let mut operations = vec![Operation::new("Q", vec![])];
        for (form, x, y) in placements {
            let name = form.resource_name();
            xobjects.set(name.clone(), Object::Reference(form.id));
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        Object::Real(*x),
                        Object::Real(-*y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }
        resources.set("XObject", Object::Dictionary(xobjects));

        let mut overlay_content = b"\n".to_vec();
        overlay_content.extend(
            Content { operations }
                .encode()
                .map_err(|e| PdfEditError::Write(e.to_string()))?,
        );

        // Wrap the existing content in q/Q so its graphics state can't leak
        // into the overlays.
        let existing = self.document.get_page_contents(page_id);
        let save_id = self
            .document
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let overlay_id = self
            .document
            .add_object(Stream::new(Dictionary::new(), overlay_content));

        let mut contents = vec![Object::Reference(save_id)];
        contents.extend(existing.into_iter().map(Object::Reference));
        contents.push(Object::Reference(overlay_id));

        let page = self
            .document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| malformed("page object is not a dictionary"))?;
        page.set("Contents", Object::Array(contents));
        page.set("Resources", Object::Dictionary(resources));

        Ok(())
    }
}

/// Edit transaction for a single page.
pub struct PageEdit<'a> {
    editor: &'a mut PdfEditor,
    index: u32,
    placements: Vec<(FormXObject, f32, f32)>,
    ended: bool,
}

impl PageEdit<'_> {
    /// Import the first page of an overlay PDF so it can be placed.
    ///
    /// The returned form stays valid for every later page of the same editor.
    pub fn import_overlay(&mut self, bytes: &[u8]) -> Result<FormXObject, PdfEditError> {
        self.editor.import_form(bytes)
    }

    /// Queue `form` for drawing at `(x, y)` in the y-down placement convention.
    pub fn overlay(&mut self, form: FormXObject, x: f32, y: f32) {
        self.placements.push((form, x, y));
    }

    /// Close the transaction, writing any queued overlays into the page.
    pub fn end(mut self) -> Result<(), PdfEditError> {
        let placements = std::mem::take(&mut self.placements);
        self.editor.apply_placements(self.index, &placements)?;
        self.ended = true;
        Ok(())
    }
}

impl Drop for PageEdit<'_> {
    fn drop(&mut self) {
        if !self.ended {
            self.editor.poisoned = true;
        }
    }
}

fn collect_pages(document: &Document) -> Result<(Vec<PageMetadata>, Vec<ObjectId>), PdfEditError> {
    let mut pages = Vec::new();
    let mut page_ids = Vec::new();

    for (number, page_id) in document.get_pages() {
        let media_box = media_box(document, page_id).ok_or(PdfEditError::MalformedPage {
            page: number,
            reason: "no MediaBox".to_string(),
        })?;
        pages.push(PageMetadata {
            index: number,
            width: media_box[2] - media_box[0],
            height: media_box[3] - media_box[1],
        });
        page_ids.push(page_id);
    }

    if pages.is_empty() {
        return Err(PdfEditError::NoPages);
    }
    Ok((pages, page_ids))
}

fn media_box(document: &Document, page_id: ObjectId) -> Option<[f32; 4]> {
    let values: Vec<f32> = match inherited_attribute(document, page_id, b"MediaBox")? {
        Object::Array(items) => items.iter().filter_map(number).collect(),
        _ => return None,
    };

    match values.as_slice() {
        [x0, y0, x1, y1] => Some([*x0, *y0, *x1, *y1]),
        _ => None,
    }
}

/// Look up a page attribute, following `Parent` for inheritable keys and
/// resolving a top-level indirect reference.
fn inherited_attribute(document: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = document.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return match value {
                Object::Reference(id) => document.get_object(*id).ok().cloned(),
                other => Some(other.clone()),
            };
        }
        let parent = current.get(b"Parent").ok()?;
        current = match parent {
            Object::Reference(id) => document.get_dictionary(*id).ok()?,
            _ => return None,
        };
    }

    None
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
