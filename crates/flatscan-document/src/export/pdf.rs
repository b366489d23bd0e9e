// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — one page per scan, each embedding its JPEG unchanged as a
// DCTDecode image XObject, built with `lopdf`.

use chrono::{DateTime, Utc};
use flatscan_core::{ExportSettings, Orientation};
use flatscan_core::error::{Result, ScanError};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info};

use super::{CancelFlag, EncodedPage, ExportPage, ExportProgress, encode_page};

/// PDF version written in the header.
pub const PDF_VERSION: &str = "1.4";

/// Resource name of the page image inside each page's XObject dictionary.
const IMAGE_NAME: &str = "Im0";

/// Document information dictionary contents.
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    pub title: String,
    pub creator: String,
    pub created: DateTime<Utc>,
}

impl Default for PdfMetadata {
    fn default() -> Self {
        Self {
            title: "Scanned Document".into(),
            creator: "Flatscan".into(),
            created: Utc::now(),
        }
    }
}

/// Where an image lands on the page, in points from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Fit an image into the page box minus margins, preserving aspect ratio and
/// centring it on both axes.
pub fn fit_image(
    image_width: u32,
    image_height: u32,
    page_width: f32,
    page_height: f32,
    margin: f32,
) -> Placement {
    let avail_w = (page_width - 2.0 * margin).max(0.0);
    let avail_h = (page_height - 2.0 * margin).max(0.0);
    let (iw, ih) = (image_width.max(1) as f32, image_height.max(1) as f32);

    let scale = (avail_w / iw).min(avail_h / ih);
    let width = iw * scale;
    let height = ih * scale;

    Placement {
        x: margin + (avail_w - width) / 2.0,
        y: margin + (avail_h - height) / 2.0,
        width,
        height,
    }
}

/// Incremental PDF assembly: pages are appended one at a time as their JPEGs
/// become available, so only encoded bytes are held between pages.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    settings: ExportSettings,
    metadata: PdfMetadata,
}

impl PdfBuilder {
    pub fn new(settings: ExportSettings, metadata: PdfMetadata) -> Self {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            settings,
            metadata,
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append one page sized for `orientation`, with the image fitted inside
    /// the margins.
    pub fn push(&mut self, encoded: EncodedPage, orientation: Orientation) -> Result<()> {
        let (page_w, page_h) = self.settings.paper_size.page_box(orientation);
        let placement = fit_image(
            encoded.width,
            encoded.height,
            page_w,
            page_h,
            self.settings.margin,
        );

        let page_id = add_page(&mut self.doc, self.pages_id, encoded, page_w, page_h, placement)?;
        self.kids.push(Object::Reference(page_id));

        debug!(
            page = self.kids.len(),
            page_w,
            page_h,
            ?placement,
            "PDF page written"
        );
        Ok(())
    }

    /// Write the page tree, catalog, and info dictionary and serialise.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let total = self.kids.len();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => Object::Integer(total as i64),
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(self.pages_id),
        });
        let info_id = self.doc.add_object(info_dictionary(&self.metadata));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.trailer.set("Info", Object::Reference(info_id));

        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|err| ScanError::Pdf(format!("failed to serialise PDF: {}", err)))?;

        info!(pages = total, bytes = output.len(), "PDF assembled");
        Ok(output)
    }
}

/// Encode every page and assemble the document. No bytes are returned unless
/// every page succeeded.
pub(crate) fn write_pdf(
    pages: &[ExportPage],
    settings: &ExportSettings,
    metadata: &PdfMetadata,
    progress: &mut dyn FnMut(ExportProgress),
    cancel: &CancelFlag,
) -> Result<Vec<u8>> {
    let total = pages.len();
    let quality = settings.jpeg_quality();
    let mut builder = PdfBuilder::new(*settings, metadata.clone());

    for (index, page) in pages.iter().enumerate() {
        cancel.check()?;
        let encoded = encode_page(&page.image, page.rotation, quality)?;
        builder.push(encoded, page.orientation)?;
        progress(ExportProgress {
            completed: index + 1,
            total,
        });
    }

    builder.finish()
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    encoded: EncodedPage,
    page_w: f32,
    page_h: f32,
    placement: Placement,
) -> Result<ObjectId> {
    let mut image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(encoded.width as i64),
            "Height" => Object::Integer(encoded.height as i64),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
            "Filter" => "DCTDecode",
        },
        encoded.jpeg,
    );
    // Already JPEG; leave the stream as-is.
    image.allows_compression = false;
    let image_id = doc.add_object(image);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(placement.width),
                    real(0.0),
                    real(0.0),
                    real(placement.height),
                    real(placement.x),
                    real(placement.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|err| ScanError::Pdf(format!("failed to encode page content: {}", err)))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

    let mut xobjects = Dictionary::new();
    xobjects.set(IMAGE_NAME, Object::Reference(image_id));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![real(0.0), real(0.0), real(page_w), real(page_h)],
        "Contents" => Object::Reference(content_id),
        "Resources" => dictionary! {
            "XObject" => xobjects,
        },
    }))
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn info_dictionary(metadata: &PdfMetadata) -> Dictionary {
    let date = metadata.created.format("D:%Y%m%d%H%M%S+00'00'").to_string();
    dictionary! {
        "Title" => text_string(&metadata.title),
        "Creator" => text_string(&metadata.creator),
        "Producer" => text_string("Flatscan"),
        "CreationDate" => Object::string_literal(date),
    }
}

/// PDF text string: literal for ASCII, UTF-16BE with byte-order mark otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
