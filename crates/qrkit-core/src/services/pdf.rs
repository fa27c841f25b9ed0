//! Single-page PDF documents with one embedded raster

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::Result;

/// Page geometry in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageLayout {
    /// A4 portrait with a half-inch margin
    pub fn a4() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            margin: 36.0,
        }
    }

    /// Fit an image of the given pixel size to the printable width, keeping
    /// its aspect ratio, anchored at the top-left margin
    pub fn fit(&self, image_width: u32, image_height: u32) -> Placement {
        let width = self.width - self.margin * 2.0;
        let ratio = image_height as f32 / image_width.max(1) as f32;
        Placement {
            x: self.margin,
            y: self.margin,
            width,
            height: width * ratio,
        }
    }
}

/// Image rectangle measured from the top-left corner of the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A one-page document under construction
pub struct PdfDocument {
    doc: Document,
    page: PageLayout,
    pages_id: ObjectId,
    images: Vec<(ObjectId, Placement)>,
}

impl PdfDocument {
    pub fn new(page: PageLayout) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            page,
            pages_id,
            images: Vec::new(),
        }
    }

    /// Embed an RGB raster at the given placement
    pub fn embed_image(&mut self, image: &RgbImage, placement: Placement) {
        let (w, h) = image.dimensions();
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            image.as_raw().clone(),
        );
        let id = self.doc.add_object(stream);
        self.images.push((id, placement));
    }

    /// Finish the page tree and serialize
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let mut operations = Vec::new();
        let mut xobjects = lopdf::Dictionary::new();

        for (index, (id, placement)) in self.images.iter().enumerate() {
            let name = format!("Im{}", index);
            // PDF user space starts at the bottom-left corner
            let bottom = self.page.height - placement.y - placement.height;
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    placement.width.into(),
                    0.0_f32.into(),
                    0.0_f32.into(),
                    placement.height.into(),
                    placement.x.into(),
                    bottom.into(),
                ],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
            xobjects.set(name, *id);
        }

        let content = Content { operations };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));
        let resources_id = self.doc.add_object(dictionary! {
            "XObject" => xobjects,
        });
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.0_f32.into(),
                0.0_f32.into(),
                self.page.width.into(),
                self.page.height.into(),
            ],
        });
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}
