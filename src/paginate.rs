//! Re-slicing the overlaid capture into fixed-aspect document pages

use crate::capture::Slice;
use crate::{CaptureConfig, Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage, RgbaImage};
use log::{debug, info};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

/// A page's source region inside the composite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// First composite row of the page
    pub source_y: u64,
    /// Rows taken from the composite; less than the page height on the last page
    pub height: u32,
}

/// The primary surface followed by residual slices, read without
/// concatenating them into one buffer.
pub struct Composite<'a> {
    segments: Vec<&'a RgbaImage>,
    width: u32,
    height: u64,
}

impl<'a> Composite<'a> {
    pub fn new(primary: &'a RgbaImage, residual: &'a [Slice]) -> Self {
        let mut segments = vec![primary];
        segments.extend(residual.iter().map(|s| &s.image));
        let height = segments.iter().map(|s| u64::from(s.height())).sum();
        Self {
            segments,
            width: primary.width(),
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    fn locate(&self, y: u64) -> Option<(&'a RgbaImage, u32)> {
        let mut top = 0u64;
        for segment in &self.segments {
            let h = u64::from(segment.height());
            if y < top + h {
                return Some((*segment, (y - top) as u32));
            }
            top += h;
        }
        None
    }

    /// Copy `rows` composite rows starting at `y` into `dest` at row 0,
    /// flattening alpha onto `background`
    fn copy_rows(&self, y: u64, rows: u32, dest: &mut RgbImage, background: Rgb<u8>) {
        let width = self.width.min(dest.width());
        for dy in 0..rows.min(dest.height()) {
            let Some((segment, sy)) = self.locate(y + u64::from(dy)) else {
                break;
            };
            for x in 0..width.min(segment.width()) {
                let [r, g, b, a] = segment.get_pixel(x, sy).0;
                dest.put_pixel(x, dy, flatten([r, g, b], a, background));
            }
        }
    }
}

fn flatten(rgb: [u8; 3], alpha: u8, background: Rgb<u8>) -> Rgb<u8> {
    if alpha == 255 {
        return Rgb(rgb);
    }
    let a = u32::from(alpha);
    let mix = |c: u8, bg: u8| ((u32::from(c) * a + u32::from(bg) * (255 - a) + 127) / 255) as u8;
    Rgb([
        mix(rgb[0], background[0]),
        mix(rgb[1], background[1]),
        mix(rgb[2], background[2]),
    ])
}

/// `round(width * aspect)`, at least one pixel
pub fn page_height(width: u32, aspect: f64) -> u32 {
    (f64::from(width) * aspect).round().max(1.0) as u32
}

/// Split `composite_height` rows into `ceil(composite_height / page_height)` pages
pub fn plan_pages(composite_height: u64, page_height: u32) -> Vec<Page> {
    let step = u64::from(page_height.max(1));
    (0..composite_height)
        .step_by(step as usize)
        .map(|source_y| Page {
            source_y,
            height: step.min(composite_height - source_y) as u32,
        })
        .collect()
}

/// One encoded document page
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub source: Page,
    pub width: u32,
    pub height: u32,
    /// Baseline JPEG at the configured quality
    pub jpeg: Vec<u8>,
}

/// Produces paginated documents from an overlaid surface
#[derive(Debug, Clone)]
pub struct Paginator {
    pub aspect: f64,
    pub jpeg_quality: u8,
    pub px_to_pt: f64,
    pub background: Rgb<u8>,
}

impl Paginator {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            aspect: config.page_aspect,
            jpeg_quality: config.jpeg_quality,
            px_to_pt: config.px_to_pt,
            background: Rgb(config.background),
        }
    }

    /// Rasterize every page of `primary` + `residual`, background-filled
    /// below the content on the last page
    pub fn render_pages(&self, primary: &RgbaImage, residual: &[Slice]) -> Result<Vec<RgbImage>> {
        let composite = Composite::new(primary, residual);
        if composite.width() == 0 || composite.height() == 0 {
            return Err(Error::Encoding("cannot paginate an empty surface".into()));
        }
        let page_h = page_height(composite.width(), self.aspect);
        Ok(plan_pages(composite.height(), page_h)
            .into_iter()
            .map(|page| {
                let mut img = RgbImage::from_pixel(composite.width(), page_h, self.background);
                composite.copy_rows(page.source_y, page.height, &mut img, self.background);
                img
            })
            .collect())
    }

    /// Render and JPEG-encode every page
    pub fn paginate(&self, primary: &RgbaImage, residual: &[Slice]) -> Result<Vec<DocumentPage>> {
        let composite = Composite::new(primary, residual);
        let page_h = page_height(composite.width(), self.aspect);
        let plan = plan_pages(composite.height(), page_h);
        let rendered = self.render_pages(primary, residual)?;

        plan.into_iter()
            .zip(rendered)
            .enumerate()
            .map(|(i, (source, img))| {
                let jpeg = encode_jpeg(&img, self.jpeg_quality)
                    .map_err(|e| Error::Encoding(format!("page {}: {}", i + 1, e)))?;
                debug!("page {} rows {}..+{} -> {} bytes", i + 1, source.source_y, source.height, jpeg.len());
                Ok(DocumentPage {
                    source,
                    width: img.width(),
                    height: img.height(),
                    jpeg,
                })
            })
            .collect()
    }

    /// Paginate and assemble the PDF. Nothing is returned unless every page
    /// encoded.
    pub fn render_pdf(&self, primary: &RgbaImage, residual: &[Slice]) -> Result<Vec<u8>> {
        let pages = self.paginate(primary, residual)?;
        let pdf = build_pdf(&pages, self.px_to_pt)?;
        info!("paginated {} pages into {} byte document", pages.len(), pdf.len());
        Ok(pdf)
    }
}

/// Encode an RGB page as JPEG at `quality`
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgb8.into())
        .map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(out)
}

/// One PDF page per document page, each a full-bleed DCT image sized with
/// the same points-per-pixel factor on both axes
pub fn build_pdf(pages: &[DocumentPage], px_to_pt: f64) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(Error::Encoding("document has no pages".into()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());

    for page in pages {
        let w_pt = (f64::from(page.width) * px_to_pt) as f32;
        let h_pt = (f64::from(page.height) * px_to_pt) as f32;

        let image_dict = Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(i64::from(page.width))),
            ("Height", Object::Integer(i64::from(page.height))),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("Filter", Object::Name(b"DCTDecode".to_vec())),
        ]);
        let image_id = doc.add_object(Stream::new(image_dict, page.jpeg.clone()).with_compression(false));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![w_pt.into(), 0f32.into(), 0f32.into(), h_pt.into(), 0f32.into(), 0f32.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|e| Error::Encoding(format!("page content: {}", e)))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

        let resources = Dictionary::from_iter([(
            "XObject",
            Object::Dictionary(Dictionary::from_iter([("Im0", Object::Reference(image_id))])),
        )]);

        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
            (
                "MediaBox",
                Object::Array(vec![0f32.into(), 0f32.into(), w_pt.into(), h_pt.into()]),
            ),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::Encoding(format!("failed to write document: {}", e)))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn paginator() -> Paginator {
        Paginator {
            aspect: 297.0 / 210.0,
            jpeg_quality: 90,
            px_to_pt: 0.75,
            background: Rgb([255, 255, 255]),
        }
    }

    #[test]
    fn page_count_is_ceiling() {
        assert_eq!(page_height(210, 297.0 / 210.0), 297);
        let plan = plan_pages(1000, 297);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[3], Page { source_y: 891, height: 109 });
        assert_eq!(plan.iter().map(|p| u64::from(p.height)).sum::<u64>(), 1000);
        assert_eq!(plan_pages(594, 297).len(), 2);
        assert!(plan_pages(0, 297).is_empty());
    }

    #[test]
    fn last_page_band_is_background_filled() {
        let primary = RgbaImage::from_pixel(210, 400, Rgba([0, 0, 0, 255]));
        let pages = paginator().render_pages(&primary, &[]).unwrap();
        assert_eq!(pages.len(), 2);
        let last = &pages[1];
        assert_eq!(last.height(), 297);
        assert_eq!(*last.get_pixel(10, 102), Rgb([0, 0, 0]));
        assert_eq!(*last.get_pixel(10, 103), Rgb([255, 255, 255]));
        assert_eq!(*last.get_pixel(10, 296), Rgb([255, 255, 255]));
    }

    #[test]
    fn residual_slices_continue_the_composite() {
        let primary = RgbaImage::from_pixel(210, 250, Rgba([10, 0, 0, 255]));
        let residual = vec![
            Slice::new(RgbaImage::from_pixel(210, 100, Rgba([20, 0, 0, 255])), 300),
            Slice::new(RgbaImage::from_pixel(210, 50, Rgba([30, 0, 0, 255])), 400),
        ];
        let composite = Composite::new(&primary, &residual);
        assert_eq!(composite.height(), 400);
        let pages = paginator().render_pages(&primary, &residual).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].get_pixel(0, 249)[0], 10);
        assert_eq!(pages[0].get_pixel(0, 250)[0], 20);
        assert_eq!(pages[0].get_pixel(0, 296)[0], 20);
        // composite rows 297..350 are the rest of the first residual slice
        assert_eq!(pages[1].get_pixel(0, 52)[0], 20);
        assert_eq!(pages[1].get_pixel(0, 53)[0], 30);
        assert_eq!(pages[1].get_pixel(0, 102)[0], 30);
        assert_eq!(pages[1].get_pixel(0, 103)[0], 255);
    }

    #[test]
    fn transparent_pixels_flatten_onto_background() {
        assert_eq!(flatten([0, 0, 0], 0, Rgb([255, 255, 255])), Rgb([255, 255, 255]));
        assert_eq!(flatten([9, 9, 9], 255, Rgb([255, 255, 255])), Rgb([9, 9, 9]));
    }

    #[test]
    fn pdf_has_one_page_per_planned_page() {
        let primary = RgbaImage::from_pixel(105, 400, Rgba([40, 80, 120, 255]));
        let pdf = paginator().render_pdf(&primary, &[]).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn jpeg_pages_are_jpeg() {
        let img = RgbImage::from_pixel(16, 16, Rgb([1, 2, 3]));
        let bytes = encode_jpeg(&img, 92).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn empty_document_is_an_encoding_error() {
        assert!(matches!(build_pdf(&[], 0.75), Err(Error::Encoding(_))));
    }
}
