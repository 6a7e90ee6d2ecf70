//! Chapter document composition.
//!
//! Turns an ordered set of raster pages into one PDF. All pages share one
//! width, the most common width in the set; each page keeps its own height
//! after proportional rescaling, so page boxes follow the content rather
//! than a fixed paper size. One pixel maps to one PDF point.

use crate::error::ComposeError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageReader, ImageResult, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Composed pages between progress log lines.
const PROGRESS_EVERY: usize = 10;

/// A composed chapter on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDocument {
    pub chapter_number: f64,
    pub path: PathBuf,
    pub page_count: usize,
}

/// Returns the most frequent width; ties go to the width seen first.
pub fn modal_width(widths: &[u32]) -> Option<u32> {
    let mut counts: HashMap<u32, (usize, usize)> = HashMap::new();
    for (position, width) in widths.iter().enumerate() {
        counts.entry(*width).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(width, _)| width)
}

/// Height after scaling `width x height` to `target_width`, never below 1.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == target_width || width == 0 {
        return height;
    }
    let scaled = u64::from(height) * u64::from(target_width) / u64::from(width);
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

/// One page ready to embed.
struct EncodedPage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

/// Builds single-chapter PDFs.
#[derive(Debug, Clone)]
pub struct DocumentComposer {
    jpeg_quality: u8,
}

impl DocumentComposer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Composes `images`, optionally preceded by `cover`, into `output`.
    ///
    /// A cover that does not exist is ignored. Pages that cannot be decoded
    /// are skipped; the document is written as long as one page survives.
    pub fn compose(
        &self,
        images: &[PathBuf],
        output: &Path,
        cover: Option<&Path>,
        chapter_number: f64,
    ) -> Result<ChapterDocument, ComposeError> {
        let mut inputs: Vec<&Path> = Vec::with_capacity(images.len() + 1);
        if let Some(cover) = cover.filter(|c| c.exists()) {
            inputs.push(cover);
        }
        inputs.extend(images.iter().map(PathBuf::as_path));

        if inputs.is_empty() {
            return Err(ComposeError::NoInput);
        }

        let widths: Vec<u32> = inputs
            .iter()
            .filter_map(|path| {
                match open_image(path).and_then(ImageReader::into_dimensions) {
                    Ok((width, _)) => Some(width),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "image unreadable, left out of width survey");
                        None
                    }
                }
            })
            .collect();
        let target_width =
            modal_width(&widths).ok_or(ComposeError::UnreadableSet(inputs.len()))?;
        debug!(target_width, images = inputs.len(), "target width selected");

        let mut pages = Vec::with_capacity(inputs.len());
        for path in &inputs {
            match self.prepare_page(path, target_width) {
                Ok(page) => pages.push(page),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "page skipped");
                    continue;
                }
            }
            if pages.len() % PROGRESS_EVERY == 0 {
                info!(
                    chapter = chapter_number,
                    done = pages.len(),
                    total = inputs.len(),
                    "composing"
                );
            }
        }

        if pages.is_empty() {
            return Err(ComposeError::NoPagesWritten);
        }

        let page_count = pages.len();
        let mut document = build_document(pages);
        save_document(&mut document, output).map_err(|source| ComposeError::WriteError {
            path: output.to_path_buf(),
            source,
        })?;

        info!(
            chapter = chapter_number,
            pages = page_count,
            path = %output.display(),
            "chapter document written"
        );
        Ok(ChapterDocument {
            chapter_number,
            path: output.to_path_buf(),
            page_count,
        })
    }

    /// Decodes, normalizes and re-encodes one page.
    fn prepare_page(&self, path: &Path, target_width: u32) -> Result<EncodedPage, ComposeError> {
        let rgb = open_image(path)?.decode()?.to_rgb8();
        let (width, height) = rgb.dimensions();

        let rgb = if width == target_width {
            rgb
        } else {
            let new_height = scaled_height(width, height, target_width);
            image::imageops::resize(&rgb, target_width, new_height, FilterType::Lanczos3)
        };

        self.encode(rgb)
    }

    fn encode(&self, rgb: RgbImage) -> Result<EncodedPage, ComposeError> {
        let (width, height) = rgb.dimensions();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality).encode_image(&rgb)?;
        Ok(EncodedPage {
            width,
            height,
            jpeg,
        })
    }
}

/// Lays out one page per image, each with its own media box.
/// Opens an image with its format sniffed from the content, not the file name.
fn open_image(path: &Path) -> ImageResult<ImageReader<BufReader<File>>> {
    Ok(ImageReader::open(path)?.with_guessed_format()?)
}

fn build_document(pages: Vec<EncodedPage>) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let (width, height) = (i64::from(page.width), i64::from(page.height));

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            page.jpeg,
        ));

        let content = format!("q {width} 0 0 {height} 0 0 cm /Im0 Do Q").into_bytes();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    finish_page_tree(&mut doc, pages_id, kids);
    doc
}

/// Writes the page tree root and catalog.
pub(crate) fn finish_page_tree(doc: &mut Document, pages_id: ObjectId, kids: Vec<Object>) {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
}

/// Saves `doc` to `path`, creating parent directories.
pub(crate) fn save_document(doc: &mut Document, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    doc.save_to(&mut writer).map_err(io::Error::other)?;
    writer.flush()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Writes a noise image so encoded files are not trivially small.
    pub(crate) fn noise_image(path: &Path, width: u32, height: u32) {
        let mut state: u32 = width.wrapping_mul(31).wrapping_add(height);
        let img = RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let [a, b, c, _] = state.to_le_bytes();
            image::Rgb([a, b, c])
        });
        img.save(path).unwrap();
    }

    fn media_boxes(path: &Path) -> Vec<(i64, i64)> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_dictionary(*id).unwrap();
                let bounds = page.get(b"MediaBox").unwrap().as_array().unwrap();
                (bounds[2].as_i64().unwrap(), bounds[3].as_i64().unwrap())
            })
            .collect()
    }

    #[test]
    fn test_modal_width() {
        assert_eq!(modal_width(&[800, 800, 800, 750]), Some(800));
        assert_eq!(modal_width(&[750, 800, 800, 750]), Some(750));
        assert_eq!(modal_width(&[640]), Some(640));
        assert_eq!(modal_width(&[]), None);
    }

    #[test]
    fn test_scaled_height() {
        assert_eq!(scaled_height(750, 200, 800), 213);
        assert_eq!(scaled_height(800, 200, 800), 200);
        assert_eq!(scaled_height(5000, 1, 10), 1);
    }

    #[test]
    fn test_mode_width_wins_and_outlier_is_rescaled() {
        let dir = TempDir::new().unwrap();
        let mut images = Vec::new();
        for (i, width) in [800, 800, 800, 750].into_iter().enumerate() {
            let path = dir.path().join(format!("pagina_{:03}.png", i + 1));
            noise_image(&path, width, 200);
            images.push(path);
        }

        let output = dir.path().join("pdfs").join("capitulo_1.pdf");
        let doc = DocumentComposer::new(95)
            .compose(&images, &output, None, 1.0)
            .unwrap();

        assert_eq!(doc.page_count, 4);
        assert_eq!(
            media_boxes(&output),
            vec![(800, 200), (800, 200), (800, 200), (800, 213)]
        );
    }

    #[test]
    fn test_uniform_widths_keep_heights() {
        let dir = TempDir::new().unwrap();
        let mut images = Vec::new();
        for (i, height) in [120, 300, 90].into_iter().enumerate() {
            let path = dir.path().join(format!("pagina_{:03}.jpg", i + 1));
            noise_image(&path, 64, height);
            images.push(path);
        }

        let output = dir.path().join("out.pdf");
        DocumentComposer::new(90)
            .compose(&images, &output, None, 2.0)
            .unwrap();
        assert_eq!(media_boxes(&output), vec![(64, 120), (64, 300), (64, 90)]);
    }

    #[test]
    fn test_cover_leads_and_missing_cover_is_ignored() {
        let dir = TempDir::new().unwrap();
        let cover = dir.path().join("portada.png");
        noise_image(&cover, 32, 48);
        let mut images = Vec::new();
        for i in 1..=2 {
            let path = dir.path().join(format!("pagina_{i:03}.png"));
            noise_image(&path, 64, 64);
            images.push(path);
        }

        let composer = DocumentComposer::new(95);
        let output = dir.path().join("with_cover.pdf");
        let doc = composer
            .compose(&images, &output, Some(&cover), 1.0)
            .unwrap();
        assert_eq!(doc.page_count, 3);
        assert_eq!(media_boxes(&output)[0], (64, 96));

        let output = dir.path().join("no_cover.pdf");
        let doc = composer
            .compose(&images, &output, Some(&dir.path().join("portada.jpg")), 1.0)
            .unwrap();
        assert_eq!(doc.page_count, 2);
    }

    #[test]
    fn test_broken_page_is_skipped() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("pagina_001.png");
        let bad = dir.path().join("pagina_002.jpg");
        noise_image(&good, 40, 40);
        std::fs::write(&bad, b"<html>not an image</html>").unwrap();

        let output = dir.path().join("out.pdf");
        let doc = DocumentComposer::new(95)
            .compose(&[good, bad], &output, None, 1.0)
            .unwrap();
        assert_eq!(doc.page_count, 1);
    }

    #[test]
    fn test_format_follows_content_not_extension() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("source.png");
        noise_image(&png, 64, 80);
        let misnamed = dir.path().join("pagina_001.jpg");
        std::fs::copy(&png, &misnamed).unwrap();
        let other = dir.path().join("pagina_002.png");
        noise_image(&other, 64, 40);

        let composer = DocumentComposer::new(95);
        let output = dir.path().join("mixed.pdf");
        let doc = composer
            .compose(&[misnamed.clone(), other], &output, None, 1.0)
            .unwrap();
        assert_eq!(doc.page_count, 2);
        assert_eq!(media_boxes(&output), vec![(64, 80), (64, 40)]);

        let output = dir.path().join("single.pdf");
        let doc = composer.compose(&[misnamed], &output, None, 1.0).unwrap();
        assert_eq!(doc.page_count, 1);
    }

    #[test]
    fn test_error_conditions() {
        let dir = TempDir::new().unwrap();
        let composer = DocumentComposer::new(95);
        let output = dir.path().join("out.pdf");

        assert!(matches!(
            composer.compose(&[], &output, None, 1.0),
            Err(ComposeError::NoInput)
        ));

        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"nope").unwrap();
        assert!(matches!(
            composer.compose(&[bad.clone(), bad], &output, None, 1.0),
            Err(ComposeError::UnreadableSet(2))
        ));
        assert!(!output.exists());

        let good = dir.path().join("good.png");
        noise_image(&good, 16, 16);
        let blocked = dir.path().join("good.png").join("out.pdf");
        assert!(matches!(
            composer.compose(&[good], &blocked, None, 1.0),
            Err(ComposeError::WriteError { .. })
        ));
    }
}
