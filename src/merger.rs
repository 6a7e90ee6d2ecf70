//! Concatenation of chapter documents into the final volume.

use crate::composer::{ChapterDocument, finish_page_tree, save_document};
use crate::error::MergeError;
use crate::layout::parse_chapter_name;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Page attributes a page may inherit from its ancestors.
const INHERITED_KEYS: &[&[u8]] = &[b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

fn type_is(object: &Object, name: &[u8]) -> bool {
    match object {
        Object::Dictionary(dict) => {
            matches!(dict.get(b"Type"), Ok(Object::Name(n)) if n.as_slice() == name)
        }
        _ => false,
    }
}

/// Looks `key` up on the page, then on its parents.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    // Bounded walk; a malformed tree may contain cycles.
    for _ in 0..32 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Copies inherited attributes onto every page so it survives re-parenting.
fn pin_inherited_attributes(doc: &mut Document, page_ids: &[ObjectId]) {
    for &page_id in page_ids {
        let resolved: Vec<(&[u8], Object)> = INHERITED_KEYS
            .iter()
            .filter_map(|key| inherited(doc, page_id, key).map(|value| (*key, value)))
            .collect();

        if let Some(Object::Dictionary(page)) = doc.objects.get_mut(&page_id) {
            for (key, value) in resolved {
                if !page.has(key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
    }
}

/// Merges chapter documents into `output`, in ascending chapter order.
///
/// Sources missing from disk or unreadable are skipped with a warning.
/// Pages are copied as-is and keep their own boxes.
pub fn merge(documents: &[ChapterDocument], output: &Path) -> Result<PathBuf, MergeError> {
    let mut ordered: Vec<&ChapterDocument> = documents.iter().collect();
    ordered.sort_by(|a, b| a.chapter_number.total_cmp(&b.chapter_number));

    let mut merged = Document::with_version("1.5");
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut kids: Vec<ObjectId> = Vec::new();
    let mut next_id = 1;
    let mut sources = 0;

    for chapter in ordered {
        if !chapter.path.exists() {
            warn!(
                chapter = chapter.chapter_number,
                path = %chapter.path.display(),
                "chapter document missing, skipped"
            );
            continue;
        }
        let mut doc = match Document::load(&chapter.path) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(
                    chapter = chapter.chapter_number,
                    error = %err,
                    "chapter document unreadable, skipped"
                );
                continue;
            }
        };

        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        pin_inherited_attributes(&mut doc, &page_ids);

        for (id, object) in doc.objects {
            if type_is(&object, b"Catalog") || type_is(&object, b"Pages") {
                continue;
            }
            objects.insert(id, object);
        }
        kids.extend(page_ids);
        sources += 1;
    }

    if kids.is_empty() {
        return Err(MergeError::EmptyMerge);
    }

    let pages_id = (next_id, 0);
    for page_id in &kids {
        if let Some(Object::Dictionary(page)) = objects.get_mut(page_id) {
            page.set("Parent", pages_id);
        }
    }

    merged.objects = objects;
    merged.max_id = next_id;
    let page_count = kids.len();
    finish_page_tree(&mut merged, pages_id, kids.into_iter().map(Object::from).collect());

    save_document(&mut merged, output).map_err(|source| MergeError::WriteError {
        path: output.to_path_buf(),
        source,
    })?;

    info!(sources, pages = page_count, path = %output.display(), "final document written");
    Ok(output.to_path_buf())
}

/// Rescans a `pdfs` directory for `capitulo_<n>.pdf` files, sorted by number.
pub fn collect_chapter_documents(pdfs_dir: &Path) -> std::io::Result<Vec<ChapterDocument>> {
    let mut documents = Vec::new();

    for entry in std::fs::read_dir(pdfs_dir)? {
        let path = entry?.path();
        let Some(chapter_number) = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| name.ends_with(".pdf"))
            .and_then(parse_chapter_name)
        else {
            continue;
        };

        let page_count = match Document::load(&path) {
            Ok(doc) => doc.get_pages().len(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read page count");
                0
            }
        };

        documents.push(ChapterDocument {
            chapter_number,
            path,
            page_count,
        });
    }

    documents.sort_by(|a, b| a.chapter_number.total_cmp(&b.chapter_number));
    Ok(documents)
}
