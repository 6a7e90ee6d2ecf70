//! On-disk layout of one work.
//!
//! ```text
//! <root>/<workId>/capitulo_<n>/pagina_<NNN>.<ext>
//! <root>/<workId>/pdfs/capitulo_<n>.pdf
//! <root>/<workId>/<workId>_completo.pdf
//! <root>/<workId>/portada.<ext>
//! ```

use std::io;
use std::path::{Path, PathBuf};
use url::Url;

const CHAPTER_PREFIX: &str = "capitulo_";
const PAGE_PREFIX: &str = "pagina_";
const COVER_STEM: &str = "portada";
const PDFS_DIR: &str = "pdfs";
const FALLBACK_WORK_ID: &str = "unknown";

/// Renders a chapter number for file names: `12`, `12.5`.
pub fn format_chapter_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

/// Parses the chapter number out of `capitulo_<n>` or `capitulo_<n>.pdf`.
pub fn parse_chapter_name(name: &str) -> Option<f64> {
    let rest = name.strip_prefix(CHAPTER_PREFIX)?;
    let rest = rest.strip_suffix(".pdf").unwrap_or(rest);
    rest.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Derives the work identifier: the last non-empty path segment of `uri`.
pub fn work_id_from_uri(uri: &str) -> String {
    let path = match Url::parse(uri) {
        Ok(url) => url.path().to_string(),
        Err(_) => uri.split(['?', '#']).next().unwrap_or(uri).to_string(),
    };

    path.split('/')
        .rfind(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .chars()
                .map(|c| match c {
                    '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                    c => c,
                })
                .collect()
        })
        .unwrap_or_else(|| FALLBACK_WORK_ID.to_string())
}

/// Paths of one work's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    work_id: String,
    work_dir: PathBuf,
}

impl WorkLayout {
    /// Layout for the work served at `uri`, under `root`.
    pub fn from_source(root: &Path, uri: &str) -> Self {
        let work_id = work_id_from_uri(uri);
        Self {
            work_dir: root.join(&work_id),
            work_id,
        }
    }

    /// Layout of an existing work directory.
    pub fn from_work_dir(work_dir: &Path) -> Self {
        let work_id = work_dir
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_WORK_ID)
            .to_string();
        Self {
            work_id,
            work_dir: work_dir.to_path_buf(),
        }
    }

    pub fn work_id(&self) -> &str {
        &self.work_id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Staging directory for a chapter's page images.
    pub fn chapter_dir(&self, number: f64) -> PathBuf {
        self.work_dir
            .join(format!("{CHAPTER_PREFIX}{}", format_chapter_number(number)))
    }

    pub fn pdfs_dir(&self) -> PathBuf {
        self.work_dir.join(PDFS_DIR)
    }

    pub fn chapter_pdf(&self, number: f64) -> PathBuf {
        self.pdfs_dir()
            .join(format!("{CHAPTER_PREFIX}{}.pdf", format_chapter_number(number)))
    }

    pub fn final_pdf(&self) -> PathBuf {
        self.work_dir.join(format!("{}_completo.pdf", self.work_id))
    }

    pub fn cover_path(&self, extension: &str) -> PathBuf {
        self.work_dir.join(format!("{COVER_STEM}.{extension}"))
    }

    /// Creates the work and pdfs directories.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.pdfs_dir())
    }

    /// Finds a previously downloaded cover, if any.
    pub fn existing_cover(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.work_dir).ok()?;
        let mut covers: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.file_stem().and_then(|s| s.to_str()) == Some(COVER_STEM)
            })
            .collect();
        covers.sort();
        covers.into_iter().next()
    }

    /// Lists staged chapter directories, sorted by chapter number.
    pub fn staged_chapters(&self) -> io::Result<Vec<(f64, PathBuf)>> {
        let mut chapters = Vec::new();
        for entry in std::fs::read_dir(&self.work_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(number) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_chapter_name)
            else {
                continue;
            };
            chapters.push((number, path));
        }
        chapters.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(chapters)
    }
}

/// Lists the staged page images of a chapter directory in page order.
pub fn staged_pages(chapter_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(chapter_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(PAGE_PREFIX))
        })
        .collect();
    pages.sort_by_key(|path| {
        let ordinal = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.strip_prefix(PAGE_PREFIX))
            .and_then(|digits| digits.parse::<u32>().ok())
            .unwrap_or(u32::MAX);
        (ordinal, path.clone())
    });
    Ok(pages)
}
