//! Text extraction and sectioning for regulatory PDFs.
//!
//! A PDF may bundle several regulations. Each one starts on a page whose
//! header names a known regulation and whose numbering restarts at `1.`.
//! Inside a regulation, numbered headings (`1.`, `2.` ... `99.`) delimit
//! sections.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::IngestError;

pub const PAGE_SEPARATOR: &str = "\n\n";
const HEADER_CHARS: usize = 400;

static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x{200B}-\x{200F}\x{FEFF}\x{A0}]").unwrap());
static DOUBLE_QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x{201C}\x{201D}]").unwrap());
static SINGLE_QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x{2018}\x{2019}]").unwrap());
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x{2013}\x{2014}\x{2022}]").unwrap());
static BLANKS_BETWEEN_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([a-zá-úà-ú])\n{2,}([a-zá-úà-ú])").unwrap());
static BREAKS_BETWEEN_LETTERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([a-zá-úà-ú])[\n\r\x{2028}\x{2029}]+\s*[\n\r\x{2028}\x{2029}]+([a-zá-úà-ú])").unwrap()
});
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static MANY_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static SPACED_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\n *").unwrap());
static SPACED_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\n+ *").unwrap());
static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*(\d{1,2})\.(?:\D|$)").unwrap());
static FIRST_SECTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*1\.(?:\D|$)").unwrap());

/// One numbered section of a regulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub doc_name: Option<String>,
    pub section_number: String,
    pub section_title: String,
    pub page_start: usize,
    pub page_end: usize,
    pub content: String,
}

/// Normalise raw PDF page text.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = INVISIBLE.replace_all(text, " ");
    let text = DOUBLE_QUOTES.replace_all(&text, "\"");
    let text = SINGLE_QUOTES.replace_all(&text, "'");
    let text = DASHES.replace_all(&text, "-");
    let text = join_broken_lines(&text);
    let text = BLANKS_BETWEEN_LETTERS.replace_all(&text, "$1 $2");
    let text = SPACES.replace_all(&text, " ");
    let text = MANY_NEWLINES.replace_all(&text, "\n\n");
    let text = SPACED_NEWLINE.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Collapse line breaks between words while keeping real paragraph breaks.
pub fn fix_double_newlines(text: &str) -> String {
    let text = BREAKS_BETWEEN_LETTERS.replace_all(text, "$1 $2");
    let text = SPACES.replace_all(&text, " ");
    let text = SPACED_NEWLINES.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Replace every newline with a space unless it ends a sentence or clause
/// (`. : ; ? !` before it) or introduces a numbered item (`\s*\d+\.` after it).
fn join_broken_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for (i, c) in text.char_indices() {
        if c == '\n' {
            let after_punct = matches!(prev, Some('.' | ':' | ';' | '?' | '!'));
            let keep = after_punct || starts_numbered_item(&text[i + 1..]);
            out.push(if keep { '\n' } else { ' ' });
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

fn starts_numbered_item(rest: &str) -> bool {
    let rest = rest.trim_start();
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && rest[digits..].starts_with('.')
}

/// Read a document and return its cleaned pages.
///
/// PDFs go through `pdf-extract` one page at a time. Anything with a
/// `.txt` extension is read as-is, with form feeds as page breaks.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn extract_pages(path: &Path) -> Result<Vec<String>, IngestError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IngestError::NotFound(path.to_path_buf()),
        _ => IngestError::Extraction { path: path.to_path_buf(), reason: e.to_string() },
    })?;

    let is_text = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    let raw_pages: Vec<String> = if is_text {
        String::from_utf8_lossy(&bytes).split('\u{000C}').map(str::to_string).collect()
    } else {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| IngestError::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    let mut pages: Vec<String> = raw_pages.iter().map(|p| clean_text(p)).collect();
    while pages.len() > 1 && pages.last().is_some_and(|p| p.is_empty()) {
        pages.pop();
    }

    if pages.iter().all(|p| p.is_empty()) {
        return Err(IngestError::EmptyText(path.to_path_buf()));
    }

    info!(pages = pages.len(), chars = pages.iter().map(|p| p.len()).sum::<usize>(), "Extracted document text");
    Ok(pages)
}

/// Extract pages and split them into sections.
pub fn extract_sections(path: &Path, titles: &[String]) -> Result<Vec<Section>, IngestError> {
    let pages = extract_pages(path)?;
    sectionize(&pages, titles)
}

fn title_patterns(titles: &[String]) -> Result<Vec<(Regex, String)>, IngestError> {
    titles
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|title| {
            let words: Vec<String> = title.split_whitespace().map(regex::escape).collect();
            let pattern = format!(r"(?i){}", words.join(r"\s*"));
            Regex::new(&pattern)
                .map(|re| (re, title.clone()))
                .map_err(|e| IngestError::InvalidTitle { title: title.clone(), reason: e.to_string() })
        })
        .collect()
}

/// Split cleaned pages into sections.
///
/// `pages` are 1-based in the output. A page opens a new document only when
/// its header names one of `titles` and its numbering restarts at `1.`.
#[instrument(skip_all, fields(pages = pages.len(), titles = titles.len()))]
pub fn sectionize(pages: &[String], titles: &[String]) -> Result<Vec<Section>, IngestError> {
    let patterns = title_patterns(titles)?;

    let mut starts: Vec<(usize, Option<String>)> = Vec::new();
    for (i, text) in pages.iter().enumerate() {
        let header: String = text.chars().take(HEADER_CHARS).collect();
        let found = patterns.iter().find(|(re, _)| re.is_match(&header)).map(|(_, name)| name.clone());

        if let Some(name) = found {
            if FIRST_SECTION.is_match(text) {
                debug!(page = i + 1, doc = %name, "Document starts");
                starts.push((i + 1, Some(name)));
            }
        }
    }

    if starts.is_empty() {
        warn!("No known document titles found; treating the file as one document");
        starts.push((1, None));
    } else if starts[0].0 != 1 {
        // Leading pages before the first recognised title
        starts.insert(0, (1, None));
    }
    starts.push((pages.len() + 1, None));

    let mut sections = Vec::new();
    for window in starts.windows(2) {
        let (start_page, doc_name) = (window[0].0, &window[0].1);
        let next_page = window[1].0;
        sections.extend(split_document(pages, start_page, next_page, doc_name));
    }

    for section in &mut sections {
        section.content = fix_double_newlines(&section.content);
    }

    info!(sections = sections.len(), "Split document into sections");
    Ok(sections)
}

fn split_document(pages: &[String], start_page: usize, next_page: usize, doc_name: &Option<String>) -> Vec<Section> {
    let doc_pages = &pages[start_page - 1..next_page - 1];
    let block = doc_pages.join(PAGE_SEPARATOR);

    // (page number, byte offset of the page within `block`)
    let mut boundaries = Vec::with_capacity(doc_pages.len());
    let mut offset = 0;
    for (i, page) in doc_pages.iter().enumerate() {
        boundaries.push((start_page + i, offset));
        offset += page.len() + PAGE_SEPARATOR.len();
    }
    let page_of = |pos: usize| {
        boundaries
            .iter()
            .take_while(|(_, off)| *off <= pos)
            .last()
            .map_or(start_page, |(page, _)| *page)
    };

    let headings: Vec<(usize, usize, String)> = SECTION_HEADING
        .captures_iter(&block)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?;
            // Content starts right after the "N." marker
            Some((whole.start(), number.end() + 1, number.as_str().to_string()))
        })
        .collect();

    if headings.is_empty() {
        return vec![Section {
            doc_name: doc_name.clone(),
            section_number: String::new(),
            section_title: String::new(),
            page_start: start_page,
            page_end: next_page - 1,
            content: block.trim().to_string(),
        }];
    }

    headings
        .iter()
        .enumerate()
        .map(|(idx, (_, start_pos, number))| {
            let end_pos = headings.get(idx + 1).map_or(block.len(), |(next_start, _, _)| *next_start);

            let first_line = block[*start_pos..].trim_start().split('\n').next().unwrap_or("").trim();
            let title = if !first_line.is_empty() && !first_line.starts_with(|c: char| c.is_ascii_digit()) {
                first_line.to_string()
            } else {
                String::new()
            };

            let mut content = block[*start_pos..end_pos].trim();
            if !title.is_empty() {
                if let Some(rest) = content.strip_prefix(title.as_str()) {
                    content = rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–'));
                }
            }

            Section {
                doc_name: doc_name.clone(),
                section_number: number.clone(),
                section_title: title,
                page_start: page_of(*start_pos),
                page_end: page_of(end_pos.saturating_sub(1).max(*start_pos)),
                content: content.trim().to_string(),
            }
        })
        .collect()
}
