//! Chunker (C2): sentence-aware text segmentation with page/chapter
//! tagging, plus the tabular one-chunk-per-row path. Grounded line-for-line
//! on `original_source/.../document_service.py::_build_chunks_with_metadata`
//! and `_split_sentences`.

use crate::utils::text::{detect_chapter_heading, normalize_header, parse_delimited_row, split_sentences};

/// One emitted chunk of the text path, still missing its embedding and
/// `chunk_index` (assigned by the caller once all chunks for a document
/// are known).
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub page: Option<i64>,
    pub chapter_num: Option<i64>,
    pub chapter_title: Option<String>,
}

pub struct TextChunker {
    target_chars: usize,
    overlap_sentences: usize,
}

impl TextChunker {
    pub fn new(target_chars: usize, overlap_sentences: usize) -> Self {
        Self {
            target_chars: target_chars.max(1),
            overlap_sentences,
        }
    }

    /// Split `[[PAGE:n]]`-marked (or marker-less, single-page) text into
    /// chunks. Each page is handled independently: (a) scan its first six
    /// non-blank lines for a chapter heading, remembered for every chunk
    /// on that page; (b) split into sentences; (c) greedily accumulate
    /// sentences until the char target would be exceeded, then start the
    /// next chunk with a trailing overlap of the last K sentences.
    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let pages = split_pages(text);
        let mut out = Vec::new();

        for (page_num, page_text) in pages {
            let chapter = detect_chapter_heading(&page_text);
            let sentences = split_sentences(&page_text);
            if sentences.is_empty() {
                continue;
            }
            for group in self.group_sentences(&sentences) {
                let content = group.join(" ");
                if content.trim().is_empty() {
                    continue;
                }
                out.push(TextChunk {
                    content,
                    page: page_num,
                    chapter_num: chapter.as_ref().map(|(n, _)| *n),
                    chapter_title: chapter.as_ref().map(|(_, t)| t.clone()).filter(|t| !t.is_empty()),
                });
            }
        }

        out
    }

    /// Greedy accumulation with trailing-sentence overlap. Returns groups
    /// of sentences, one per emitted chunk.
    fn group_sentences(&self, sentences: &[String]) -> Vec<Vec<String>> {
        let mut groups = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for sentence in sentences {
            let added_len = sentence.chars().count() + 1;
            if !current.is_empty() && current_len + added_len > self.target_chars {
                groups.push(current.clone());
                let overlap_start = current.len().saturating_sub(self.overlap_sentences);
                current = current[overlap_start..].to_vec();
                current_len = current.iter().map(|s| s.chars().count() + 1).sum();
            }
            current.push(sentence.clone());
            current_len += added_len;
        }

        if !current.is_empty() {
            groups.push(current);
        }

        groups
    }
}

/// Split on `[[PAGE:n]]` markers. Text with no markers is treated as a
/// single unnumbered page (`page: None`).
fn split_pages(text: &str) -> Vec<(Option<i64>, String)> {
    if !text.contains("[[PAGE:") {
        return vec![(None, text.to_string())];
    }

    let mut pages = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("[[PAGE:") {
        if start > 0 {
            // leading text before the first marker: attach to page None
            let prefix = &rest[..start];
            if !prefix.trim().is_empty() {
                pages.push((None, prefix.to_string()));
            }
        }
        let after_marker = &rest[start + "[[PAGE:".len()..];
        let end_bracket = match after_marker.find("]]") {
            Some(i) => i,
            None => break,
        };
        let num: Option<i64> = after_marker[..end_bracket].trim().parse().ok();
        let body_start = end_bracket + "]]".len();
        let next_marker_rel = after_marker[body_start..].find("[[PAGE:");
        let (body, remainder) = match next_marker_rel {
            Some(rel) => (
                &after_marker[body_start..body_start + rel],
                &after_marker[body_start + rel..],
            ),
            None => (&after_marker[body_start..], ""),
        };
        pages.push((num, body.to_string()));
        rest = remainder;
        if remainder.is_empty() {
            break;
        }
    }

    pages
}

/// Tabular path (C2): first row is header, remaining rows are one chunk
/// each. Returns `(normalized_columns, row_chunks)`; a tabular document's
/// chunks carry no chapter metadata.
pub fn chunk_rows(rows: &[String]) -> (Vec<String>, Vec<String>) {
    if rows.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let header_fields = parse_delimited_row(&rows[0], ',');
    let columns: Vec<String> = header_fields.iter().map(|h| normalize_header(h)).collect();
    let row_chunks: Vec<String> = rows[1..].to_vec();
    (columns, row_chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_accumulates_until_target() {
        let chunker = TextChunker::new(30, 1);
        let text = "Hello world. This is Sparta! Really? Yes indeed.";
        let chunks = chunker.chunk_text(text);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.page.is_none()));
    }

    #[test]
    fn overlap_repeats_trailing_sentences() {
        let chunker = TextChunker::new(25, 1);
        let text = "One sentence here. Second one follows. Third comes next. Fourth is last.";
        let chunks = chunker.chunk_text(text);
        assert!(chunks.len() >= 2);
        // the second chunk should start with the last sentence of the first
        let first_last_sentence = chunks[0].content.split(' ').last();
        assert!(chunks[1].content.contains(first_last_sentence.unwrap_or("")));
    }

    #[test]
    fn pages_carry_distinct_chapters() {
        let text = "[[PAGE:1]]\nChapter 1. Intro\nFirst page text here. More words follow.\n\
                    [[PAGE:2]]\nChapter 2: Setup\nSecond page text here. More words follow.";
        let chunker = TextChunker::new(1400, 2);
        let chunks = chunker.chunk_text(text);
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks[0].chapter_num, Some(1));
        assert_eq!(chunks[0].chapter_title.as_deref(), Some("Intro"));
        let second_page_chunk = chunks.iter().find(|c| c.page == Some(2)).unwrap();
        assert_eq!(second_page_chunk.chapter_num, Some(2));
        assert_eq!(second_page_chunk.chapter_title.as_deref(), Some("Setup"));
    }

    #[test]
    fn tabular_header_is_normalized_and_rows_pass_through() {
        let rows = vec![
            "Employee_Name,Department,Salary".to_string(),
            "\"Akinkuolie, Sarah\",Engineering,95000".to_string(),
        ];
        let (columns, row_chunks) = chunk_rows(&rows);
        assert_eq!(columns, vec!["employee_name", "department", "salary"]);
        assert_eq!(row_chunks.len(), 1);
        assert!(row_chunks[0].contains("Akinkuolie, Sarah"));
    }
}
