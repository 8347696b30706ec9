use super::knowledgebase::KnowledgeFile;
use super::TextSegment;
use crate::error::{RagError, Result};
use pdf_extract::extract_text;
use std::fs;
use std::path::Path;

/// Extensions accepted into a knowledgebase, lowercase and without the dot.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "md", "mdx", "pdf"];

/// Separators tried in order when a piece of text is longer than a chunk.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Turns a stored file into plain text.
pub trait TextExtractor: Send + Sync {
    fn read(&self, file: &KnowledgeFile) -> Result<String>;
}

/// Reads PDFs through `pdf-extract` and everything else as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTextExtractor;

impl TextExtractor for FileTextExtractor {
    fn read(&self, file: &KnowledgeFile) -> Result<String> {
        let extraction = |message: String| RagError::Extraction {
            file_name: file.name.clone(),
            message,
        };

        match file_extension(&file.name).as_str() {
            "pdf" => extract_text(&file.path)
                .map_err(|e| extraction(format!("Failed to extract PDF text: {}", e))),
            _ => fs::read_to_string(&file.path)
                .map_err(|e| extraction(format!("Failed to read file: {}", e))),
        }
    }
}

/// Lowercased extension of `file_name`, or an empty string.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

pub fn is_supported_file(file_name: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&file_extension(file_name).as_str())
}

/// Chunks a file's text into segments tagged with the file name.
pub fn segment_document(
    file_name: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<TextSegment> {
    chunk_text(text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| TextSegment::from_file(chunk, file_name, i))
        .collect()
}

/// Splits text into chunks of at most `chunk_size` characters.
///
/// Text is cut at paragraph breaks first, then line breaks, sentence ends and
/// spaces, falling back to fixed character windows. The pieces are merged
/// back up to `chunk_size`, and each new chunk starts with up to `overlap`
/// characters from the end of the previous one.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size - 1);

    let mut pieces = Vec::new();
    split_recursive(text, chunk_size, &SEPARATORS, &mut pieces);
    merge_pieces(&pieces, chunk_size, overlap)
}

fn split_recursive<'a>(text: &'a str, chunk_size: usize, separators: &[&str], out: &mut Vec<&'a str>) {
    if char_len(text) <= chunk_size {
        out.push(text);
        return;
    }

    let Some((separator, rest)) = separators.split_first() else {
        out.extend(char_windows(text, chunk_size));
        return;
    };

    for piece in split_keeping_separator(text, separator) {
        split_recursive(piece, chunk_size, rest, out);
    }
}

fn merge_pieces(pieces: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(piece);
        if current_len > 0 && current_len + piece_len > chunk_size {
            let carried = tail_chars(&current, overlap.min(chunk_size - piece_len));
            push_chunk(&mut chunks, &current);
            current_len = char_len(&carried);
            current = carried;
        }
        current.push_str(piece);
        current_len += piece_len;
    }
    push_chunk(&mut chunks, &current);

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Splits at `separator`, leaving it attached to the preceding piece.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

fn char_windows(text: &str, size: usize) -> Vec<&str> {
    let mut windows = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            windows.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        windows.push(&text[start..]);
    }

    windows
}

fn tail_chars(text: &str, n: usize) -> String {
    let len = char_len(text);
    if n == 0 {
        return String::new();
    }
    if n >= len {
        return text.to_string();
    }
    text.char_indices()
        .nth(len - n)
        .map(|(idx, _)| text[idx..].to_string())
        .unwrap_or_default()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
