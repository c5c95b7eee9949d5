//! Two-stage document splitter.
//!
//! Stage one cuts on section headers (`"\n## "`) with a large window so
//! section boundaries survive; stage two cuts each section on line breaks
//! with the tighter window embeddings want. Sizes and overlaps are measured
//! in characters, and every chunk records its absolute character offset so
//! the overlap-stripped concatenation reconstructs the source exactly.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::KnowledgeBaseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    /// Position in the emitted sequence.
    pub source_order: usize,
    /// Absolute character offset of `text` in the source document.
    pub start_offset: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    coarse_chunk_size: usize,
    coarse_overlap: usize,
    fine_chunk_size: usize,
    fine_overlap: usize,
}

impl Chunker {
    pub fn new(config: &KnowledgeBaseConfig) -> Self {
        Self {
            coarse_chunk_size: config.coarse_chunk_size,
            coarse_overlap: config.coarse_overlap,
            fine_chunk_size: config.fine_chunk_size,
            fine_overlap: config.fine_overlap,
        }
    }

    pub fn split(&self, text: &str) -> Vec<DocumentChunk> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let coarse = split_windows(&chars, 0, "\n## ", self.coarse_chunk_size, self.coarse_overlap);

        let mut chunks = Vec::new();
        for block in coarse {
            let fine = split_windows(
                &chars[block.clone()],
                block.start,
                "\n",
                self.fine_chunk_size,
                self.fine_overlap,
            );
            for window in fine {
                chunks.push(DocumentChunk {
                    text: chars[window.clone()].iter().collect(),
                    source_order: chunks.len(),
                    start_offset: window.start,
                });
            }
        }

        chunks
    }
}

/// Split `chars` on `separator` and regroup the parts into windows of at most
/// `size` characters, re-including up to `overlap` characters of whole
/// trailing parts in the next window. Returned ranges are absolute (`base` is
/// added) and their union covers the input.
fn split_windows(
    chars: &[char],
    base: usize,
    separator: &str,
    size: usize,
    overlap: usize,
) -> Vec<Range<usize>> {
    let parts = split_parts(chars, separator);
    let mut windows = Vec::new();

    let mut i = 0;
    while i < parts.len() {
        // A single part larger than the window gets hard character windows.
        if parts[i].len() > size {
            let part = parts[i].clone();
            let step = size.saturating_sub(overlap).max(1);
            let mut start = part.start;
            loop {
                let end = (start + size).min(part.end);
                windows.push(base + start..base + end);
                if end == part.end {
                    break;
                }
                start += step;
            }
            i += 1;
            continue;
        }

        // Grow the window part by part while it fits.
        let mut j = i;
        let mut len = 0;
        while j < parts.len() && len + parts[j].len() <= size {
            len += parts[j].len();
            j += 1;
        }

        windows.push(base + parts[i].start..base + parts[j - 1].end);

        if j >= parts.len() {
            break;
        }

        // Back off whole parts into the overlap budget, keeping progress.
        let mut next = j;
        let mut carried = 0;
        while next > i + 1 {
            let part_len = parts[next - 1].len();
            if carried + part_len > overlap {
                break;
            }
            carried += part_len;
            next -= 1;
        }
        i = next;
    }

    windows
}

/// Cut `chars` into contiguous parts at each occurrence of `separator`,
/// attaching the separator to the part it introduces. Concatenating the
/// parts yields the input.
fn split_parts(chars: &[char], separator: &str) -> Vec<Range<usize>> {
    let sep: Vec<char> = separator.chars().collect();
    let mut boundaries = vec![0];

    if !sep.is_empty() && chars.len() >= sep.len() {
        let mut pos = 1; // a separator at offset 0 starts no new part
        while pos + sep.len() <= chars.len() {
            if chars[pos..pos + sep.len()] == sep[..] {
                boundaries.push(pos);
                pos += sep.len();
            } else {
                pos += 1;
            }
        }
    }

    boundaries.push(chars.len());
    boundaries
        .windows(2)
        .filter(|pair| pair[0] < pair[1])
        .map(|pair| pair[0]..pair[1])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_chunker() -> Chunker {
        Chunker::new(&KnowledgeBaseConfig::default())
    }

    fn small_chunker() -> Chunker {
        Chunker::new(&KnowledgeBaseConfig {
            coarse_chunk_size: 60,
            coarse_overlap: 20,
            fine_chunk_size: 25,
            fine_overlap: 8,
            default_k: 3,
        })
    }

    /// Strip injected overlap and rebuild the document from chunk offsets.
    fn reconstruct(source: &str, chunks: &[DocumentChunk]) -> String {
        let mut sorted: Vec<&DocumentChunk> = chunks.iter().collect();
        sorted.sort_by_key(|c| (c.start_offset, c.text.chars().count()));

        let source_chars: Vec<char> = source.chars().collect();
        let mut out = String::new();
        let mut covered = 0;
        for chunk in sorted {
            let len = chunk.text.chars().count();
            let end = chunk.start_offset + len;
            if end <= covered {
                continue;
            }
            let from = covered.max(chunk.start_offset);
            out.extend(&source_chars[from..end]);
            covered = end;
        }
        out
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(default_chunker().split("").is_empty());
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunks = default_chunker().split("个人简介\n热爱编程");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "个人简介\n热爱编程");
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn sectioned_document_reconstructs_losslessly() {
        let mut doc = String::from("## 教育经历\n成都某大学 计算机学院\n主修课程：数据结构、操作系统\n");
        doc.push_str("\n## 项目经历\n问答系统：负责检索模块和路由逻辑的设计与实现\n模型微调：整理语料并完成训练脚本\n");
        doc.push_str("\n## 技能清单\n熟悉 Python 与 Rust\n了解常见的向量检索方案\n");

        let chunks = small_chunker().split(&doc);
        assert!(chunks.len() > 2);
        assert_eq!(reconstruct(&doc, &chunks), doc);
    }

    #[test]
    fn chunk_length_is_bounded_by_the_fine_window() {
        let doc = "第一行内容比较短\n第二行也不长\n第三行同样很短\n第四行结束".repeat(4);
        let chunks = small_chunker().split(&doc);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 25, "oversized: {:?}", chunk.text);
        }
    }

    #[test]
    fn separator_free_text_falls_back_to_fixed_windows() {
        let doc: String = std::iter::repeat('甲').take(120).collect();
        let chunks = small_chunker().split(&doc);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&doc, &chunks), doc);
    }

    #[test]
    fn adjacent_chunks_share_overlap_within_a_block() {
        let doc = "aaaa\nbbbb\ncccc\ndddd\neeee\nffff\ngggg\nhhhh";
        let chunks = small_chunker().split(doc);
        assert!(chunks.len() >= 2);
        // The second window starts before the first one ends.
        assert!(chunks[1].start_offset < chunks[0].start_offset + chunks[0].text.chars().count());
    }

    #[test]
    fn source_order_is_sequential() {
        let doc = "一\n二\n三\n".repeat(30);
        let chunks = small_chunker().split(&doc);
        for (idx, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source_order, idx);
        }
    }
}
