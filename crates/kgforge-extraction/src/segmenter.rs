use kgforge_core::document::{Chunk, Sentence};

const PARAGRAPH_BREAK: &str = "\n\n";
const SENTENCE_TERMINALS: [char; 3] = ['。', '！', '？'];

/// Splits document text into bounded chunks and chunks into sentences.
///
/// Chunks are built by greedily packing blank-line separated paragraphs,
/// rejoined with a blank line, up to `max_chunk_chars` characters. A paragraph
/// that alone exceeds the budget is packed sentence by sentence, and a single
/// sentence over the budget is cut at the character limit, so no chunk is ever
/// longer than the budget. There is no overlap between chunks.
#[derive(Debug, Clone)]
pub struct Segmenter {
    max_chunk_chars: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Segmenter {
    pub fn new(max_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars: max_chunk_chars.max(1),
        }
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        let text = text.replace("\r\n", "\n");
        let max = self.max_chunk_chars;

        let mut pieces: Vec<String> = Vec::new();
        let mut buffer = String::new();

        for paragraph in text.split(PARAGRAPH_BREAK).map(str::trim).filter(|p| !p.is_empty()) {
            let para_len = char_len(paragraph);

            if para_len > max {
                if !buffer.is_empty() {
                    pieces.push(std::mem::take(&mut buffer));
                }
                pieces.extend(self.split_oversized(paragraph));
                continue;
            }

            if buffer.is_empty() {
                buffer.push_str(paragraph);
            } else if char_len(&buffer) + PARAGRAPH_BREAK.len() + para_len <= max {
                buffer.push_str(PARAGRAPH_BREAK);
                buffer.push_str(paragraph);
            } else {
                pieces.push(std::mem::replace(&mut buffer, paragraph.to_string()));
            }
        }

        if !buffer.is_empty() {
            pieces.push(buffer);
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { index, text })
            .collect()
    }

    /// Decompose chunks into sentences, numbering them across the whole sequence.
    pub fn sentences(&self, chunks: &[Chunk]) -> Vec<Sentence> {
        let mut ordinal = 0;
        let mut sentences = Vec::new();
        for chunk in chunks {
            for text in split_sentences(&chunk.text) {
                ordinal += 1;
                sentences.push(Sentence {
                    ordinal,
                    chunk_index: chunk.index,
                    text: text.to_string(),
                });
            }
        }
        sentences
    }

    fn split_oversized(&self, paragraph: &str) -> Vec<String> {
        let max = self.max_chunk_chars;
        let mut out = Vec::new();
        let mut buffer = String::new();

        for sentence in split_sentences(paragraph) {
            let sentence_len = char_len(sentence);
            if sentence_len > max {
                if !buffer.is_empty() {
                    out.push(std::mem::take(&mut buffer));
                }
                out.extend(hard_split(sentence, max));
            } else if char_len(&buffer) + sentence_len <= max {
                buffer.push_str(sentence);
            } else {
                out.push(std::mem::replace(&mut buffer, sentence.to_string()));
            }
        }

        if !buffer.is_empty() {
            out.push(buffer);
        }
        out
    }
}

/// Split after each sentence-final mark. Pieces are trimmed and blanks dropped;
/// trailing text without a terminal mark is kept as its own sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if SENTENCE_TERMINALS.contains(&c) {
            let end = i + c.len_utf8();
            sentences.push(&text[start..end]);
            start = end;
        }
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
