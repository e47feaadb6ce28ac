use gix::bstr::ByteSlice;
use gix::diff::blob::{diff, intern::InternedInput, Algorithm};

use crate::unified::UnifiedSink;

/// One divergence record from a unified diff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Chunk {
    /// Postimage line up to which pre and post are the same.
    pub same: u32,
    /// Preimage line number after this chunk.
    pub p_next: u32,
    /// Postimage line number after this chunk.
    pub t_next: u32,
}

/// The chunks of one pre/post comparison, in postimage order.
#[derive(Debug, Default)]
pub(crate) struct Patch {
    chunks: Vec<Chunk>,
}

impl Patch {
    /// Diff two buffers and digest the resulting unified diff. `context` is
    /// 0 for plain blame propagation and 1 for the move/copy search.
    pub(crate) fn generate(pre: &[u8], post: &[u8], context: u32) -> Self {
        let input = InternedInput::new(pre, post);
        let text = diff(
            Algorithm::Histogram,
            &input,
            UnifiedSink::new(&input, context),
        );
        Self::parse(text.as_ref())
    }

    /// Digest unified-diff text into chunks.
    ///
    /// Hunk offsets are 1-based in the text and 0-based here. Context lines
    /// at the start of a hunk push `same` forward; context lines at its end
    /// pull `p_next`/`t_next` back, so `same..t_next` spans exactly the
    /// divergent postimage lines. A hunk header that does not parse is
    /// dropped.
    pub(crate) fn parse(text: &[u8]) -> Self {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut post_context = 0u32;
        let mut in_pre_context = false;

        for line in text.lines() {
            if line.len() >= 4 && line.starts_with(b"@@") {
                if let Some(last) = chunks.last_mut() {
                    last.p_next -= post_context;
                    last.t_next -= post_context;
                }
                post_context = 0;
                in_pre_context = false;
                let Some((off1, len1, off2, len2)) = parse_hunk_header(line) else {
                    continue;
                };
                // line numbers in patch output are one based
                let off1 = i64::from(off1) - 1;
                let off2 = i64::from(off2) - 1;
                let same = if len2 != 0 { off2 } else { off2 + 1 };
                chunks.push(Chunk {
                    same: same as u32,
                    p_next: (off1 + i64::from(len1.max(1))) as u32,
                    t_next: (same + i64::from(len2)) as u32,
                });
                in_pre_context = true;
            } else if in_pre_context && line.first() == Some(&b' ') {
                if let Some(last) = chunks.last_mut() {
                    last.same += 1;
                }
            } else {
                in_pre_context = false;
                if line.first() == Some(&b' ') {
                    post_context += 1;
                } else {
                    post_context = 0;
                }
            }
        }
        if let Some(last) = chunks.last_mut() {
            last.p_next -= post_context;
            last.t_next -= post_context;
        }

        Self { chunks }
    }

    pub(crate) fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// Parse `@@ -off1[,len1] +off2[,len2] @@`; lengths default to 1.
fn parse_hunk_header(line: &[u8]) -> Option<(u32, u32, u32, u32)> {
    let rest = line.strip_prefix(b"@@ -")?;
    let (off1, len1, rest) = parse_range(rest)?;
    let rest = rest.strip_prefix(b" +")?;
    let (off2, len2, rest) = parse_range(rest)?;
    rest.strip_prefix(b" @@")?;
    Some((off1, len1, off2, len2))
}

fn parse_range(bytes: &[u8]) -> Option<(u32, u32, &[u8])> {
    let (off, rest) = parse_number(bytes)?;
    match rest.strip_prefix(b",") {
        Some(rest) => {
            let (len, rest) = parse_number(rest)?;
            Some((off, len, rest))
        }
        None => Some((off, 1, rest)),
    }
}

fn parse_number(bytes: &[u8]) -> Option<(u32, &[u8])> {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let mut value = 0u32;
    for b in &bytes[..digits] {
        value = value.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }
    Some((value, &bytes[digits..]))
}
