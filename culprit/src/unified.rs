use std::ops::Range;

use gix::bstr::BString;
use gix::diff::blob::{
    intern::{InternedInput, Token},
    Sink,
};

/// Renders diff output as unified-diff text at a configurable context
/// width. Changes separated by at most `2 * context` unchanged lines are
/// merged into one hunk, as the classic diff machinery does.
pub(crate) struct UnifiedSink<'a> {
    input: &'a InternedInput<&'a [u8]>,
    context: u32,
    out: BString,
    hunk: BString,
    before_hunk_start: u32,
    after_hunk_start: u32,
    before_next: u32,
    after_next: u32,
    pending: bool,
}

impl<'a> UnifiedSink<'a> {
    pub(crate) fn new(input: &'a InternedInput<&'a [u8]>, context: u32) -> Self {
        Self {
            input,
            context,
            out: BString::default(),
            hunk: BString::default(),
            before_hunk_start: 0,
            after_hunk_start: 0,
            before_next: 0,
            after_next: 0,
            pending: false,
        }
    }

    fn push_line(&mut self, sign: u8, token: Token) {
        let line = self.input.interner[token];
        self.hunk.push(sign);
        self.hunk.extend_from_slice(line);
        if !line.ends_with(b"\n") {
            self.hunk.push(b'\n');
        }
    }

    fn push_context(&mut self, range: Range<u32>) {
        for i in range {
            let token = self.input.before[i as usize];
            self.push_line(b' ', token);
        }
    }

    fn flush(&mut self) {
        if !self.pending {
            return;
        }
        let trail = self
            .context
            .min(self.input.before.len() as u32 - self.before_next);
        self.push_context(self.before_next..self.before_next + trail);

        let before_len = self.before_next + trail - self.before_hunk_start;
        let after_len = self.after_next + trail - self.after_hunk_start;
        // an empty side names the line before the gap, so no +1 there
        let before_off = self.before_hunk_start + u32::from(before_len != 0);
        let after_off = self.after_hunk_start + u32::from(after_len != 0);
        self.out.extend_from_slice(
            format!("@@ -{before_off},{before_len} +{after_off},{after_len} @@\n").as_bytes(),
        );
        self.out.extend_from_slice(&self.hunk);
        self.hunk.clear();
        self.pending = false;
    }
}

impl<'a> Sink for UnifiedSink<'a> {
    type Out = BString;

    fn process_change(&mut self, before: Range<u32>, after: Range<u32>) {
        if self.pending && before.start - self.before_next > 2 * self.context {
            self.flush();
        }
        if !self.pending {
            let lead = self.context.min(before.start).min(after.start);
            self.before_hunk_start = before.start - lead;
            self.after_hunk_start = after.start - lead;
            self.before_next = self.before_hunk_start;
            self.after_next = self.after_hunk_start;
            self.pending = true;
        }
        self.push_context(self.before_next..before.start);
        for i in before.clone() {
            let token = self.input.before[i as usize];
            self.push_line(b'-', token);
        }
        for i in after.clone() {
            let token = self.input.after[i as usize];
            self.push_line(b'+', token);
        }
        self.before_next = before.end;
        self.after_next = after.end;
    }

    fn finish(mut self) -> Self::Out {
        self.flush();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gix::diff::blob::{diff, Algorithm};
    use pretty_assertions::assert_eq;

    fn unified(pre: &[u8], post: &[u8], context: u32) -> String {
        let input = InternedInput::new(pre, post);
        let out = diff(Algorithm::Histogram, &input, UnifiedSink::new(&input, context));
        out.to_string()
    }

    #[test]
    fn no_context() {
        let text = unified(b"a\nb\nc\n", b"a\nB\nc\nd\n", 0);
        assert_eq!(text, "@@ -2,1 +2,1 @@\n-b\n+B\n@@ -3,0 +4,1 @@\n+d\n");
    }

    #[test]
    fn context_lines_and_hunk_merging() {
        // the two changes are two unchanged lines apart: at context 1 they
        // share a hunk, the inner lines becoming context
        let text = unified(b"a\nb\nc\nd\ne\nf\n", b"a\nB\nc\nd\nE\nf\n", 1);
        assert_eq!(
            text,
            "@@ -1,6 +1,6 @@\n a\n-b\n+B\n c\n d\n-e\n+E\n f\n"
        );
    }

    #[test]
    fn distant_changes_stay_separate() {
        let text = unified(b"a\nb\nc\nd\ne\nf\ng\n", b"A\nb\nc\nd\ne\nf\nG\n", 1);
        assert_eq!(
            text,
            "@@ -1,2 +1,2 @@\n-a\n+A\n b\n@@ -6,2 +6,2 @@\n f\n-g\n+G\n"
        );
    }

    #[test]
    fn missing_final_newline_is_terminated() {
        let text = unified(b"a\nb", b"a\nc", 0);
        assert_eq!(text, "@@ -2,1 +2,1 @@\n-b\n+c\n");
    }

    #[test]
    fn identical_inputs_produce_nothing() {
        assert_eq!(unified(b"a\nb\n", b"a\nb\n", 3), "");
    }
}
