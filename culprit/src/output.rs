use std::collections::{HashMap, HashSet};
use std::io::Write;

use gix::ObjectId;
use time::macros::format_description;

use crate::{
    error::Result,
    scoreboard::{ent_score, Scoreboard},
};

/// Output mode toggles shared by both emitters.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputOptions {
    /// `git annotate`-style tab-separated fields.
    pub annotate_compat: bool,
    /// Full 40-character commit names instead of 8.
    pub long_object_names: bool,
    /// Raw unix timestamps instead of formatted dates.
    pub raw_timestamps: bool,
    /// Show the path the line came from.
    pub show_name: bool,
    /// Show the line number in the suspect's file.
    pub show_number: bool,
    /// Show each entry's content score.
    pub show_score: bool,
}

#[derive(Clone, Debug)]
struct CommitInfo {
    author: String,
    author_mail: String,
    author_time: i64,
    author_tz_offset: i32,
    author_tz: String,
    committer: String,
    committer_mail: String,
    committer_time: i64,
    committer_tz: String,
    summary: String,
}

/// Per-run output state: demand-loaded commit metadata plus the column
/// widths computed by the alignment pass.
#[derive(Default)]
struct FormatState {
    opts: OutputOptions,
    info: HashMap<ObjectId, CommitInfo>,
    shown: HashSet<ObjectId>,
    multi_path: HashSet<ObjectId>,
    longest_file: usize,
    longest_author: usize,
    max_orig_digits: usize,
    max_digits: usize,
    max_score_digits: usize,
}

impl FormatState {
    fn commit_info(&mut self, sb: &Scoreboard<'_>, id: ObjectId) -> Result<&CommitInfo> {
        if !self.info.contains_key(&id) {
            let commit = sb.repo.find_object(id)?.try_into_commit()?;
            let author = commit.author()?;
            let committer = commit.committer()?;
            let summary = commit.message()?.summary().to_string();
            self.info.insert(
                id,
                CommitInfo {
                    author: author.name.to_string(),
                    author_mail: format!("<{}>", author.email),
                    author_time: author.time.seconds,
                    author_tz_offset: author.time.offset,
                    author_tz: tz_string(author.time.offset),
                    committer: committer.name.to_string(),
                    committer_mail: format!("<{}>", committer.email),
                    committer_time: committer.time.seconds,
                    committer_tz: tz_string(committer.time.offset),
                    summary,
                },
            );
        }
        Ok(&self.info[&id])
    }

    fn format_time(&self, time: i64, tz_offset: i32, tz: &str) -> String {
        if self.opts.raw_timestamps {
            return format!("{time} {tz}");
        }
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let stamp = time::OffsetDateTime::from_unix_timestamp(time)
            .unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
            .to_offset(time::UtcOffset::from_whole_seconds(tz_offset).unwrap_or(time::UtcOffset::UTC));
        let formatted = stamp.format(&format).unwrap_or_default();
        format!("{formatted} {tz}")
    }
}

fn tz_string(offset_seconds: i32) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let offset = offset_seconds.unsigned_abs();
    format!("{sign}{:02}{:02}", offset / 3600, (offset % 3600) / 60)
}

/// `1 + floor(log10(n))` for positive `n`; 1 for zero.
fn decimal_width(mut n: u32) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}

/// Emit the machine-readable format, one block per entry in line order.
/// Commit metadata appears the first time a commit is printed; commits that
/// show up under more than one path get a `filename` line on every block.
pub fn emit_porcelain(sb: &Scoreboard<'_>, out: &mut dyn Write) -> Result<()> {
    let mut state = FormatState::default();
    let ents = sb.entries();
    for (i, e) in ents.iter().enumerate() {
        for other in &ents[i + 1..] {
            if other.suspect.commit == e.suspect.commit && other.suspect.path != e.suspect.path {
                state.multi_path.insert(e.suspect.commit);
                break;
            }
        }
    }

    for e in ents {
        let commit = e.suspect.commit;
        let hex = commit.to_hex().to_string();
        writeln!(out, "{hex} {} {} {}", e.s_lno + 1, e.lno + 1, e.num_lines)?;
        if state.shown.insert(commit) {
            let ci = state.commit_info(sb, commit)?.clone();
            writeln!(out, "author {}", ci.author)?;
            writeln!(out, "author-mail {}", ci.author_mail)?;
            writeln!(out, "author-time {}", ci.author_time)?;
            writeln!(out, "author-tz {}", ci.author_tz)?;
            writeln!(out, "committer {}", ci.committer)?;
            writeln!(out, "committer-mail {}", ci.committer_mail)?;
            writeln!(out, "committer-time {}", ci.committer_time)?;
            writeln!(out, "committer-tz {}", ci.committer_tz)?;
            writeln!(out, "filename {}", e.suspect.path)?;
            writeln!(out, "summary {}", ci.summary)?;
        } else if state.multi_path.contains(&commit) {
            writeln!(out, "filename {}", e.suspect.path)?;
        }
        for line in 0..e.num_lines {
            if line > 0 {
                writeln!(out, "{hex} {} {}", e.s_lno + 1 + line, e.lno + 1 + line)?;
            }
            out.write_all(b"\t")?;
            out.write_all(sb.line_bytes(e.lno + line, 1))?;
        }
    }
    Ok(())
}

/// Emit the human-readable format. The alignment pass runs first so author,
/// path, line-number and score columns line up across the whole output.
pub fn emit_human(
    sb: &mut Scoreboard<'_>,
    opts: OutputOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let mut state = FormatState {
        opts,
        ..Default::default()
    };
    find_alignment(sb, &mut state)?;

    for i in 0..sb.entries().len() {
        let e = sb.entries()[i].clone();
        let commit = e.suspect.commit;
        let ci = state.commit_info(sb, commit)?.clone();
        let hex = commit
            .to_hex_with_len(if state.opts.long_object_names { 40 } else { 8 })
            .to_string();
        let path = e.suspect.path.to_string();
        let time = state.format_time(ci.author_time, ci.author_tz_offset, &ci.author_tz);

        for line in 0..e.num_lines {
            write!(out, "{hex}")?;
            if state.opts.annotate_compat {
                write!(out, "\t({:>10}\t{:>10}\t{})", ci.author, time, e.lno + 1 + line)?;
            } else {
                if state.opts.show_score {
                    write!(out, " {:width$}", e.score, width = state.max_score_digits)?;
                }
                if state.opts.show_name {
                    write!(out, " {:<width$}", path, width = state.longest_file)?;
                }
                if state.opts.show_number {
                    write!(
                        out,
                        " {:width$}",
                        e.s_lno + 1 + line,
                        width = state.max_orig_digits
                    )?;
                }
                write!(
                    out,
                    " ({:<author_width$} {:>10} {:line_width$}) ",
                    ci.author,
                    time,
                    e.lno + 1 + line,
                    author_width = state.longest_author,
                    line_width = state.max_digits
                )?;
            }
            out.write_all(sb.line_bytes(e.lno + line, 1))?;
        }
    }
    Ok(())
}

/// One pass over the entries to compute column widths, force the filename
/// column on when blame crossed a rename or copy, and warm the score cache.
fn find_alignment(sb: &mut Scoreboard<'_>, state: &mut FormatState) -> Result<()> {
    let mut longest_src_lines = 0;
    let mut longest_dst_lines = 0;
    let mut largest_score = 0;

    for i in 0..sb.entries().len() {
        let suspect = sb.entries()[i].suspect.clone();
        if state.shown.insert(suspect.commit) {
            let author_len = state.commit_info(sb, suspect.commit)?.author.len();
            if suspect.path != sb.path {
                state.opts.show_name = true;
            }
            state.longest_file = state.longest_file.max(suspect.path.len());
            state.longest_author = state.longest_author.max(author_len);
        }
        let score = {
            let (buf, lines) = (&sb.final_buf, &sb.lines);
            let e = sb.ents.get_mut(i);
            longest_src_lines = longest_src_lines.max(e.s_lno + e.num_lines);
            longest_dst_lines = longest_dst_lines.max(e.lno + e.num_lines);
            ent_score(buf, lines, e)
        };
        largest_score = largest_score.max(score);
    }
    state.shown.clear();

    state.max_orig_digits = decimal_width(longest_src_lines);
    state.max_digits = decimal_width(longest_dst_lines);
    state.max_score_digits = decimal_width(largest_score);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decimal_widths() {
        assert_eq!(decimal_width(0), 1);
        assert_eq!(decimal_width(9), 1);
        assert_eq!(decimal_width(10), 2);
        assert_eq!(decimal_width(99), 2);
        assert_eq!(decimal_width(100), 3);
    }

    #[test]
    fn timezone_strings() {
        assert_eq!(tz_string(0), "+0000");
        assert_eq!(tz_string(3600), "+0100");
        assert_eq!(tz_string(-4 * 3600 - 1800), "-0430");
        assert_eq!(tz_string(5 * 3600 + 1800), "+0530");
    }
}
