use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use gix::{bstr::BString, ObjectId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use culprit::{emit_human, emit_porcelain, read_ancestry, BlameOptions, OutputOptions, Scoreboard};

const DEFAULT_MOVE_SCORE: u32 = 20;
const DEFAULT_COPY_SCORE: u32 = 40;

/// Annotate each line of a file with the commit that last changed it.
#[derive(Parser)]
#[command(name = "culprit", version, about)]
struct Cli {
    /// Use the same output mode as git-annotate
    #[arg(short = 'c')]
    compatibility: bool,

    /// Show long commit SHA1
    #[arg(short = 'l', long = "long")]
    long: bool,

    /// Show raw timestamp
    #[arg(short = 't', long = "time")]
    time: bool,

    /// Show original filename
    #[arg(short = 'f', long = "show-name")]
    show_name: bool,

    /// Show original linenumber
    #[arg(short = 'n', long = "show-number")]
    show_number: bool,

    /// Show in a format designed for machine consumption
    #[arg(short = 'p', long = "porcelain")]
    porcelain: bool,

    /// Include each entry's content score in the output
    #[arg(long = "score-debug")]
    score_debug: bool,

    /// Process only line range n,m, counting from 1
    #[arg(short = 'L', value_name = "n,m")]
    line_range: Option<String>,

    /// Find line movements within the file, with an optional score threshold
    #[arg(short = 'M', value_name = "score", num_args = 0..=1, default_missing_value = "0")]
    detect_moves: Option<u32>,

    /// Find lines copied from other files; give twice to also inspect
    /// files the commit did not touch
    #[arg(
        short = 'C',
        value_name = "score",
        num_args = 0..=1,
        default_missing_value = "0",
        action = clap::ArgAction::Append
    )]
    detect_copies: Vec<u32>,

    /// Use ancestry from this file (one `commit parent…` line each) instead
    /// of the commits' real parents
    #[arg(short = 'S', value_name = "file")]
    ancestry: Option<PathBuf>,

    /// Revisions (`rev`, `^rev`, `a..b`) and the path to annotate; the path
    /// may also follow a `--`
    #[arg(value_name = "args")]
    args: Vec<String>,

    #[arg(last = true, value_name = "path", hide = true)]
    after_dashdash: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let repo = gix::discover(".").context("not inside a git repository")?;

    let (revs, path) = split_positionals(&cli)?;
    let (final_commit, uninteresting) = resolve_revisions(&repo, &revs)?;

    let range = cli
        .line_range
        .as_deref()
        .map(parse_line_range)
        .transpose()?;
    let move_score = cli
        .detect_moves
        .map(|score| if score == 0 { DEFAULT_MOVE_SCORE } else { score });
    let copy_score = (!cli.detect_copies.is_empty()).then(|| {
        cli.detect_copies
            .iter()
            .copied()
            .find(|score| *score != 0)
            .unwrap_or(DEFAULT_COPY_SCORE)
    });
    // -C implies -M
    let move_score = if copy_score.is_some() {
        move_score.or(Some(DEFAULT_MOVE_SCORE))
    } else {
        move_score
    };
    let opts = BlameOptions {
        move_score,
        copy_score,
        copy_harder: cli.detect_copies.len() > 1,
        max_age: None,
        range,
    };

    let repo_relative = repo_relative_path(&repo, &path);
    let mut sb = Scoreboard::new(&repo, final_commit, repo_relative.as_ref(), opts)
        .with_context(|| format!("cannot blame {path}"))?;
    sb.set_uninteresting(uninteresting);
    if let Some(file) = &cli.ancestry {
        let grafts = read_ancestry(file)
            .with_context(|| format!("reading graft file {} failed", file.display()))?;
        sb.set_grafts(grafts);
    }

    sb.assign_blame()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if cli.porcelain {
        emit_porcelain(&sb, &mut out)?;
    } else {
        let opts = OutputOptions {
            annotate_compat: cli.compatibility,
            long_object_names: cli.long,
            raw_timestamps: cli.time,
            show_name: cli.show_name,
            show_number: cli.show_number,
            show_score: cli.score_debug,
        };
        emit_human(&mut sb, opts, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

/// Sort the positional arguments into revisions and the one path. With a
/// `--` the split is explicit; without one, whichever of the two trailing
/// arguments exists in the working tree is the path.
fn split_positionals(cli: &Cli) -> anyhow::Result<(Vec<String>, String)> {
    if !cli.after_dashdash.is_empty() {
        if cli.after_dashdash.len() > 1 {
            bail!("only one path can be blamed");
        }
        return Ok((cli.args.clone(), cli.after_dashdash[0].clone()));
    }
    match cli.args.as_slice() {
        [path] => {
            if !path_in_work_tree(path) {
                bail!("cannot stat path {path}");
            }
            Ok((vec![], path.clone()))
        }
        [first, second] => {
            let (path, rev) = if path_in_work_tree(first) {
                (first, second)
            } else {
                (second, first)
            };
            if !path_in_work_tree(path) {
                bail!("cannot stat path {path}");
            }
            Ok((vec![rev.clone()], path.clone()))
        }
        [] => bail!("no path given"),
        _ => bail!("expected at most one revision and one path; use -- to separate them"),
    }
}

fn path_in_work_tree(path: &str) -> bool {
    std::path::Path::new(path).symlink_metadata().is_ok()
}

/// Resolve revision arguments into the single commit to dig from plus the
/// set of commits masked off by negative revisions.
fn resolve_revisions(
    repo: &gix::Repository,
    revs: &[String],
) -> anyhow::Result<(ObjectId, HashSet<ObjectId>)> {
    use gix::revision::plumbing::Spec;

    let mut positive = None;
    let mut negatives = Vec::new();
    let mut set_positive = |id: ObjectId| -> anyhow::Result<()> {
        if let Some(existing) = positive {
            bail!("more than one commit to dig from: {existing} and {id}");
        }
        positive = Some(id);
        Ok(())
    };
    for rev in revs {
        let spec = repo
            .rev_parse(rev.as_str())
            .with_context(|| format!("cannot resolve revision '{rev}'"))?
            .detach();
        match spec {
            Spec::Include(id) => set_positive(id)?,
            Spec::Exclude(id) => negatives.push(id),
            Spec::Range { from, to } => {
                set_positive(to)?;
                negatives.push(from);
            }
            _ => bail!("unsupported revision spec '{rev}'"),
        }
    }

    let tip = match positive {
        Some(id) => id,
        None => repo
            .rev_parse_single("HEAD")
            .context("no such ref: HEAD")?
            .detach(),
    };
    let final_commit = peel_to_commit(repo, tip)?;

    let mut uninteresting = HashSet::new();
    let negatives = negatives
        .into_iter()
        .map(|id| peel_to_commit(repo, id))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if !negatives.is_empty() {
        for info in repo.rev_walk(negatives).all()? {
            uninteresting.insert(info?.id);
        }
    }
    Ok((final_commit, uninteresting))
}

fn peel_to_commit(repo: &gix::Repository, id: ObjectId) -> anyhow::Result<ObjectId> {
    Ok(repo
        .find_object(id)?
        .peel_to_kind(gix::object::Kind::Commit)
        .with_context(|| format!("{id} is not a commit"))?
        .id)
}

fn parse_line_range(arg: &str) -> anyhow::Result<(u32, u32)> {
    let (bottom, top) = arg
        .split_once(',')
        .with_context(|| format!("malformed line range '{arg}', expected n,m"))?;
    let bottom = bottom.trim().parse().context("bad start of line range")?;
    let top = top.trim().parse().context("bad end of line range")?;
    Ok((bottom, top))
}

/// The path as the repository knows it: relative to the worktree root, with
/// unix separators.
fn repo_relative_path(repo: &gix::Repository, path: &str) -> BString {
    let full = match repo.prefix() {
        Ok(Some(prefix)) => prefix.join(path),
        _ => PathBuf::from(path),
    };
    gix::path::to_unix_separators_on_windows(gix::path::into_bstr(full.as_path())).into_owned()
}
