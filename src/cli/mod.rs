use std::io;
use std::os::unix::io::AsRawFd;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::file::STDIN_NAME;
use crate::session::Session;
use crate::tail::{Anchor, TailSpec, Unit};

#[derive(Parser, Debug)]
#[command(name = "tailr", version, about = "Print the tail of files, following growth with inotify")]
pub struct Cli {
    /// Output the last N lines (use +N to start at line N)
    #[arg(short = 'n', long = "lines", value_name = "N")]
    pub lines: Option<String>,

    /// Output the last N bytes (use +N to start at byte N)
    #[arg(short = 'c', long = "bytes", value_name = "N", conflicts_with = "lines")]
    pub bytes: Option<String>,

    /// Keep files open and print data appended as they grow
    #[arg(short, long)]
    pub follow: bool,

    /// Never print file name headers
    #[arg(short, long)]
    pub quiet: bool,

    /// Always print file name headers
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Files to tail ("-" or no operand reads standard input)
    #[arg(value_name = "FILE")]
    pub files: Vec<String>,
}

pub fn run(cli: Cli) -> Result<()> {
    let spec = parse_spec(&cli)?;

    let mut files = cli.files;
    let mut follow = cli.follow;
    if files.is_empty() {
        files.push(STDIN_NAME.to_string());
        // POSIX: -f is ignored when no file operand is given and standard
        // input is a pipe.
        if follow && stdin_is_pipe_like() {
            tracing::info!("standard input is a pipe; ignoring --follow");
            follow = false;
        }
    }

    let headers = !cli.quiet && (cli.verbose || files.len() > 1);
    let mut session = Session::new(files, spec, follow, headers);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    session.run(&mut out).context("session failed")?;

    if session.failed() {
        bail!("some files could not be tailed");
    }
    Ok(())
}

/// Build the tail specification from `-n`/`-c`, accepting the `+N`
/// from-start form. Defaults to the last 10 lines.
fn parse_spec(cli: &Cli) -> Result<TailSpec> {
    let (unit, raw) = if let Some(n) = &cli.bytes {
        (Unit::Bytes, n)
    } else if let Some(n) = &cli.lines {
        (Unit::Lines, n)
    } else {
        return Ok(TailSpec::default());
    };

    let (anchor, digits) = match raw.strip_prefix('+') {
        Some(rest) => (Anchor::FromStart, rest),
        None => (Anchor::FromEnd, raw.strip_prefix('-').unwrap_or(raw)),
    };
    let count: u64 = digits
        .parse()
        .with_context(|| format!("invalid count: {raw:?}"))?;

    Ok(TailSpec { unit, count, anchor })
}

fn stdin_is_pipe_like() -> bool {
    use nix::libc;

    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(io::stdin().as_raw_fd(), &mut st) } != 0 {
        return false;
    }
    let fmt = st.st_mode & libc::S_IFMT;
    fmt == libc::S_IFIFO || fmt == libc::S_IFSOCK
}
