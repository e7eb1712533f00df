use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor};
use directories::ProjectDirs;
use lectern_core::{
    Bookmark, BookmarkProvider, Command, FileBookmarkStore, FileProgressStore, ProgressStore,
    ReaderController, BOOKMARK_CHANNEL, SEARCH_CHANNEL,
};
use lectern_render::TextRenderFactory;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "lectern",
    version,
    about = "library document reader with full-text search and highlights"
)]
struct Args {
    /// Page to open the document on (1-based); overrides saved progress
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Lines per page for documents without form-feed pagination
    #[arg(long = "lines-per-page", default_value_t = 40)]
    lines_per_page: usize,

    /// Path to the document to read
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "lectern", "lectern")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let data_dir = project_dirs.data_local_dir();
    let store: Arc<dyn ProgressStore> =
        Arc::new(FileProgressStore::new(data_dir.join("progress"))?);
    let bookmark_store = FileBookmarkStore::new(data_dir.join("bookmarks"))?;

    let provider = TextRenderFactory::with_lines_per_page(args.lines_per_page);
    let mut reader = ReaderController::open_with(&provider, args.file.clone(), store)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;
    reader.ingest_all().await?;

    let bookmarks = bookmark_store
        .bookmarks(&reader.info().id)
        .unwrap_or_else(|err| {
            warn!(?err, "failed to load bookmarks");
            Vec::new()
        });

    if let Some(page) = args.page {
        reader.apply(Command::GotoPage { page })?;
        reader.take_events();
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    show_page(&mut stdout, &mut reader)?;

    loop {
        crossterm::execute!(stdout, Print("> "))?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match parse_command(line.trim()) {
            Some(Action::Reader(command)) => {
                let saving = matches!(command, Command::SaveProgress);
                reader.apply(command)?;
                if saving {
                    crossterm::execute!(stdout, Print("progress saved\n"))?;
                }
                if !reader.take_events().is_empty() {
                    show_page(&mut stdout, &mut reader)?;
                }
            }
            Some(Action::ListBookmarks) => list_bookmarks(&mut stdout, &bookmarks)?,
            Some(Action::ActivateBookmark(ordinal)) => {
                match bookmarks.get(ordinal.wrapping_sub(1)) {
                    Some(bookmark) => {
                        reader.apply(Command::ActivateBookmark {
                            bookmark: bookmark.clone(),
                        })?;
                        reader.take_events();
                        show_page(&mut stdout, &mut reader)?;
                    }
                    None => crossterm::execute!(stdout, Print("no such bookmark\n"))?,
                }
            }
            Some(Action::Help) => print_help(&mut stdout)?,
            Some(Action::Quit) => break,
            None => {
                crossterm::execute!(stdout, Print("unrecognized command, ? for help\n"))?;
            }
        }
    }

    reader.persist()?;
    Ok(())
}

enum Action {
    Reader(Command),
    ListBookmarks,
    ActivateBookmark(usize),
    Help,
    Quit,
}

fn parse_command(input: &str) -> Option<Action> {
    if let Some(query) = input.strip_prefix('/') {
        return Some(Action::Reader(Command::Search {
            query: query.to_string(),
        }));
    }

    let mut parts = input.split_whitespace();
    let action = match parts.next()? {
        "n" => Action::Reader(Command::NextPage),
        "p" => Action::Reader(Command::PrevPage),
        "g" => {
            let page = parts.next()?.parse().ok()?;
            Action::Reader(Command::GotoPage { page })
        }
        "sn" => Action::Reader(Command::SearchNext),
        "sp" => Action::Reader(Command::SearchPrev),
        "sc" => Action::Reader(Command::ClearSearch),
        "b" => match parts.next() {
            Some(ordinal) => Action::ActivateBookmark(ordinal.parse().ok()?),
            None => Action::ListBookmarks,
        },
        "w" => Action::Reader(Command::SaveProgress),
        "q" => Action::Quit,
        "h" | "?" => Action::Help,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(action)
}

/// Renders the current page, feeds the render-complete signal back to the
/// reader so highlight channels reconcile, then draws the marked-up page.
fn show_page(stdout: &mut io::Stdout, reader: &mut ReaderController) -> Result<()> {
    let page = reader.current_page();
    let root = reader.renderer().render_page(page)?;
    reader.on_render_complete(page);

    crossterm::execute!(stdout, Print("\n"))?;
    for leaf in root.lock().leaves() {
        for fragment in leaf.fragments() {
            match fragment.channel() {
                None => crossterm::execute!(stdout, Print(fragment.text()))?,
                Some(channel) => {
                    let (background, foreground) = channel_colors(channel);
                    crossterm::execute!(
                        stdout,
                        SetBackgroundColor(background),
                        SetForegroundColor(foreground),
                        Print(fragment.text()),
                        ResetColor
                    )?;
                }
            }
        }
        crossterm::execute!(stdout, Print("\n"))?;
    }

    let status = format_status(reader);
    crossterm::execute!(
        stdout,
        cursor::MoveToColumn(0),
        SetAttribute(Attribute::Reverse),
        Print(status),
        SetAttribute(Attribute::Reset),
        Print("\n")
    )?;
    Ok(())
}

fn channel_colors(channel: &str) -> (Color, Color) {
    match channel {
        SEARCH_CHANNEL => (Color::Yellow, Color::Black),
        BOOKMARK_CHANNEL => (Color::Cyan, Color::Black),
        _ => (Color::White, Color::Black),
    }
}

fn format_status(reader: &ReaderController) -> String {
    let info = reader.info();
    let mut status = format!(
        "{} — page {}/{}",
        info.title,
        reader.current_page(),
        info.page_count
    );

    if let Some(summary) = reader.search_summary() {
        status.push_str(" — /");
        status.push_str(&summary.query);
        if summary.total == 0 {
            status.push_str(" (no matches)");
        } else if let Some(index) = summary.current_index {
            status.push_str(&format!(" ({}/{})", index + 1, summary.total));
        }
    }

    status
}

fn list_bookmarks(stdout: &mut io::Stdout, bookmarks: &[Bookmark]) -> Result<()> {
    if bookmarks.is_empty() {
        crossterm::execute!(stdout, Print("no bookmarks for this document\n"))?;
        return Ok(());
    }
    for (ordinal, bookmark) in bookmarks.iter().enumerate() {
        crossterm::execute!(
            stdout,
            Print(format!(
                "{:>3}. p{} — {}\n",
                ordinal + 1,
                bookmark.page_number,
                bookmark.description
            ))
        )?;
    }
    Ok(())
}

fn print_help(stdout: &mut io::Stdout) -> Result<()> {
    crossterm::execute!(
        stdout,
        Print(concat!(
            "  n / p        next / previous page\n",
            "  g <page>     go to page\n",
            "  /<text>      search\n",
            "  sn / sp      next / previous search result\n",
            "  sc           clear search\n",
            "  b            list bookmarks\n",
            "  b <n>        open bookmark n\n",
            "  w            save reading progress\n",
            "  q            quit\n",
        ))
    )?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "lectern.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
