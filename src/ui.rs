// UI layer: the login prompt (`dialoguer`) and the console event loop
// (`crossterm`). The loop is single-threaded: it polls the keyboard with a
// short timeout and renders finished remote calls between polls.

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use tracing::{info, warn};

use crate::api::{ApiClient, Backend};
use crate::console::{Console, Flow};
use crate::input::{InputAction, InputLine};

const PROMPT: &str = "itisadb> ";
const TICK: Duration = Duration::from_millis(50);
const LOGIN_ATTEMPTS: usize = 3;

/// Makes sure the client holds a `session` cookie before the console
/// starts. A session saved by a previous run is reused; otherwise the
/// operator is asked for credentials.
pub fn ensure_session(api: &ApiClient, session_file: &Path) -> Result<()> {
    if let Err(e) = api.cookies().restore(session_file) {
        // a broken file just means logging in again
        warn!(error = %e, "ignoring saved session");
    }
    if api.cookies().has_session() {
        info!(cookies = ?api.cookies().names(), "reusing saved session");
        return Ok(());
    }

    println!("Log in to {}", api.base_url());
    for _ in 0..LOGIN_ATTEMPTS {
        if handle_login(api)? {
            api.cookies().persist(session_file)?;
            return Ok(());
        }
    }
    anyhow::bail!("Login failed {} times, giving up", LOGIN_ATTEMPTS)
}

/// Collect credentials and log in. Returns whether a session was obtained.
fn handle_login(api: &ApiClient) -> Result<bool> {
    let username: String = Input::new().with_prompt("Username").interact_text()?;
    let password: String = Password::new().with_prompt("Password").interact()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message("Logging in...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = api.login(&username, &password);
    spinner.finish_and_clear();

    match result {
        Ok(()) => {
            println!("Welcome {}!", username);
            Ok(true)
        }
        Err(e) => {
            println!("{}", e);
            Ok(false)
        }
    }
}

/// Restores the terminal even when the loop bails out with an error.
struct TerminalGuard;

impl TerminalGuard {
    fn enter(out: &mut impl Write) -> Result<Self> {
        enable_raw_mode().context("Enabling raw mode")?;
        execute!(out, EnterAlternateScreen).context("Entering alternate screen")?;
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Runs the console until the operator quits (`None`) or a command
/// navigates away (`Some(url)`).
pub fn run<B: Backend>(mut console: Console<B>) -> Result<Option<Url>> {
    let mut out = io::stdout();
    let _guard = TerminalGuard::enter(&mut out)?;
    let mut input = InputLine::default();
    let mut dirty = true;

    let leave = loop {
        if console.pump() {
            dirty = true;
        }
        if dirty {
            draw(&mut out, &console, &input)?;
            dirty = false;
        }

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            // resize and focus events only need a redraw
            dirty = true;
            continue;
        };

        match input.handle_key(key) {
            InputAction::Submit(line) => {
                dirty = true;
                match console.submit(&line) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Leave(url)) => break Some(url),
                    Err(e) => console.report_error(&line, &e),
                }
            }
            InputAction::CancelPending => {
                if console.cancel_pending() > 0 {
                    dirty = true;
                }
            }
            InputAction::Quit => break None,
            InputAction::Edited => dirty = true,
            InputAction::Ignored => {}
        }
    };
    Ok(leave)
}

fn draw<B: Backend>(out: &mut impl Write, console: &Console<B>, input: &InputLine) -> Result<()> {
    let (width, height) = terminal::size()?;
    let width = width.max(1) as usize;

    queue!(
        out,
        MoveTo(0, 0),
        Clear(ClearType::All),
        SetForegroundColor(Color::Green),
        Print(PROMPT),
        ResetColor,
        Print(input.value())
    )?;

    let mut row: u16 = 1;
    let pending = console.pending();
    if pending > 0 {
        queue!(
            out,
            MoveTo(0, row),
            SetForegroundColor(Color::DarkGrey),
            Print(format!("{pending} request(s) pending, Esc cancels")),
            ResetColor
        )?;
        row += 1;
    }

    for (line, is_error) in console.transcript().lines() {
        if row >= height {
            break;
        }
        let line: String = line.chars().take(width).collect();
        queue!(out, MoveTo(0, row))?;
        if is_error {
            queue!(out, SetForegroundColor(Color::Red), Print(line), ResetColor)?;
        } else {
            queue!(out, Print(line))?;
        }
        row += 1;
    }

    // keep the cursor on the input line
    let col = (PROMPT.chars().count() + input.value().chars().count()).min(width - 1);
    queue!(out, MoveTo(col as u16, 0))?;
    out.flush()?;
    Ok(())
}
