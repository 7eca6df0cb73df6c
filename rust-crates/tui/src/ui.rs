use crate::client::AppView;
use chrono::{
    DateTime,
    Utc,
};
use claim_engine::{
    AllocationState,
    AttemptStatus,
    ClaimPhase,
    EligibilityView,
    EngineSnapshot,
    ledger::BASE_UNITS_PER_TOKEN,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

pub type InputEventReceiver = EventStream;

pub enum UserEvent {
    Quit,
    Claim,
    Refresh,
    Redraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
    )?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    match state.mode {
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Normal => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('m') | KeyCode::Enter => Some(UserEvent::Claim),
            KeyCode::Char('r') => Some(UserEvent::Refresh),
            _ => None,
        },
    }
}

pub fn draw(
    state: &mut UiState,
    view: &AppView,
    snap: &EngineSnapshot,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let mode = state.mode.clone();
        term.draw(|f| ui(f, &mode, view, snap, now))?;
        state.terminal = Some(term);
    }
    Ok(())
}

fn ui(f: &mut Frame, mode: &Mode, view: &AppView, snap: &EngineSnapshot, now: DateTime<Utc>) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // wallet
            Constraint::Length(6), // mint
            Constraint::Min(5),    // status / errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], view, snap);
    draw_mint_panel(f, chunks[1], snap, now);
    draw_status(f, chunks[2], view, snap);
    let help = Paragraph::new("m/Enter mint | r refresh | q/Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[3]);

    if *mode == Mode::QuitModal {
        let area = centered_rect(40, 20, f.area());
        f.render_widget(Clear, area);
        let modal = Paragraph::new("Quit? (y/n)")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Quit"));
        f.render_widget(modal, area);
    }
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, view: &AppView, snap: &EngineSnapshot) {
    let account = snap
        .signer
        .as_ref()
        .map(|a| short_id(a.as_str()))
        .unwrap_or_else(|| "not connected".to_string());
    let balance = snap
        .balance
        .map(format_balance)
        .unwrap_or_else(|| "-".to_string());
    let text = format!(
        "Wallet: {} ({}) | Balance: {} | {} | Network: {}",
        view.wallet,
        account,
        balance,
        eligibility_label(&snap.eligibility),
        view.network
    );
    let widget = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_mint_panel(f: &mut Frame, area: Rect, snap: &EngineSnapshot, now: DateTime<Utc>) {
    let lines = match snap.allocation.as_ref() {
        None => vec![Line::from("Loading mint state...")],
        Some(allocation) => vec![
            Line::from(format!(
                "Available: {} | Redeemed: {} | Remaining: {}",
                allocation.items_available,
                allocation.items_redeemed,
                allocation.items_remaining
            )),
            Line::from(mint_status_line(allocation, now)),
            Line::from(format!("Claim: {}", phase_label(snap))),
        ],
    };
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Mint"));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, view: &AppView, snap: &EngineSnapshot) {
    let mut errors = view.errors.clone();
    if let Some(e) = snap.refresh_error.as_ref() {
        errors.push(e.clone());
    }
    let failed = snap.attempt.status == AttemptStatus::Failed;
    let widget = if errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if view.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in view.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        let color = if failed { Color::Red } else { Color::Green };
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(color))
    } else {
        let lines: Vec<Line> = errors.into_iter().map(Line::from).collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn phase_label(snap: &EngineSnapshot) -> &'static str {
    match snap.phase {
        ClaimPhase::Idle => "idle",
        ClaimPhase::Gating => "checking eligibility...",
        ClaimPhase::Submitting => "submitting...",
        ClaimPhase::AwaitingConfirmation => "waiting for confirmation...",
        ClaimPhase::Reconciling => "finishing up...",
    }
}

fn eligibility_label(view: &EligibilityView) -> String {
    match view {
        EligibilityView::Open => "Open mint".to_string(),
        EligibilityView::Unknown => "Whitelist: checking".to_string(),
        EligibilityView::NotListed => "Not whitelisted".to_string(),
        EligibilityView::Listed(record) => {
            format!("Whitelisted ({} reserved)", record.reserve_count)
        }
    }
}

pub fn mint_status_line(allocation: &AllocationState, now: DateTime<Utc>) -> String {
    if allocation.is_sold_out() {
        return "SOLD OUT".to_string();
    }
    if allocation.is_live_at(now) {
        return "Mint is live".to_string();
    }
    let remaining = (allocation.go_live_at - now).to_std().unwrap_or_default();
    format!("Mint starts in {}", format_countdown(remaining.as_secs()))
}

pub fn format_countdown(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours} hours, {minutes} minutes, {seconds} seconds")
}

pub fn format_balance(base_units: u64) -> String {
    let whole = base_units / BASE_UNITS_PER_TOKEN;
    let fractional = base_units % BASE_UNITS_PER_TOKEN;
    if fractional == 0 {
        format!("{}", whole)
    } else {
        format!(
            "{}.{}",
            whole,
            format!("{:09}", fractional).trim_end_matches('0')
        )
    }
}

fn short_id(id: &str) -> String {
    if id.len() <= 12 {
        return id.to_string();
    }
    format!("{}..{}", &id[..6], &id[id.len() - 4..])
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
