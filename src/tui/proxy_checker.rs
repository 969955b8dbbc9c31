//! Live verification dashboard

use crate::proxy::{ProxyCandidate, ProxyCheckResult, ProxyCheckStatus, ProxyChecker, ProxyType};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use reqwest::Url;
use std::io;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Duration;

/// Rejected checks kept on screen
const MAX_RECENT_REJECTED: usize = 100;

const SCHEMES: [ProxyType; 4] = [
    ProxyType::Http,
    ProxyType::Https,
    ProxyType::Socks4,
    ProxyType::Socks5,
];

/// Progress of one proxy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SchemeTally {
    scheme: ProxyType,
    total: usize,
    checked: usize,
    working: usize,
}

/// Dashboard state while the candidates are verified
pub struct ProxyCheckerApp {
    proxies: Vec<ProxyCandidate>,
    checker: ProxyChecker,
    total: usize,
    checked: usize,
    /// Confirmed checks in completion order
    working: Vec<ProxyCheckResult>,
    /// Rejected checks in completion order
    rejected: Vec<ProxyCheckResult>,
    timeouts: usize,
    tallies: Vec<SchemeTally>,
    /// Cursor over the working table, newest first
    list_state: ListState,
    status_message: String,
    is_complete: bool,
    should_quit: bool,
}

impl ProxyCheckerApp {
    pub fn new(proxies: Vec<ProxyCandidate>, checker: ProxyChecker) -> Self {
        let tallies = SCHEMES
            .iter()
            .map(|&scheme| SchemeTally {
                scheme,
                total: proxies.iter().filter(|p| p.proxy_type == scheme).count(),
                checked: 0,
                working: 0,
            })
            .filter(|tally| tally.total > 0)
            .collect();

        Self {
            total: proxies.len(),
            proxies,
            checker,
            checked: 0,
            working: Vec::new(),
            rejected: Vec::new(),
            timeouts: 0,
            tallies,
            list_state: ListState::default(),
            status_message: "Starting proxy check...".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Run the dashboard until every proxy is checked and the user leaves.
    /// Returns every check result, working ones first in completion order.
    pub async fn run(mut self) -> Result<Vec<ProxyCheckResult>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result?;
        Ok(self.into_results())
    }

    fn into_results(mut self) -> Vec<ProxyCheckResult> {
        let mut results = self.working;
        results.append(&mut self.rejected);
        results
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut rx = self
            .checker
            .check_proxies_stream(std::mem::take(&mut self.proxies));

        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            loop {
                match rx.try_recv() {
                    Ok(result) => self.record(result),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if !self.is_complete {
                            self.finish();
                        }
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn record(&mut self, result: ProxyCheckResult) {
        self.checked += 1;
        let working = result.is_working();

        if let Some(tally) = self
            .tallies
            .iter_mut()
            .find(|t| t.scheme == result.proxy.proxy_type)
        {
            tally.checked += 1;
            tally.working += usize::from(working);
        }

        if working {
            self.working.push(result);
            if self.list_state.selected().is_none() {
                self.list_state.select(Some(0));
            }
        } else {
            if result.status == ProxyCheckStatus::Timeout {
                self.timeouts += 1;
            }
            self.rejected.push(result);
        }

        self.status_message = format!(
            "Checking... {}% ({}/{}) | Working: {} | Rejected: {}",
            self.percent(),
            self.checked,
            self.total,
            self.working.len(),
            self.rejected.len()
        );
    }

    fn finish(&mut self) {
        self.is_complete = true;
        self.status_message = format!(
            "Complete! {} of {} proxies work | Press 'q' to save and exit",
            self.working.len(),
            self.checked
        );
    }

    fn percent(&self) -> u16 {
        if self.total > 0 {
            (self.checked as f64 / self.total as f64 * 100.0) as u16
        } else {
            100
        }
    }

    fn handle_input(&mut self, key: KeyCode) {
        let len = self.working.len();
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                if self.is_complete {
                    self.should_quit = true;
                } else {
                    self.status_message =
                        "Checks still running, 'q' is available once they finish".to_string();
                }
            }
            KeyCode::Down if len > 0 => {
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up if len > 0 => {
                let i = match self.list_state.selected() {
                    Some(0) | None => len - 1,
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(f.size());

        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Verifying proxies")
                    .title_alignment(Alignment::Center),
            )
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(self.percent().min(100))
            .label(format!("{}/{}", self.checked, self.total));
        f.render_widget(gauge, rows[0]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[1]);
        self.render_working(f, columns[0]);

        let side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(self.tallies.len() as u16 + 3),
                Constraint::Min(0),
            ])
            .split(columns[1]);
        self.render_schemes(f, side[0]);
        self.render_rejected(f, side[1]);

        let status = Paragraph::new(self.status_message.clone())
            .style(Style::default().fg(if self.is_complete { Color::Green } else { Color::Yellow }))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(status, rows[2]);
    }

    fn render_working(&mut self, f: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .working
            .iter()
            .rev()
            .map(|result| ListItem::new(working_line(result)).style(country_style(&result.proxy)))
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(
                        "Working ({})  {:<21} {:<6} {:<3} {:<18} {:>6}",
                        self.working.len(),
                        "proxy",
                        "scheme",
                        "cc",
                        "via",
                        "ms"
                    )),
            )
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_schemes(&self, f: &mut Frame, area: Rect) {
        let mut text = format!("{:<7} {:>7} {:>7} {:>7}\n", "scheme", "total", "checked", "working");
        for tally in &self.tallies {
            text.push_str(&format!(
                "{:<7} {:>7} {:>7} {:>7}\n",
                tally.scheme.to_string(),
                tally.total,
                tally.checked,
                tally.working
            ));
        }

        let table = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("By scheme"));
        f.render_widget(table, area);
    }

    fn render_rejected(&self, f: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .rejected
            .iter()
            .rev()
            .take(MAX_RECENT_REJECTED)
            .map(|result| ListItem::new(rejected_line(result)).style(Style::default().fg(Color::Red)))
            .collect();

        let title = format!(
            "Rejected ({}, {} timed out)",
            self.rejected.len(),
            self.timeouts
        );
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(list, area);
    }
}

/// Row of the working table: address, scheme, country, confirming host, time
fn working_line(result: &ProxyCheckResult) -> String {
    let via = match &result.status {
        ProxyCheckStatus::Working { target } => target_host(target),
        _ => String::new(),
    };
    format!(
        "{:<21} {:<6} {:<3} {:<18} {:>6}",
        result.proxy.to_simple_string(),
        result.proxy.proxy_type.to_string(),
        result.proxy.country,
        via,
        result.response_time_ms.unwrap_or_default()
    )
}

fn rejected_line(result: &ProxyCheckResult) -> String {
    let reason = match &result.status {
        ProxyCheckStatus::Timeout => "timed out",
        ProxyCheckStatus::Failed(reason) => reason.as_str(),
        ProxyCheckStatus::Working { .. } => "",
    };
    format!("{} {}", result.proxy.url(), reason)
}

fn target_host(target: &str) -> String {
    Url::parse(target)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| target.to_string())
}

/// Proxies whose source gave no country are dimmed
fn country_style(proxy: &ProxyCandidate) -> Style {
    if proxy.has_country() {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Green).add_modifier(Modifier::DIM)
    }
}
