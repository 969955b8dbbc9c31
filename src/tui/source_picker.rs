//! Interactive selection of the proxy sources to harvest

use crate::proxy::{ProxySource, SourceRegistry};
use crate::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use std::io;

const HELP: &str = "Space: toggle | a: all/none | Enter: start | q: quit";

/// Checklist of the catalog's sources
pub struct SourcePicker {
    sources: Vec<ProxySource>,
    selected: Vec<bool>,
    list_state: ListState,
    status_message: String,
    confirmed: bool,
    should_quit: bool,
}

impl SourcePicker {
    pub fn new(registry: &SourceRegistry) -> Self {
        let sources = registry.all();
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            selected: vec![false; sources.len()],
            sources,
            list_state,
            status_message: HELP.to_string(),
            confirmed: false,
            should_quit: false,
        }
    }

    /// Show the picker. Returns the chosen keys, or `None` if the user quit.
    pub fn run(mut self) -> Result<Option<Vec<String>>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result?;
        Ok(self.confirmed.then(|| self.selected_keys()))
    }

    fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        while !self.confirmed && !self.should_quit {
            terminal.draw(|f| self.ui(f))?;

            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    self.handle_input(key.code);
                }
            }
        }
        Ok(())
    }

    /// Keys of the checked sources, in catalog order
    pub fn selected_keys(&self) -> Vec<String> {
        self.sources
            .iter()
            .zip(&self.selected)
            .filter(|(_, selected)| **selected)
            .map(|(source, _)| source.key.clone())
            .collect()
    }

    fn handle_input(&mut self, key: KeyCode) {
        let len = self.sources.len();
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Down => {
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Char(' ') => {
                if let Some(flag) = self.list_state.selected().and_then(|i| self.selected.get_mut(i)) {
                    *flag = !*flag;
                }
            }
            KeyCode::Char('a') => {
                let all = self.selected.iter().all(|s| *s);
                self.selected.iter_mut().for_each(|s| *s = !all);
            }
            KeyCode::Enter => {
                if self.selected.iter().any(|s| *s) {
                    self.confirmed = true;
                } else {
                    self.status_message = "Invalid selection. Please select at least one source.".to_string();
                }
            }
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(f.size());

        let title = Paragraph::new("Select proxy sources to use")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let items: Vec<ListItem> = self
            .sources
            .iter()
            .zip(&self.selected)
            .map(|(source, selected)| {
                let mark = if *selected { "[x]" } else { "[ ]" };
                ListItem::new(format!("{} {:>2}  {}  ({})", mark, source.key, source.name, source.format))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Sources"))
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, chunks[1], &mut self.list_state);

        let status = Paragraph::new(self.status_message.clone())
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_and_confirm() {
        let mut picker = SourcePicker::new(&SourceRegistry::builtin());
        picker.handle_input(KeyCode::Enter);
        assert!(!picker.confirmed);

        picker.handle_input(KeyCode::Char(' '));
        picker.handle_input(KeyCode::Down);
        picker.handle_input(KeyCode::Down);
        picker.handle_input(KeyCode::Char(' '));
        picker.handle_input(KeyCode::Enter);

        assert!(picker.confirmed);
        assert_eq!(picker.selected_keys(), vec!["1".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_select_all_toggles() {
        let mut picker = SourcePicker::new(&SourceRegistry::builtin());
        picker.handle_input(KeyCode::Char('a'));
        assert_eq!(picker.selected_keys().len(), 10);
        picker.handle_input(KeyCode::Char('a'));
        assert!(picker.selected_keys().is_empty());
    }

    #[test]
    fn test_up_wraps_to_last() {
        let mut picker = SourcePicker::new(&SourceRegistry::builtin());
        picker.handle_input(KeyCode::Up);
        assert_eq!(picker.list_state.selected(), Some(9));
    }
}
