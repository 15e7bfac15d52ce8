use std::io::{self, BufRead, Stdout, Write};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("nothing was selected")]
    NothingSelected,
    #[error("{input:?} is not one of the {len} options")]
    Invalid { input: String, len: usize },
    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
}

/// Operator input. Calls block; callers serialize them and run them off the
/// async workers.
pub trait Prompter: Send + Sync {
    fn pick(&self, title: &str, options: &[String]) -> Result<usize, PromptError>;
    fn read_line(&self, prompt: &str) -> Result<String, PromptError>;
}

/// Full-screen list picker.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn pick(&self, title: &str, options: &[String]) -> Result<usize, PromptError> {
        if options.is_empty() {
            return Err(PromptError::NothingSelected);
        }
        let mut terminal = setup_terminal()?;
        let _cleanup = TerminalCleanup;
        let mut selected = 0usize;

        loop {
            terminal.draw(|frame| draw_menu(frame, title, options, selected))?;

            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Down | KeyCode::Tab | KeyCode::Char('j') => {
                    selected = (selected + 1) % options.len();
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    if selected == 0 {
                        selected = options.len() - 1;
                    } else {
                        selected -= 1;
                    }
                }
                KeyCode::Home => selected = 0,
                KeyCode::End => selected = options.len() - 1,
                KeyCode::Enter => return Ok(selected),
                KeyCode::Esc | KeyCode::Char('q') => return Err(PromptError::NothingSelected),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(PromptError::NothingSelected)
                }
                _ => {}
            }
        }
    }

    fn read_line(&self, prompt: &str) -> Result<String, PromptError> {
        read_stdin_line(prompt)
    }
}

fn draw_menu(frame: &mut ratatui::Frame, title: &str, options: &[String], selected: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5), Constraint::Length(3)])
        .split(frame.area());

    let header = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::BOTTOM))
        .wrap(Wrap { trim: true });
    frame.render_widget(header, chunks[0]);

    let items: Vec<ListItem> = options.iter().map(|o| ListItem::new(Line::from(o.as_str()))).collect();
    let list = List::new(items)
        .block(Block::default().title("Candidates").borders(Borders::ALL))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(selected));
    frame.render_stateful_widget(list, chunks[1], &mut state);

    let help = Paragraph::new("Arrows/Tab to move. Enter to pick. Esc or Q to leave this game unresolved.")
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help, chunks[2]);
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

struct TerminalCleanup;

impl Drop for TerminalCleanup {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(stdout, LeaveAlternateScreen);
    }
}

/// Numbered menu on stdout, answer read from stdin. Works without a tty.
pub struct LinePrompter;

impl Prompter for LinePrompter {
    fn pick(&self, title: &str, options: &[String]) -> Result<usize, PromptError> {
        let mut out = io::stdout().lock();
        writeln!(out, "{title}")?;
        for (i, option) in options.iter().enumerate() {
            writeln!(out, "  {:>2}) {}", i + 1, option)?;
        }
        drop(out);
        let answer = read_stdin_line("pick a number:")?;
        parse_choice(&answer, options.len())
    }

    fn read_line(&self, prompt: &str) -> Result<String, PromptError> {
        read_stdin_line(prompt)
    }
}

fn read_stdin_line(prompt: &str) -> Result<String, PromptError> {
    let mut out = io::stdout().lock();
    writeln!(out, "{prompt}")?;
    out.flush()?;
    drop(out);

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(PromptError::NothingSelected);
    }
    Ok(line.trim().to_string())
}

/// One-based answer to a zero-based index.
pub fn parse_choice(input: &str, len: usize) -> Result<usize, PromptError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PromptError::NothingSelected);
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Ok(n - 1),
        _ => Err(PromptError::Invalid {
            input: input.to_string(),
            len,
        }),
    }
}
