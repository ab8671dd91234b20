use std::{
    io::stdout,
    sync::{mpsc::Receiver, Arc},
    thread::JoinHandle,
    time::Duration,
};

use crate::control::{ControlCommand, SessionControl};
use crate::gui::error::GloveGuiError;
use crate::telemetry_decoder::StatusReading;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use log::warn;
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// What the panel is doing with keypresses.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Normal,
    /// Typing `key=value` labels to resume with
    EditLabels(String),
}

#[derive(Debug)]
struct Panel {
    mode: Mode,
    status: Option<StatusReading>,
    message: String,
}

impl Panel {
    fn new() -> Self {
        Self {
            mode: Mode::Normal,
            status: None,
            message: String::new(),
        }
    }

    /// Acts on one keypress. Returns false once the session should end.
    fn on_key(&mut self, code: KeyCode, control: &SessionControl) -> bool {
        match &mut self.mode {
            Mode::Normal => match code {
                KeyCode::Char('p') => control.pause(),
                KeyCode::Char('r') => self.mode = Mode::EditLabels(String::new()),
                KeyCode::Char('s') | KeyCode::Char('q') | KeyCode::Esc => {
                    control.stop();
                    return false;
                }
                _ => {}
            },
            Mode::EditLabels(input) => match code {
                KeyCode::Char(c) => input.push(c),
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Esc => self.mode = Mode::Normal,
                KeyCode::Enter => {
                    match format!("resume {}", input).parse::<ControlCommand>() {
                        Ok(command) => {
                            control.apply(&command);
                            self.message.clear();
                        }
                        Err(e) => {
                            warn!("Not resuming: {}", e);
                            self.message = e.to_string();
                        }
                    }
                    self.mode = Mode::Normal;
                }
                _ => {}
            },
        }
        true
    }

    fn draw(&self, frame: &mut Frame, control: &SessionControl, target: &str) {
        let title = Title::from(Span::styled(
            format!(" Recording to {} ", target),
            Style::new().magenta().bold(),
        ));
        let instructions = match self.mode {
            Mode::Normal => Title::from(Line::from(vec![
                " Pause ".into(),
                "<P>".magenta().bold(),
                " Resume ".into(),
                "<R>".magenta().bold(),
                " Stop ".into(),
                "<S>/<Q> ".magenta().bold(),
            ])),
            Mode::EditLabels(_) => Title::from(Line::from(vec![
                " Resume ".into(),
                "<Enter>".magenta().bold(),
                " Cancel ".into(),
                "<Esc> ".magenta().bold(),
            ])),
        };
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);

        let state = if control.is_paused() {
            "PAUSED".yellow().bold()
        } else {
            "LOGGING".green().bold()
        };
        let (phase, countdown) = match &self.status {
            Some(status) => (status.phase.clone(), status.countdown.to_string()),
            None => ("-".to_owned(), "-".to_owned()),
        };
        let labels = control.labels();

        let mut lines = vec![
            Line::from(vec![" State: ".into(), state]),
            Line::from(vec![
                " Phase: ".into(),
                Span::styled(phase, Style::new().cyan().bold()),
                "  Countdown: ".into(),
                Span::styled(countdown, Style::new().cyan().bold()),
            ]),
            Line::from(format!(
                " gesture={:?} object={:?} phase={:?} grip_type={:?}",
                labels.gesture, labels.object, labels.phase, labels.grip_type
            )),
        ];
        if let Mode::EditLabels(input) = &self.mode {
            lines.push(Line::from(vec![
                " Labels (key=value ...): ".into(),
                Span::styled(input.clone(), Style::new().magenta()),
            ]));
        }
        if !self.message.is_empty() {
            lines.push(Line::from(Span::styled(
                format!(" {}", self.message),
                Style::new().red(),
            )));
        }

        frame.render_widget(Paragraph::new(lines).block(block), frame.size());
    }
}

/// Shows the control panel for a session running on `worker` until the
/// user stops it or the worker finishes on its own, then returns what the
/// worker returned.
///
/// Status readings arriving on `status_rx` are shown as they come in.
pub fn session_panel<T>(
    control: Arc<SessionControl>,
    status_rx: Receiver<StatusReading>,
    target: &str,
    worker: JoinHandle<T>,
) -> Result<T, GloveGuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let res = panel_loop(&mut terminal, &control, &status_rx, target, &worker);

    // the worker notices within one read timeout
    control.stop();
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    res?;

    worker.join().map_err(|_| GloveGuiError::JoinError)
}

fn panel_loop<B: Backend, T>(
    terminal: &mut Terminal<B>,
    control: &SessionControl,
    status_rx: &Receiver<StatusReading>,
    target: &str,
    worker: &JoinHandle<T>,
) -> Result<(), GloveGuiError> {
    let mut panel = Panel::new();

    while !worker.is_finished() {
        if let Some(status) = status_rx.try_iter().last() {
            panel.status = Some(status);
        }

        terminal.draw(|frame| panel.draw(frame, control, target))?;

        if event::poll(Duration::from_millis(100))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !panel.on_key(key.code, control) {
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(panel: &mut Panel, control: &SessionControl, text: &str) {
        for c in text.chars() {
            assert!(panel.on_key(KeyCode::Char(c), control));
        }
    }

    #[test]
    fn test_pause_then_resume_with_labels() {
        let control = SessionControl::default();
        let mut panel = Panel::new();

        assert!(panel.on_key(KeyCode::Char('p'), &control));
        assert!(control.is_paused());

        assert!(panel.on_key(KeyCode::Char('r'), &control));
        // still paused while the labels are typed
        assert!(control.is_paused());
        type_text(&mut panel, &control, "gesture=fisq");
        panel.on_key(KeyCode::Backspace, &control);
        type_text(&mut panel, &control, "t object=ball");
        assert!(panel.on_key(KeyCode::Enter, &control));

        assert_eq!(panel.mode, Mode::Normal);
        assert!(!control.is_paused());
        assert_eq!(control.labels().gesture, "fist");
        assert_eq!(control.labels().object, "ball");
    }

    #[test]
    fn test_bad_labels_stay_paused() {
        let control = SessionControl::default();
        let mut panel = Panel::new();
        control.pause();

        panel.on_key(KeyCode::Char('r'), &control);
        type_text(&mut panel, &control, "fist");
        panel.on_key(KeyCode::Enter, &control);

        assert!(control.is_paused());
        assert!(!panel.message.is_empty());
    }

    #[test]
    fn test_stop_keys() {
        let control = SessionControl::default();
        let mut panel = Panel::new();

        // 's' is just text while editing labels
        panel.on_key(KeyCode::Char('r'), &control);
        assert!(panel.on_key(KeyCode::Char('s'), &control));
        assert!(control.is_running());
        panel.on_key(KeyCode::Esc, &control);

        assert!(!panel.on_key(KeyCode::Char('s'), &control));
        assert!(!control.is_running());
    }
}
