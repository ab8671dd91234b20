use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use std::{error::Error, io, sync::mpsc::Receiver, time::Duration};

use rehabglove::{device_command::DeviceCommand, telemetry_decoder::StatusReading};

/// What the reading thread tells the display.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Status(StatusReading),
    /// The glove finished its program
    Finished,
    Disconnected,
}

#[derive(Debug, Default)]
struct App {
    status: Option<StatusReading>,
    /// Longest countdown seen in the current phase, taken as its length
    phase_length: i32,
    message: String,
}

impl App {
    fn on_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Status(status) => {
                let new_phase = self
                    .status
                    .as_ref()
                    .map_or(true, |current| current.phase != status.phase);
                if new_phase {
                    self.phase_length = status.countdown;
                } else {
                    self.phase_length = self.phase_length.max(status.countdown);
                }
                self.status = Some(status);
            }
            MonitorEvent::Finished => self.message = "Therapy program finished".to_owned(),
            MonitorEvent::Disconnected => self.message = "Glove disconnected".to_owned(),
        }
    }

    /// Fraction of the current phase still to go.
    fn remaining(&self) -> f64 {
        match &self.status {
            Some(status) if self.phase_length > 0 => {
                (status.countdown as f64 / self.phase_length as f64).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

pub fn engage_gui<F>(events: Receiver<MonitorEvent>, send: F) -> Result<(), Box<dyn Error>>
where
    F: FnMut(DeviceCommand) -> io::Result<()>,
{
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(100);
    let res = run_app(&mut terminal, App::default(), events, send, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(res?)
}

fn run_app<B: Backend, F>(
    terminal: &mut Terminal<B>,
    mut app: App,
    events: Receiver<MonitorEvent>,
    mut send: F,
    tick_rate: Duration,
) -> io::Result<()>
where
    F: FnMut(DeviceCommand) -> io::Result<()>,
{
    loop {
        for event in events.try_iter() {
            app.on_event(event);
        }

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let command = match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char('s') => DeviceCommand::Start,
                    KeyCode::Char('p') => DeviceCommand::Pause,
                    KeyCode::Char('r') => DeviceCommand::Resume,
                    _ => continue,
                };
                app.message = match send(command) {
                    Ok(()) => format!("Sent {}", command),
                    Err(e) => {
                        warn!("Failed to send {}: {}", command, e);
                        format!("Failed to send {}: {}", command, e)
                    }
                };
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(1),
        ])
        .split(f.size());

    let (phase, countdown) = match &app.status {
        Some(status) => (status.phase.clone(), format!("{}s", status.countdown)),
        None => ("Waiting for the glove...".to_owned(), "-".to_owned()),
    };
    let status = Paragraph::new(vec![
        Line::from(vec![" Phase: ".into(), Span::styled(phase, Style::new().cyan().bold())]),
        Line::from(vec![" Countdown: ".into(), Span::styled(countdown, Style::new().cyan().bold())]),
    ])
    .block(Block::default().title(" Therapy ").borders(Borders::ALL));
    f.render_widget(status, chunks[0]);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(app.remaining());
    f.render_widget(gauge, chunks[1]);

    let help = Paragraph::new(vec![
        Line::from(" Start <S>  Pause <P>  Resume <R>  Quit <Q>"),
        Line::from(format!(" {}", app.message)),
    ]);
    f.render_widget(help, chunks[2]);
}
