// tools/linkterm_cli/main.rs
//
// linkterm: interactive serial terminal on top of the link engine.
//
// Usage:
//   linkterm list
//   linkterm open /dev/ttyUSB0 --baud 115200
//   linkterm loopback            (echo device, no hardware needed)
//
// Keys: Enter sends, Tab toggles hex input, Ctrl-X toggles hex view,
// Ctrl-T toggles timestamps, Ctrl-L clears, Esc quits.
// In loopback mode Ctrl-U unplugs or replugs the fake device.

use std::error::Error;
use std::io::Stdout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::broadcast::error::RecvError;

use linkterm_lib::{
    default_settings_path, init_logging, list_ports, load_settings, save_settings, Direction,
    DisplayMode, EngineSettings, FlowControl, LineEnding, LinkConfig, LinkEngine, LinkStatus,
    LoopbackDevice, Parity, StopBits,
};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Redraw interval so the reconnect countdown keeps moving.
const REFRESH: Duration = Duration::from_millis(250);

const LOOPBACK_PORT: &str = "loopback";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "linkterm", version, about = "Serial terminal with automatic reconnect")]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Write logs to a timestamped file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports and exit
    List,
    /// Open a serial port (the last used port if omitted)
    Open(OpenArgs),
    /// Talk to an in-memory echo device
    Loopback(ViewArgs),
}

#[derive(Args, Debug)]
struct OpenArgs {
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    #[arg(long)]
    data_bits: Option<u8>,

    #[arg(long, value_enum)]
    parity: Option<ParityArg>,

    #[arg(long, value_enum)]
    stop_bits: Option<StopBitsArg>,

    #[arg(long, value_enum)]
    flow: Option<FlowArg>,

    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Show traffic as hex bytes
    #[arg(long)]
    hex: bool,

    /// Prefix each record with its arrival time
    #[arg(long)]
    timestamps: bool,

    /// Line ending appended when pressing Enter
    #[arg(long, value_enum)]
    line_ending: Option<EndingArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ParityArg {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
            ParityArg::Mark => Parity::Mark,
            ParityArg::Space => Parity::Space,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "1.5")]
    OnePointFive,
    #[value(name = "2")]
    Two,
}

impl From<StopBitsArg> for StopBits {
    fn from(arg: StopBitsArg) -> Self {
        match arg {
            StopBitsArg::One => StopBits::One,
            StopBitsArg::OnePointFive => StopBits::OnePointFive,
            StopBitsArg::Two => StopBits::Two,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FlowArg {
    None,
    RtsCts,
    XonXoff,
}

impl From<FlowArg> for FlowControl {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::None => FlowControl::None,
            FlowArg::RtsCts => FlowControl::RtsCts,
            FlowArg::XonXoff => FlowControl::XonXoff,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EndingArg {
    None,
    Lf,
    Cr,
    Crlf,
}

impl From<EndingArg> for LineEnding {
    fn from(arg: EndingArg) -> Self {
        match arg {
            EndingArg::None => LineEnding::None,
            EndingArg::Lf => LineEnding::Lf,
            EndingArg::Cr => LineEnding::Cr,
            EndingArg::Crlf => LineEnding::CrLf,
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            init_logging(cli.log_dir.as_deref())?;
            print_ports()
        }
        Command::Open(args) => {
            init_logging(Some(&log_dir(cli.log_dir)))?;
            let settings_path = cli.settings.or_else(default_settings_path);
            let mut settings = read_settings(settings_path.as_deref())?;
            apply_view_args(&mut settings, &args.view);

            let config = link_config(&settings, &args)?;
            let engine = LinkEngine::new(settings.clone());
            engine.connect(config.clone())?;

            if let Some(path) = settings_path.as_deref() {
                settings.last_link = Some(config);
                if let Err(e) = save_settings(path, &settings) {
                    tracing::warn!(error = %e, "could not remember the last link");
                }
            }

            let app = App::new(settings.line_ending, None);
            run_terminal(&engine, app).await
        }
        Command::Loopback(view) => {
            init_logging(Some(&log_dir(cli.log_dir)))?;
            let mut settings = read_settings(cli.settings.as_deref())?;
            apply_view_args(&mut settings, &view);

            let device = LoopbackDevice::with_echo(LOOPBACK_PORT);
            let engine = LinkEngine::with_opener(settings.clone(), Arc::new(device.opener()));
            engine.connect(LinkConfig::new(LOOPBACK_PORT, 115_200))?;

            let app = App::new(settings.line_ending, Some(device));
            run_terminal(&engine, app).await
        }
    }
}

fn print_ports() -> CliResult<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for port in ports {
        let mut line = format!("{:<24} {}", port.port_name, port.kind);
        if let Some(usb) = &port.usb {
            line.push_str(&format!(" {:04x}:{:04x}", usb.vid, usb.pid));
            if let Some(label) = usb.label() {
                line.push_str(&format!(" {}", label));
            }
        }
        println!("{}", line);
    }
    Ok(())
}

/// The TUI owns the terminal, so logs always go to a file.
fn log_dir(requested: Option<PathBuf>) -> PathBuf {
    requested.unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("linkterm")
            .join("logs")
    })
}

fn read_settings(path: Option<&Path>) -> CliResult<EngineSettings> {
    match path {
        Some(path) => Ok(load_settings(path)?),
        None => Ok(EngineSettings::default()),
    }
}

fn apply_view_args(settings: &mut EngineSettings, view: &ViewArgs) {
    if view.hex {
        settings.display.mode = DisplayMode::Hex;
    }
    if view.timestamps {
        settings.display.timestamps = true;
    }
    if let Some(ending) = view.line_ending {
        settings.line_ending = ending.into();
    }
}

/// Command-line values over the remembered link over defaults.
fn link_config(settings: &EngineSettings, args: &OpenArgs) -> CliResult<LinkConfig> {
    let remembered = settings.last_link.clone();
    let mut config = match (&args.port, remembered) {
        (Some(port), Some(last)) if last.port_name == *port => last,
        (Some(port), _) => LinkConfig::new(port.clone(), 115_200),
        (None, Some(last)) => last,
        (None, None) => return Err("no port given and no previous link to reopen".into()),
    };

    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(bits) = args.data_bits {
        config.data_bits = bits;
    }
    if let Some(parity) = args.parity {
        config.parity = parity.into();
    }
    if let Some(stop_bits) = args.stop_bits {
        config.stop_bits = stop_bits.into();
    }
    if let Some(flow) = args.flow {
        config.flow_control = flow.into();
    }
    Ok(config)
}

// ============================================================================
// Terminal UI
// ============================================================================

struct App {
    input: String,
    hex_input: bool,
    line_ending: LineEnding,
    loopback: Option<LoopbackDevice>,
    quit: bool,
}

impl App {
    fn new(line_ending: LineEnding, loopback: Option<LoopbackDevice>) -> Self {
        Self {
            input: String::new(),
            hex_input: false,
            line_ending,
            loopback,
            quit: false,
        }
    }

    fn handle_key(&mut self, engine: &LinkEngine, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.quit = true,
            KeyCode::Char('c') if ctrl => self.quit = true,
            KeyCode::Char('l') if ctrl => engine.clear(),
            KeyCode::Char('x') if ctrl => {
                let mut options = engine.buffer().display_options();
                options.mode = match options.mode {
                    DisplayMode::Text => DisplayMode::Hex,
                    DisplayMode::Hex => DisplayMode::Text,
                };
                engine.set_display_options(options);
            }
            KeyCode::Char('t') if ctrl => {
                let mut options = engine.buffer().display_options();
                options.timestamps = !options.timestamps;
                engine.set_display_options(options);
            }
            KeyCode::Char('u') if ctrl => {
                if let Some(device) = &self.loopback {
                    if device.is_plugged() {
                        device.unplug();
                        engine.note("Loopback device unplugged");
                    } else {
                        device.replug();
                        engine.note("Loopback device plugged back in");
                    }
                }
            }
            KeyCode::Tab => self.hex_input = !self.hex_input,
            KeyCode::Enter => self.submit(engine),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) if !ctrl => self.input.push(c),
            _ => {}
        }
    }

    fn submit(&mut self, engine: &LinkEngine) {
        let result = if self.hex_input {
            engine.send_hex(&self.input)
        } else {
            engine.send_text(&self.input, self.line_ending)
        };
        match result {
            Ok(()) => self.input.clear(),
            // Keep the input so it can be retried
            Err(e) => engine.note(format!("Send failed: {}", e)),
        }
    }
}

async fn run_terminal(engine: &LinkEngine, mut app: App) -> CliResult<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(&mut terminal, engine, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    engine.disconnect();
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    engine: &LinkEngine,
    app: &mut App,
) -> CliResult<()> {
    let mut link_events = engine.subscribe();
    let mut keys = EventStream::new();
    let mut refresh = tokio::time::interval(REFRESH);

    while !app.quit {
        terminal.draw(|frame| draw(frame, engine, app))?;

        tokio::select! {
            key = keys.next() => match key {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    app.handle_key(engine, key);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            event = link_events.recv() => match event {
                // Every redraw reads the latest snapshot, so skipped events are harmless
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = refresh.tick() => {}
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, engine: &LinkEngine, app: &App) {
    let [body, status_area, input_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(3),
    ])
    .areas(frame.area());

    let title = match engine.link_config() {
        Some(config) => format!(" {} ", config),
        None => " linkterm ".to_string(),
    };
    let height = body.height.saturating_sub(2) as usize;
    let mut lines = record_lines(engine, height);
    let skip = lines.len().saturating_sub(height);
    let visible = lines.split_off(skip);
    frame.render_widget(Paragraph::new(visible).block(Block::bordered().title(title)), body);

    frame.render_widget(Paragraph::new(status_line(engine)), status_area);

    let label = if app.hex_input { " Send (hex) " } else { " Send " };
    frame.render_widget(
        Paragraph::new(app.input.as_str()).block(Block::bordered().title(label)),
        input_area,
    );
    frame.set_cursor_position((
        input_area.x + 1 + app.input.chars().count() as u16,
        input_area.y + 1,
    ));
}

fn record_lines(engine: &LinkEngine, count: usize) -> Vec<Line<'static>> {
    let buffer = engine.buffer();
    let snapshot = engine.tail(count);
    let mut lines = Vec::new();
    for record in snapshot.iter() {
        let style = match record.direction {
            Direction::Rx => Style::default(),
            Direction::Tx => Style::default().fg(Color::Cyan),
            Direction::Error => Style::default().fg(Color::Red),
            Direction::Info => Style::default().fg(Color::Yellow),
        };
        let text = buffer.rendered_text(record);
        for part in text.split('\n') {
            lines.push(Line::styled(part.trim_end_matches('\r').to_string(), style));
        }
    }
    lines
}

fn status_line(engine: &LinkEngine) -> Line<'static> {
    let (label, color) = match engine.status() {
        LinkStatus::Connected => ("connected".to_string(), Color::Green),
        LinkStatus::Reconnecting {
            attempt,
            next_attempt_at,
        } => {
            let wait_ms = (next_attempt_at - Local::now()).num_milliseconds().max(0);
            (
                format!("reconnecting (attempt {}) in {:.1}s", attempt, wait_ms as f64 / 1000.0),
                Color::Yellow,
            )
        }
        LinkStatus::Disconnected => ("disconnected".to_string(), Color::Red),
    };
    let stats = engine.stats();
    Line::styled(
        format!(
            " {} | TX {} B | RX {} B | errors {} | up {}s ",
            label,
            stats.bytes_tx,
            stats.bytes_rx,
            stats.error_count,
            stats.session_duration.as_secs()
        ),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )
}
