/// Interfaz de terminal de PortSlayer.
///
/// Dibuja la sesión con ratatui y traduce las teclas a comandos. La
/// navegación y el filtro por texto viven aquí; la sesión solo recibe la
/// entrada seleccionada y los comandos `Refresh`, `Kill` y `Quit`.
///
/// ## Teclas
/// - `↑`/`k`, `↓`/`j`, `g`/`G`: moverse por la lista
/// - `r`: actualizar
/// - `x`/`Supr`: matar el proceso del puerto seleccionado
/// - `/`: filtrar por puerto o nombre, `Enter` acepta, `Esc` limpia
/// - `q`/`Ctrl+C`: salir
use std::io::{self, Stdout};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};

use crate::port_table::{PortEntry, PortTable};
use crate::process::ProcessControl;
use crate::session::{Command, Flow, MessageKind, Phase, Session};
use crate::snapshot::SocketSource;

/// Título de la lista de puertos
const TITLE: &str = " ⚔️ Port Inspector & Executioner ";

/// Ayuda mostrada en el borde inferior
const HELP: &str = " [j/k] Move [/] Filter [r] Refresh [x] Kill [q] Quit ";

// ─────────────────────────────────────────────────────────────
// Terminal
// ─────────────────────────────────────────────────────────────

/// Terminal en modo raw + pantalla alternativa.
///
/// Al soltarse restaura la terminal, también si el bucle principal
/// termina con error.
pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }

    pub fn terminal(&mut self) -> &mut Terminal<CrosstermBackend<Stdout>> {
        &mut self.terminal
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            log::error!("No se pudo salir del modo raw: {err}");
        }
        if let Err(err) = execute!(self.terminal.backend_mut(), LeaveAlternateScreen) {
            log::error!("No se pudo restaurar la pantalla: {err}");
        }
        let _ = self.terminal.show_cursor();
    }
}

// ─────────────────────────────────────────────────────────────
// Teclas → acciones
// ─────────────────────────────────────────────────────────────

/// Modo de entrada de la lista.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Filter,
}

/// Acción resultante de una tecla.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Command(Command),
    Up,
    Down,
    First,
    Last,
    StartFilter,
    FilterChar(char),
    FilterBackspace,
    AcceptFilter,
    ClearFilter,
}

/// Traduce una tecla a una acción según el modo actual.
pub fn map_key(key: KeyEvent, mode: InputMode) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Command(Command::Quit));
    }

    match (mode, key.code) {
        (_, KeyCode::Up) => Some(Action::Up),
        (_, KeyCode::Down) => Some(Action::Down),
        (_, KeyCode::Esc) => Some(Action::ClearFilter),

        (InputMode::Filter, KeyCode::Enter) => Some(Action::AcceptFilter),
        (InputMode::Filter, KeyCode::Backspace) => Some(Action::FilterBackspace),
        (InputMode::Filter, KeyCode::Char(c)) => Some(Action::FilterChar(c)),

        (InputMode::Normal, KeyCode::Char('q')) => Some(Action::Command(Command::Quit)),
        (InputMode::Normal, KeyCode::Char('r')) => Some(Action::Command(Command::Refresh)),
        (InputMode::Normal, KeyCode::Char('x') | KeyCode::Delete) => {
            Some(Action::Command(Command::Kill))
        }
        (InputMode::Normal, KeyCode::Char('k')) => Some(Action::Up),
        (InputMode::Normal, KeyCode::Char('j')) => Some(Action::Down),
        (InputMode::Normal, KeyCode::Char('g') | KeyCode::Home) => Some(Action::First),
        (InputMode::Normal, KeyCode::Char('G') | KeyCode::End) => Some(Action::Last),
        (InputMode::Normal, KeyCode::Char('/')) => Some(Action::StartFilter),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────
// Estado de la vista
// ─────────────────────────────────────────────────────────────

/// Estado propio de la interfaz: filtro y posición en la lista visible.
#[derive(Debug, Default)]
pub struct ListView {
    mode: InputMode,
    filter: String,
    list_state: ListState,
    /// Texto mostrado mientras se ejecuta un comando lento
    busy: Option<&'static str>,
}

impl ListView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Índices de la tabla que pasan el filtro actual.
    ///
    /// El filtro compara, sin distinguir mayúsculas, contra el número de
    /// puerto y el nombre del proceso.
    pub fn visible_indices(&self, table: &PortTable) -> Vec<usize> {
        let query = self.filter.to_lowercase();
        table
            .iter()
            .enumerate()
            .filter(|(_, entry)| query.is_empty() || matches_filter(entry, &query))
            .map(|(index, _)| index)
            .collect()
    }

    /// Alinea la lista visible con la selección de la sesión.
    ///
    /// Si la entrada seleccionada quedó oculta por el filtro, pasa a la
    /// primera visible; sin entradas visibles la sesión queda sin
    /// selección, así `Kill` nunca actúa sobre algo que no se ve.
    pub fn sync<S: SocketSource, P: ProcessControl>(&mut self, session: &mut Session<S, P>) {
        let visible = self.visible_indices(session.table());
        let position = session
            .selected_index()
            .and_then(|selected| visible.iter().position(|&index| index == selected));

        match (position, visible.first()) {
            (Some(position), _) => self.list_state.select(Some(position)),
            (None, Some(&first)) => {
                session.select(Some(first));
                self.list_state.select(Some(0));
            }
            (None, None) => {
                session.select(None);
                self.list_state.select(None);
            }
        }
    }

    /// Aplica una acción de la interfaz.
    pub fn handle<S: SocketSource, P: ProcessControl>(
        &mut self,
        action: Action,
        session: &mut Session<S, P>,
    ) -> Flow {
        let flow = match action {
            Action::Command(command) => session.apply(command),
            Action::Up => self.move_by(session, -1),
            Action::Down => self.move_by(session, 1),
            Action::First => self.move_by(session, isize::MIN),
            Action::Last => self.move_by(session, isize::MAX),
            Action::StartFilter => {
                self.mode = InputMode::Filter;
                Flow::Continue
            }
            Action::FilterChar(c) => {
                self.filter.push(c);
                Flow::Continue
            }
            Action::FilterBackspace => {
                self.filter.pop();
                Flow::Continue
            }
            Action::AcceptFilter => {
                self.mode = InputMode::Normal;
                Flow::Continue
            }
            Action::ClearFilter => {
                self.filter.clear();
                self.mode = InputMode::Normal;
                Flow::Continue
            }
        };
        self.sync(session);
        flow
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    fn move_by<S: SocketSource, P: ProcessControl>(
        &mut self,
        session: &mut Session<S, P>,
        delta: isize,
    ) -> Flow {
        let visible = self.visible_indices(session.table());
        if let Some(last) = visible.len().checked_sub(1) {
            let current = self.list_state.selected().unwrap_or(0);
            let target = current.saturating_add_signed(delta).min(last);
            session.select(Some(visible[target]));
        }
        Flow::Continue
    }
}

fn matches_filter(entry: &PortEntry, query: &str) -> bool {
    entry.port.to_string().contains(query) || entry.owner_name.to_lowercase().contains(query)
}

// ─────────────────────────────────────────────────────────────
// Bucle principal
// ─────────────────────────────────────────────────────────────

/// Pantalla de espera mientras se hace la primera pasada.
pub fn draw_splash<B: Backend>(terminal: &mut Terminal<B>) -> io::Result<()> {
    terminal.draw(|f| {
        let block = Block::default().title(TITLE).borders(Borders::ALL).cyan();
        let text = Paragraph::new(Line::from(" ⏳ Scanning ports…".yellow().italic())).block(block);
        f.render_widget(text, f.area());
    })?;
    Ok(())
}

/// Ejecuta la interfaz hasta que el usuario sale.
pub fn run<B, S, P>(terminal: &mut Terminal<B>, session: &mut Session<S, P>) -> io::Result<()>
where
    B: Backend,
    S: SocketSource,
    P: ProcessControl,
{
    let mut view = ListView::new();
    view.sync(session);

    loop {
        terminal.draw(|f| draw(f, session, &mut view))?;

        let Event::Key(key) = event::read()? else {
            // Resize y demás eventos solo piden redibujar
            continue;
        };
        let Some(action) = map_key(key, view.mode()) else {
            continue;
        };

        // Refrescar y matar bloquean: mostrar el aviso antes
        view.busy = match action {
            Action::Command(Command::Refresh) => Some("Refreshing…"),
            Action::Command(Command::Kill) if session.selected_entry().is_some() => Some("Killing…"),
            _ => None,
        };
        if view.busy.is_some() {
            terminal.draw(|f| draw(f, session, &mut view))?;
        }

        let flow = view.handle(action, session);
        view.busy = None;
        debug_assert_eq!(session.phase(), Phase::Idle);

        if flow == Flow::Quit {
            return Ok(());
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Dibujo
// ─────────────────────────────────────────────────────────────

/// Dibuja la lista de puertos y la barra de estado.
pub fn draw<S, P>(f: &mut Frame, session: &Session<S, P>, view: &mut ListView)
where
    S: SocketSource,
    P: ProcessControl,
{
    let [list_area, status_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(4)]).areas(f.area());

    draw_list(f, list_area, session.table(), view);
    draw_status(f, status_area, session, view);
}

fn draw_list(f: &mut Frame, area: Rect, table: &PortTable, view: &mut ListView) {
    let visible = view.visible_indices(table);
    let title = format!("{TITLE}({} ports) ", visible.len());
    let block = Block::default()
        .title(title)
        .title_bottom(Line::from(HELP).centered().dark_gray())
        .borders(Borders::ALL)
        .cyan();

    if visible.is_empty() {
        let text = if table.is_empty() {
            " ✅ No listening TCP ports"
        } else {
            " No ports match the filter"
        };
        f.render_widget(Paragraph::new(text.dark_gray()).block(block), area);
        return;
    }

    let items: Vec<ListItem> = visible
        .iter()
        .filter_map(|&index| table.get(index))
        .map(port_item)
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::Rgb(30, 30, 30)).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");

    f.render_stateful_widget(list, area, &mut view.list_state);
}

/// Item de dos líneas: "Port 8080" y "PID: 1234 • node".
fn port_item(entry: &PortEntry) -> ListItem<'static> {
    let pid = entry
        .owner_pid
        .map_or_else(|| "-".to_string(), |pid| pid.to_string());
    let name_color = if entry.owner_pid.is_some() {
        Color::Rgb(0, 255, 127)
    } else {
        Color::DarkGray
    };

    ListItem::new(vec![
        Line::from(format!("Port {}", entry.port).white().bold()),
        Line::from(vec![
            Span::styled(format!("  PID: {pid} • "), Style::default().fg(Color::Gray)),
            Span::styled(
                entry.owner_name.clone(),
                Style::default().fg(name_color).add_modifier(Modifier::ITALIC),
            ),
        ]),
    ])
}

fn draw_status<S, P>(f: &mut Frame, area: Rect, session: &Session<S, P>, view: &ListView)
where
    S: SocketSource,
    P: ProcessControl,
{
    let message = match (view.busy, session.message()) {
        (Some(busy), _) => Line::from(format!(" ⏳ {busy}").yellow().italic()),
        (None, Some(message)) => {
            let style = match message.kind {
                MessageKind::Info | MessageKind::Success => {
                    Style::default().fg(Color::Green).add_modifier(Modifier::ITALIC)
                }
                MessageKind::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            };
            Line::from(Span::styled(format!(" {}", message.text), style))
        }
        (None, None) => Line::from(""),
    };

    let mode = match view.mode() {
        InputMode::Normal => " NORMAL ".on_green().black().bold(),
        InputMode::Filter => " FILTER ".on_yellow().black().bold(),
    };
    let filter_line = Line::from(vec![
        mode,
        " │ Filter: ".dark_gray(),
        view.filter().to_string().yellow().underlined(),
    ]);

    f.render_widget(
        Paragraph::new(vec![message, filter_line]).block(Block::default().borders(Borders::ALL)),
        area,
    );
}
