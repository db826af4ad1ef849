//! Máquina de estados de la sesión interactiva.
//!
//! La sesión es dueña de la tabla de puertos actual, de la selección y del
//! último mensaje. Procesa un comando a la vez (`Refresh`, `Kill`, `Quit`)
//! y siempre queda en un estado consistente: o la tabla se reconstruye
//! entera, o no se toca.

use crate::error::KillError;
use crate::port_table::{PortEntry, PortTable, PortTableBuilder};
use crate::process::ProcessControl;
use crate::snapshot::SocketSource;

/// Mensaje mostrado tras refrescar la lista.
pub const REFRESHED_MESSAGE: &str = "List refreshed";

/// Fase de la máquina de estados.
///
/// `Refreshing` y `Acting` son transitorias: entre comandos la sesión
/// siempre está en `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Refreshing,
    Acting,
}

/// Comandos que modifican la sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reconstruir la tabla de puertos
    Refresh,
    /// Terminar el proceso dueño del puerto seleccionado
    Kill,
    /// Salir de la aplicación
    Quit,
}

/// Qué debe hacer el bucle principal después de un comando.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Tono del último mensaje (la interfaz decide el estilo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Success,
    Error,
}

/// Resultado de la última acción, en texto plano.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl StatusMessage {
    fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Estado de la sesión interactiva.
#[derive(Debug)]
pub struct Session<S, P> {
    builder: PortTableBuilder<S, P>,
    table: PortTable,
    selected: Option<usize>,
    message: Option<StatusMessage>,
    phase: Phase,
}

impl<S: SocketSource, P: ProcessControl> Session<S, P> {
    /// Crea la sesión realizando la primera pasada de resolución.
    ///
    /// Si hay puertos, queda seleccionado el primero.
    pub fn start(builder: PortTableBuilder<S, P>) -> Self {
        let table = builder.build();
        let selected = if table.is_empty() { None } else { Some(0) };
        Self {
            builder,
            table,
            selected,
            message: None,
            phase: Phase::Idle,
        }
    }

    /// Aplica un comando y lo procesa hasta el final.
    pub fn apply(&mut self, command: Command) -> Flow {
        match command {
            Command::Refresh => {
                self.refresh();
                Flow::Continue
            }
            Command::Kill => {
                self.kill_selected();
                Flow::Continue
            }
            Command::Quit => {
                log::info!("Cerrando sesión");
                Flow::Quit
            }
        }
    }

    /// Reconstruye la tabla e informa "List refreshed".
    pub fn refresh(&mut self) {
        self.rebuild();
        self.message = Some(StatusMessage::new(MessageKind::Info, REFRESHED_MESSAGE));
    }

    /// Termina el proceso dueño del puerto seleccionado.
    ///
    /// Sin selección no hace nada. Si la señal se entrega (o el proceso ya
    /// no existía) se reconstruye la tabla; si falla, la tabla y la
    /// selección quedan intactas y solo cambia el mensaje.
    pub fn kill_selected(&mut self) {
        let Some(entry) = self.selected_entry().cloned() else {
            log::debug!("Kill sin selección: nada que hacer");
            return;
        };

        let Some(pid) = entry.owner_pid else {
            log::warn!("Puerto {} sin PID visible, no se puede matar", entry.port);
            self.message = Some(StatusMessage::new(
                MessageKind::Error,
                format!("Failed to kill port {}: owning process not visible", entry.port),
            ));
            return;
        };

        self.phase = Phase::Acting;
        let outcome = self.builder.processes().kill(pid);
        self.phase = Phase::Idle;

        match outcome {
            Ok(()) => self.on_killed(&entry, pid),
            // El objetivo ya se cumplió
            Err(KillError::NotFound) => {
                log::info!("El proceso {pid} ya había terminado");
                self.on_killed(&entry, pid);
            }
            Err(err) => {
                log::warn!("Error cerrando puerto {} (PID {}): {}", entry.port, pid, err);
                self.message = Some(StatusMessage::new(
                    MessageKind::Error,
                    format!("Failed to kill {pid}: {err}"),
                ));
            }
        }
    }

    /// Cambia la selección. Un índice fuera de rango se ajusta al último.
    pub fn select(&mut self, index: Option<usize>) {
        self.selected = clamp_selection(index, self.table.len());
    }

    /// Entrada seleccionada, si la hay.
    pub fn selected_entry(&self) -> Option<&PortEntry> {
        self.selected.and_then(|index| self.table.get(index))
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn table(&self) -> &PortTable {
        &self.table
    }

    pub fn message(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn on_killed(&mut self, entry: &PortEntry, pid: u32) {
        log::info!("Puerto {} cerrado ({} PID {})", entry.port, entry.owner_name, pid);
        self.rebuild();
        self.message = Some(StatusMessage::new(
            MessageKind::Success,
            format!("Successfully killed {} (Port {})", entry.owner_name, entry.port),
        ));
    }

    fn rebuild(&mut self) {
        self.phase = Phase::Refreshing;
        self.table = self.builder.build();
        self.selected = clamp_selection(self.selected.or(Some(0)), self.table.len());
        self.phase = Phase::Idle;
    }
}

fn clamp_selection(index: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    index.map(|i| i.min(len - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapshotError;
    use crate::port_table::tests::listen;
    use crate::port_table::UNKNOWN_PROCESS;
    use crate::snapshot::RawConnection;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Fuente cuyo contenido se puede cambiar entre pasadas.
    #[derive(Clone, Default)]
    struct ScriptedSource(Rc<RefCell<Vec<RawConnection>>>);

    impl ScriptedSource {
        fn set(&self, connections: Vec<RawConnection>) {
            *self.0.borrow_mut() = connections;
        }
    }

    impl SocketSource for ScriptedSource {
        fn try_snapshot(&self) -> Result<Vec<RawConnection>, SnapshotError> {
            Ok(self.0.borrow().clone())
        }
    }

    /// Procesos falsos: nombres fijos, resultado de kill configurable y
    /// registro de los PIDs señalizados.
    struct FakeProcesses {
        names: HashMap<u32, String>,
        kill_result: Result<(), KillError>,
        killed: RefCell<Vec<u32>>,
    }

    impl FakeProcesses {
        fn new(kill_result: Result<(), KillError>) -> Self {
            let names = [(100, "sshd"), (200, "nginx"), (300, "postgres")]
                .into_iter()
                .map(|(pid, name)| (pid, name.to_string()))
                .collect();
            Self {
                names,
                kill_result,
                killed: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessControl for FakeProcesses {
        fn process_name(&self, pid: u32) -> Result<String, crate::error::ResolveError> {
            self.names
                .get(&pid)
                .cloned()
                .ok_or(crate::error::ResolveError::NotFound(pid))
        }

        fn kill(&self, pid: u32) -> Result<(), KillError> {
            self.killed.borrow_mut().push(pid);
            self.kill_result.clone()
        }
    }

    fn session_with(
        connections: Vec<RawConnection>,
        kill_result: Result<(), KillError>,
    ) -> (Session<ScriptedSource, FakeProcesses>, ScriptedSource) {
        let source = ScriptedSource::default();
        source.set(connections);
        let session = Session::start(PortTableBuilder::new(source.clone(), FakeProcesses::new(kill_result)));
        (session, source)
    }

    fn ports<S: SocketSource, P: ProcessControl>(session: &Session<S, P>) -> Vec<u16> {
        session.table().iter().map(|e| e.port).collect()
    }

    fn killed<S: SocketSource>(session: &Session<S, FakeProcesses>) -> Vec<u32> {
        session.builder.processes().killed.borrow().clone()
    }

    #[test]
    fn test_start_selects_first_entry() {
        let (session, _) = session_with(vec![listen(80, 200), listen(22, 100)], Ok(()));
        assert_eq!(ports(&session), vec![22, 80]);
        assert_eq!(session.selected_index(), Some(0));
        assert_eq!(session.selected_entry().unwrap().owner_name, "sshd");
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.message().is_none());
    }

    #[test]
    fn test_start_with_empty_table_has_no_selection() {
        let (session, _) = session_with(Vec::new(), Ok(()));
        assert!(session.table().is_empty());
        assert_eq!(session.selected_index(), None);
        assert!(session.selected_entry().is_none());
    }

    #[test]
    fn test_refresh_replaces_table_and_clamps_selection() {
        let (mut session, source) =
            session_with(vec![listen(22, 100), listen(80, 200), listen(5432, 300)], Ok(()));
        session.select(Some(2));

        source.set(vec![listen(22, 100)]);
        assert_eq!(session.apply(Command::Refresh), Flow::Continue);

        assert_eq!(ports(&session), vec![22]);
        assert_eq!(session.selected_index(), Some(0));
        assert_eq!(session.message().unwrap().text, REFRESHED_MESSAGE);
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn test_refresh_to_empty_clears_selection() {
        let (mut session, source) = session_with(vec![listen(22, 100)], Ok(()));
        source.set(Vec::new());
        session.refresh();
        assert_eq!(session.selected_index(), None);
        assert_eq!(session.message().unwrap().text, REFRESHED_MESSAGE);
    }

    #[test]
    fn test_refresh_from_empty_selects_first() {
        let (mut session, source) = session_with(Vec::new(), Ok(()));
        source.set(vec![listen(22, 100)]);
        session.refresh();
        assert_eq!(session.selected_index(), Some(0));
    }

    #[test]
    fn test_kill_success_rebuilds_and_reports() {
        let (mut session, source) = session_with(vec![listen(22, 100), listen(80, 200)], Ok(()));
        session.select(Some(1));
        source.set(vec![listen(22, 100)]);

        session.apply(Command::Kill);

        assert_eq!(killed(&session), vec![200]);
        assert_eq!(ports(&session), vec![22]);
        let message = session.message().unwrap();
        assert_eq!(message.kind, MessageKind::Success);
        assert!(message.text.contains("nginx"));
        assert!(message.text.contains("80"));
        assert_eq!(session.selected_index(), Some(0));
    }

    #[test]
    fn test_kill_not_found_behaves_like_success() {
        let (mut success, source_a) = session_with(vec![listen(22, 100), listen(80, 200)], Ok(()));
        let (mut gone, source_b) =
            session_with(vec![listen(22, 100), listen(80, 200)], Err(KillError::NotFound));
        for source in [&source_a, &source_b] {
            source.set(vec![listen(80, 200)]);
        }

        success.apply(Command::Kill);
        gone.apply(Command::Kill);

        assert_eq!(success.message(), gone.message());
        assert_eq!(success.table(), gone.table());
        assert_eq!(gone.message().unwrap().text, "Successfully killed sshd (Port 22)");
    }

    #[test]
    fn test_kill_permission_denied_leaves_table_untouched() {
        let (mut session, source) =
            session_with(vec![listen(22, 100), listen(80, 200)], Err(KillError::PermissionDenied));
        session.select(Some(1));
        let before = session.table().clone();
        source.set(Vec::new());

        session.apply(Command::Kill);

        assert_eq!(session.table(), &before);
        assert_eq!(session.selected_index(), Some(1));
        let message = session.message().unwrap();
        assert_eq!(message.kind, MessageKind::Error);
        assert!(message.text.contains("200"));
        assert!(message.text.starts_with("Failed to kill"));
    }

    #[test]
    fn test_kill_other_error_reports_reason() {
        let (mut session, _) =
            session_with(vec![listen(22, 100)], Err(KillError::Other("invalid argument".into())));
        session.kill_selected();
        assert_eq!(session.message().unwrap().text, "Failed to kill 100: invalid argument");
    }

    #[test]
    fn test_kill_on_empty_table_is_noop() {
        let (mut session, source) = session_with(Vec::new(), Ok(()));
        source.set(vec![listen(22, 100)]);

        session.apply(Command::Kill);

        assert!(killed(&session).is_empty());
        assert!(session.table().is_empty());
        assert!(session.message().is_none());
        assert_eq!(session.selected_index(), None);
    }

    #[test]
    fn test_kill_without_visible_pid_skips_the_os() {
        let hidden = RawConnection {
            local_port: 631,
            pid: None,
            state: crate::snapshot::SocketState::Listen,
        };
        let (mut session, _) = session_with(vec![hidden], Ok(()));
        assert_eq!(session.selected_entry().unwrap().owner_name, UNKNOWN_PROCESS);

        session.kill_selected();

        assert!(killed(&session).is_empty());
        let message = session.message().unwrap();
        assert_eq!(message.kind, MessageKind::Error);
        assert!(message.text.contains("631"));
    }

    #[test]
    fn test_message_is_replaced_not_accumulated() {
        let (mut session, _) = session_with(vec![listen(22, 100)], Err(KillError::PermissionDenied));
        session.kill_selected();
        session.refresh();
        assert_eq!(session.message().unwrap().text, REFRESHED_MESSAGE);
    }

    #[test]
    fn test_select_clamps_to_table() {
        let (mut session, _) = session_with(vec![listen(22, 100), listen(80, 200)], Ok(()));
        session.select(Some(10));
        assert_eq!(session.selected_index(), Some(1));
        session.select(None);
        assert!(session.selected_entry().is_none());
    }

    #[test]
    fn test_quit() {
        let (mut session, _) = session_with(Vec::new(), Ok(()));
        assert_eq!(session.apply(Command::Quit), Flow::Quit);
    }
}
