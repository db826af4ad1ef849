/// Construcción de la tabla de puertos en escucha.
///
/// Une la foto de sockets con los nombres de proceso: se queda con los
/// sockets `LISTEN`, elimina duplicados por puerto (gana el primero en el
/// orden del sistema), resuelve el nombre del dueño y ordena por puerto.
use std::collections::HashSet;

use crate::error::ResolveError;
use crate::process::ProcessControl;
use crate::snapshot::{RawConnection, SocketSource, SocketState};

/// Nombre usado cuando no se puede resolver el proceso dueño
pub const UNKNOWN_PROCESS: &str = "Unknown";

/// Un puerto TCP en escucha y su proceso dueño.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    /// Número del puerto
    pub port: u16,
    /// PID del proceso dueño al momento de la foto (si es visible)
    pub owner_pid: Option<u32>,
    /// Nombre del proceso, o [`UNKNOWN_PROCESS`]
    pub owner_name: String,
}

impl std::fmt::Display for PortEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.owner_pid {
            Some(pid) => write!(f, "Port {}: {} (PID: {})", self.port, self.owner_name, pid),
            None => write!(f, "Port {}: {}", self.port, self.owner_name),
        }
    }
}

/// Tabla de puertos ordenada, resultado de una pasada de resolución.
///
/// Invariantes: los puertos son únicos y están en orden ascendente. Una
/// vez construida no cambia; refrescar produce una tabla nueva.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortTable {
    entries: Vec<PortEntry>,
}

impl PortTable {
    /// Entradas en orden ascendente de puerto.
    pub fn entries(&self) -> &[PortEntry] {
        &self.entries
    }

    /// Entrada en la posición indicada.
    pub fn get(&self, index: usize) -> Option<&PortEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PortEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a PortTable {
    type Item = &'a PortEntry;
    type IntoIter = std::slice::Iter<'a, PortEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries().iter()
    }
}

/// Construye tablas de puertos a partir de una fuente de sockets y un
/// controlador de procesos.
#[derive(Debug)]
pub struct PortTableBuilder<S, P> {
    source: S,
    processes: P,
}

impl<S: SocketSource, P: ProcessControl> PortTableBuilder<S, P> {
    pub fn new(source: S, processes: P) -> Self {
        Self { source, processes }
    }

    /// Controlador de procesos usado para resolver nombres y matar.
    pub fn processes(&self) -> &P {
        &self.processes
    }

    /// Realiza una pasada completa: foto del kernel, deduplicado,
    /// resolución de nombres y orden.
    ///
    /// Nunca falla: sin sockets en escucha (o sin acceso a la tabla) el
    /// resultado es una tabla vacía.
    pub fn build(&self) -> PortTable {
        let connections = self.source.snapshot();
        let table = build_table(connections, |pid| self.processes.process_name(pid));
        log::info!("Tabla de puertos: {} puertos en escucha", table.len());
        table
    }
}

/// Algoritmo de construcción, independiente del sistema operativo.
///
/// # Arguments
/// * `connections` - Conexiones en el orden en que las entregó el sistema
/// * `resolve` - Resuelve el nombre de un PID
pub fn build_table<I, R>(connections: I, resolve: R) -> PortTable
where
    I: IntoIterator<Item = RawConnection>,
    R: Fn(u32) -> Result<String, ResolveError>,
{
    let mut seen = HashSet::new();

    let mut entries: Vec<PortEntry> = connections
        .into_iter()
        .filter(|conn| conn.state == SocketState::Listen)
        .filter(|conn| seen.insert(conn.local_port))
        .map(|conn| PortEntry {
            port: conn.local_port,
            owner_pid: conn.pid,
            owner_name: conn
                .pid
                .map_or_else(|| UNKNOWN_PROCESS.to_string(), |pid| resolve_name(&resolve, pid)),
        })
        .collect();

    // Puertos únicos: el orden por puerto es total
    entries.sort_by_key(|entry| entry.port);

    PortTable { entries }
}

fn resolve_name<R>(resolve: &R, pid: u32) -> String
where
    R: Fn(u32) -> Result<String, ResolveError>,
{
    match resolve(pid) {
        Ok(name) if !name.is_empty() => name,
        Ok(_) => UNKNOWN_PROCESS.to_string(),
        Err(err) => {
            log::debug!("Nombre no resuelto: {err}");
            UNKNOWN_PROCESS.to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::KillError;
    use proptest::prelude::*;
    use std::collections::HashMap;

    pub(crate) fn listen(port: u16, pid: u32) -> RawConnection {
        RawConnection {
            local_port: port,
            pid: Some(pid),
            state: SocketState::Listen,
        }
    }

    fn names(pairs: &[(u32, &str)]) -> impl Fn(u32) -> Result<String, ResolveError> {
        let map: HashMap<u32, String> = pairs.iter().map(|(pid, n)| (*pid, n.to_string())).collect();
        move |pid| map.get(&pid).cloned().ok_or(ResolveError::NotFound(pid))
    }

    #[test]
    fn test_example_scenario() {
        let raw = vec![listen(22, 100), listen(80, 200), listen(22, 999)];
        let table = build_table(raw, names(&[(100, "sshd"), (200, "nginx"), (999, "evil")]));

        assert_eq!(
            table.entries(),
            &[
                PortEntry {
                    port: 22,
                    owner_pid: Some(100),
                    owner_name: "sshd".into()
                },
                PortEntry {
                    port: 80,
                    owner_pid: Some(200),
                    owner_name: "nginx".into()
                },
            ]
        );
    }

    #[test]
    fn test_only_listen_sockets_are_kept() {
        let raw = vec![
            RawConnection {
                local_port: 22,
                pid: Some(1),
                state: SocketState::Established,
            },
            RawConnection {
                local_port: 443,
                pid: Some(2),
                state: SocketState::TimeWait,
            },
            listen(8080, 3),
        ];
        let table = build_table(raw, names(&[(3, "node")]));
        let ports: Vec<u16> = table.iter().map(|e| e.port).collect();
        assert_eq!(ports, vec![8080]);
    }

    #[test]
    fn test_non_listen_duplicate_does_not_shadow_listener() {
        // Una conexión establecida en el mismo puerto no cuenta como "primera"
        let raw = vec![
            RawConnection {
                local_port: 22,
                pid: Some(5),
                state: SocketState::Established,
            },
            listen(22, 100),
        ];
        let table = build_table(raw, names(&[(100, "sshd")]));
        assert_eq!(table.get(0).unwrap().owner_pid, Some(100));
    }

    #[test]
    fn test_resolver_failure_falls_back_to_unknown() {
        let raw = vec![listen(5432, 77)];
        let table = build_table(raw, |pid| Err(ResolveError::PermissionDenied(pid)));
        assert_eq!(table.get(0).unwrap().owner_name, UNKNOWN_PROCESS);
        assert_eq!(table.get(0).unwrap().owner_pid, Some(77));
    }

    #[test]
    fn test_unknown_pid_is_not_resolved() {
        let raw = vec![RawConnection {
            local_port: 631,
            pid: None,
            state: SocketState::Listen,
        }];
        let table = build_table(raw, |_| panic!("no debe consultarse"));
        assert_eq!(table.get(0).unwrap().owner_name, UNKNOWN_PROCESS);
        assert_eq!(table.get(0).unwrap().owner_pid, None);
    }

    #[test]
    fn test_empty_snapshot_gives_empty_table() {
        let table = build_table(Vec::new(), names(&[]));
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_display() {
        let entry = PortEntry {
            port: 8080,
            owner_pid: Some(12345),
            owner_name: "node".into(),
        };
        assert_eq!(entry.to_string(), "Port 8080: node (PID: 12345)");
    }

    struct FixedSource(Vec<RawConnection>);

    impl SocketSource for FixedSource {
        fn try_snapshot(&self) -> Result<Vec<RawConnection>, crate::error::SnapshotError> {
            Ok(self.0.clone())
        }
    }

    struct NamesOnly;

    impl ProcessControl for NamesOnly {
        fn process_name(&self, pid: u32) -> Result<String, ResolveError> {
            Ok(format!("proc-{pid}"))
        }

        fn kill(&self, _pid: u32) -> Result<(), KillError> {
            Ok(())
        }
    }

    #[test]
    fn test_builder_uses_source_and_resolver() {
        let builder = PortTableBuilder::new(FixedSource(vec![listen(443, 9), listen(80, 8)]), NamesOnly);
        let table = builder.build();
        let rendered: Vec<String> = table.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["Port 80: proc-8 (PID: 8)", "Port 443: proc-9 (PID: 9)"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Cada puerto aparece una sola vez y conserva el primer registro
        #[test]
        fn prop_dedup_keeps_first_listener(
            raw in prop::collection::vec((1u16..64, 1u32..1000, any::<bool>()), 0..80)
        ) {
            let connections: Vec<RawConnection> = raw
                .iter()
                .map(|&(port, pid, is_listen)| RawConnection {
                    local_port: port,
                    pid: Some(pid),
                    state: if is_listen { SocketState::Listen } else { SocketState::Established },
                })
                .collect();

            let table = build_table(connections.clone(), |pid| Ok(pid.to_string()));

            let mut expected: HashMap<u16, u32> = HashMap::new();
            for conn in connections.iter().filter(|c| c.state == SocketState::Listen) {
                expected.entry(conn.local_port).or_insert(conn.pid.unwrap());
            }

            prop_assert_eq!(table.len(), expected.len());
            for entry in &table {
                prop_assert_eq!(Some(expected[&entry.port]), entry.owner_pid);
            }
        }

        /// Los puertos quedan en orden estrictamente ascendente
        #[test]
        fn prop_table_is_strictly_sorted(ports in prop::collection::vec(1u16..=u16::MAX, 0..100)) {
            let connections = ports.iter().map(|&port| listen(port, 1));
            let table = build_table(connections, |pid| Err(ResolveError::NotFound(pid)));

            for pair in table.entries().windows(2) {
                prop_assert!(pair[0].port < pair[1].port);
            }
        }
    }
}
