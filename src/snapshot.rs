/// Módulo de lectura de la tabla de sockets TCP.
///
/// Obtiene una foto de las conexiones TCP del sistema, ya sea leyendo
/// `/proc/net/tcp{,6}` o parseando la salida del comando `ss`. Cualquier
/// fallo se degrada a una lista vacía: la herramienta debe seguir siendo
/// usable aunque el kernel no nos deje ver todo.
use std::process::Command;

use crate::config::SourceKind;
use crate::error::SnapshotError;

/// Estado TCP de un socket, tal como lo reporta el kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Aceptando conexiones entrantes
    Listen,
    /// Conexión establecida
    Established,
    /// Esperando el cierre definitivo
    TimeWait,
    /// El extremo remoto cerró la conexión
    CloseWait,
    /// Cualquier otro estado de la máquina TCP
    Other,
}

impl SocketState {
    /// Interpreta la columna de estado de `ss` (ej: "LISTEN", "ESTAB").
    pub fn from_ss(state: &str) -> Self {
        match state {
            "LISTEN" => Self::Listen,
            "ESTAB" => Self::Established,
            "TIME-WAIT" => Self::TimeWait,
            "CLOSE-WAIT" => Self::CloseWait,
            _ => Self::Other,
        }
    }
}

/// Registro crudo de una conexión TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConnection {
    /// Puerto local del socket
    pub local_port: u16,
    /// PID del proceso dueño, si el kernel lo deja ver
    pub pid: Option<u32>,
    /// Estado TCP
    pub state: SocketState,
}

/// Fuente de la tabla de conexiones TCP del sistema.
pub trait SocketSource {
    /// Lee la tabla de conexiones, propagando el error.
    fn try_snapshot(&self) -> Result<Vec<RawConnection>, SnapshotError>;

    /// Lee la tabla de conexiones en el orden que la entrega el sistema.
    ///
    /// Si la consulta falla por completo devuelve una lista vacía y deja
    /// constancia en el log.
    fn snapshot(&self) -> Vec<RawConnection> {
        match self.try_snapshot() {
            Ok(connections) => connections,
            Err(err) => {
                log::warn!("No se pudo leer la tabla de sockets: {err}");
                Vec::new()
            }
        }
    }
}

impl<T: SocketSource + ?Sized> SocketSource for Box<T> {
    fn try_snapshot(&self) -> Result<Vec<RawConnection>, SnapshotError> {
        (**self).try_snapshot()
    }
}

/// Crea la fuente de sockets indicada en la configuración.
pub fn source_for(kind: SourceKind) -> Box<dyn SocketSource> {
    match kind {
        SourceKind::Auto => Box::new(AutoSource),
        SourceKind::Procfs => Box::new(ProcfsSource),
        SourceKind::Ss => Box::new(SsSource),
    }
}

// ─────────────────────────────────────────────────────────────
// procfs
// ─────────────────────────────────────────────────────────────

/// Lee `/proc/net/tcp` y `/proc/net/tcp6` y asocia cada socket a su
/// proceso buscando el inode en `/proc/<pid>/fd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsSource;

#[cfg(target_os = "linux")]
impl SocketSource for ProcfsSource {
    fn try_snapshot(&self) -> Result<Vec<RawConnection>, SnapshotError> {
        let mut entries = procfs::net::tcp()?;
        // tcp6 no existe si IPv6 está deshabilitado en el kernel
        match procfs::net::tcp6() {
            Ok(v6) => entries.extend(v6),
            Err(err) => log::debug!("Sin /proc/net/tcp6: {err}"),
        }

        let owners = socket_owners();
        let connections = entries
            .into_iter()
            .map(|entry| RawConnection {
                local_port: entry.local_address.port(),
                pid: owners.get(&entry.inode).copied(),
                state: map_tcp_state(&entry.state),
            })
            .collect();

        Ok(connections)
    }
}

#[cfg(not(target_os = "linux"))]
impl SocketSource for ProcfsSource {
    fn try_snapshot(&self) -> Result<Vec<RawConnection>, SnapshotError> {
        Err(SnapshotError::Unsupported)
    }
}

/// Construye el mapa inode de socket → PID recorriendo los descriptores
/// de todos los procesos visibles.
///
/// Los procesos que no se pueden leer (otro usuario, ya terminados) se
/// ignoran. Si varios procesos comparten un socket gana el primero que
/// aparece en `/proc`.
#[cfg(target_os = "linux")]
fn socket_owners() -> std::collections::HashMap<u64, u32> {
    use procfs::process::FDTarget;

    let mut owners = std::collections::HashMap::new();
    let processes = match procfs::process::all_processes() {
        Ok(processes) => processes,
        Err(err) => {
            log::warn!("No se pudo listar /proc: {err}");
            return owners;
        }
    };

    for process in processes.flatten() {
        let Ok(pid) = u32::try_from(process.pid()) else {
            continue;
        };
        let Ok(fds) = process.fd() else {
            continue;
        };
        for fd in fds.flatten() {
            if let FDTarget::Socket(inode) = fd.target {
                owners.entry(inode).or_insert(pid);
            }
        }
    }

    owners
}

#[cfg(target_os = "linux")]
fn map_tcp_state(state: &procfs::net::TcpState) -> SocketState {
    use procfs::net::TcpState;

    match state {
        TcpState::Listen => SocketState::Listen,
        TcpState::Established => SocketState::Established,
        TcpState::TimeWait => SocketState::TimeWait,
        TcpState::CloseWait => SocketState::CloseWait,
        _ => SocketState::Other,
    }
}

// ─────────────────────────────────────────────────────────────
// ss
// ─────────────────────────────────────────────────────────────

/// Parsea la salida de `ss -tanpH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsSource;

impl SocketSource for SsSource {
    fn try_snapshot(&self) -> Result<Vec<RawConnection>, SnapshotError> {
        let raw_output = execute_ss_command("-tanpH")?;
        Ok(parse_ss_output(&raw_output))
    }
}

/// Ejecuta el comando `ss` con los flags indicados.
///
/// Intenta primero `sudo -n` (no interactivo) para ver los PIDs de todos
/// los procesos; si falla, ejecuta `ss` sin privilegios.
///
/// # Arguments
/// * `flags` - Flags para el comando ss (ej: "-tanpH")
///
/// # Returns
/// La salida estándar del comando, o el error si `ss` no pudo ejecutarse.
fn execute_ss_command(flags: &str) -> Result<String, SnapshotError> {
    let result = Command::new("sudo").args(["-n", "ss", flags]).output();

    if let Ok(output) = result {
        if output.status.success() {
            if let Ok(stdout) = String::from_utf8(output.stdout) {
                return Ok(stdout);
            }
        }
    }

    // Fallback sin sudo (solo verá procesos propios)
    log::debug!("Ejecutando ss sin sudo - solo se verán procesos propios");
    let fallback = Command::new("ss").arg(flags).output()?;
    if !fallback.status.success() {
        let stderr = String::from_utf8_lossy(&fallback.stderr);
        return Err(SnapshotError::InvalidOutput(stderr.trim().to_string()));
    }

    String::from_utf8(fallback.stdout).map_err(|err| SnapshotError::InvalidOutput(err.to_string()))
}

/// Parsea la salida completa de `ss`, descartando las líneas ilegibles.
fn parse_ss_output(output: &str) -> Vec<RawConnection> {
    output.lines().filter_map(parse_single_line).collect()
}

/// Parsea una línea individual de la salida de `ss`.
///
/// Formato esperado:
/// ```text
/// LISTEN  0  128  0.0.0.0:8080  0.0.0.0:*  users:(("node",pid=1234,fd=5))
/// ```
/// La sección `users:` es opcional: sin privilegios `ss` no la muestra
/// para procesos ajenos.
fn parse_single_line(line: &str) -> Option<RawConnection> {
    let line = line.trim();
    let state = line.split_whitespace().next()?;
    let local_port = extract_port_from_line(line)?;
    let pid = extract_pid(line);

    Some(RawConnection {
        local_port,
        pid,
        state: SocketState::from_ss(state),
    })
}

/// Extrae el puerto local de una línea de `ss`.
///
/// Toma el primer campo con forma de dirección (IPv4 `0.0.0.0:8080`,
/// IPv6 `[::]:8080`, comodín `*:8080`) y devuelve lo que sigue al último
/// `:`. Los valores numéricos sueltos como el backlog (128) no cuentan.
fn extract_port_from_line(line: &str) -> Option<u16> {
    // Campos: [Estado, RecvQ, SendQ, DirLocal, DirRemota, ...]
    let address = line.split_whitespace().skip(1).find(|part| {
        part.contains('.') || part.contains('[') || part.contains("::") || part.starts_with('*')
    })?;

    let port_str = address.rsplit(':').next()?;
    match port_str.parse::<u16>() {
        Ok(port) if port > 0 => Some(port),
        _ => None,
    }
}

/// Extrae el PID del patrón `pid=NUMERO` dentro de `users:((...))`.
fn extract_pid(line: &str) -> Option<u32> {
    let users_section = &line[line.find("users:((")?..];

    let pid_marker = "pid=";
    let pid_start = users_section.find(pid_marker)? + pid_marker.len();
    let pid_end = users_section[pid_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(users_section.len(), |i| i + pid_start);

    users_section[pid_start..pid_end].parse().ok()
}

// ─────────────────────────────────────────────────────────────
// auto
// ─────────────────────────────────────────────────────────────

/// procfs con `ss` como respaldo.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoSource;

impl SocketSource for AutoSource {
    fn try_snapshot(&self) -> Result<Vec<RawConnection>, SnapshotError> {
        ProcfsSource.try_snapshot().or_else(|err| {
            log::warn!("procfs no disponible ({err}), usando ss");
            SsSource.try_snapshot()
        })
    }
}
