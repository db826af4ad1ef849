/// Módulo de procesos: nombre por PID y envío de señales.
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::{KillError, ResolveError};

/// Operaciones sobre procesos del sistema operativo.
pub trait ProcessControl {
    /// Devuelve el nombre legible del proceso.
    fn process_name(&self, pid: u32) -> Result<String, ResolveError>;

    /// Envía la señal de terminación al proceso.
    ///
    /// No espera a que el proceso termine: `Ok` significa "señal
    /// entregada", no "puerto liberado".
    fn kill(&self, pid: u32) -> Result<(), KillError>;
}

/// Implementación real sobre `/proc` y `kill(2)`.
#[derive(Debug, Clone, Copy)]
pub struct SystemProcesses {
    signal: Signal,
}

impl SystemProcesses {
    /// Crea el controlador que enviará `signal` al matar procesos.
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new(Signal::SIGKILL)
    }
}

impl ProcessControl for SystemProcesses {
    #[cfg(target_os = "linux")]
    fn process_name(&self, pid: u32) -> Result<String, ResolveError> {
        let raw_pid = i32::try_from(pid).map_err(|_| ResolveError::NotFound(pid))?;
        procfs::process::Process::new(raw_pid)
            .and_then(|process| process.stat())
            .map(|stat| stat.comm)
            .map_err(|err| classify_proc_error(pid, err))
    }

    #[cfg(not(target_os = "linux"))]
    fn process_name(&self, _pid: u32) -> Result<String, ResolveError> {
        Err(ResolveError::Unsupported)
    }

    fn kill(&self, pid: u32) -> Result<(), KillError> {
        let target = signal_target(pid)?;
        log::info!("Enviando {} al proceso {}", self.signal, pid);

        signal::kill(target, self.signal).map_err(classify_errno)
    }
}

/// Valida el PID antes de tocar `kill(2)`.
///
/// PID 0 y los negativos tienen significado especial (grupo de procesos,
/// todos los procesos), así que nunca se envían.
fn signal_target(pid: u32) -> Result<Pid, KillError> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(KillError::Other(format!("invalid pid {pid}"))),
    }
}

fn classify_errno(errno: Errno) -> KillError {
    match errno {
        Errno::ESRCH => KillError::NotFound,
        Errno::EPERM => KillError::PermissionDenied,
        other => KillError::Other(other.desc().to_string()),
    }
}

#[cfg(target_os = "linux")]
fn classify_proc_error(pid: u32, err: procfs::ProcError) -> ResolveError {
    use procfs::ProcError;

    match err {
        ProcError::NotFound(_) => ResolveError::NotFound(pid),
        ProcError::PermissionDenied(_) => ResolveError::PermissionDenied(pid),
        other => ResolveError::Other {
            pid,
            reason: other.to_string(),
        },
    }
}
