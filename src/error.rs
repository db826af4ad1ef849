//! Tipos de error de PortSlayer TUI.
//!
//! Ningún error del núcleo es fatal: los fallos de consulta al kernel se
//! degradan a tablas vacías, los nombres no resueltos al centinela
//! `"Unknown"` y los fallos de `kill` a un mensaje de estado. Solo
//! [`AppError`] llega hasta `main`.

use std::io;
use thiserror::Error;

/// Fallo al leer la tabla de conexiones TCP del sistema.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Error leyendo `/proc/net/tcp*`.
    #[cfg(target_os = "linux")]
    #[error("procfs no disponible: {0}")]
    Procfs(#[from] procfs::ProcError),

    /// No se pudo ejecutar el comando `ss`.
    #[error("error ejecutando ss: {0}")]
    Command(#[from] io::Error),

    /// `ss` terminó con error o su salida no es UTF-8.
    #[error("salida de ss inválida: {0}")]
    InvalidOutput(String),

    /// La fuente no existe en esta plataforma.
    #[cfg(not(target_os = "linux"))]
    #[error("fuente de sockets no soportada en esta plataforma")]
    Unsupported,
}

/// Fallo al obtener el nombre de un proceso.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// El proceso ya no existe.
    #[error("proceso {0} no encontrado")]
    NotFound(u32),

    /// Sin permisos para inspeccionar el proceso.
    #[error("sin permisos para inspeccionar el proceso {0}")]
    PermissionDenied(u32),

    /// Plataforma sin soporte de resolución de nombres.
    #[cfg(not(target_os = "linux"))]
    #[error("resolución de nombres no soportada en esta plataforma")]
    Unsupported,

    /// Cualquier otro error del sistema operativo.
    #[error("error resolviendo el proceso {pid}: {reason}")]
    Other {
        /// PID consultado.
        pid: u32,
        /// Descripción del error.
        reason: String,
    },
}

/// Resultado fallido de enviar una señal de terminación.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KillError {
    /// El proceso ya terminó (ESRCH). Quien llama lo trata como éxito.
    #[error("process not found")]
    NotFound,

    /// Sin permisos para señalizar el proceso (EPERM).
    #[error("permission denied")]
    PermissionDenied,

    /// Cualquier otro fallo.
    #[error("{0}")]
    Other(String),
}

/// Valor de configuración inválido.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// La variable contiene un valor no reconocido.
    #[error("valor inválido para {var}: {value:?} (esperado: {expected})")]
    InvalidValue {
        /// Nombre de la variable de entorno.
        var: &'static str,
        /// Valor recibido.
        value: String,
        /// Valores aceptados.
        expected: &'static str,
    },
}

/// Errores fatales de la aplicación (terminal o configuración).
#[derive(Error, Debug)]
pub enum AppError {
    /// Error de E/S de la terminal.
    #[error("error de terminal: {0}")]
    Io(#[from] io::Error),

    /// Configuración inválida.
    #[error("configuración inválida: {0}")]
    Config(#[from] ConfigError),
}
