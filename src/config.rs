/// Configuración de PortSlayer TUI.
///
/// Se lee de variables de entorno al iniciar. `RUST_LOG` sigue
/// controlando el nivel de logging (ver `main`).
use std::path::PathBuf;

use nix::sys::signal::Signal;

use crate::error::ConfigError;

/// Variable con la señal a enviar al matar un proceso.
pub const ENV_SIGNAL: &str = "PORTSLAYER_SIGNAL";
/// Variable con la fuente de la tabla de sockets.
pub const ENV_SOURCE: &str = "PORTSLAYER_SOURCE";
/// Variable con la ruta del archivo de log.
pub const ENV_LOG_FILE: &str = "PORTSLAYER_LOG_FILE";

/// Nombre del archivo de log por defecto (dentro del directorio temporal)
const DEFAULT_LOG_FILE_NAME: &str = "portslayer-tui.log";

/// Fuente de la tabla de conexiones TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// procfs, con `ss` como respaldo
    #[default]
    Auto,
    /// Solo `/proc/net/tcp*`
    Procfs,
    /// Solo el comando `ss`
    Ss,
}

/// Configuración completa de la aplicación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Señal enviada al proceso dueño del puerto
    pub signal: Signal,
    /// De dónde se lee la tabla de sockets
    pub source: SourceKind,
    /// Archivo donde se escribe el log (la terminal está ocupada por la TUI)
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signal: Signal::SIGKILL,
            source: SourceKind::Auto,
            log_file: std::env::temp_dir().join(DEFAULT_LOG_FILE_NAME),
        }
    }
}

impl Config {
    /// Lee la configuración de las variables de entorno del proceso.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda.
    ///
    /// Las variables ausentes o vacías toman su valor por defecto.
    ///
    /// # Arguments
    /// * `lookup` - Devuelve el valor de una variable, si existe
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = value(ENV_SIGNAL) {
            config.signal = parse_signal(&raw)?;
        }
        if let Some(raw) = value(ENV_SOURCE) {
            config.source = parse_source(&raw)?;
        }
        if let Some(raw) = value(ENV_LOG_FILE) {
            config.log_file = PathBuf::from(raw);
        }

        Ok(config)
    }
}

fn parse_signal(raw: &str) -> Result<Signal, ConfigError> {
    match raw.to_ascii_uppercase().as_str() {
        "KILL" | "SIGKILL" | "9" => Ok(Signal::SIGKILL),
        "TERM" | "SIGTERM" | "15" => Ok(Signal::SIGTERM),
        _ => Err(ConfigError::InvalidValue {
            var: ENV_SIGNAL,
            value: raw.to_string(),
            expected: "KILL, TERM",
        }),
    }
}

fn parse_source(raw: &str) -> Result<SourceKind, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "auto" => Ok(SourceKind::Auto),
        "procfs" | "proc" => Ok(SourceKind::Procfs),
        "ss" => Ok(SourceKind::Ss),
        _ => Err(ConfigError::InvalidValue {
            var: ENV_SOURCE,
            value: raw.to_string(),
            expected: "auto, procfs, ss",
        }),
    }
}
