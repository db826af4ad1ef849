//! # PortSlayer TUI ⚔️
//!
//! Herramienta de terminal para Linux que lista los puertos TCP en
//! escucha, muestra el proceso dueño de cada uno y permite terminarlo.
//!
//! ## Características
//! - Lista navegable de puertos TCP en `LISTEN`, ordenada por puerto
//! - Nombre y PID del proceso dueño (o "Unknown" si no se puede ver)
//! - Cierre del proceso seleccionado con actualización automática
//! - Filtro por número de puerto o nombre de proceso
//! - Actualización bajo demanda (sin sondeo en segundo plano)
//!
//! ## Configuración
//! - `RUST_LOG`: nivel de log (por defecto `info`)
//! - `PORTSLAYER_LOG_FILE`: archivo de log (por defecto en el directorio temporal)
//! - `PORTSLAYER_SIGNAL`: `KILL` (por defecto) o `TERM`
//! - `PORTSLAYER_SOURCE`: `auto` (por defecto), `procfs` o `ss`

mod config;
mod error;
mod port_table;
mod process;
mod session;
mod snapshot;
mod tui;

use std::fs::File;
use std::path::Path;
use std::process::ExitCode;

use config::Config;
use error::AppError;
use port_table::PortTableBuilder;
use process::SystemProcesses;
use session::Session;

/// Inicializa el logging hacia un archivo.
///
/// La terminal está ocupada por la interfaz, así que el log no puede ir a
/// stderr. Si el archivo no se puede abrir el logging queda desactivado.
fn init_logging(path: &Path) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    match File::create(path) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(_) => {
            builder.filter_level(log::LevelFilter::Off);
        }
    }

    builder.init();
}

fn run(config: &Config) -> Result<(), AppError> {
    let mut guard = tui::TerminalGuard::enter()?;
    let terminal = guard.terminal();

    // Primera pasada con pantalla de espera (nunca una lista vacía falsa)
    tui::draw_splash(terminal)?;
    let builder = PortTableBuilder::new(
        snapshot::source_for(config.source),
        SystemProcesses::new(config.signal),
    );
    let mut session = Session::start(builder);

    tui::run(terminal, &mut session)?;
    Ok(())
}

/// Punto de entrada principal de PortSlayer TUI.
///
/// Lee la configuración, inicializa el logging y ejecuta la interfaz
/// hasta que el usuario sale. Solo la configuración inválida y los
/// errores de la propia terminal terminan con código distinto de cero.
fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("portslayer-tui: {}", AppError::from(err));
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_file);
    log::info!("⚔️  PortSlayer TUI v{} iniciando...", env!("CARGO_PKG_VERSION"));
    log::debug!("Configuración: {config:?}");

    match run(&config) {
        Ok(()) => {
            log::info!("PortSlayer TUI cerrándose...");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            eprintln!("portslayer-tui: {err}");
            ExitCode::FAILURE
        }
    }
}
