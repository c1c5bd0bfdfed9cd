use std::{error::Error, process::ExitCode};

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use srvctl::{
    cli::{Cli, Commands, parse_args},
    config::{ConfigResolver, PersistedConfig},
    controller::{Action, LifecycleController, Outcome},
    error::LifecycleError,
    hooks::HookRegistry,
    launcher::CommandLauncher,
    signals::NixSignalDispatcher,
};

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    let persisted = match PersistedConfig::load(&args.config) {
        Ok(persisted) => persisted,
        Err(err) => {
            error!("Failed to load {:?}: {err}", args.config);
            eprintln!("error: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let Commands::Server { action, .. } = &args.command;
    let action = match Action::parse(action) {
        Ok(action) => action,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let config = ConfigResolver::new(&persisted).resolve(&args.command.overrides());
    debug!("Resolved configuration: {config:?}");

    let hooks = HookRegistry::from_config(&persisted, &config.app_path);
    debug!("Registered {} lifecycle hook(s)", hooks.len());

    if matches!(action, Action::Start | Action::Restart) && !config.daemonize {
        register_signal_handler()?;
    }

    let controller =
        LifecycleController::new(config, NixSignalDispatcher, CommandLauncher, hooks);

    match controller.execute(action) {
        Ok(Outcome::Restarted(outcome)) => {
            if let Some(err) = outcome.stop_error {
                eprintln!("error: restart could not stop the running server: {err}");
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Ok(outcome) => {
            debug!("{action} finished: {outcome:?}");
            Ok(ExitCode::SUCCESS)
        }
        Err(LifecycleError::Restart { stop, start }) => {
            warn!("{action} failed: stop: {stop}; start: {start}");
            eprintln!("error: restart could not stop the running server: {stop}");
            eprintln!("error: {start}");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            warn!("{action} failed: {err}");
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Keeps the supervisor alive on CTRL-C so it can report the foreground server's exit.
fn register_signal_handler() -> Result<(), Box<dyn Error>> {
    ctrlc::set_handler(move || {
        info!("Interrupt received; waiting for the server to exit");
    })?;

    Ok(())
}
