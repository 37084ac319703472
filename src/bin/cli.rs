use camcast::{CamcastConfig, RemoteDisplay, SessionController};
use std::env;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    camcast::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: camcast <command> [args]");
        eprintln!("Commands:");
        eprintln!("  run [--config <path>] [--synthetic]");
        eprintln!("  list-devices [--json]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "run" => cmd_run(&args),
        "list-devices" => cmd_list_devices(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_list_devices(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let devices = camcast::camera::list_cameras()?;
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            println!("{}: {}", d.id, d.name);
        }
    }
    Ok(())
}

fn cmd_run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path = None;
    let mut synthetic = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--synthetic" => synthetic = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => CamcastConfig::load_from_file(path)?,
        None => CamcastConfig::load_or_default(),
    };
    if synthetic {
        config.camera.synthetic_fallback = true;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let display = RemoteDisplay::new();
        let controller = Arc::new(SessionController::new(config, display)?);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
        ctrlc::set_handler(move || {
            let _ = shutdown_tx.try_send(());
        })?;

        // The session starts with the process and stops when it exits.
        if let Err(e) = controller.start().await {
            eprintln!("camcast: failed to start session: {}", e);
        }

        let _ = shutdown_rx.recv().await;
        log::info!("Shutdown requested");
        controller.stop().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
