use carla_mock_host::{MainLoop, NetworkThread};
use crossbeam_channel::bounded;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:22752";

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("CARLA_MOCK_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let target = parse_arg_value(&args, "--target").unwrap_or_else(|| "Carla".to_string());
    let preload = parse_arg_value(&args, "--preload").unwrap_or_default();

    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);

    let (in_tx, in_rx) = bounded(carla_mock_host::INBOUND_CAP);
    let (out_tx, out_rx) = bounded(carla_mock_host::OUTBOUND_CAP);

    let net = match NetworkThread::spawn_with_addr(&addr, in_tx, out_rx) {
        Ok(n) => n,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        if let Err(e) = fs::write(path, net.listen_addr().to_string()) {
            warn!(path = %path.display(), error = %e, "could not write addr file");
        }
    }

    println!("mock_host listening on ws://{}", net.listen_addr());

    let mut main_loop = MainLoop::new(in_rx, out_tx).with_target_name(&target);
    for identifier in preload.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match main_loop.engine_mut().add_plugin(identifier) {
            Ok(id) => info!(%id, identifier, "preloaded"),
            Err(e) => warn!(error = %e, "preload skipped"),
        }
    }

    let start = Instant::now();
    loop {
        main_loop.tick();
        thread::sleep(Duration::from_millis(10));
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    main_loop.announce_exit(None);
    thread::sleep(Duration::from_millis(50));
    net.shutdown();
}
