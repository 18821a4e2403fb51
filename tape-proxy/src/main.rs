use std::{env, sync::Arc};

use tape::{
    CONTROL_API_VERSION, ConfigHandle, ControlPlaneRouter, FsTapeStore, ProxyConfig, ROUTES,
    SequenceManager, SharedState, build_app, build_data_app, init_logging,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if wants_version_flag() {
        println!("{}", binary_version_text());
        return Ok(());
    }

    init_logging()?;
    info!("{}", binary_version_text());

    let config = ProxyConfig::from_env()?;
    let listen_addr = config.listen_addr;
    let tape_store = Arc::new(FsTapeStore::open(&config.tape_path).await?);
    let sequence = Arc::new(SequenceManager::new());

    let config = ConfigHandle::new(config);
    let control_plane = config.control_plane();
    if control_plane.enabled {
        info!(
            "control-plane v{CONTROL_API_VERSION} mounted at {} (tapes at {})",
            control_plane.path,
            config.tape_path().display()
        );
        for route in ROUTES.iter() {
            info!(
                "control-plane route {} {}{}",
                route.method, control_plane.path, route.prefix
            );
        }
    } else {
        info!("control-plane disabled; set CONTROL_PLANE_ENABLED=true to mount it");
    }

    let router = ControlPlaneRouter::new(sequence, tape_store, config.clone());
    let app = build_app(SharedState::new(config, router), build_data_app());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("proxy listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn wants_version_flag() -> bool {
    env::args()
        .skip(1)
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
}

fn binary_version_text() -> String {
    let binary = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("TAPE_BUILD_GIT_COMMIT") {
        Some(commit) => format!("{binary} {version} ({commit})"),
        None => format!("{binary} {version}"),
    }
}
