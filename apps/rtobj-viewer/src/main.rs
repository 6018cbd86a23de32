mod app;
mod config;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use config::{BackendKind, ShadingArg, ViewerConfig};
use rtobj_render::Scene;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use winit::event_loop::{ControlFlow, EventLoop};

#[derive(Parser)]
#[command(name = "rtobj", about = "Ray trace an OBJ model in an interactive window")]
struct Cli {
    /// OBJ model to load
    model: Option<PathBuf>,

    /// Ray-tracing backend
    #[arg(long, value_enum, default_value_t = BackendKind::Cpu)]
    backend: BackendKind,

    /// Shading mode
    #[arg(long, value_enum, default_value_t = ShadingArg::Normal)]
    shading: ShadingArg,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(model) = cli.model else {
        let program = std::env::args().next().unwrap_or_else(|| "rtobj".into());
        eprintln!("Usage: {program} <obj file>");
        std::process::exit(1);
    };

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("rtobj starting");

    let loaded = rtobj_assets::load_obj(&model)
        .with_context(|| format!("failed to load OBJ model '{}'", model.display()))?;
    tracing::info!(
        "model has {} vertices, {} triangles in {} shapes",
        loaded.mesh.vertex_count(),
        loaded.mesh.triangle_count(),
        loaded.shapes.len()
    );

    let scene = Scene::from_mesh(&loaded.mesh).context("model geometry is invalid")?;
    drop(loaded);

    let config = ViewerConfig {
        model,
        backend: cli.backend,
        shading: cli.shading.into(),
    };

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = app::ViewerApp::new(config, scene);
    event_loop.run_app(&mut app)?;

    app.into_result()
}
