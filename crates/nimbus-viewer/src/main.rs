mod app;
mod camera;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use nimbus_engine::logging::{init_logging, LoggingConfig};
use nimbus_engine::device::GpuInit;
use nimbus_engine::window::{Runtime, RuntimeConfig};
use nimbus_splat::from_ply;

use crate::app::ViewerApp;

struct Args {
    ply_path: PathBuf,
    vsync: bool,
}

fn parse_args() -> Result<Args> {
    let mut ply_path = None;
    let mut vsync = true;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--no-vsync" => vsync = false,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            s if s.starts_with('-') => bail!("unknown option: {s}"),
            _ => {
                if ply_path.replace(PathBuf::from(&arg)).is_some() {
                    bail!("expected a single .ply path");
                }
            }
        }
    }

    let ply_path = match ply_path {
        Some(p) => p,
        None => {
            print_usage();
            bail!("missing .ply path");
        }
    };
    Ok(Args { ply_path, vsync })
}

fn print_usage() {
    eprintln!("usage: nimbus-viewer <scene.ply> [--no-vsync]");
    eprintln!();
    eprintln!("controls:");
    eprintln!("  drag         look around");
    eprintln!("  W/A/S/D Q/E  move");
    eprintln!("  scroll       zoom (FOV)");
    eprintln!("  1 / 2        exact / bucketed depth sort");
    eprintln!("  0            cycle SH degree");
    eprintln!("  Esc          quit");
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let args = parse_args()?;

    let dataset = from_ply(&args.ply_path)
        .with_context(|| format!("loading {}", args.ply_path.display()))?;

    let gpu_init = GpuInit {
        present_mode: if args.vsync {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::Immediate
        },
        // Real scans exceed the default 128 MiB storage-binding limit.
        required_limits: wgpu::Limits {
            max_storage_buffer_binding_size: 1 << 30,
            max_buffer_size: 1 << 30,
            ..wgpu::Limits::default()
        },
        ..GpuInit::default()
    };

    let config = RuntimeConfig {
        title: format!(
            "nimbus - {}",
            args.ply_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| args.ply_path.display().to_string())
        ),
        ..RuntimeConfig::default()
    };

    let app = ViewerApp::new(Arc::new(dataset));
    Runtime::run(config, gpu_init, app)
}
