// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::Parser;
use lumen_core::init_tracing;
use lumen_platform::{window_attributes, WindowSurface};
use lumen_render::{RenderOptions, Renderer, ResizeSignal};
use lumen_render_vk::VkRenderer;
use tracing::{error, info};

use lumen_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "lumen.toml")]
    config: PathBuf,
    /// Enable Vulkan validation regardless of build profile or config
    #[arg(long)]
    validation: bool,
}

struct App {
    cfg: AppCfg,
    options: RenderOptions,
    window: Option<Arc<Window>>,
    renderer: Option<VkRenderer>,
    resized: ResizeSignal,

    failure: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        // Renderer first: it drains the GPU and needs the window alive.
        self.renderer = None;
        self.window = None;
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let w = &self.cfg.window;
        let window = match event_loop.create_window(window_attributes(
            &w.title, w.width, w.height, w.resizable,
        )) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, anyhow!("create_window: {e}")),
        };

        let surface = WindowSurface::new(window.clone(), self.resized.clone());
        match VkRenderer::new(&*window, &*window, Box::new(surface), self.options) {
            Ok(renderer) => {
                info!("renderer ready (validation = {})", self.options.validation);
                self.renderer = Some(renderer);
            }
            Err(e) => return self.fail(event_loop, e.context("renderer init")),
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                info!("Resized → {}x{}", new_size.width, new_size.height);
                self.resized.raise();
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render() {
                    Ok(()) => self.frames = self.frames.saturating_add(1),
                    Err(e) => self.fail(event_loop, e.context("render")),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let Some(window) = &self.window else {
            return;
        };
        // A minimised window gets a redraw again from its next Resized.
        let size = window.inner_size();
        if size.width > 0 && size.height > 0 {
            window.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    let options = cfg.render_options(args.validation);
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App {
        cfg,
        options,
        window: None,
        renderer: None,
        resized: ResizeSignal::new(),
        failure: None,
        frames: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
