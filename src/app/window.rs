use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{
        ElementState,
        WindowEvent
    },
    event_loop::{
        ActiveEventLoop,
        ControlFlow,
        EventLoop
    },
    keyboard::{
        Key,
        NamedKey
    },
    window::{
        Window,
        WindowId
    }
};

use crate::{
    config::EngineConfig,
    game::scene::SceneLogic,
    rendering::{
        gfx::GraphicsContext,
        wgpu_backend::WgpuContext
    }
};

use super::{Engine, EngineError, FrameClock};

struct App {
    engine: Engine,
    context: Option<WgpuContext>,
    clock: FrameClock,
    error: Option<EngineError>,
}

impl App {
    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(context) = self.context.as_mut() {
            self.engine.shutdown(context);
        }
        self.context = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: EngineError) {
        log::error!("Stopping on error: {err}");
        self.error = Some(err);
        self.stop(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() {
            return;
        }

        let window_config = &self.engine.config().window;
        let attributes = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(window_config.width, window_config.height));

        // Create window object
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, err.into()),
        };

        match pollster::block_on(WgpuContext::new(window.clone())) {
            Ok(context) => self.context = Some(context),
            Err(err) => return self.fail(event_loop, err.into()),
        }

        self.clock = FrameClock::new();
        window.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("The close button was pressed; stopping");
                self.stop(event_loop);
            },
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && event.logical_key == Key::Named(NamedKey::Escape) {
                    log::info!("Escape pressed; stopping");
                    self.stop(event_loop);
                }
            },
            WindowEvent::RedrawRequested => {
                let dt = self.clock.tick();
                match self.engine.frame(context, dt) {
                    Ok(stats) => log::trace!("Frame {}: {stats:?}", self.clock.frames()),
                    Err(err) => return self.fail(event_loop, err),
                }

                // Emits a new redraw requested event.
                context.window().request_redraw();
            },
            WindowEvent::Resized(size) => {
                // Reconfigures the size of the surface. We do not re-render
                // here as this event is always followed up by redraw request.
                context.resize(size.width, size.height);
            },
            _ => (),
        }
    }
}

/// Opens a window and runs `logic` until the window is closed or Escape is pressed.
pub fn run_windowed(config: EngineConfig, logic: Box<dyn SceneLogic>) -> Result<(), EngineError> {
    config.validate()?;

    let mut engine = Engine::new(config);
    engine.request_scene(logic);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        engine,
        context: None,
        clock: FrameClock::new(),
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
