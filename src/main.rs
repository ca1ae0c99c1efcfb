// src/main.rs
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use log::info;
use surface_bridge::app::App;
use surface_bridge::core::graphics::backend::software::{self, rgb};
use surface_bridge::core::host::event::{BUTTON_LEFT, KEY_ARROW_DOWN, KEY_ARROW_UP};
use surface_bridge::{InputHandle, RenderLoop, Result};

/// Clears to a fixed colour and draws a cursor-following square.
/// Wheel or arrow keys resize the square, holding the left button fills it.
struct ClearDemo {
    name: &'static str,
    background: u32,
    input: InputHandle,
    size: i32,
    started: Option<Instant>,
    frames: u64,
}

impl ClearDemo {
    fn new(name: &'static str, background: u32) -> Self {
        Self {
            name,
            background,
            input: InputHandle::new(),
            size: 24,
            started: None,
            frames: 0,
        }
    }
}

impl RenderLoop for ClearDemo {
    fn init(&mut self) -> Result<()> {
        software::clear_color(self.background)?;
        self.started = Some(Instant::now());
        info!("{}: init, clear colour {:06x}", self.name, self.background);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let (x, y, pressed) = {
            let input = self.input.get();
            self.size = (self.size + input.scroll_delta() * 4).clamp(4, 200);
            if input.key_code(KEY_ARROW_UP) {
                self.size = (self.size + 1).min(200);
            }
            if input.key_code(KEY_ARROW_DOWN) {
                self.size = (self.size - 1).max(4);
            }
            (input.mouse_x(), input.mouse_y(), input.mouse_button(BUTTON_LEFT))
        };

        software::clear()?;
        let half = self.size / 2;
        let color = if pressed { rgb(255, 255, 255) } else { rgb(40, 40, 40) };
        software::fill_rect(x - half, y - half, self.size, self.size, color)?;
        self.frames += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        let secs = self.started.map_or(0.0, |t| t.elapsed().as_secs_f64());
        info!(
            "{}: shutdown after {} frame(s) in {secs:.1}s",
            self.name, self.frames
        );
        Ok(())
    }

    fn input_state(&self) -> &InputHandle {
        &self.input
    }
}

fn main() -> Result<()> {
    env_logger::init();

    App::new("surface bridge")
        .with_size(960, 480)
        .with_surface(Rc::new(RefCell::new(ClearDemo::new("first", rgb(200, 30, 30)))))
        .with_surface(Rc::new(RefCell::new(ClearDemo::new("second", rgb(30, 30, 200)))))
        .run()
}
