//! Frame hand-off for interactive runs.
//!
//! The loop calls [`Presenter::publish`] with the freshly computed positions
//! after every step and [`Presenter::poll_cancel`] right after it.
//! [`TextureRenderer`] is a headless presenter: it rasterises the bodies into
//! an RGBA8 texture the same way a fill + draw kernel pair would and can dump
//! the last frame as an image file.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use image::{imageops, DynamicImage, Rgba, RgbaImage};

use crate::body::Position;
use crate::NBodyError;

pub trait Presenter {
    /// Called once per completed step with the now-current positions.
    fn publish(&mut self, positions: &[Position]) -> Result<(), NBodyError>;

    /// `true` once the user asked to stop. Polled once per step.
    fn poll_cancel(&mut self) -> bool;
}

/// Shared stop request, settable from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Spawns a thread that cancels on `q`, `quit`, an empty line or EOF.
    pub fn watch_stdin(&self) -> Result<JoinHandle<()>, NBodyError> {
        let flag = self.clone();
        let handle = std::thread::Builder::new()
            .name("nbody-stdin".to_owned())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(l) if is_quit_command(&l) => break,
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                }
                flag.cancel();
            })?;
        Ok(handle)
    }
}

fn is_quit_command(line: &str) -> bool {
    matches!(line.trim(), "" | "q" | "Q" | "quit" | "exit")
}

pub const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const BODY_COLOUR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Headless RGBA8 render target, origin at the bottom-left corner.
///
/// A body at `(x, y, _)` lands on pixel `(x + width/2, y + height/2)`; bodies
/// outside the texture are not drawn.
pub struct TextureRenderer {
    texture: RgbaImage,
    frames: u64,
    frame_limit: Option<u64>,
    drawn: usize,
    cancel: CancelFlag,
}

impl TextureRenderer {
    pub fn new(width: u32, height: u32, cancel: CancelFlag) -> Self {
        Self {
            texture: RgbaImage::from_pixel(width, height, BACKGROUND),
            frames: 0,
            frame_limit: None,
            drawn: 0,
            cancel,
        }
    }

    /// Stop after `frames` published frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn fill(&mut self, colour: Rgba<u8>) {
        for px in self.texture.pixels_mut() {
            *px = colour;
        }
    }

    /// Plots every body that falls inside the texture; returns how many did.
    pub fn draw(&mut self, positions: &[Position]) -> usize {
        let (width, height) = self.texture.dimensions();
        let half_w = width as f32 / 2.0;
        let half_h = height as f32 / 2.0;
        let mut drawn = 0;
        for p in positions {
            let px = (p.x + half_w).floor();
            let py = (p.y + half_h).floor();
            // NaN fails both comparisons and is skipped
            if px >= 0.0 && py >= 0.0 && px < width as f32 && py < height as f32 {
                self.texture.put_pixel(px as u32, py as u32, BODY_COLOUR);
                drawn += 1;
            }
        }
        drawn
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        let (width, height) = self.texture.dimensions();
        (x < width && y < height).then(|| *self.texture.get_pixel(x, y))
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Bodies visible in the last frame.
    pub fn drawn(&self) -> usize {
        self.drawn
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.texture.dimensions()
    }

    /// Writes the current frame top row first; the format follows the file
    /// extension (`.png`, `.ppm`, ...).
    pub fn save_snapshot(&self, path: &Path) -> Result<(), NBodyError> {
        let upright = imageops::flip_vertical(&self.texture);
        // alpha is always opaque; dropping it keeps RGB-only formats such as PPM
        DynamicImage::ImageRgba8(upright).to_rgb8().save(path)?;
        log::info!("wrote frame {} to {}", self.frames, path.display());
        Ok(())
    }
}

impl Presenter for TextureRenderer {
    fn publish(&mut self, positions: &[Position]) -> Result<(), NBodyError> {
        self.fill(BACKGROUND);
        self.drawn = self.draw(positions);
        self.frames += 1;
        Ok(())
    }

    fn poll_cancel(&mut self) -> bool {
        self.cancel.is_cancelled() || self.frame_limit.is_some_and(|limit| self.frames >= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_commands() {
        assert!(is_quit_command("q\n"));
        assert!(is_quit_command("  quit "));
        assert!(is_quit_command(""));
        assert!(!is_quit_command("go on"));
    }
}
