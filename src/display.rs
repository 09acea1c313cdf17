use crate::error::DisplayError;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const MATRIX_SIZE: usize = 8;
const PIXELS: usize = MATRIX_SIZE * MATRIX_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 128, 0);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const DARK_GREEN: Rgb = Rgb(0, 51, 0);
    pub const DARK_BLUE: Rgb = Rgb(0, 0, 102);

    /// RGB565 as the LED matrix framebuffer stores it.
    pub fn to_rgb565(self) -> u16 {
        let Rgb(r, g, b) = self;
        (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    /// Upload accepted.
    Plus,
    /// Upload rejected or failed.
    ArrowUp,
}

impl Glyph {
    pub fn pixels(self) -> [Rgb; PIXELS] {
        let (pattern, on) = match self {
            Glyph::Plus => (PLUS, Rgb::GREEN),
            Glyph::ArrowUp => (ARROW_UP, Rgb::RED),
        };
        let mut pixels = [Rgb::OFF; PIXELS];
        for (row, bits) in pattern.iter().copied().enumerate() {
            for col in 0..MATRIX_SIZE {
                if bits & (0x80u8 >> col) != 0 {
                    pixels[row * MATRIX_SIZE + col] = on;
                }
            }
        }
        pixels
    }
}

const PLUS: [u8; MATRIX_SIZE] = [
    0b0001_1000,
    0b0001_1000,
    0b0001_1000,
    0b1111_1111,
    0b1111_1111,
    0b0001_1000,
    0b0001_1000,
    0b0001_1000,
];

const ARROW_UP: [u8; MATRIX_SIZE] = [
    0b0001_1000,
    0b0011_1100,
    0b0101_1010,
    0b1001_1001,
    0b0001_1000,
    0b0001_1000,
    0b0001_1000,
    0b0001_1000,
];

/// Local status output. Callers treat every error as non-fatal.
pub trait DisplaySink {
    fn show_message(&mut self, text: &str, fg: Rgb, bg: Rgb) -> Result<(), DisplayError>;
    fn show_glyph(&mut self, glyph: Glyph) -> Result<(), DisplayError>;
    fn clear(&mut self) -> Result<(), DisplayError>;
}

/// Stand-in when no LED matrix is attached.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn show_message(&mut self, text: &str, _fg: Rgb, _bg: Rgb) -> Result<(), DisplayError> {
        tracing::debug!(text, "display message");
        Ok(())
    }

    fn show_glyph(&mut self, glyph: Glyph) -> Result<(), DisplayError> {
        tracing::debug!(?glyph, "display glyph");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// 8x8 LED matrix exposed as an RGB565 framebuffer device (`/dev/fbN`).
/// Glyphs are drawn pixel for pixel. Scrolling text needs a font the
/// framebuffer does not provide, so messages light the background colour
/// and the text goes to the log.
#[derive(Debug)]
pub struct FramebufferDisplay {
    path: PathBuf,
    rotation: u16,
}

impl FramebufferDisplay {
    pub fn open(path: &Path, rotation: u16) -> Result<Self, DisplayError> {
        OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| DisplayError::Device {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            rotation: rotation % 360,
        })
    }

    fn write_pixels(&self, pixels: &[Rgb; PIXELS]) -> Result<(), DisplayError> {
        let mut frame = [0u8; PIXELS * 2];
        for (idx, pixel) in pixels.iter().enumerate() {
            let target = rotate_index(idx, self.rotation);
            frame[target * 2..target * 2 + 2].copy_from_slice(&pixel.to_rgb565().to_le_bytes());
        }
        let device_err = |source: std::io::Error| DisplayError::Device {
            path: self.path.display().to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(device_err)?;
        file.seek(SeekFrom::Start(0)).map_err(device_err)?;
        file.write_all(&frame).map_err(device_err)?;
        Ok(())
    }
}

impl DisplaySink for FramebufferDisplay {
    fn show_message(&mut self, text: &str, _fg: Rgb, bg: Rgb) -> Result<(), DisplayError> {
        tracing::info!(text, "display message");
        self.write_pixels(&[bg; PIXELS])
    }

    fn show_glyph(&mut self, glyph: Glyph) -> Result<(), DisplayError> {
        self.write_pixels(&glyph.pixels())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.write_pixels(&[Rgb::OFF; PIXELS])
    }
}

/// Framebuffer index for logical pixel `idx` with the matrix turned
/// clockwise by `rotation` degrees.
fn rotate_index(idx: usize, rotation: u16) -> usize {
    let n = MATRIX_SIZE;
    let (row, col) = (idx / n, idx % n);
    let (r, c) = match rotation {
        90 => (col, n - 1 - row),
        180 => (n - 1 - row, n - 1 - col),
        270 => (n - 1 - col, row),
        _ => (row, col),
    };
    r * n + c
}

/// Framebuffer when configured and openable, log output otherwise.
pub fn open(path: Option<&Path>, rotation: u16) -> Box<dyn DisplaySink + Send> {
    let Some(path) = path else {
        tracing::info!("no LED matrix configured; display output goes to the log");
        return Box::new(LogDisplay);
    };
    match FramebufferDisplay::open(path, rotation) {
        Ok(display) => {
            tracing::info!(path = %path.display(), rotation, "LED matrix display ready");
            Box::new(display)
        }
        Err(err) => {
            tracing::warn!(error = %err, "unable to open LED matrix; falling back to log display");
            Box::new(LogDisplay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn read_frame(path: &Path) -> Vec<u16> {
        std::fs::read(path)
            .expect("frame")
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn rgb565_packing() {
        assert_eq!(Rgb::OFF.to_rgb565(), 0);
        assert_eq!(Rgb(255, 255, 255).to_rgb565(), 0xFFFF);
        assert_eq!(Rgb::RED.to_rgb565(), 0xF800);
        assert_eq!(Rgb::GREEN.to_rgb565(), 0x0400);
    }

    #[test]
    fn plus_glyph_is_a_green_cross() {
        let pixels = Glyph::Plus.pixels();
        assert_eq!(pixels.iter().filter(|p| **p == Rgb::GREEN).count(), 28);
        assert_eq!(pixels[3], Rgb::GREEN);
        assert_eq!(pixels[0], Rgb::OFF);
        assert!(pixels[24..32].iter().all(|p| *p == Rgb::GREEN));
    }

    #[test]
    fn arrow_glyph_is_red() {
        let pixels = Glyph::ArrowUp.pixels();
        assert!(pixels.iter().all(|p| *p == Rgb::OFF || *p == Rgb::RED));
        assert_eq!(pixels[3], Rgb::RED);
        assert_eq!(pixels[24], Rgb::RED);
    }

    #[test]
    fn rotation_is_a_permutation() {
        for rotation in [0, 90, 180, 270] {
            let mut seen = [false; PIXELS];
            for idx in 0..PIXELS {
                seen[rotate_index(idx, rotation)] = true;
            }
            assert!(seen.iter().all(|hit| *hit), "rotation {rotation}");
        }
        assert_eq!(rotate_index(0, 90), 7);
        assert_eq!(rotate_index(0, 180), 63);
        assert_eq!(rotate_index(0, 270), 56);
    }

    #[test]
    fn framebuffer_writes_glyph_and_clears() {
        let file = NamedTempFile::new().expect("tempfile");
        let mut display = FramebufferDisplay::open(file.path(), 0).expect("open");

        display.show_glyph(Glyph::Plus).expect("glyph");
        let frame = read_frame(file.path());
        assert_eq!(frame.len(), PIXELS);
        assert_eq!(frame[3], Rgb::GREEN.to_rgb565());
        assert_eq!(frame[0], 0);

        display.clear().expect("clear");
        assert!(read_frame(file.path()).iter().all(|px| *px == 0));
    }

    #[test]
    fn framebuffer_message_paints_background() {
        let file = NamedTempFile::new().expect("tempfile");
        let mut display = FramebufferDisplay::open(file.path(), 90).expect("open");
        display
            .show_message("77.0F  50%", Rgb::YELLOW, Rgb::DARK_BLUE)
            .expect("message");
        assert!(read_frame(file.path())
            .iter()
            .all(|px| *px == Rgb::DARK_BLUE.to_rgb565()));
    }

    #[test]
    fn missing_device_falls_back_to_log_display() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("fb1");
        assert!(FramebufferDisplay::open(&missing, 0).is_err());
        let mut display = open(Some(&missing), 90);
        assert!(display.show_glyph(Glyph::ArrowUp).is_ok());
    }
}
