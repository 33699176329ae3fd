//! Terminal host: crossterm surface, input translation and frame pacing.
//!
//! Each character cell shows two vertically stacked pixels with the upper
//! half block glyph: the foreground colour is the top pixel and the
//! background colour the bottom one. A terminal of `cols x rows` cells is a
//! `cols x 2*rows` pixel surface.

use std::cell::Cell;
use std::io::{self, IsTerminal, Stdout, Write};
use std::rc::Rc;
use std::time::Instant;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::style::{self, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    self, BeginSynchronizedUpdate, DisableLineWrap, EnableLineWrap, EndSynchronizedUpdate,
    EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute, queue};
use tracing::{debug, trace, warn};

use crate::drag::{PointerEvent, PointerId};
use crate::error::{Result, VizError};
use crate::graphics::Framebuffer;
use crate::host::{EventRouter, Host, HostEvent, SharedRouter, Surface};
use crate::math::Color;
use crate::resize::ViewportSize;
use crate::scheduler::{FramePacer, FrameSource, FrameStamp};

const HALF_BLOCK: char = '▀';

/// The terminal has exactly one mouse
pub const MOUSE: PointerId = PointerId(0);

/// The controlling terminal as a [`Host`]
pub struct TerminalHost {
    router: SharedRouter,
    quit: Rc<Cell<bool>>,
    fps: u32,
}

impl TerminalHost {
    pub fn new(fps: u32) -> Self {
        TerminalHost {
            router: EventRouter::shared(),
            quit: Rc::new(Cell::new(false)),
            fps,
        }
    }

    /// True once the user pressed q, Esc or Ctrl-C
    pub fn quit_requested(&self) -> bool {
        self.quit.get()
    }
}

impl Host for TerminalHost {
    fn router(&self) -> SharedRouter {
        self.router.clone()
    }

    fn acquire_surface(&mut self) -> Result<Box<dyn Surface>> {
        Ok(Box::new(TerminalSurface::acquire()?))
    }

    fn frame_source(&mut self) -> Box<dyn FrameSource> {
        Box::new(TerminalFrameSource {
            pacer: FramePacer::new(self.fps),
            router: self.router.clone(),
            quit: self.quit.clone(),
        })
    }
}

/// Pixel dimensions of a `cols x rows` cell grid
pub fn cells_to_pixels(cols: u16, rows: u16) -> Option<ViewportSize> {
    ViewportSize::new(u32::from(cols), u32::from(rows) * 2)
}

fn terminal_size() -> Result<(u16, u16)> {
    if let Some(size) = termsize::get() {
        return Ok((size.cols, size.rows));
    }
    Ok(terminal::size()?)
}

/// Raw-mode alternate screen with mouse capture. Restores the terminal on
/// release or drop.
pub struct TerminalSurface {
    out: Stdout,
    size: ViewportSize,
    active: bool,
    captured: Option<PointerId>,
}

impl TerminalSurface {
    pub fn acquire() -> Result<Self> {
        if !io::stdout().is_terminal() {
            return Err(VizError::ContextUnavailable(
                "stdout is not a terminal".to_string(),
            ));
        }
        let (cols, rows) = terminal_size()?;
        let size = cells_to_pixels(cols, rows).ok_or_else(|| {
            VizError::ContextUnavailable(format!("terminal reports {cols}x{rows} cells"))
        })?;

        terminal::enable_raw_mode()?;
        let mut out = io::stdout();
        if let Err(err) = execute!(
            out,
            EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide,
            DisableLineWrap
        ) {
            let _ = terminal::disable_raw_mode();
            return Err(err.into());
        }
        debug!(cols, rows, "terminal surface acquired");
        Ok(TerminalSurface {
            out,
            size,
            active: true,
            captured: None,
        })
    }

    fn draw(&mut self, frame: &Framebuffer, overlay: &[String]) -> io::Result<()> {
        let out = &mut self.out;
        queue!(out, BeginSynchronizedUpdate)?;

        let mut fg = None;
        let mut bg = None;
        for row in 0..frame.height().div_ceil(2) {
            queue!(out, cursor::MoveTo(0, row as u16))?;
            let (top_y, bottom_y) = (row * 2, row * 2 + 1);
            for x in 0..frame.width() {
                let top = frame.pixel(x, top_y);
                let bottom = if bottom_y < frame.height() {
                    frame.pixel(x, bottom_y)
                } else {
                    Color::BLACK
                };
                if fg != Some(top) {
                    fg = Some(top);
                    queue!(out, SetForegroundColor(term_color(top)))?;
                }
                if bg != Some(bottom) {
                    bg = Some(bottom);
                    queue!(out, SetBackgroundColor(term_color(bottom)))?;
                }
                queue!(out, Print(HALF_BLOCK))?;
            }
        }

        for (row, line) in overlay.iter().enumerate() {
            queue!(
                out,
                cursor::MoveTo(1, row as u16),
                SetForegroundColor(style::Color::White),
                SetBackgroundColor(style::Color::Black),
                Print(line)
            )?;
        }

        queue!(out, ResetColor, EndSynchronizedUpdate)?;
        out.flush()
    }
}

fn term_color(c: Color) -> style::Color {
    style::Color::Rgb {
        r: c.r,
        g: c.g,
        b: c.b,
    }
}

impl Surface for TerminalSurface {
    fn size(&self) -> ViewportSize {
        self.size
    }

    fn present(&mut self, frame: &Framebuffer, overlay: &[String]) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        Ok(self.draw(frame, overlay)?)
    }

    // Mouse capture already reports drags outside the window; only track the owner.
    fn capture_pointer(&mut self, id: PointerId) {
        trace!(pointer = id.0, "pointer captured");
        self.captured = Some(id);
    }

    fn release_pointer(&mut self, id: PointerId) {
        if self.captured == Some(id) {
            trace!(pointer = id.0, "pointer released");
            self.captured = None;
        }
    }

    fn release(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.captured = None;
        let restored = execute!(
            self.out,
            EndSynchronizedUpdate,
            DisableMouseCapture,
            ResetColor,
            cursor::Show,
            EnableLineWrap,
            LeaveAlternateScreen
        );
        let raw = terminal::disable_raw_mode();
        debug!("terminal restored");
        restored?;
        Ok(raw?)
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(%err, "failed to restore terminal");
        }
    }
}

/// What a terminal event means to the visualization
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TerminalInput {
    Host(HostEvent),
    Quit,
}

/// Maps a crossterm event onto host input. Mouse rows are doubled to land
/// on pixel coordinates.
pub fn translate(event: &Event) -> Option<TerminalInput> {
    match event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) => match code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(TerminalInput::Quit),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                Some(TerminalInput::Quit)
            }
            _ => None,
        },
        Event::Mouse(MouseEvent {
            kind, column, row, ..
        }) => {
            let (x, y) = (f64::from(*column), f64::from(*row) * 2.0);
            let pointer = match kind {
                MouseEventKind::Down(MouseButton::Left) => PointerEvent::Down { id: MOUSE, x, y },
                MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => {
                    PointerEvent::Move { id: MOUSE, x, y }
                }
                MouseEventKind::Up(MouseButton::Left) => PointerEvent::Up { id: MOUSE, x, y },
                MouseEventKind::ScrollUp => PointerEvent::Wheel { delta: 1.0 },
                MouseEventKind::ScrollDown => PointerEvent::Wheel { delta: -1.0 },
                _ => return None,
            };
            Some(TerminalInput::Host(HostEvent::Pointer(pointer)))
        }
        Event::Resize(cols, rows) => Some(TerminalInput::Host(HostEvent::Resize {
            width: u32::from(*cols),
            height: u32::from(*rows) * 2,
        })),
        _ => None,
    }
}

/// Paces frames while pumping terminal input into the host router
pub struct TerminalFrameSource {
    pacer: FramePacer,
    router: SharedRouter,
    quit: Rc<Cell<bool>>,
}

impl TerminalFrameSource {
    fn deliver(&self, event: &Event) {
        match translate(event) {
            Some(TerminalInput::Host(host_event)) => {
                self.router.borrow_mut().dispatch(&host_event);
            }
            Some(TerminalInput::Quit) => {
                debug!("quit requested");
                self.quit.set(true);
            }
            None => {}
        }
    }
}

impl FrameSource for TerminalFrameSource {
    fn probe(&self) -> Result<()> {
        if io::stdin().is_terminal() {
            Ok(())
        } else {
            Err(VizError::FrameSourceUnavailable(
                "stdin is not a terminal".to_string(),
            ))
        }
    }

    fn wait_for_frame(&mut self) -> Result<FrameStamp> {
        loop {
            let now = Instant::now();
            let remaining = self.pacer.remaining(now);
            if remaining.is_zero() || self.quit.get() {
                return Ok(self.pacer.advance(now));
            }
            if event::poll(remaining)? {
                let event = event::read()?;
                self.deliver(&event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn left_drag_becomes_pointer_gesture_in_pixels() {
        assert_eq!(
            translate(&mouse(MouseEventKind::Down(MouseButton::Left), 3, 4)),
            Some(TerminalInput::Host(HostEvent::Pointer(PointerEvent::Down {
                id: MOUSE,
                x: 3.0,
                y: 8.0
            })))
        );
        assert_eq!(
            translate(&mouse(MouseEventKind::Drag(MouseButton::Left), 5, 4)),
            Some(TerminalInput::Host(HostEvent::Pointer(PointerEvent::Move {
                id: MOUSE,
                x: 5.0,
                y: 8.0
            })))
        );
        assert_eq!(
            translate(&mouse(MouseEventKind::Down(MouseButton::Right), 5, 4)),
            None
        );
    }

    #[test]
    fn scroll_up_zooms_in() {
        assert_eq!(
            translate(&mouse(MouseEventKind::ScrollUp, 0, 0)),
            Some(TerminalInput::Host(HostEvent::Pointer(PointerEvent::Wheel {
                delta: 1.0
            })))
        );
    }

    #[test]
    fn resize_is_reported_in_pixels() {
        assert_eq!(
            translate(&Event::Resize(80, 24)),
            Some(TerminalInput::Host(HostEvent::Resize {
                width: 80,
                height: 48
            }))
        );
        assert_eq!(cells_to_pixels(80, 24), ViewportSize::new(80, 48));
        assert_eq!(cells_to_pixels(80, 0), None);
    }

    #[test]
    fn quit_keys() {
        let key = |code, modifiers| Event::Key(KeyEvent::new(code, modifiers));
        for event in [
            key(KeyCode::Char('q'), KeyModifiers::NONE),
            key(KeyCode::Esc, KeyModifiers::NONE),
            key(KeyCode::Char('c'), KeyModifiers::CONTROL),
        ] {
            assert_eq!(translate(&event), Some(TerminalInput::Quit));
        }
        assert_eq!(translate(&key(KeyCode::Char('c'), KeyModifiers::NONE)), None);
    }
}
