//! Windowing adapter
//!
//! Exposes a [`WindowHost`] backend as `window.*` opcodes. Windows are kept in an owned
//! [`WindowRegistry`] and addressed by integer handles; the string name a program gives a
//! window is only used at the opcode boundary. Host events reported by
//! [`WindowHost::poll_events`] become [`PendingCallback`]s on the shared
//! [`CallbackQueue`], so registered user functions always run on the evaluator thread.
//!
//! Callback arguments, in order:
//!
//! | event | arguments |
//! |---|---|
//! | key | `window i32, key i32, scancode i32, action i32, mods i32` |
//! | cursor position | `window i32, x f64, y f64` |
//! | size | `window i32, width i32, height i32` |

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CallbackQueue, PendingCallback};
use crate::error::{Error, Result};
use crate::ir::{OpCode, Signature};
use crate::memory::{codec, Value};
use crate::opcodes::{OpContext, Opcode, OpcodeTable};
use crate::types::TypeKind;

/// Identifier a backend assigns to one of its windows
pub type HostWindow = u64;

/// Handle a program uses for a window (never 0)
pub type WindowHandle = i32;

const ADAPTER: &str = "window";

/// Input event reported by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// Key press, release or repeat
    Key {
        /// Source window
        window: HostWindow,
        /// Key code
        key: i32,
        /// Platform scancode
        scancode: i32,
        /// Press / release / repeat
        action: i32,
        /// Modifier bit set
        mods: i32,
    },
    /// Cursor moved
    CursorPos {
        /// Source window
        window: HostWindow,
        /// X position
        x: f64,
        /// Y position
        y: f64,
    },
    /// Window resized
    Size {
        /// Source window
        window: HostWindow,
        /// New width
        width: i32,
        /// New height
        height: i32,
    },
}

impl WindowEvent {
    fn window(&self) -> HostWindow {
        match self {
            WindowEvent::Key { window, .. }
            | WindowEvent::CursorPos { window, .. }
            | WindowEvent::Size { window, .. } => *window,
        }
    }
}

/// Windowing backend
pub trait WindowHost: Send {
    /// Opens a window
    fn create(&mut self, width: i32, height: i32, title: &str) -> Result<HostWindow>;

    /// Has the window been asked to close?
    fn should_close(&self, window: HostWindow) -> Result<bool>;

    /// Sets or clears the close request
    fn set_should_close(&mut self, window: HostWindow, value: bool) -> Result<()>;

    /// Current size in pixels
    fn size(&self, window: HostWindow) -> Result<(i32, i32)>;

    /// Current cursor position
    fn cursor_pos(&self, window: HostWindow) -> Result<(f64, f64)>;

    /// Processes pending host events and returns the ones the adapter may forward
    fn poll_events(&mut self) -> Vec<WindowEvent>;

    /// Seconds since the backend started
    fn time(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CallbackKind {
    Key,
    CursorPos,
    Size,
}

#[derive(Debug, Clone)]
struct CallbackTarget {
    package: String,
    function: String,
}

struct WindowEntry {
    name: String,
    host: HostWindow,
    callbacks: HashMap<CallbackKind, CallbackTarget>,
}

/// Owned table of live windows
pub struct WindowRegistry {
    host: Box<dyn WindowHost>,
    windows: Vec<WindowEntry>,
    by_name: HashMap<String, WindowHandle>,
    queue: CallbackQueue,
}

impl WindowRegistry {
    /// Creates an empty registry over `host`, delivering callbacks into `queue`
    pub fn new(host: impl WindowHost + 'static, queue: CallbackQueue) -> Self {
        WindowRegistry {
            host: Box::new(host),
            windows: Vec::new(),
            by_name: HashMap::new(),
            queue,
        }
    }

    /// Opens a window and binds it to `name`. Reusing a name rebinds it to the new window.
    pub fn create(&mut self, name: &str, width: i32, height: i32, title: &str) -> Result<WindowHandle> {
        let host = self.host.create(width, height, title)?;
        self.windows.push(WindowEntry {
            name: name.to_string(),
            host,
            callbacks: HashMap::new(),
        });
        let handle = self.windows.len() as WindowHandle;
        self.by_name.insert(name.to_string(), handle);
        tracing::debug!(name, handle, width, height, "window created");
        Ok(handle)
    }

    /// Handle bound to `name`
    pub fn handle(&self, name: &str) -> Result<WindowHandle> {
        self.by_name.get(name).copied().ok_or_else(|| Error::Adapter {
            adapter: ADAPTER.to_string(),
            message: format!("no window named {:?}", name),
        })
    }

    /// Name a handle was created with
    pub fn name(&self, handle: WindowHandle) -> Result<&str> {
        Ok(&self.entry(handle)?.name)
    }

    fn entry(&self, handle: WindowHandle) -> Result<&WindowEntry> {
        usize::try_from(handle)
            .ok()
            .and_then(|h| h.checked_sub(1))
            .and_then(|i| self.windows.get(i))
            .ok_or_else(|| Error::Adapter {
                adapter: ADAPTER.to_string(),
                message: format!("invalid window handle {}", handle),
            })
    }

    fn entry_mut(&mut self, handle: WindowHandle) -> Result<&mut WindowEntry> {
        self.entry(handle)?;
        Ok(&mut self.windows[handle as usize - 1])
    }

    fn host_window(&self, name: &str) -> Result<HostWindow> {
        let handle = self.handle(name)?;
        Ok(self.entry(handle)?.host)
    }

    /// Has the named window been asked to close?
    pub fn should_close(&self, name: &str) -> Result<bool> {
        self.host.should_close(self.host_window(name)?)
    }

    /// Sets or clears the close request of the named window
    pub fn set_should_close(&mut self, name: &str, value: bool) -> Result<()> {
        let window = self.host_window(name)?;
        self.host.set_should_close(window, value)
    }

    /// Size of the named window
    pub fn size(&self, name: &str) -> Result<(i32, i32)> {
        self.host.size(self.host_window(name)?)
    }

    /// Cursor position in the named window
    pub fn cursor_pos(&self, name: &str) -> Result<(f64, f64)> {
        self.host.cursor_pos(self.host_window(name)?)
    }

    /// Backend clock
    pub fn time(&self) -> f64 {
        self.host.time()
    }

    fn set_callback(&mut self, name: &str, kind: CallbackKind, package: &str, function: &str) -> Result<()> {
        let handle = self.handle(name)?;
        self.entry_mut(handle)?.callbacks.insert(
            kind,
            CallbackTarget {
                package: package.to_string(),
                function: function.to_string(),
            },
        );
        Ok(())
    }

    /// Routes key events of the named window to `package.function`
    pub fn set_key_callback(&mut self, name: &str, package: &str, function: &str) -> Result<()> {
        self.set_callback(name, CallbackKind::Key, package, function)
    }

    /// Routes cursor movement of the named window to `package.function`
    pub fn set_cursor_pos_callback(&mut self, name: &str, package: &str, function: &str) -> Result<()> {
        self.set_callback(name, CallbackKind::CursorPos, package, function)
    }

    /// Routes size changes of the named window to `package.function`
    pub fn set_size_callback(&mut self, name: &str, package: &str, function: &str) -> Result<()> {
        self.set_callback(name, CallbackKind::Size, package, function)
    }

    /// Polls the backend and queues a callback for every event with a registered target.
    /// Returns the number of callbacks queued.
    pub fn poll_events(&mut self) -> Result<usize> {
        let mut queued = 0;
        for event in self.host.poll_events() {
            let Some((index, entry)) = self
                .windows
                .iter()
                .enumerate()
                .find(|(_, entry)| entry.host == event.window())
            else {
                tracing::warn!(window = event.window(), "event for unknown host window");
                continue;
            };
            let handle = (index + 1) as WindowHandle;

            let (kind, args) = match event {
                WindowEvent::Key {
                    key,
                    scancode,
                    action,
                    mods,
                    ..
                } => (
                    CallbackKind::Key,
                    vec![
                        Value::I32(handle),
                        Value::I32(key),
                        Value::I32(scancode),
                        Value::I32(action),
                        Value::I32(mods),
                    ],
                ),
                WindowEvent::CursorPos { x, y, .. } => (
                    CallbackKind::CursorPos,
                    vec![Value::I32(handle), Value::F64(x), Value::F64(y)],
                ),
                WindowEvent::Size { width, height, .. } => (
                    CallbackKind::Size,
                    vec![Value::I32(handle), Value::I32(width), Value::I32(height)],
                ),
            };

            let Some(target) = entry.callbacks.get(&kind) else {
                continue;
            };
            let args = args
                .iter()
                .map(|value| {
                    let ty = match value {
                        Value::F64(_) => TypeKind::F64,
                        _ => TypeKind::I32,
                    };
                    codec::encode(value, &ty)
                })
                .collect::<Result<Vec<_>>>()?;

            self.queue.push(PendingCallback {
                package: target.package.clone(),
                function: target.function.clone(),
                args,
            });
            queued += 1;
        }
        Ok(queued)
    }
}

type WindowFn = fn(&mut WindowRegistry, &mut OpContext<'_>) -> Result<()>;

/// A `window.*` operator bound to a shared registry
struct WindowOp {
    name: String,
    signature: Signature,
    registry: Arc<Mutex<WindowRegistry>>,
    func: WindowFn,
}

impl Opcode for WindowOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn execute(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let mut registry = self.registry.lock();
        (self.func)(&mut registry, ctx)
    }
}

fn create(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    let handle = reg.create(&ctx.str(0)?, ctx.i32(1)?, ctx.i32(2)?, &ctx.str(3)?)?;
    ctx.assign_output(0, Value::I32(handle))
}

fn handle(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    let handle = reg.handle(&ctx.str(0)?)?;
    ctx.assign_output(0, Value::I32(handle))
}

fn should_close(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    let value = reg.should_close(&ctx.str(0)?)?;
    ctx.assign_output(0, Value::Bool(value))
}

fn set_should_close(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    reg.set_should_close(&ctx.str(0)?, ctx.bool(1)?)
}

fn size(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    let (width, height) = reg.size(&ctx.str(0)?)?;
    ctx.assign_output(0, Value::I32(width))?;
    ctx.assign_output(1, Value::I32(height))
}

fn cursor_pos(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    let (x, y) = reg.cursor_pos(&ctx.str(0)?)?;
    ctx.assign_output(0, Value::F64(x))?;
    ctx.assign_output(1, Value::F64(y))
}

fn poll_events(reg: &mut WindowRegistry, _ctx: &mut OpContext<'_>) -> Result<()> {
    let queued = reg.poll_events()?;
    tracing::trace!(queued, "window events polled");
    Ok(())
}

fn time(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    ctx.assign_output(0, Value::F64(reg.time()))
}

fn set_key_callback(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    let package = ctx.package().to_string();
    reg.set_key_callback(&ctx.str(0)?, &package, &ctx.str(1)?)
}

fn set_key_callback_ex(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    reg.set_key_callback(&ctx.str(0)?, &ctx.str(2)?, &ctx.str(1)?)
}

fn set_cursor_pos_callback(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    let package = ctx.package().to_string();
    reg.set_cursor_pos_callback(&ctx.str(0)?, &package, &ctx.str(1)?)
}

fn set_size_callback(reg: &mut WindowRegistry, ctx: &mut OpContext<'_>) -> Result<()> {
    reg.set_size_callback(&ctx.str(0)?, &ctx.str(2)?, &ctx.str(1)?)
}

/// Registers `window.*` operators backed by one registry
#[derive(Clone)]
pub struct WindowAdapter {
    registry: Arc<Mutex<WindowRegistry>>,
}

impl WindowAdapter {
    /// Creates an adapter over `host` whose callbacks go to `queue`
    pub fn new(host: impl WindowHost + 'static, queue: CallbackQueue) -> Self {
        WindowAdapter {
            registry: Arc::new(Mutex::new(WindowRegistry::new(host, queue))),
        }
    }

    /// Shared registry, for hosts that inspect windows outside of program code
    pub fn registry(&self) -> Arc<Mutex<WindowRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Adds every `window.*` operator to `table` and returns their codes
    pub fn register(&self, table: &mut OpcodeTable) -> Vec<OpCode> {
        use TypeKind::{Bool, Str, F64, I32};

        let ops: [(&str, Vec<TypeKind>, Vec<TypeKind>, WindowFn); 12] = [
            ("create", vec![Str, I32, I32, Str], vec![I32], create),
            ("handle", vec![Str], vec![I32], handle),
            ("should_close", vec![Str], vec![Bool], should_close),
            ("set_should_close", vec![Str, Bool], vec![], set_should_close),
            ("size", vec![Str], vec![I32, I32], size),
            ("cursor_pos", vec![Str], vec![F64, F64], cursor_pos),
            ("poll_events", vec![], vec![], poll_events),
            ("time", vec![], vec![F64], time),
            ("set_key_callback", vec![Str, Str], vec![], set_key_callback),
            ("set_key_callback_ex", vec![Str, Str, Str], vec![], set_key_callback_ex),
            ("set_cursor_pos_callback", vec![Str, Str], vec![], set_cursor_pos_callback),
            ("set_size_callback", vec![Str, Str, Str], vec![], set_size_callback),
        ];

        ops.into_iter()
            .map(|(op, inputs, outputs, func)| {
                table.register(WindowOp {
                    name: format!("{}.{}", ADAPTER, op),
                    signature: Signature::new(inputs, outputs),
                    registry: Arc::clone(&self.registry),
                    func,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct HeadlessWindow {
    title: String,
    width: i32,
    height: i32,
    cursor: (f64, f64),
    should_close: bool,
}

#[derive(Debug, Default)]
struct HeadlessState {
    windows: Vec<HeadlessWindow>,
    events: VecDeque<WindowEvent>,
    time: f64,
}

impl HeadlessState {
    fn window(&mut self, window: HostWindow) -> Result<&mut HeadlessWindow> {
        usize::try_from(window)
            .ok()
            .and_then(|w| w.checked_sub(1))
            .and_then(|i| self.windows.get_mut(i))
            .ok_or_else(|| Error::Adapter {
                adapter: ADAPTER.to_string(),
                message: format!("unknown headless window {}", window),
            })
    }
}

/// Backend without a display. Events are scripted through a [`HeadlessControl`].
pub struct HeadlessHost {
    state: Arc<Mutex<HeadlessState>>,
}

/// Thread-safe handle for scripting a [`HeadlessHost`]
#[derive(Clone)]
pub struct HeadlessControl {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHost {
    /// Creates a backend and its control handle
    pub fn new() -> (Self, HeadlessControl) {
        let state = Arc::new(Mutex::new(HeadlessState::default()));
        (
            HeadlessHost {
                state: Arc::clone(&state),
            },
            HeadlessControl { state },
        )
    }
}

impl WindowHost for HeadlessHost {
    fn create(&mut self, width: i32, height: i32, title: &str) -> Result<HostWindow> {
        if width <= 0 || height <= 0 {
            return Err(Error::Adapter {
                adapter: ADAPTER.to_string(),
                message: format!("invalid window size {}x{}", width, height),
            });
        }
        let mut state = self.state.lock();
        state.windows.push(HeadlessWindow {
            title: title.to_string(),
            width,
            height,
            cursor: (0.0, 0.0),
            should_close: false,
        });
        Ok(state.windows.len() as HostWindow)
    }

    fn should_close(&self, window: HostWindow) -> Result<bool> {
        Ok(self.state.lock().window(window)?.should_close)
    }

    fn set_should_close(&mut self, window: HostWindow, value: bool) -> Result<()> {
        self.state.lock().window(window)?.should_close = value;
        Ok(())
    }

    fn size(&self, window: HostWindow) -> Result<(i32, i32)> {
        let mut state = self.state.lock();
        let w = state.window(window)?;
        Ok((w.width, w.height))
    }

    fn cursor_pos(&self, window: HostWindow) -> Result<(f64, f64)> {
        Ok(self.state.lock().window(window)?.cursor)
    }

    fn poll_events(&mut self) -> Vec<WindowEvent> {
        self.state.lock().events.drain(..).collect()
    }

    fn time(&self) -> f64 {
        self.state.lock().time
    }
}

impl HeadlessControl {
    /// Number of windows opened so far
    pub fn window_count(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Title of a host window
    pub fn title(&self, window: HostWindow) -> Result<String> {
        Ok(self.state.lock().window(window)?.title.clone())
    }

    /// Queues a key event
    pub fn key(&self, window: HostWindow, key: i32, scancode: i32, action: i32, mods: i32) {
        self.state.lock().events.push_back(WindowEvent::Key {
            window,
            key,
            scancode,
            action,
            mods,
        });
    }

    /// Moves the cursor and queues the matching event
    pub fn move_cursor(&self, window: HostWindow, x: f64, y: f64) -> Result<()> {
        let mut state = self.state.lock();
        state.window(window)?.cursor = (x, y);
        state.events.push_back(WindowEvent::CursorPos { window, x, y });
        Ok(())
    }

    /// Resizes a window and queues the matching event
    pub fn resize(&self, window: HostWindow, width: i32, height: i32) -> Result<()> {
        let mut state = self.state.lock();
        let w = state.window(window)?;
        w.width = width;
        w.height = height;
        state.events.push_back(WindowEvent::Size {
            window,
            width,
            height,
        });
        Ok(())
    }

    /// Marks a window as asked to close
    pub fn request_close(&self, window: HostWindow) -> Result<()> {
        self.state.lock().window(window)?.should_close = true;
        Ok(())
    }

    /// Advances the backend clock
    pub fn advance(&self, seconds: f64) {
        self.state.lock().time += seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (WindowRegistry, HeadlessControl, CallbackQueue) {
        let (host, control) = HeadlessHost::new();
        let queue = CallbackQueue::new();
        (WindowRegistry::new(host, queue.clone()), control, queue)
    }

    #[test]
    fn test_handles_are_name_keyed_only_at_lookup() {
        let (mut reg, control, _) = registry();
        let a = reg.create("main", 640, 480, "Main").unwrap();
        let b = reg.create("tools", 200, 100, "Tools").unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(reg.handle("tools").unwrap(), 2);
        assert_eq!(reg.name(1).unwrap(), "main");
        assert_eq!(control.title(2).unwrap(), "Tools");
        assert!(matches!(reg.handle("missing"), Err(Error::Adapter { .. })));
        assert!(reg.name(0).is_err());
    }

    #[test]
    fn test_events_become_callbacks() {
        let (mut reg, control, queue) = registry();
        reg.create("main", 640, 480, "Main").unwrap();
        reg.set_key_callback("main", "game", "on_key").unwrap();

        control.key(1, 65, 30, 1, 0);
        control.move_cursor(1, 1.5, 2.5).unwrap();
        assert_eq!(reg.poll_events().unwrap(), 1);

        let callbacks = queue.drain();
        assert_eq!(callbacks.len(), 1);
        assert_eq!(callbacks[0].function, "on_key");
        assert_eq!(callbacks[0].package, "game");
        assert_eq!(callbacks[0].args[0], 1i32.to_le_bytes().to_vec());
        assert_eq!(callbacks[0].args[1], 65i32.to_le_bytes().to_vec());
        assert_eq!(reg.cursor_pos("main").unwrap(), (1.5, 2.5));
    }

    #[test]
    fn test_events_for_unknown_windows_are_dropped() {
        let (mut reg, control, queue) = registry();
        control.key(9, 1, 1, 1, 0);
        assert_eq!(reg.poll_events().unwrap(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_adapter_registers_all_operators() {
        let (host, _) = HeadlessHost::new();
        let adapter = WindowAdapter::new(host, CallbackQueue::new());
        let mut table = OpcodeTable::empty();
        assert_eq!(adapter.register(&mut table).len(), 12);
        assert!(table.has("window.set_key_callback_ex"));
        assert_eq!(
            table.get(table.lookup("window.size").unwrap()).unwrap().signature().outputs.len(),
            2
        );
    }
}
