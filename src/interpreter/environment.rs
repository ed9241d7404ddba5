use std::{
    cell::RefCell,
    fmt::Debug,
    io::{BufRead, Write},
    iter,
    rc::Rc,
};

use rustc_hash::FxHashMap;

use super::RuntimeError;
use crate::value::Value;

pub type Frame = FxHashMap<String, Value>;

/// Name resolution and I/O state for one program run.
///
/// Lookups search the pushed frames innermost first, then the base frame,
/// then the globals the standard library is installed into.
pub struct Environment {
    base: Frame,
    frames: Vec<Frame>,
    globals: Frame,
    call_stack: Vec<String>,
    stdout: Rc<RefCell<dyn Write>>,
    stdin: Rc<RefCell<dyn BufRead>>,
}

impl Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("base", &self.base)
            .field("frames", &self.frames)
            .field("call_stack", &self.call_stack)
            .finish()
    }
}

impl Environment {
    pub fn new(stdout: Rc<RefCell<dyn Write>>, stdin: Rc<RefCell<dyn BufRead>>) -> Self {
        Self {
            base: Frame::default(),
            frames: Vec::new(),
            globals: Frame::default(),
            call_stack: Vec::new(),
            stdout,
            stdin,
        }
    }

    fn search(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev().chain(iter::once(&self.base))
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        self.search()
            .chain(iter::once(&self.globals))
            .find_map(|frame| frame.get(name))
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    /// Overwrites the innermost existing binding, or creates one in the
    /// current frame. Globals are never written, so assigning to a builtin's
    /// name shadows it.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(slot) = self
            .frames
            .iter_mut()
            .rev()
            .chain(iter::once(&mut self.base))
            .find_map(|frame| frame.get_mut(name))
        {
            *slot = value;
            return;
        }
        self.current_mut().insert(name.to_string(), value);
    }

    /// Binds `name` in the current frame regardless of outer bindings.
    pub fn define(&mut self, name: String, value: Value) {
        self.current_mut().insert(name, value);
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn current(&self) -> &Frame {
        self.frames.last().unwrap_or(&self.base)
    }

    fn current_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap_or(&mut self.base)
    }

    /// Number of frames above the base frame.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Runs `f` inside a fresh frame, popping it again on every exit path.
    pub fn with_frame<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        self.frames.push(Frame::default());
        let result = f(self);
        self.frames.pop();
        result
    }

    /// Runs `f` with `name` pushed onto the call stack.
    pub fn with_call<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        self.call_stack.push(name.to_string());
        log::trace!("enter {name} (depth {})", self.call_stack.len());
        let result = f(self);
        log::trace!("leave {name} (depth {})", self.call_stack.len());
        self.call_stack.pop();
        result
    }

    pub fn call_stack(&self) -> &[String] {
        &self.call_stack
    }

    pub fn write(&self, text: &str) -> Result<(), RuntimeError> {
        self.stdout.borrow_mut().write_all(text.as_bytes())?;
        Ok(())
    }

    /// Reads one line without its terminator, or `None` at end of input.
    pub fn read_line(&self) -> Result<Option<String>, RuntimeError> {
        let mut line = String::new();
        if self.stdin.borrow_mut().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn environment(input: &'static [u8]) -> (Environment, Rc<RefCell<Vec<u8>>>) {
        let stdout = Rc::new(RefCell::new(Vec::new()));
        let environment = Environment::new(stdout.clone(), Rc::new(RefCell::new(input)));
        (environment, stdout)
    }

    #[test]
    fn test_get_falls_back_to_globals() {
        let (mut env, _) = environment(b"");
        env.define_global("x", 1.0.into());
        assert_eq!(env.get("x").unwrap().to_string(), "1");
        env.set("x", 2.0.into());
        assert_eq!(env.get("x").unwrap().to_string(), "2");
        assert!(matches!(
            env.get("y"),
            Err(RuntimeError::UndefinedVariable(name)) if name == "y"
        ));
    }

    #[test]
    fn test_set_overwrites_outer_binding() {
        let (mut env, _) = environment(b"");
        env.set("x", 1.0.into());
        env.with_frame(|env| {
            env.set("x", 2.0.into());
            env.set("y", 3.0.into());
            assert_eq!(env.depth(), 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(env.get("x").unwrap().to_string(), "2");
        assert!(env.get("y").is_err());
    }

    #[test]
    fn test_define_shadows_outer_binding() {
        let (mut env, _) = environment(b"");
        env.set("x", 1.0.into());
        env.with_frame(|env| {
            env.define("x".to_string(), 5.0.into());
            assert_eq!(env.get("x")?.to_string(), "5");
            Ok(())
        })
        .unwrap();
        assert_eq!(env.get("x").unwrap().to_string(), "1");
    }

    #[test]
    fn test_frames_and_calls_unwind_on_error() {
        let (mut env, _) = environment(b"");
        let result: Result<(), _> = env.with_call("f", |env| {
            env.with_frame(|env| {
                assert_eq!(env.call_stack(), ["f".to_string()]);
                Err(RuntimeError::Type("boom".to_string()))
            })
        });
        assert!(result.is_err());
        assert_eq!(env.depth(), 0);
        assert!(env.call_stack().is_empty());
    }

    #[test]
    fn test_read_line_strips_terminators() {
        let (env, _) = environment(b"first\r\nsecond\nlast");
        assert_eq!(env.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(env.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(env.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(env.read_line().unwrap(), None);
    }

    #[test]
    fn test_write_goes_to_sink() {
        let (env, stdout) = environment(b"");
        env.write("hi").unwrap();
        assert_eq!(String::from_utf8(stdout.borrow().clone()).unwrap(), "hi");
    }
}
