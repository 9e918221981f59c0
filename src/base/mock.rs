//! In-memory serial connector for tests.

use crate::base::error::{Error, Result};
use crate::base::traits::SerialConnector;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

enum ReadStep {
    Bytes(Vec<u8>),
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct PortState {
    reads: VecDeque<ReadStep>,
    written: Vec<u8>,
    opened: usize,
    closed: usize,
    fail_open: bool,
}

/// Connector whose ports replay a script of reads and record what was written.
///
/// Once the script runs out every read times out, like an idle serial port
/// opened with a zero timeout.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Rc<RefCell<PortState>>,
}

impl ScriptedConnector {
    pub fn new() -> ScriptedConnector {
        ScriptedConnector::default()
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.borrow_mut().fail_open = fail;
    }

    /// Queues the bytes returned by one read.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .reads
            .push_back(ReadStep::Bytes(bytes.to_vec()));
    }

    /// Queues a read that fails with `kind`.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state.borrow_mut().reads.push_back(ReadStep::Fail(kind));
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    pub fn closed(&self) -> usize {
        self.state.borrow().closed
    }
}

impl SerialConnector for ScriptedConnector {
    type Port = ScriptedPort;

    fn connect(&mut self, path: &str, _baud_rate: u32) -> Result<ScriptedPort> {
        let mut state = self.state.borrow_mut();
        if state.fail_open {
            return Err(Error::DeviceNotFound {
                path: path.to_owned(),
                description: "no such device".to_owned(),
            });
        }
        state.opened += 1;
        Ok(ScriptedPort {
            state: self.state.clone(),
        })
    }
}

pub struct ScriptedPort {
    state: Rc<RefCell<PortState>>,
}

impl io::Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        match state.reads.pop_front() {
            Some(ReadStep::Bytes(mut bytes)) => {
                let read = bytes.len().min(buf.len());
                buf[..read].copy_from_slice(&bytes[..read]);
                if read < bytes.len() {
                    let rest = bytes.split_off(read);
                    state.reads.push_front(ReadStep::Bytes(rest));
                }
                Ok(read)
            }
            Some(ReadStep::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
        }
    }
}

impl io::Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ScriptedPort {
    fn drop(&mut self) {
        self.state.borrow_mut().closed += 1;
    }
}
