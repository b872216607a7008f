//! Footswitch box
//!
//! A small serial device with a handful of foot buttons. The box is found by handshaking every
//! serial port, then read frame by frame, each frame holding one state digit per button.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod listener;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

// Internal
pub use listener::*;

use comms_if::eqpt::footswitch::{self as protocol, ProtocolError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Read timeout of the serial port, bounds how long a poll can block.
pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A footswitch box which has answered the handshake.
pub struct FootswitchBox<S: Read + Write> {
    port: S,

    port_name: String,

    num_buttons: usize,

    /// Bytes read but not yet forming a whole frame
    pending: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur when talking to the footswitch box.
#[derive(Debug, thiserror::Error)]
pub enum FootswitchError {
    #[error("Footswitch port I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot open the footswitch port: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Unexpected data from the footswitch: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("The footswitch listener thread panicked")]
    ListenerPanicked,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S: Read + Write> FootswitchBox<S> {
    /// Handshake with the box on an already open port.
    ///
    /// The box is given `window` to answer before whatever it sent is read.
    pub fn connect(mut port: S, port_name: &str, window: Duration) -> Result<Self, FootswitchError> {
        port.write_all(&protocol::HANDSHAKE)?;
        port.flush()?;

        thread::sleep(window);

        let mut response = Vec::new();
        read_available(&mut port, &mut response)?;

        let num_buttons = protocol::parse_handshake(&response)?;

        info!(
            "Footswitch with {} buttons found on {}",
            num_buttons, port_name
        );

        Ok(Self {
            port,
            port_name: port_name.to_string(),
            num_buttons,
            pending: Vec::new(),
        })
    }

    pub fn num_buttons(&self) -> usize {
        self.num_buttons
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Read whatever the box has sent and return the newest button states.
    ///
    /// Returns `None` if no whole frame has arrived since the last poll. Frames which aren't made
    /// of state digits are skipped.
    pub fn poll(&mut self) -> Result<Option<Vec<bool>>, FootswitchError> {
        if self.num_buttons == 0 {
            return Ok(None);
        }

        read_available(&mut self.port, &mut self.pending)?;

        let mut latest = None;
        let num_frames = self.pending.len() / self.num_buttons;

        for frame in self.pending.chunks_exact(self.num_buttons) {
            match protocol::parse_states(frame, self.num_buttons) {
                Ok(states) => latest = Some(states),
                Err(e) => warn!("Skipping footswitch frame: {}", e),
            }
        }

        self.pending.drain(..num_frames * self.num_buttons);

        Ok(latest)
    }

    /// Give the port back.
    pub fn into_inner(self) -> S {
        self.port
    }
}

impl FootswitchBox<Box<dyn SerialPort>> {
    /// Open the named serial port and handshake with the box on it.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, FootswitchError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;

        Self::connect(
            port,
            port_name,
            Duration::from_millis(protocol::HANDSHAKE_WINDOW_MS),
        )
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Handshake every serial port, returning the name and button count of each that answers.
///
/// Ports are closed again once handshaken.
pub fn discover(baud_rate: u32) -> Result<Vec<(String, usize)>, FootswitchError> {
    let mut found = Vec::new();

    for info in serialport::available_ports()? {
        match FootswitchBox::open(&info.port_name, baud_rate) {
            Ok(fs) => found.push((info.port_name.clone(), fs.num_buttons())),
            Err(e) => debug!("No footswitch on {}: {}", info.port_name, e),
        }
    }

    Ok(found)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Read until the port has nothing more to give.
fn read_available<R: Read>(port: &mut R, buf: &mut Vec<u8>) -> io::Result<()> {
    let mut chunk = [0u8; 64];

    loop {
        match port.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    return Ok(());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                return Ok(())
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory serial port, reads time out once the input runs dry.
    #[derive(Clone, Default)]
    pub(crate) struct MockPort {
        pub input: Arc<Mutex<VecDeque<u8>>>,
        pub output: Arc<Mutex<Vec<u8>>>,
    }

    impl MockPort {
        pub fn with_input(bytes: &[u8]) -> Self {
            let port = Self::default();
            port.feed(bytes);
            port
        }

        pub fn feed(&self, bytes: &[u8]) {
            self.input.lock().unwrap().extend(bytes.iter());
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut input = self.input.lock().unwrap();
            if input.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(input.len());
            for b in buf.iter_mut().take(n) {
                *b = input.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn connect(port: MockPort) -> FootswitchBox<MockPort> {
        FootswitchBox::connect(port, "mock", Duration::from_millis(0)).unwrap()
    }

    #[test]
    fn test_handshake() {
        let port = MockPort::with_input(b"FOOT3");
        let fs = connect(port.clone());

        assert_eq!(fs.num_buttons(), 3);
        assert_eq!(*port.output.lock().unwrap(), vec![16, 128]);
    }

    #[test]
    fn test_bad_handshake() {
        let port = MockPort::with_input(b"HELLO");
        let res = FootswitchBox::connect(port, "mock", Duration::from_millis(0));
        assert!(matches!(
            res,
            Err(FootswitchError::Protocol(ProtocolError::NoToken(_)))
        ));

        // Silent port
        let res = FootswitchBox::connect(MockPort::default(), "mock", Duration::from_millis(0));
        assert!(matches!(res, Err(FootswitchError::Protocol(_))));
    }

    #[test]
    fn test_poll_frames() {
        let port = MockPort::with_input(b"FOOT3");
        let mut fs = connect(port.clone());

        assert_eq!(fs.poll().unwrap(), None);

        port.feed(b"101");
        assert_eq!(fs.poll().unwrap(), Some(vec![true, false, true]));

        // A partial frame waits for the rest
        port.feed(b"0001");
        assert_eq!(fs.poll().unwrap(), Some(vec![false, false, false]));
        port.feed(b"10");
        assert_eq!(fs.poll().unwrap(), Some(vec![true, true, false]));

        // Several frames at once give the newest
        port.feed(b"100010");
        assert_eq!(fs.poll().unwrap(), Some(vec![false, true, false]));
    }

    #[test]
    fn test_poll_skips_bad_frames() {
        let port = MockPort::with_input(b"FOOT3");
        let mut fs = connect(port.clone());

        port.feed(b"011");
        port.feed(b"1x0");
        assert_eq!(fs.poll().unwrap(), Some(vec![false, true, true]));

        port.feed(b"\r\n0");
        assert_eq!(fs.poll().unwrap(), None);
    }
}
