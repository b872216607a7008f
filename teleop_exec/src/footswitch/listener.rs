//! Background listener for the footswitch box

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Internal
use super::{FootswitchBox, FootswitchError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Polls a footswitch box on its own thread, keeping the newest button states.
///
/// The thread checks its stop flag between polls, so stopping takes at most one poll period plus
/// the port's read timeout.
pub struct FootswitchListener<S: Read + Write + Send + 'static> {
    stop: Arc<AtomicBool>,

    states: Arc<Mutex<Option<Vec<bool>>>>,

    handle: Option<JoinHandle<FootswitchBox<S>>>,

    num_buttons: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S: Read + Write + Send + 'static> FootswitchListener<S> {
    /// Start listening to the box.
    pub fn start(fs: FootswitchBox<S>, poll_period: Duration) -> Result<Self, FootswitchError> {
        let stop = Arc::new(AtomicBool::new(false));
        let states = Arc::new(Mutex::new(None));
        let num_buttons = fs.num_buttons();

        let handle = {
            let stop = stop.clone();
            let states = states.clone();
            thread::Builder::new()
                .name("footswitch".into())
                .spawn(move || listen(fs, stop, states, poll_period))?
        };

        Ok(Self {
            stop,
            states,
            handle: Some(handle),
            num_buttons,
        })
    }

    pub fn num_buttons(&self) -> usize {
        self.num_buttons
    }

    /// Newest button states, or `None` if the box hasn't sent any yet.
    pub fn states(&self) -> Option<Vec<bool>> {
        match self.states.lock() {
            Ok(s) => s.clone(),
            Err(_) => None,
        }
    }

    /// Whether the listening thread is still going.
    pub fn is_running(&self) -> bool {
        match self.handle {
            Some(ref h) => !h.is_finished(),
            None => false,
        }
    }

    /// Stop the listener and get the box back.
    pub fn stop(mut self) -> Result<FootswitchBox<S>, FootswitchError> {
        self.stop.store(true, Ordering::Relaxed);

        match self.handle.take() {
            Some(h) => h.join().map_err(|_| FootswitchError::ListenerPanicked),
            None => Err(FootswitchError::ListenerPanicked),
        }
    }
}

impl<S: Read + Write + Send + 'static> Drop for FootswitchListener<S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                warn!("Footswitch listener panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn listen<S: Read + Write>(
    mut fs: FootswitchBox<S>,
    stop: Arc<AtomicBool>,
    states: Arc<Mutex<Option<Vec<bool>>>>,
    poll_period: Duration,
) -> FootswitchBox<S> {
    debug!("Listening to the footswitch on {}", fs.port_name());

    while !stop.load(Ordering::Relaxed) {
        match fs.poll() {
            Ok(Some(s)) => {
                if let Ok(mut guard) = states.lock() {
                    *guard = Some(s);
                }
            }
            Ok(None) => (),
            Err(e) => {
                warn!("Footswitch listener stopped: {}", e);
                break;
            }
        }

        thread::sleep(poll_period);
    }

    debug!("Footswitch listener on {} exiting", fs.port_name());

    fs
}
