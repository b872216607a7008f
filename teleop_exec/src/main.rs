//! Main teleoperation executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - Signal input acquisition:
//!             - Scripted signal writes
//!             - Footswitch buttons
//!         - Motor board processing (hardware events, sinks, commands)
//!         - Wrist control processing
//!         - Archiving
//!
//! # Modules
//!
//! All modules (e.g. `wrist_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.
//!

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use teleop_lib::{
    data_store::DataStore,
    footswitch::{self, FootswitchBox, FootswitchListener},
    motor_ctrl::{self, MotorBoard},
    params::{FootswitchParams, TeleopExecParams},
    script::{self, ScriptEntry},
    sim::{SimDxlBus, SimMotorBoard},
    wrist_ctrl::{self, OrientationCmd, WristAxis, WristCtrl},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, trace, warn};
use serialport::SerialPort;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use comms_if::signal::{LocalSignalBus, SignalBus, SignalId};
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::{PendingWrites, ScriptInterpreter},
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Number of cycles per second
const CYCLE_FREQUENCY_HZ: f64 = 1.0 / CYCLE_PERIOD_S;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options of the executable.
#[derive(Debug, StructOpt)]
#[structopt(name = "teleop_exec", about = "Teleoperation motor board and wrist executable")]
struct Opts {
    /// Executable parameter file, relative to the params directory.
    #[structopt(short, long, default_value = "teleop_exec.toml")]
    params: String,

    /// Don't touch any serial port, the footswitch is not searched for.
    #[structopt(long)]
    dry_run: bool,

    /// Stop after this many cycles.
    #[structopt(short, long)]
    cycles: Option<u128>,

    /// Signal script to run, overrides the one in the parameter file.
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,
}

/// Signals the operator drives the wrist with.
struct WristSignals {
    orientation: [(SignalId, Receiver<f64>); 3],
    torque: [(SignalId, Receiver<f64>); 3],
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("teleop_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Teleoperation Executable\n");
    info!("Running on: {}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    debug!("CLI options: {:?}", opts);

    // ---- LOAD PARAMETERS ----

    let exec_params: TeleopExecParams =
        util::params::load(&opts.params).wrap_err("Could not load exec params")?;

    let calibs = motor_ctrl::load_calibrations(&exec_params.motor_calibrations)
        .wrap_err("Could not load motor calibrations")?;

    let wrist_params: wrist_ctrl::Params = util::params::load(&exec_params.wrist_params)
        .wrap_err("Could not load wrist params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE SCRIPT ----

    let script_path = match opts.script {
        Some(ref p) => Some(p.clone()),
        None => exec_params.script.as_ref().map(PathBuf::from),
    };

    let mut script = match script_path {
        Some(p) => {
            info!("Loading script from {:?}", p);

            let si: ScriptInterpreter<ScriptEntry> =
                ScriptInterpreter::new(&p).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} writes\n",
                si.get_duration(),
                si.get_num_writes()
            );

            Some(si)
        }
        None => {
            info!("No script provided, signals are only driven by the footswitch\n");
            None
        }
    };

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let bus = Arc::new(LocalSignalBus::new());
    let mut ds = DataStore::default();

    let (event_tx, event_rx) = channel();
    let mut motor_board = MotorBoard::new(SimMotorBoard::with_events(event_tx), event_rx, bus.clone());
    motor_board
        .init(calibs, &session)
        .wrap_err("Failed to initialise the motor board")?;
    info!("MotorBoard init complete, {} motors", motor_board.motors().len());

    let mut wrist_ctrl: WristCtrl<SimDxlBus> = WristCtrl::default();
    wrist_ctrl
        .init(wrist_params, &session)
        .wrap_err("Failed to initialise WristCtrl")?;

    if let Err(e) = wrist_ctrl.connect(SimDxlBus::new()) {
        warn!("Wrist connected with errors: {}", e);
    }
    info!("WristCtrl init complete");

    let wrist_signals = WristSignals::new(bus.as_ref());

    info!("Module initialisation complete\n");

    // ---- INITIALISE FOOTSWITCH ----

    let listener = match exec_params.footswitch {
        Some(ref p) if !opts.dry_run => start_footswitch(p),
        Some(_) => {
            info!("Dry run, footswitch not used");
            None
        }
        None => None,
    };

    // ---- INITIALISE ARCHIVES ----

    let mut archives = if exec_params.print_data {
        Some((
            Archiver::from_path(&session, "motor_telemetry.csv")
                .wrap_err("Failed to open the motor telemetry archive")?,
            Archiver::from_path(&session, "wrist_setpoints.csv")
                .wrap_err("Failed to open the wrist setpoint archive")?,
        ))
    } else {
        None
    };

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(CYCLE_FREQUENCY_HZ, session::get_elapsed_seconds());

        // ---- SIGNAL INPUT ----

        if let Some(ref mut si) = script {
            match si.get_pending() {
                PendingWrites::None => (),
                PendingWrites::Some(entries) => {
                    script::dispatch(entries, bus.as_ref(), &mut ds.motor_ctrl_input);
                }
                // Exit if end of script reached
                PendingWrites::EndOfScript => {
                    info!("End of signal script reached, stopping");
                    break;
                }
            }
        }

        if let (Some(l), Some(p)) = (&listener, &exec_params.footswitch) {
            publish_footswitch(&mut ds, l.states(), &p.bindings, bus.as_ref());
        }

        wrist_signals.collect(&mut ds.wrist_ctrl_input, wrist_ctrl.orientation());

        // ---- CONTROL ALGORITHM PROCESSING ----

        match motor_board.proc(&ds.motor_ctrl_input) {
            Ok((o, r)) => {
                ds.motor_ctrl_output = o;
                ds.motor_ctrl_status_rpt = r;
            }
            Err(e) => warn!("Error during MotorBoard processing: {}", e),
        }

        // Advance the simulated motors
        motor_board.link_mut().step(CYCLE_PERIOD_S);

        match wrist_ctrl.proc(&ds.wrist_ctrl_input) {
            Ok((o, r)) => {
                if r.wrap_suppressed {
                    debug!("Wrist setpoint 3 held at {:?}", o.setpoints);
                }
                wrist_signals.set_yaw_range(bus.as_ref(), o.yaw_min_deg, o.yaw_max_deg);
                ds.wrist_ctrl_output = Some(o);
                ds.wrist_ctrl_status_rpt = r;
            }
            // The error is already in the wrist's error text
            Err(e) => warn!("Error during WristCtrl processing: {}", e),
        }

        if let Some(dxl) = wrist_ctrl.bus_mut() {
            let writes = dxl.take_writes();
            if !writes.is_empty() {
                trace!("{} Dynamixel writes this cycle", writes.len());
            }
        }

        // ---- WRITE ARCHIVES ----

        if let Some((ref mut motor_arch, ref mut wrist_arch)) = archives {
            for rec in ds.motor_telemetry_records().iter() {
                if let Err(e) = motor_arch.serialise(rec) {
                    warn!("Could not archive motor telemetry: {}", e);
                }
            }

            if let Some(rec) = ds.wrist_setpoint_record() {
                if let Err(e) = wrist_arch.serialise(&rec) {
                    warn!("Could not archive wrist setpoints: {}", e);
                }
            }
        }

        // ---- TELEMETRY ----

        if ds.is_1_hz_cycle {
            match serde_json::to_string(&ds.motor_ctrl_status_rpt) {
                Ok(s) => debug!("MotorBoard status: {}", s),
                Err(e) => warn!("Could not serialise the MotorBoard status: {}", e),
            }

            if let Some(ref o) = ds.wrist_ctrl_output {
                match serde_json::to_string(o) {
                    Ok(s) => debug!("WristCtrl output: {}", s),
                    Err(e) => warn!("Could not serialise the WristCtrl output: {}", e),
                }
            }

            if !wrist_ctrl.error_text().is_empty() {
                info!("Wrist: {}", wrist_ctrl.error_text());
            }
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        ds.cycle_end();

        if let Some(limit) = opts.cycles {
            if ds.num_cycles >= limit {
                info!("Cycle limit of {} reached, stopping", limit);
                break;
            }
        }
    }

    // ---- SHUTDOWN ----

    if let Some(l) = listener {
        match l.stop() {
            Ok(fs) => info!("Footswitch on {} disconnected", fs.port_name()),
            Err(e) => warn!("{}", e),
        }
    }

    wrist_ctrl.disconnect();

    let calibs = motor_board.shutdown(&session);
    info!("Saved the calibration of {} motors", calibs.len());

    info!("End of execution");

    session.exit();

    Ok(())
}

/// Open the footswitch box and start listening to it.
///
/// The executable runs without a footswitch if none can be found.
fn start_footswitch(params: &FootswitchParams) -> Option<FootswitchListener<Box<dyn SerialPort>>> {
    let opened = match params.port {
        Some(ref port) => FootswitchBox::open(port, params.baud_rate).map_err(Report::from),
        None => find_footswitch(params.baud_rate),
    };

    let fs = match opened {
        Ok(fs) => fs,
        Err(e) => {
            warn!("No footswitch available: {}", e);
            return None;
        }
    };

    if fs.num_buttons() != params.bindings.len() {
        warn!(
            "Footswitch has {} buttons but {} are bound",
            fs.num_buttons(),
            params.bindings.len()
        );
    }

    match FootswitchListener::start(fs, Duration::from_millis(params.poll_period_ms)) {
        Ok(l) => Some(l),
        Err(e) => {
            warn!("Could not start the footswitch listener: {}", e);
            None
        }
    }
}

/// Use the first port a footswitch answers on.
fn find_footswitch(
    baud_rate: u32,
) -> Result<FootswitchBox<Box<dyn SerialPort>>, Report> {
    let found = footswitch::discover(baud_rate)?;

    for (port, num_buttons) in found.iter() {
        info!("Found footswitch on {} ({} buttons)", port, num_buttons);
    }

    match found.first() {
        Some((port, _)) => Ok(FootswitchBox::open(port, baud_rate)?),
        None => Err(eyre!("No serial port answered the footswitch handshake")),
    }
}

/// Publish any button which changed since the last cycle onto its bound signal.
fn publish_footswitch(
    ds: &mut DataStore,
    states: Option<Vec<bool>>,
    bindings: &[String],
    bus: &LocalSignalBus,
) {
    let states = match states {
        Some(s) => s,
        None => return,
    };

    for (i, (pressed, name)) in states.iter().zip(bindings.iter()).enumerate() {
        let changed = match ds.footswitch_states {
            Some(ref prev) => prev.get(i) != Some(pressed),
            None => true,
        };

        if changed && !bus.publish_named(name, if *pressed { 1.0 } else { 0.0 }) {
            warn!("Footswitch button {} is bound to unknown signal {}", i, name);
        }
    }

    ds.footswitch_states = Some(states);
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WristSignals {
    fn new(bus: &LocalSignalBus) -> Self {
        let sub = |name: &str| {
            let id = SignalId::new(name);
            let rx = bus.subscribe(&id);
            (id, rx)
        };

        let signals = Self {
            orientation: [sub("wrist.Roll"), sub("wrist.Pitch"), sub("wrist.Yaw")],
            torque: [
                sub("wrist.Torque1"),
                sub("wrist.Torque2"),
                sub("wrist.Torque3"),
            ],
        };

        for (id, _) in signals.torque.iter() {
            bus.set_range(id, 0.0, 1.0);
        }

        signals
    }

    /// Clamp yaw commands into the range the solver can reach.
    fn set_yaw_range(&self, bus: &LocalSignalBus, min_deg: f64, max_deg: f64) {
        if min_deg.is_finite() && max_deg.is_finite() {
            bus.set_range(&self.orientation[2].0, min_deg, max_deg);
        }
    }

    /// Move the newest value of every wrist signal into the wrist input.
    fn collect(&self, input: &mut wrist_ctrl::InputData, current: OrientationCmd) {
        let latest = |(id, rx): &(SignalId, Receiver<f64>)| {
            let v = rx.try_iter().last();
            if let Some(v) = v {
                trace!("{} -> {}", id, v);
            }
            v
        };

        let mut cmd = current;
        let mut any = false;

        for (i, signal) in self.orientation.iter().enumerate() {
            if let Some(v) = latest(signal) {
                any = true;
                match i {
                    0 => cmd.roll_deg = v,
                    1 => cmd.pitch_deg = v,
                    _ => cmd.yaw_deg = v,
                }
            }
        }

        if any {
            input.orientation = Some(cmd);
        }

        let axes = [WristAxis::Roll, WristAxis::Pitch, WristAxis::Yaw];
        for (signal, axis) in self.torque.iter().zip(axes.iter()) {
            if let Some(v) = latest(signal) {
                input.torque.push((*axis, v > 0.5));
            }
        }
    }
}
