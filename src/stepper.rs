//! Drives a machine in real time on its own thread.
//!
//! The machine sits behind one `Mutex`. The stepper thread takes it once per
//! frame, runs that frame's worth of instructions, ticks the timers and copies
//! the framebuffer out before letting go, so anything else holding the lock
//! (key events, inspectors) only ever sees the machine between frames.
//! Finished frames go out over a bounded channel and are dropped, not queued,
//! when the consumer falls behind.
use crate::config::{Config, Pacer};
use crate::graphics::Framebuffer;
use crate::inspect::Inspection;
use crate::VirtualMachine;
use slog::Logger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type SharedMachine = Arc<Mutex<VirtualMachine>>;

/// A consistent picture of the display at the end of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub pixels: Framebuffer,
    pub sound_active: bool,
    pub cycles: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Frame(Frame),
    /// whether the sound timer is running. Sent on every change, and once at
    /// the start of each run.
    Tone(bool),
    /// emulation stopped on a fatal error
    Halted(String),
}

/// What a single call to [`run_frame`] did
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameOutcome {
    pub executed: u32,
    /// a clear or draw ran during the frame
    pub drew: bool,
    pub sound_active: bool,
    pub halted: Option<String>,
}

/// Run up to `cycles` instructions, then tick the timers once. Stops early when
/// the machine parks on a key wait or halts.
pub fn run_frame(vm: &mut VirtualMachine, cycles: u32) -> FrameOutcome {
    let mut outcome = FrameOutcome::default();

    for _ in 0..cycles {
        match vm.execute() {
            Ok(Some(op)) => {
                outcome.executed += 1;
                outcome.drew |= op.is_display_op();
            }
            Ok(None) => break,
            Err(e) => {
                outcome.halted = Some(e.to_string());
                break;
            }
        }
    }

    vm.tick_timers();
    outcome.sound_active = vm.sound_active();
    outcome
}

fn lock(machine: &Mutex<VirtualMachine>) -> MutexGuard<'_, VirtualMachine> {
    // a panic mid-frame leaves the machine in some valid state, so keep going
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Stepper {
    machine: SharedMachine,
    config: Config,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    events: SyncSender<Event>,
    logger: Logger,
}

impl Stepper {
    /// Wrap `vm` in a stepper. Nothing runs until [`start`](Self::start). The
    /// receiver gets every published [`Event`].
    pub fn new(
        vm: VirtualMachine,
        config: Config,
        logger: Option<Logger>,
    ) -> (Self, Receiver<Event>) {
        let (events, rx) = sync_channel(config.frame_queue.max(1));
        let stepper = Stepper {
            machine: Arc::new(Mutex::new(vm)),
            config,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            events,
            logger: crate::logger::or_discard(logger),
        };
        (stepper, rx)
    }

    pub fn machine(&self) -> SharedMachine {
        Arc::clone(&self.machine)
    }

    /// Run `f` with exclusive access to the machine
    pub fn with_machine<R, F: FnOnce(&mut VirtualMachine) -> R>(&self, f: F) -> R {
        f(&mut lock(&self.machine))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        // reap a thread that exited on its own after a halt
        self.stop();

        self.running.store(true, Ordering::SeqCst);
        let machine = Arc::clone(&self.machine);
        let running = Arc::clone(&self.running);
        let events = self.events.clone();
        let pacer = self.config.pacer();
        let frame = Duration::from_secs(1) / self.config.timer_hz.max(1);
        let logger = self.logger.new(o!("thread" => "stepper"));

        info!(self.logger, "starting"; "clock_hz" => self.config.clock_hz, "frame_us" => frame.as_micros() as u64);
        self.handle = Some(thread::spawn(move || {
            drive(&machine, &running, &events, pacer, frame, &logger)
        }));
    }

    /// Stop emulation and wait for the stepper thread to finish. Once this
    /// returns no instruction is in flight.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(self.logger, "stepper thread panicked");
            }
            info!(self.logger, "stopped");
        }
    }

    /// Swap in a whole new machine. Emulation is stopped across the swap and
    /// resumed afterwards if it was running.
    pub fn reload(&mut self, vm: VirtualMachine) {
        let was_running = self.is_running();
        self.stop();
        *lock(&self.machine) = vm;
        if was_running {
            self.start();
        }
    }

    /// Reset the current machine, keeping its program
    pub fn reset(&mut self) {
        let was_running = self.is_running();
        self.stop();
        lock(&self.machine).reset();
        if was_running {
            self.start();
        }
    }

    pub fn press_key(&self, code: u8) {
        lock(&self.machine).press_key(code);
    }

    pub fn release_key(&self, code: u8) {
        lock(&self.machine).release_key(code);
    }

    pub fn inspect(&self) -> Inspection {
        lock(&self.machine).inspect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Stepper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the stepper thread
fn drive(
    machine: &Mutex<VirtualMachine>,
    running: &AtomicBool,
    events: &SyncSender<Event>,
    mut pacer: Pacer,
    frame: Duration,
    logger: &Logger,
) {
    // last tone state the consumer was actually sent. None until the first
    // frame, so every run starts by announcing the current state.
    let mut tone: Option<bool> = None;
    let mut next = Instant::now();

    while running.load(Ordering::SeqCst) {
        let (outcome, pixels, total) = {
            let mut vm = lock(machine);
            let outcome = run_frame(&mut vm, pacer.next_frame());
            (outcome, vm.framebuffer().clone(), vm.cycles())
        };

        if let Some(reason) = outcome.halted {
            error!(logger, "emulation halted"; "reason" => &reason);
            // if this is dropped the reason is still on the machine
            publish(events, Event::Halted(reason), logger);
            break;
        }

        // a tone change only counts once it is delivered; dropped ones are
        // retried next frame
        if tone != Some(outcome.sound_active) {
            match publish(events, Event::Tone(outcome.sound_active), logger) {
                Publish::Sent => tone = Some(outcome.sound_active),
                Publish::Dropped => {}
                Publish::Closed => break,
            }
        }

        let snapshot = Frame {
            pixels,
            sound_active: outcome.sound_active,
            cycles: total,
        };
        if publish(events, Event::Frame(snapshot), logger) == Publish::Closed {
            break;
        }

        next += frame;
        let now = Instant::now();
        if next > now {
            spin_sleep::sleep(next - now);
        } else {
            // fell behind, don't try to catch up with a burst
            next = now;
        }
    }

    running.store(false, Ordering::SeqCst);
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum Publish {
    Sent,
    /// the consumer is behind and the queue is full
    Dropped,
    /// nobody is listening any more
    Closed,
}

fn publish(events: &SyncSender<Event>, event: Event, logger: &Logger) -> Publish {
    match events.try_send(event) {
        Ok(()) => Publish::Sent,
        Err(TrySendError::Full(_)) => {
            debug!(logger, "consumer behind, dropped event");
            Publish::Dropped
        }
        Err(TrySendError::Disconnected(_)) => {
            info!(logger, "event receiver gone, stopping");
            Publish::Closed
        }
    }
}
