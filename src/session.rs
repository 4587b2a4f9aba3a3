//! Everything a front end needs to run one machine, owned in one place and
//! passed around explicitly: the stepper, its event stream, the config and a
//! log of user-facing status messages.
use crate::config::Config;
use crate::error::Result;
use crate::inspect::Inspection;
use crate::stepper::{Event, Frame, Stepper};
use crate::VirtualMachine;
use slog::Logger;
use std::path::Path;
use std::sync::mpsc::Receiver;

pub struct Session {
    stepper: Stepper,
    events: Receiver<Event>,
    config: Config,
    messages: Vec<String>,
    tone: bool,
    // whether the current halt already made it into `messages`
    halt_reported: bool,
    logger: Logger,
}

impl Session {
    /// A stopped session holding the built-in boot program
    pub fn new(config: Config, logger: Option<Logger>) -> Self {
        let logger = crate::logger::or_discard(logger);
        let vm = seeded(VirtualMachine::boot(Some(logger.clone())), &config);
        let (stepper, events) = Stepper::new(vm, config.clone(), Some(logger.clone()));

        let mut session = Session {
            stepper,
            events,
            config,
            messages: Vec::new(),
            tone: false,
            halt_reported: false,
            logger,
        };
        session.message("CHIP-8 initialized");
        session
    }

    pub fn start(&mut self) {
        self.halt_reported = false;
        self.stepper.start();
        self.message("VM started.");
    }

    pub fn stop(&mut self) {
        self.stepper.stop();
        self.tone = false;
        self.message("VM stopped.");
    }

    /// Reset the machine to the state right after its program was loaded
    pub fn reset(&mut self) {
        self.stepper.reset();
        self.tone = false;
        self.halt_reported = false;
        self.message("Reset VM completed.");
    }

    /// Replace the running program with the contents of a file. On any error the
    /// current machine is left exactly as it was.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.message(format!("Loading ROM ... (PATH: {})", path.display()));

        let vm = VirtualMachine::with_program_file(
            path,
            self.config.base as usize,
            Some(self.logger.clone()),
        );
        self.install(vm)
    }

    /// Replace the running program with `program`
    pub fn load_program(&mut self, program: &[u8]) -> Result<()> {
        self.message(format!("Loading ROM ... ({} bytes)", program.len()));
        let vm = VirtualMachine::load(program, self.config.base as usize, Some(self.logger.clone()));
        self.install(vm)
    }

    fn install(&mut self, vm: Result<VirtualMachine>) -> Result<()> {
        match vm {
            Ok(vm) => {
                self.stepper.reload(seeded(vm, &self.config));
                self.tone = false;
                self.halt_reported = false;
                self.message("Loading ROM completed.");
                Ok(())
            }
            Err(e) => {
                self.message(format!("Loading ROM failed: {}", e));
                Err(e)
            }
        }
    }

    /// Drain pending events and return the newest frame, if any arrived.
    /// Tone changes and halts are folded into the session state and messages.
    pub fn poll(&mut self) -> Option<Frame> {
        let mut latest = None;
        let pending: Vec<Event> = self.events.try_iter().collect();
        for event in pending {
            match event {
                Event::Frame(frame) => {
                    self.tone = frame.sound_active;
                    latest = Some(frame);
                }
                Event::Tone(on) => self.tone = on,
                Event::Halted(reason) => self.report_halt(&reason),
            }
        }

        if !self.is_running() {
            // nothing plays while stopped, whatever the last event said
            self.tone = false;
            if !self.halt_reported {
                // the halt event may have been dropped on a full queue
                let fault = self
                    .stepper
                    .with_machine(|vm| vm.fault().map(str::to_owned));
                if let Some(reason) = fault {
                    self.report_halt(&reason);
                }
            }
        }
        latest
    }

    fn report_halt(&mut self, reason: &str) {
        self.tone = false;
        if !self.halt_reported {
            self.halt_reported = true;
            self.message(format!("VM halted: {}", reason));
        }
    }

    pub fn is_running(&self) -> bool {
        self.stepper.is_running()
    }

    /// Whether a tone should currently be playing, as of the last [`poll`](Self::poll)
    pub fn tone(&self) -> bool {
        self.tone
    }

    pub fn press_key(&self, code: u8) {
        self.stepper.press_key(code);
    }

    pub fn release_key(&self, code: u8) {
        self.stepper.release_key(code);
    }

    pub fn inspect(&self) -> Inspection {
        self.stepper.inspect()
    }

    pub fn stepper(&self) -> &Stepper {
        &self.stepper
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    fn message<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        info!(self.logger, "{}", message);
        self.messages.push(message);
    }
}

fn seeded(vm: VirtualMachine, config: &Config) -> VirtualMachine {
    match config.seed {
        Some(seed) => vm.with_seed(seed),
        None => vm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use std::thread;
    use std::time::Duration;

    fn fast() -> Config {
        Config {
            clock_hz: 2000,
            timer_hz: 200,
            seed: Some(1),
            ..Config::default()
        }
    }

    #[test]
    fn starts_stopped_with_boot_program() {
        let session = Session::new(fast(), None);
        assert!(!session.is_running());
        assert_eq!(session.inspect().program_counter, 0x200);
        assert_eq!(
            session.stepper().with_machine(|vm| vm.program().to_vec()),
            crate::rom::BOOT.to_vec()
        );
        assert_eq!(session.messages(), &["CHIP-8 initialized".to_string()]);
    }

    #[test]
    fn start_poll_stop() {
        let mut session = Session::new(fast(), None);
        session.start();

        let mut frame = None;
        for _ in 0..100 {
            if let Some(f) = session.poll() {
                if f.pixels.lit() > 0 {
                    frame = Some(f);
                    break;
                }
            }
            thread::sleep(Duration::from_millis(5));
        }
        session.stop();

        assert!(frame.is_some());
        assert!(!session.is_running());
        assert_eq!(
            &session.messages()[1..],
            &["VM started.".to_string(), "VM stopped.".to_string()]
        );
    }

    #[test]
    fn load_program_and_reset() {
        let mut session = Session::new(fast(), None);
        session.load_program(&[0x60, 0x2A, 0x12, 0x02]).unwrap();
        session
            .stepper()
            .with_machine(|vm| vm.execute())
            .unwrap();
        assert_eq!(session.inspect().registers[0], 0x2A);

        session.reset();
        assert_eq!(session.inspect().registers[0], 0);
        assert_eq!(session.inspect().program_counter, 0x200);
        assert!(session
            .messages()
            .iter()
            .any(|m| m == "Reset VM completed."));
    }

    #[test]
    fn failed_load_keeps_current_machine() {
        let mut session = Session::new(fast(), None);
        session.stepper().with_machine(|vm| vm.press_key(3));

        let too_big = vec![0u8; 0x1000];
        assert!(matches!(
            session.load_program(&too_big),
            Err(Error::ProgramTooLarge { .. })
        ));

        let missing = std::env::temp_dir().join("chip8vm-session-missing.ch8");
        let _ = fs::remove_file(&missing);
        assert!(matches!(session.load_file(&missing), Err(Error::Io(_))));

        // same machine, same state
        assert!(session.stepper().with_machine(|vm| vm.is_key_down(3)));
        assert_eq!(
            session.stepper().with_machine(|vm| vm.program().to_vec()),
            crate::rom::BOOT.to_vec()
        );
        assert!(session
            .messages()
            .last()
            .unwrap()
            .starts_with("Loading ROM failed"));
    }

    #[test]
    fn load_file() {
        let path = std::env::temp_dir().join("chip8vm-session-load.ch8");
        fs::write(&path, &[0x00, 0xE0, 0x12, 0x02]).unwrap();

        let mut session = Session::new(fast(), None);
        session.load_file(&path).unwrap();
        assert_eq!(
            session.stepper().with_machine(|vm| vm.program().to_vec()),
            vec![0x00, 0xE0, 0x12, 0x02]
        );
        assert_eq!(
            session.messages().last().map(String::as_str),
            Some("Loading ROM completed.")
        );
        let _ = fs::remove_file(&path);
    }

    fn wait_for<F: FnMut(&mut Session) -> bool>(session: &mut Session, mut done: F) -> bool {
        for _ in 0..200 {
            if done(session) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn reset_and_stop_silence_tone() {
        let mut session = Session::new(fast(), None);
        // LD V1, 0xFF; LD ST, V1; JP 0x204
        session.load_program(&[0x61, 0xFF, 0xF1, 0x18, 0x12, 0x04]).unwrap();
        session.start();
        assert!(wait_for(&mut session, |s| {
            s.poll();
            s.tone()
        }));

        session.reset();
        assert!(!session.tone());

        assert!(wait_for(&mut session, |s| {
            s.poll();
            s.tone()
        }));
        session.stop();
        assert!(!session.tone());
        session.poll();
        assert!(!session.tone());
    }

    #[test]
    fn lagging_consumer_still_hears_tone_end() {
        let config = Config {
            frame_queue: 1,
            ..fast()
        };
        let mut session = Session::new(config, None);
        // LD V1, 2; LD ST, V1; JP 0x204
        session.load_program(&[0x61, 0x02, 0xF1, 0x18, 0x12, 0x04]).unwrap();
        session.start();

        // don't poll until the sound timer has long run out
        assert!(wait_for(&mut session, |s| s.inspect().sound_timer == 0));
        thread::sleep(Duration::from_millis(20));

        assert!(wait_for(&mut session, |s| {
            s.poll();
            !s.tone()
        }));
        assert!(session.is_running());
        session.stop();
    }

    #[test]
    fn halt_is_reported_when_its_event_is_dropped() {
        let config = Config {
            frame_queue: 1,
            ..fast()
        };
        let mut session = Session::new(config, None);
        // the first frame's tone event fills the queue, then V0 counts to
        // 0x40 and RET underflows
        #[rustfmt::skip]
        let program = [
            0x61, 0x05, // LD V1, 5
            0xF1, 0x18, // LD ST, V1
            0x70, 0x01, // ADD V0, 1
            0x30, 0x40, // SE V0, 0x40
            0x12, 0x04, // JP 0x204
            0x00, 0xEE, // RET
        ];
        session.load_program(&program).unwrap();
        session.start();

        assert!(wait_for(&mut session, |s| !s.is_running()));
        session.poll();
        session.poll();

        let halts: Vec<&String> = session
            .messages()
            .iter()
            .filter(|m| m.starts_with("VM halted: stack underflow"))
            .collect();
        assert_eq!(halts.len(), 1);
        assert!(!session.tone());
    }

    #[test]
    fn halt_shows_up_in_messages() {
        let mut session = Session::new(fast(), None);
        session.load_program(&[0x00, 0xEE]).unwrap();
        session.start();

        for _ in 0..100 {
            session.poll();
            if !session.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        session.poll();

        assert!(session
            .messages()
            .iter()
            .any(|m| m.starts_with("VM halted: stack underflow")));
    }
}
