use clap::Parser;
use tracing::warn;

use std::env;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use ringq::cleanup;
use ringq::console::{self, Command};
use ringq::{
    Admission, PopOutcome, ProcessLauncher, QueueError, Receiver, ReceiverConfig,
};

#[derive(Parser)]
#[clap(about = "Creates a shared-memory queue, launches its senders and reads from it")]
struct Opts {
    #[clap(short = 'c', long = "config")]
    config: Option<String>,
    /// Logical queue name every other resource name is derived from
    #[clap(short = 'n', long = "name")]
    name: Option<String>,
    #[clap(long = "capacity")]
    capacity: Option<u32>,
    #[clap(long = "slot-size")]
    slot_size: Option<u32>,
    /// permits or space_signal
    #[clap(long = "admission")]
    admission: Option<Admission>,
    #[clap(short = 's', long = "senders")]
    senders: Option<u32>,
    /// Sender executable; defaults to `sender` next to this one
    #[clap(long = "sender")]
    sender_program: Option<String>,
    /// Wait for senders started by hand instead of launching them
    #[clap(long = "no-launch")]
    no_launch: bool,
    /// Keep going when some senders never signal readiness
    #[clap(long = "proceed-on-partial")]
    proceed_on_partial: bool,
    /// Remove objects left behind by a crashed receiver, then exit
    #[clap(long = "clean")]
    clean: bool,
}

impl Opts {
    fn apply(&self, cfg: &mut ReceiverConfig) {
        if let Some(name) = &self.name {
            cfg.queue.name = name.clone();
        }
        if let Some(capacity) = self.capacity {
            cfg.queue.capacity = capacity;
        }
        if let Some(slot_size) = self.slot_size {
            cfg.queue.slot_size = slot_size;
        }
        if let Some(admission) = self.admission {
            cfg.queue.admission = admission;
        }
        if let Some(senders) = self.senders {
            cfg.senders = senders;
        }
        if let Some(program) = &self.sender_program {
            cfg.sender_program = program.clone();
        }
        if self.proceed_on_partial {
            cfg.proceed_on_partial_readiness = true;
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts: Opts = Opts::parse();
    let mut cfg = match &opts.config {
        Some(path) => ReceiverConfig::load(path)?,
        None => ReceiverConfig::default(),
    };
    opts.apply(&mut cfg);
    ringq::init_tracing(&cfg.log_level);
    cfg.validate()?;

    let names = cfg.queue.names()?;
    if opts.clean {
        let removed = cleanup::remove_stale(&names, cfg.senders);
        println!("Removed {} stale objects of queue {}.", removed, names.queue());
        return Ok(());
    }

    let mut launcher = ProcessLauncher::new(sender_program(&cfg)?)
        .with_prefix(cfg.launch_prefix.clone())
        .with_args(cfg.sender_args.clone());
    let mut receiver = Receiver::create(&cfg.queue)?;
    let children = launcher.children();
    cleanup::unlink_on_termination(names.clone(), cfg.senders, move || {
        children.terminate_all();
    })?;
    println!(
        "Queue {} created: {} slots of {} bytes, {:?} admission.",
        names.queue(),
        cfg.queue.capacity,
        cfg.queue.slot_size,
        cfg.queue.admission
    );

    if opts.no_launch {
        receiver.expect_senders(cfg.senders)?;
        println!("Waiting for {} senders on queue {}.", cfg.senders, names.queue());
    } else {
        receiver.launch_senders(cfg.senders, &mut launcher)?;
    }

    match receiver.await_senders(cfg.ready_timeout()) {
        Ok(()) => println!("All {} senders are ready.", cfg.senders),
        Err(QueueError::PartialReadiness { missing }) if cfg.proceed_on_partial_readiness => {
            warn!(?missing, "continuing without every sender");
            println!("Senders {:?} are not ready; continuing without them.", missing);
        }
        Err(e) => return Err(e.into()),
    }

    run(&mut receiver, cfg.message_timeout())?;
    // children first, then the named objects
    drop(launcher);
    drop(receiver);
    Ok(())
}

fn sender_program(cfg: &ReceiverConfig) -> io::Result<PathBuf> {
    if !cfg.sender_program.is_empty() {
        return Ok(PathBuf::from(&cfg.sender_program));
    }
    let file_name = format!("sender{}", env::consts::EXE_SUFFIX);
    Ok(env::current_exe()?.with_file_name(file_name))
}

fn run(receiver: &mut Receiver, timeout: Duration) -> Result<(), QueueError> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    println!("Commands: read, status, exit");
    while let Some(line) = console::prompt(&mut input, &mut output, "> ")? {
        match console::parse(&line) {
            Command::Read => match receiver.reader().pop(timeout)? {
                PopOutcome::Received(message) => {
                    println!("Received: {}", String::from_utf8_lossy(&message))
                }
                PopOutcome::NoMessageTimeout => {
                    println!("No message within {} ms.", timeout.as_millis())
                }
            },
            Command::Status => {
                let status = receiver.reader().status()?;
                println!(
                    "Messages in queue: {}/{} ({} free)",
                    status.occupancy,
                    status.capacity,
                    status.free()
                );
            }
            Command::Exit => break,
            Command::Empty => {}
            Command::Send(_) | Command::Unknown(_) => {
                println!("Unknown command: {}. Use read, status or exit.", line.trim())
            }
        }
    }
    Ok(())
}
