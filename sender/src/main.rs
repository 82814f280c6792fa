use clap::Parser;
use tracing::warn;

use std::error::Error;
use std::io;
use std::thread;
use std::time::Duration;

use ringq::console::{self, Command};
use ringq::{MessageWriter, PushOutcome, QueueError, SenderConfig};

#[derive(Parser)]
#[clap(about = "Attaches to a shared-memory queue and pushes messages into it")]
struct Opts {
    #[clap(short = 'c', long = "config")]
    config: Option<String>,
    #[clap(short = 'n', long = "name", default_value = "ringq")]
    name: String,
    /// Which ready signal to set; assigned by the receiver
    #[clap(short = 'i', long = "index")]
    index: u32,
    /// Push this text `count` times and exit instead of reading commands
    #[clap(short = 'm', long = "message")]
    message: Option<String>,
    #[clap(long = "count", default_value = "1")]
    count: u32,
    #[clap(long = "interval-ms", default_value = "0")]
    interval_ms: u64,
    #[clap(long = "space-timeout-ms")]
    space_timeout_ms: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts: Opts = Opts::parse();
    let mut cfg = match &opts.config {
        Some(path) => SenderConfig::load(path)?,
        None => SenderConfig::default(),
    };
    if let Some(ms) = opts.space_timeout_ms {
        cfg.space_timeout_ms = ms;
    }
    ringq::init_tracing(&cfg.log_level);

    let mut writer = ringq::join(&opts.name, opts.index, cfg.attach_timeout())?;
    println!("Sender {} attached to queue {}.", opts.index, opts.name);

    let sender = Sender {
        index: opts.index,
        timeout: cfg.space_timeout(),
    };
    match &opts.message {
        Some(text) => {
            let interval = Duration::from_millis(opts.interval_ms);
            for n in 0..opts.count {
                if n > 0 && !interval.is_zero() {
                    thread::sleep(interval);
                }
                sender.send(&mut writer, text)?;
            }
        }
        None => sender.run(&mut writer)?,
    }
    Ok(())
}

struct Sender {
    index: u32,
    timeout: Duration,
}

impl Sender {
    fn send(&self, writer: &mut MessageWriter, text: &str) -> Result<(), QueueError> {
        let message = console::tag(self.index, text);
        match writer.push(message.as_bytes(), self.timeout)? {
            PushOutcome::Sent {
                occupancy,
                truncated,
            } => {
                if truncated {
                    println!("Message truncated to {} bytes.", writer.max_message_len());
                }
                println!("Sent. Messages in queue: {}", occupancy);
            }
            PushOutcome::BackpressureTimeout => {
                warn!(index = self.index, "queue full, message dropped");
                println!(
                    "Queue stayed full for {} ms; message not sent.",
                    self.timeout.as_millis()
                );
            }
        }
        Ok(())
    }

    fn run(&self, writer: &mut MessageWriter) -> Result<(), QueueError> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        println!("Commands: send [text], status, exit");
        while let Some(line) = console::prompt(&mut input, &mut output, "> ")? {
            match console::parse(&line) {
                Command::Send(Some(text)) => self.send(writer, &text)?,
                Command::Send(None) => {
                    match console::prompt(&mut input, &mut output, "Message: ")? {
                        Some(text) => self.send(writer, &text)?,
                        None => break,
                    }
                }
                Command::Status => {
                    let status = writer.status()?;
                    println!("Messages in queue: {}/{}", status.occupancy, status.capacity);
                }
                Command::Exit => break,
                Command::Empty => {}
                Command::Read | Command::Unknown(_) => {
                    println!("Unknown command: {}. Use send, status or exit.", line.trim())
                }
            }
        }
        Ok(())
    }
}
