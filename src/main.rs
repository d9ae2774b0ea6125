use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, LevelFilter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use fireflysync::clock::HostClock;
use fireflysync::config::{JsonConfigStore, SystemConfig};
use fireflysync::node::{Node, Operator};
use fireflysync::pattern::PatternId;
use fireflysync::radio::{UdpRadio, DEFAULT_PORT_BASE};
use fireflysync::sim::Swarm;
use fireflysync::traits::{Console, Led, Rgb};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run one lantern node on the local network
    Run {
        #[arg(short, long, default_value = "fireflysync.json")]
        config: PathBuf,

        /// Pattern to start with (numeric id)
        #[arg(short, long, default_value_t = 10)]
        pattern: u8,

        #[arg(long, default_value_t = DEFAULT_PORT_BASE)]
        port_base: u16,

        #[arg(long, default_value = "255.255.255.255")]
        broadcast: Ipv4Addr,

        /// Fixed RNG seed for reproducible jitter
        #[arg(long)]
        seed: Option<u64>,

        /// Print every received packet on the console
        #[arg(long, default_value_t = false)]
        monitor: bool,
    },
    /// Simulate a swarm of sync engines and report convergence
    Simulate {
        #[arg(short, long, default_value_t = 4)]
        nodes: usize,

        #[arg(short, long, default_value_t = 30)]
        cycles: u32,

        /// Probability of losing each delivered ping
        #[arg(long, default_value_t = 0.0)]
        loss: f64,

        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Start offsets in ms, comma separated; random when omitted
        #[arg(long, value_delimiter = ',')]
        offsets: Option<Vec<u32>>,
    },
}

/// The host has no RGB LED; color changes go to the log.
#[derive(Default)]
struct LogLed {
    last: Option<Rgb>,
}

impl Led for LogLed {
    fn set_color(&mut self, r: u8, g: u8, b: u8) {
        if self.last != Some((r, g, b)) {
            debug!("[LED] {:3} {:3} {:3}", r, g, b);
            self.last = Some((r, g, b));
        }
    }
}

/// Console on stdin/stdout. A reader thread keeps `read_byte` non-blocking.
struct StdioConsole {
    input: Receiver<u8>,
}

impl StdioConsole {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for byte in std::io::stdin().lock().bytes() {
                match byte {
                    Ok(b) if tx.send(b).is_ok() => {}
                    _ => break,
                }
            }
        });
        StdioConsole { input: rx }
    }
}

impl Console for StdioConsole {
    fn read_byte(&mut self) -> Option<u8> {
        match self.input.try_recv() {
            Ok(b) => Some(b),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn write_str(&mut self, s: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(s.as_bytes());
        let _ = out.flush();
    }
}

fn run_node(config_path: PathBuf, pattern: u8, port_base: u16, broadcast: Ipv4Addr, seed: Option<u64>, monitor: bool) -> Result<()> {
    let initial = PatternId::from_byte(pattern).ok_or_else(|| anyhow!("unknown pattern id {}", pattern))?;

    let store = JsonConfigStore::new(config_path);
    let config = store.load_or_default();
    info!("Config: {}", store.path().display());

    let radio = UdpRadio::open(&config.node, port_base, broadcast)?;
    let rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };

    let operator = Operator::new(Box::new(StdioConsole::spawn()), Box::new(store)).with_monitor(monitor);
    let mut node = Node::new(radio, HostClock::new(), LogLed::default(), config, rng).with_operator(operator);

    let stop = node.stop_handle();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        stop.store(true, Ordering::SeqCst);
    })?;

    node.request_pattern(initial);
    node.run();

    info!("Exiting.");
    Ok(())
}

fn simulate(nodes: usize, cycles: u32, loss: f64, seed: u64, offsets: Option<Vec<u32>>) -> Result<()> {
    if !(0.0..1.0).contains(&loss) {
        return Err(anyhow!("loss must be in [0, 1), got {}", loss));
    }

    let sync = SystemConfig::default().sync;
    let offsets = match offsets {
        Some(list) if !list.is_empty() => list,
        Some(_) => return Err(anyhow!("--offsets needs at least one value")),
        None => {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..nodes).map(|_| rng.random_range(0..=sync.startup_jitter_ms)).collect()
        }
    };

    info!("[SIM] {} nodes, offsets {:?} ms, loss {}, cycle_base {}ms", offsets.len(), offsets, loss, sync.cycle_base_ms);
    let mut swarm = Swarm::new(sync.cycle_base_ms, &offsets, loss, seed);

    for cycle in 1..=cycles {
        swarm.run_until_cycles(cycle);
        let extras: Vec<(u32, u32)> = swarm.adjustments().iter().map(|a| (a.on_extra, a.off_extra)).collect();
        info!("[SIM] cycle {:3} t={:6}ms spread {:4}ms extras {:?}", cycle, swarm.now(), swarm.phase_spread(), extras);
    }

    let (sent, lost) = swarm.pings();
    info!("[SIM] done: spread {}ms, {} pings sent, {} deliveries lost", swarm.phase_spread(), sent, lost);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(None)
        .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .parse_default_env()
        .init();

    match args.mode {
        Mode::Run { config, pattern, port_base, broadcast, seed, monitor } => {
            run_node(config, pattern, port_base, broadcast, seed, monitor)
        }
        Mode::Simulate { nodes, cycles, loss, seed, offsets } => simulate(nodes, cycles, loss, seed, offsets),
    }
}
