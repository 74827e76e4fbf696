//! A network of machines exchanging packets.
//!
//! Every machine runs the same program. On its first read a machine receives
//! its own address; after that it reads packets as `x, y` pairs, or `-1` when
//! its queue is empty. It sends a packet by writing `destination, x, y`.
//!
//! Packets addressed to the NAT (address 255 by default) are kept by the
//! monitor. With [`NatPolicy::WakeOnIdle`] the monitor re-sends the last NAT
//! packet to address 0 whenever the network is quiescent, and stops once it
//! would deliver the same `y` twice in a row.
//!
//! # Quiescence
//!
//! A shared epoch counter increments on every packet enqueue or dequeue and
//! every value sent. A machine is idle once its last reads in a row returned
//! no data and it holds no half-written packet. The monitor declares the
//! network quiescent only if, between two reads of the epoch that agree, no
//! packet was in flight and every machine was idle.

use crate::orchestration::errors::OrchestrationError;
use crate::orchestration::machine_thread::{MachineThread, spawn};
use crate::virtual_machine::port::{Input, Output, PortError, Receive};
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::{Exit, Machine, MachineConfig};
use crate::{debug, info, warn};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Address of the NAT unless configured otherwise.
pub const NAT_ADDRESS: i64 = 255;

/// Settings for a network run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Pause after a read finds an empty queue, to keep polling machines
    /// from spinning.
    pub poll_backoff: Duration,
    /// How often the monitor checks for NAT packets and quiescence.
    pub monitor_interval: Duration,
    pub nat_address: i64,
    /// Empty reads in a row before a machine counts as idle.
    pub idle_threshold: u32,
    /// Give up if no result arrives in time.
    pub timeout: Option<Duration>,
    /// Settings for every machine. Names get the machine's address appended.
    pub machine: MachineConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            poll_backoff: Duration::from_micros(200),
            monitor_interval: Duration::from_millis(2),
            nat_address: NAT_ADDRESS,
            idle_threshold: 2,
            timeout: Some(Duration::from_secs(30)),
            machine: MachineConfig::named("nic"),
        }
    }
}

/// When the monitor stops the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatPolicy {
    /// Stop at the first packet sent to the NAT.
    FirstPacket,
    /// Wake address 0 with the last NAT packet whenever the network goes
    /// quiet; stop when the same `y` would be sent twice in a row.
    WakeOnIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packet {
    pub source: i64,
    pub destination: i64,
    pub x: i64,
    pub y: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkOutcome {
    /// First packet that reached the NAT.
    NatPacket(Packet),
    /// The `y` the NAT was about to deliver to address 0 a second time in a row.
    RepeatedWake { y: i64, wakeups: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkReport {
    pub outcome: NetworkOutcome,
    /// Packets delivered to a queue, NAT wakeups included.
    pub packets_routed: u64,
}

/// Idle tracking for one machine, written by its ports and read by the monitor.
#[derive(Debug, Default)]
struct NicStatus {
    idle: AtomicBool,
    empty_polls: AtomicU32,
    partial: AtomicBool,
}

impl NicStatus {
    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst) && !self.partial.load(Ordering::SeqCst)
    }

    fn wake(&self) {
        self.idle.store(false, Ordering::SeqCst);
        self.empty_polls.store(0, Ordering::SeqCst);
    }

    /// A stopped machine reads nothing and sends nothing more.
    fn settle(&self) {
        self.partial.store(false, Ordering::SeqCst);
        self.idle.store(true, Ordering::SeqCst);
    }
}

/// Routing table shared by every machine and the monitor.
struct Switch {
    routes: DashMap<i64, UnboundedSender<Packet>>,
    in_flight: AtomicUsize,
    epoch: AtomicU64,
    routed: AtomicU64,
    shutdown: AtomicBool,
}

impl Switch {
    fn new() -> Self {
        Self {
            routes: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            routed: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Queues `packet` at its destination.
    fn route(&self, packet: Packet) -> Result<(), PortError> {
        let Some(route) = self.routes.get(&packet.destination) else {
            return Err(PortError::Rejected(format!(
                "no machine at address {}",
                packet.destination
            )));
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        if route.send(packet).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(PortError::Closed);
        }
        self.routed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Records that a queued packet was taken off a queue.
    fn delivered(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.touch();
    }

    fn is_quiescent(&self, statuses: &[Arc<NicStatus>]) -> bool {
        let before = self.epoch.load(Ordering::SeqCst);
        if self.in_flight.load(Ordering::SeqCst) != 0 {
            return false;
        }
        if !statuses.iter().all(|status| status.is_idle()) {
            return false;
        }
        self.in_flight.load(Ordering::SeqCst) == 0 && self.epoch.load(Ordering::SeqCst) == before
    }
}

/// Input side of a network interface.
struct NicInput {
    address: i64,
    booted: bool,
    rx: UnboundedReceiver<Packet>,
    pending_y: Option<i64>,
    status: Arc<NicStatus>,
    switch: Arc<Switch>,
    backoff: Duration,
    idle_threshold: u32,
}

impl Input for NicInput {
    fn receive(&mut self) -> Receive {
        if !self.booted {
            self.booted = true;
            return Receive::Value(self.address);
        }
        if let Some(y) = self.pending_y.take() {
            self.switch.touch();
            return Receive::Value(y);
        }
        if self.switch.shutdown.load(Ordering::SeqCst) {
            return Receive::Closed;
        }

        match self.rx.try_recv() {
            Ok(packet) => {
                // Leave idle before the packet stops counting as in flight.
                self.status.wake();
                self.switch.delivered();
                self.pending_y = Some(packet.y);
                Receive::Value(packet.x)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                let polls = self.status.empty_polls.fetch_add(1, Ordering::SeqCst) + 1;
                if polls >= self.idle_threshold {
                    self.status.idle.store(true, Ordering::SeqCst);
                }
                if !self.backoff.is_zero() {
                    std::thread::sleep(self.backoff);
                }
                Receive::NoData
            }
        }
    }
}

/// Output side of a network interface. Assembles `destination, x, y` triples.
struct NicOutput {
    address: i64,
    buffer: Vec<i64>,
    status: Arc<NicStatus>,
    switch: Arc<Switch>,
}

impl Output for NicOutput {
    fn send(&mut self, value: i64) -> Result<(), PortError> {
        self.status.wake();
        self.status.partial.store(true, Ordering::SeqCst);
        self.switch.touch();

        self.buffer.push(value);
        if self.buffer.len() < 3 {
            return Ok(());
        }

        let packet = Packet {
            source: self.address,
            destination: self.buffer[0],
            x: self.buffer[1],
            y: self.buffer[2],
        };
        self.buffer.clear();
        let routed = self.switch.route(packet);
        self.status.partial.store(false, Ordering::SeqCst);
        routed
    }
}

type NicThread = MachineThread<NicInput, NicOutput>;

/// A network of machines running one program.
#[derive(Clone, Debug)]
pub struct Network {
    program: Program,
    size: usize,
    config: NetworkConfig,
}

impl Network {
    /// A network of `size` machines at addresses `0..size`.
    pub fn new(program: &Program, size: usize) -> Self {
        Self {
            program: program.clone(),
            size,
            config: NetworkConfig::default(),
        }
    }

    pub fn config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Boots every machine and runs until `policy` produces a result.
    ///
    /// All machines are stopped before this returns. A fault in any machine
    /// ends the run with [`OrchestrationError::MachineFault`].
    pub async fn run(self, policy: NatPolicy) -> Result<NetworkReport, OrchestrationError> {
        if self.size == 0 {
            return Err(OrchestrationError::EmptyNetwork);
        }

        let switch = Arc::new(Switch::new());
        let (nat_tx, mut nat_rx) = unbounded_channel();
        switch.routes.insert(self.config.nat_address, nat_tx);

        let mut statuses = Vec::with_capacity(self.size);
        let mut threads: Vec<Option<NicThread>> = Vec::with_capacity(self.size);
        for address in 0..self.size as i64 {
            let (tx, rx) = unbounded_channel();
            switch.routes.insert(address, tx);

            let status = Arc::new(NicStatus::default());
            statuses.push(status.clone());

            let input = NicInput {
                address,
                booted: false,
                rx,
                pending_y: None,
                status: status.clone(),
                switch: switch.clone(),
                backoff: self.config.poll_backoff,
                idle_threshold: self.config.idle_threshold,
            };
            let output = NicOutput {
                address,
                buffer: Vec::with_capacity(3),
                status,
                switch: switch.clone(),
            };

            let mut config = self.config.machine.clone();
            config.name = format!("{}-{}", config.name, address);
            threads.push(Some(spawn(Machine::with_config(
                &self.program,
                input,
                output,
                config,
            ))));
        }
        info!("booted {} machines", self.size);

        let outcome = Self::monitor(
            &switch,
            &mut nat_rx,
            &statuses,
            &mut threads,
            policy,
            &self.config,
        )
        .await;

        switch.shutdown.store(true, Ordering::SeqCst);
        let mut first_fault = None;
        for thread in threads.into_iter().flatten() {
            let name = thread.name().to_string();
            let (_, result) = thread.join().await?;
            if let Err(fault) = result {
                first_fault.get_or_insert(OrchestrationError::MachineFault {
                    machine: name,
                    fault,
                });
            }
        }

        let outcome = match (outcome, first_fault) {
            (Err(err), _) => return Err(err),
            (Ok(_), Some(err)) => return Err(err),
            (Ok(outcome), None) => outcome,
        };

        Ok(NetworkReport {
            outcome,
            packets_routed: switch.routed.load(Ordering::SeqCst),
        })
    }

    async fn monitor(
        switch: &Switch,
        nat_rx: &mut UnboundedReceiver<Packet>,
        statuses: &[Arc<NicStatus>],
        threads: &mut [Option<NicThread>],
        policy: NatPolicy,
        config: &NetworkConfig,
    ) -> Result<NetworkOutcome, OrchestrationError> {
        let started = Instant::now();
        let mut last_nat: Option<Packet> = None;
        let mut last_wake_y: Option<i64> = None;
        let mut wakeups = 0;

        loop {
            while let Ok(packet) = nat_rx.try_recv() {
                switch.delivered();
                debug!(
                    "NAT received x={} y={} from {}",
                    packet.x, packet.y, packet.source
                );
                if policy == NatPolicy::FirstPacket {
                    return Ok(NetworkOutcome::NatPacket(packet));
                }
                last_nat = Some(packet);
            }

            Self::reap(threads, statuses).await?;

            if switch.is_quiescent(statuses) {
                let Some(packet) = last_nat else {
                    return Err(OrchestrationError::Stalled {
                        machine: "network".to_string(),
                    });
                };
                if last_wake_y == Some(packet.y) {
                    info!("NAT would repeat y={} after {} wakeups", packet.y, wakeups);
                    return Ok(NetworkOutcome::RepeatedWake {
                        y: packet.y,
                        wakeups,
                    });
                }

                switch
                    .route(Packet {
                        source: config.nat_address,
                        destination: 0,
                        x: packet.x,
                        y: packet.y,
                    })
                    .map_err(OrchestrationError::Port)?;
                wakeups += 1;
                last_wake_y = Some(packet.y);
                debug!("network idle, NAT woke address 0 with y={}", packet.y);
            }

            if let Some(timeout) = config.timeout
                && started.elapsed() >= timeout
            {
                warn!("network produced no result within {:?}", timeout);
                return Err(OrchestrationError::Timeout(timeout));
            }

            tokio::time::sleep(config.monitor_interval).await;
        }
    }

    /// Collects machines that stopped on their own and counts them as idle
    /// from then on. A fault ends the run; a network where every machine
    /// halted can make no further progress.
    async fn reap(
        threads: &mut [Option<NicThread>],
        statuses: &[Arc<NicStatus>],
    ) -> Result<(), OrchestrationError> {
        for (slot, status) in threads.iter_mut().zip(statuses) {
            if !slot.as_ref().is_some_and(|thread| thread.is_finished()) {
                continue;
            }
            let Some(thread) = slot.take() else {
                continue;
            };
            let name = thread.name().to_string();
            let (_, result) = thread.join().await?;
            match result {
                Ok(exit) => {
                    if exit == Exit::Halted {
                        debug!("{} halted", name);
                    }
                    status.settle();
                }
                Err(fault) => {
                    return Err(OrchestrationError::MachineFault {
                        machine: name,
                        fault,
                    });
                }
            }
        }

        if threads.iter().all(Option::is_none) {
            return Err(OrchestrationError::Stalled {
                machine: "network".to_string(),
            });
        }
        Ok(())
    }
}
