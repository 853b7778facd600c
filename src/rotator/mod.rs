//! Identity rotation loop
//!
//! Owns the control channel for the life of the process. Each cycle takes
//! an address reading, sends NEWNYM, waits for new circuits to settle, takes
//! a second reading and reports both. Only lookups are allowed to fail
//! without ending the loop.

use crate::config::RotationConfig;
use crate::error::Result;
use crate::lookup::{AddressLookup, Observation};
use crate::tor::ControlChannel;
use crate::util::time::format_duration;
use std::fmt;
use std::io::Write;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Width of the countdown line, cleared once the wait is over
const COUNTDOWN_WIDTH: usize = 48;

/// Whether a rotation produced a visibly different address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
    /// At least one of the readings failed
    Unknown,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed => f.write_str("changed"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::Unknown => f.write_str("unverified"),
        }
    }
}

/// Result of one rotation
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub before: Observation,
    pub after: Observation,
}

impl CycleReport {
    pub fn outcome(&self) -> Outcome {
        match (&self.before.address, &self.after.address) {
            (Some(before), Some(after)) if before == after => Outcome::Unchanged,
            (Some(_), Some(_)) => Outcome::Changed,
            _ => Outcome::Unknown,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[cycle {}] {} -> {} ({})",
            self.cycle,
            self.before,
            self.after,
            self.outcome()
        )
    }
}

/// The rotate-and-report loop
pub struct Rotator<C, L, W> {
    channel: C,
    lookup: L,
    out: W,
    interval: Duration,
    settle: Duration,
    limit: Option<u64>,
    countdown: bool,
    cycles: u64,
}

impl<C, L, W> Rotator<C, L, W>
where
    C: ControlChannel,
    L: AddressLookup,
    W: Write,
{
    /// Take ownership of an authenticated channel
    pub fn new(channel: C, lookup: L, config: &RotationConfig, out: W) -> Self {
        Self {
            channel,
            lookup,
            out,
            interval: config.interval(),
            settle: config.settle(),
            limit: config.cycle_limit(),
            countdown: config.countdown,
            cycles: 0,
        }
    }

    /// Completed cycles so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Rotate until the cycle limit is reached or a fatal error occurs
    ///
    /// Without a limit this only returns on error; callers cancel it by
    /// dropping the future.
    pub async fn run(&mut self) -> Result<u64> {
        loop {
            self.run_cycle().await?;

            if self.limit.is_some_and(|limit| self.cycles >= limit) {
                info!("Reached {} cycles, stopping", self.cycles);
                return Ok(self.cycles);
            }

            self.wait_interval().await;
        }
    }

    /// One rotation: observe, signal, settle, observe, report
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let cycle = self.cycles + 1;
        debug!("Starting rotation cycle {}", cycle);

        let before = Observation::take(&self.lookup).await?;

        self.channel.signal_newnym().await?;
        info!("Requested new Tor identity (cycle {})", cycle);

        if !self.settle.is_zero() {
            debug!("Waiting {:?} for new circuits", self.settle);
            sleep(self.settle).await;
        }

        let after = Observation::take(&self.lookup).await?;

        self.cycles = cycle;
        let report = CycleReport {
            cycle,
            before,
            after,
        };

        debug!(
            "Cycle {} observed {} at {} and {} at {}",
            cycle,
            report.before,
            report.before.at.to_rfc3339(),
            report.after,
            report.after.at.to_rfc3339()
        );
        if report.outcome() == Outcome::Unchanged {
            warn!(
                "Exit address unchanged after NEWNYM ({}); Tor may have reused the exit",
                report.after
            );
        }
        self.emit(&report.to_string());
        Ok(report)
    }

    /// Close the control channel
    pub async fn close(&mut self) {
        if let Err(e) = self.channel.close().await {
            warn!("Error closing control channel: {}", e);
        }
    }

    async fn wait_interval(&mut self) {
        if !self.countdown {
            sleep(self.interval).await;
            return;
        }

        let mut remaining = self.interval.as_secs();
        while remaining > 0 {
            let line = format!("Next rotation in {}...", format_duration(remaining));
            self.write_partial(&format!("\r{:<width$}", line, width = COUNTDOWN_WIDTH));
            sleep(Duration::from_secs(1)).await;
            remaining -= 1;
        }
        self.write_partial(&format!("\r{}\r", " ".repeat(COUNTDOWN_WIDTH)));
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line) {
            warn!("Failed to write report: {}", e);
        }
    }

    fn write_partial(&mut self, text: &str) {
        let written = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            debug!("Failed to write countdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RotatorError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    #[derive(Default)]
    struct SimulatedChannel {
        signals: Vec<Instant>,
        reject_after: Option<usize>,
        closed: bool,
    }

    impl ControlChannel for SimulatedChannel {
        async fn signal_newnym(&mut self) -> Result<()> {
            if self.reject_after.is_some_and(|n| self.signals.len() >= n) {
                return Err(RotatorError::ControlProtocol(
                    "SIGNAL NEWNYM refused, channel not authenticated: 514 Authentication required."
                        .into(),
                ));
            }
            self.signals.push(Instant::now());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    /// Replays scripted lookup results; `None` is a failed lookup
    struct ScriptedLookup {
        script: RefCell<VecDeque<Option<&'static str>>>,
        calls: RefCell<Vec<Instant>>,
    }

    impl ScriptedLookup {
        fn new(script: &[Option<&'static str>]) -> Self {
            Self {
                script: RefCell::new(script.iter().copied().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl AddressLookup for ScriptedLookup {
        async fn lookup(&self) -> Result<String> {
            self.calls.borrow_mut().push(Instant::now());
            match self.script.borrow_mut().pop_front().flatten() {
                Some(addr) => Ok(addr.to_string()),
                None => Err(RotatorError::Lookup("timed out".into())),
            }
        }
    }

    fn rotation(interval_secs: u64, settle_secs: u64, count: u64) -> RotationConfig {
        RotationConfig {
            interval_secs,
            settle_secs,
            count: Some(count),
            countdown: false,
        }
    }

    fn output(rotator: &Rotator<SimulatedChannel, ScriptedLookup, Vec<u8>>) -> String {
        String::from_utf8(rotator.output().clone()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn n_cycles_send_n_signals_spaced_by_interval() {
        let lookup = ScriptedLookup::new(&[Some("1.1.1.1"); 6]);
        let config = rotation(60, 5, 3);
        let mut rotator = Rotator::new(SimulatedChannel::default(), lookup, &config, Vec::new());

        let cycles = rotator.run().await.unwrap();

        assert_eq!(cycles, 3);
        let signals = &rotator.channel().signals;
        assert_eq!(signals.len(), 3);
        for pair in signals.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(60));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_reports_unknown_and_continues() {
        let lookup = ScriptedLookup::new(&[
            None,
            Some("5.6.7.8"),
            Some("5.6.7.8"),
            Some("9.9.9.9"),
        ]);
        let mut rotator =
            Rotator::new(SimulatedChannel::default(), lookup, &rotation(30, 0, 2), Vec::new());

        rotator.run().await.unwrap();

        assert_eq!(rotator.channel().signals.len(), 2);
        let out = output(&rotator);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "[cycle 1] unknown -> 5.6.7.8 (unverified)");
        assert_eq!(lines[1], "[cycle 2] 5.6.7.8 -> 9.9.9.9 (changed)");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_signal_is_fatal() {
        let channel = SimulatedChannel {
            reject_after: Some(1),
            ..Default::default()
        };
        let lookup = ScriptedLookup::new(&[Some("1.1.1.1"); 8]);
        let mut rotator = Rotator::new(channel, lookup, &rotation(10, 0, 5), Vec::new());

        let err = rotator.run().await.unwrap_err();

        assert!(matches!(err, RotatorError::ControlProtocol(_)));
        assert!(!err.is_recoverable());
        assert_eq!(rotator.cycles(), 1);
        assert_eq!(rotator.channel().signals.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_address_is_reported() {
        let lookup = ScriptedLookup::new(&[Some("2.2.2.2"), Some("2.2.2.2")]);
        let mut rotator =
            Rotator::new(SimulatedChannel::default(), lookup, &rotation(10, 1, 1), Vec::new());

        let report = rotator.run_cycle().await.unwrap();

        assert_eq!(report.outcome(), Outcome::Unchanged);
        assert_eq!(output(&rotator), "[cycle 1] 2.2.2.2 -> 2.2.2.2 (unchanged)\n");
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_precedes_second_lookup() {
        let lookup = ScriptedLookup::new(&[Some("1.1.1.1"), Some("2.2.2.2")]);
        let mut rotator =
            Rotator::new(SimulatedChannel::default(), lookup, &rotation(10, 7, 1), Vec::new());

        let report = rotator.run_cycle().await.unwrap();

        assert_eq!(report.outcome(), Outcome::Changed);
        let calls = rotator.lookup.calls.borrow();
        let signal = rotator.channel().signals[0];
        assert!(signal >= calls[0]);
        assert!(calls[1] - signal >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_then_clears() {
        let lookup = ScriptedLookup::new(&[Some("1.1.1.1"); 4]);
        let config = RotationConfig {
            countdown: true,
            ..rotation(3, 0, 2)
        };
        let mut rotator = Rotator::new(SimulatedChannel::default(), lookup, &config, Vec::new());

        rotator.run().await.unwrap();

        let out = output(&rotator);
        assert!(out.contains("Next rotation in 3s..."));
        assert!(out.contains("Next rotation in 1s..."));
        assert!(!out.contains("Next rotation in 0s"));
    }

    #[tokio::test]
    async fn close_reaches_channel() {
        let lookup = ScriptedLookup::new(&[]);
        let mut rotator =
            Rotator::new(SimulatedChannel::default(), lookup, &rotation(10, 0, 1), Vec::new());
        rotator.close().await;
        assert!(rotator.channel().closed);
    }
}
