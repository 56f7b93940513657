//! The driver's side of the handshake.
//!
//! The external driver owns simulated time. Whenever it wants orchestration
//! work done it sends a [`DriverReport`] through its [`DriverPort`] and stays
//! blocked until the scheduler replies. A [`SchedulerReply::Finished`] or
//! [`SchedulerReply::Aborted`] reply closes the port for good.

use std::time::Duration;

use cosim_common::SimTime;

use crate::callback::CallbackToken;
use crate::error::HandshakeError;
use crate::handshake::HandshakeEnd;

/// Why the driver handed over the baton.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    /// First handoff of the run; no time has elapsed.
    Start,
    /// Simulated time advanced by one tick.
    TimeElapsed,
    /// A registered callback fired.
    Callback(CallbackToken),
}

/// One driver-to-scheduler notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverReport {
    /// The simulator's current time.
    pub time: SimTime,
    /// Why the driver is reporting.
    pub reason: WakeReason,
}

/// The scheduler's answer, handing the baton back to the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulerReply {
    /// The round is complete; advance time and report again.
    Yield,
    /// The run ended cleanly; stop reporting.
    Finished,
    /// The run hit a fatal error; stop reporting.
    Aborted {
        /// Description of the fatal error.
        reason: String,
    },
}

impl SchedulerReply {
    /// Returns true for replies that end the run.
    pub fn is_final(&self) -> bool {
        !matches!(self, SchedulerReply::Yield)
    }
}

/// The scheduler's end of the handshake.
pub(crate) type SchedulerEnd = HandshakeEnd<SchedulerReply, DriverReport>;

/// The driver's end of the handshake.
#[derive(Debug)]
pub struct DriverPort {
    end: HandshakeEnd<DriverReport, SchedulerReply>,
    closed: bool,
}

impl DriverPort {
    pub(crate) fn new(end: HandshakeEnd<DriverReport, SchedulerReply>) -> Self {
        Self { end, closed: false }
    }

    /// Bounds how long each report waits for the scheduler's reply.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.end = self.end.with_timeout(timeout);
        self
    }

    /// Hands the baton to the scheduler for the first round.
    pub fn start(&mut self, time: SimTime) -> Result<SchedulerReply, HandshakeError> {
        self.report(DriverReport {
            time,
            reason: WakeReason::Start,
        })
    }

    /// Reports that simulated time advanced by one tick.
    pub fn report_time_elapsed(&mut self, time: SimTime) -> Result<SchedulerReply, HandshakeError> {
        self.report(DriverReport {
            time,
            reason: WakeReason::TimeElapsed,
        })
    }

    /// Reports that the callback registered under `token` fired.
    pub fn report_callback(
        &mut self,
        token: CallbackToken,
        time: SimTime,
    ) -> Result<SchedulerReply, HandshakeError> {
        self.report(DriverReport {
            time,
            reason: WakeReason::Callback(token),
        })
    }

    /// Sends `report` and blocks until the scheduler replies.
    pub fn report(&mut self, report: DriverReport) -> Result<SchedulerReply, HandshakeError> {
        if self.closed {
            return Err(HandshakeError::Closed);
        }
        let reply = self.end.signal(report);
        if reply.as_ref().map_or(true, SchedulerReply::is_final) {
            self.closed = true;
        }
        reply
    }

    /// Returns true once the run has ended or the scheduler went away.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::handshake;
    use std::thread;

    #[test]
    fn final_reply_closes_port() {
        let (driver_end, sched_end) = handshake::<DriverReport, SchedulerReply>();
        let mut port = DriverPort::new(driver_end);
        let scheduler = thread::spawn(move || {
            let first = sched_end.wait().unwrap();
            assert_eq!(first.reason, WakeReason::Start);
            let second = sched_end.signal(SchedulerReply::Yield).unwrap();
            assert_eq!(second.reason, WakeReason::TimeElapsed);
            sched_end.release(SchedulerReply::Finished).unwrap();
        });
        assert_eq!(port.start(SimTime::ZERO), Ok(SchedulerReply::Yield));
        assert!(!port.is_closed());
        assert_eq!(
            port.report_time_elapsed(SimTime::from_units(1)),
            Ok(SchedulerReply::Finished)
        );
        assert!(port.is_closed());
        assert_eq!(
            port.report_time_elapsed(SimTime::from_units(2)),
            Err(HandshakeError::Closed)
        );
        scheduler.join().unwrap();
    }

    #[test]
    fn vanished_scheduler_closes_port() {
        let (driver_end, sched_end) = handshake::<DriverReport, SchedulerReply>();
        drop(sched_end);
        let mut port = DriverPort::new(driver_end);
        assert_eq!(port.start(SimTime::ZERO), Err(HandshakeError::Disconnected));
        assert!(port.is_closed());
    }

    #[test]
    fn reply_finality() {
        assert!(!SchedulerReply::Yield.is_final());
        assert!(SchedulerReply::Finished.is_final());
        assert!(SchedulerReply::Aborted {
            reason: "x".into()
        }
        .is_final());
    }
}
