//! Control loop speaking the port protocol
//!
//! One message is decoded and fully handled before the next is read. While
//! waiting for input the loop also checks on the parent process at a fixed
//! interval, so a parent that dies without closing the pipe is noticed.

use std::time::Duration;

use anyhow::Result;
use exaudio_core::{DeviceFingerprint, Direction};
use exaudio_discovery::{AudioBackend, DeviceManager};
use exaudio_etf::{decode_message, encode_ack, CommandMessage, DecodeErrorKind};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::command::{Command, Target};
use crate::logging::LogControl;
use crate::parent::ParentWatch;

const OKAY: &str = "okay";
const ERROR: &str = "error";

/// Why the control loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `exit` command
    Exit,
    /// Input closed between messages
    EndOfStream,
    /// Input closed or failed mid-message
    Malformed,
    /// The controlling process went away
    ParentGone,
}

enum Flow {
    Continue,
    Exit,
}

pub struct Port<R, W, B: AudioBackend> {
    input: R,
    output: W,
    manager: DeviceManager<B>,
    log: LogControl,
    parent: ParentWatch,
    check_interval: Duration,
}

impl<R, W, B> Port<R, W, B>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    B: AudioBackend,
{
    pub fn new(input: R, output: W, manager: DeviceManager<B>, log: LogControl) -> Self {
        Self {
            input,
            output,
            manager,
            log,
            parent: ParentWatch::current(),
            check_interval: Duration::from_millis(500),
        }
    }

    pub fn with_parent(mut self, parent: ParentWatch) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval.max(Duration::from_millis(1));
        self
    }

    /// Serve commands until the loop ends, then release every device resource
    pub async fn run(&mut self) -> Result<ExitReason> {
        let result = self.serve().await;
        self.manager.shutdown();
        result
    }

    async fn serve(&mut self) -> Result<ExitReason> {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let watching = self.parent.is_enabled();

        loop {
            if !self.parent.is_alive() {
                warn!("parent changed");
                return Ok(ExitReason::ParentGone);
            }

            // the decode future is kept across ticks; dropping it mid-message
            // would lose bytes already read
            let decoded = {
                let decode = decode_message(&mut self.input);
                tokio::pin!(decode);
                loop {
                    tokio::select! {
                        result = &mut decode => break result,
                        _ = ticker.tick(), if watching => {
                            if !self.parent.is_alive() {
                                warn!("parent changed while waiting for input");
                                return Ok(ExitReason::ParentGone);
                            }
                        }
                    }
                }
            };

            match decoded {
                Ok(message) => {
                    trace!(message = %message, "received");
                    if let Flow::Exit = self.handle(message).await? {
                        return Ok(ExitReason::Exit);
                    }
                }
                Err(e) => match e.kind() {
                    DecodeErrorKind::EndOfStream => {
                        info!("input closed");
                        return Ok(ExitReason::EndOfStream);
                    }
                    DecodeErrorKind::Malformed => {
                        error!(error = %e, "input stream unusable");
                        return Ok(ExitReason::Malformed);
                    }
                    DecodeErrorKind::ProtocolViolation => {
                        warn!(error = %e, "dropping message");
                    }
                },
            }
        }
    }

    async fn handle(&mut self, message: CommandMessage) -> Result<Flow> {
        let command = match Command::try_from(&message) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "rejected command");
                self.reply(ERROR).await?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            Command::Empty => debug!("empty command"),
            Command::Scan => {
                let key = match self.manager.scan() {
                    Ok(report) => {
                        debug!(report = ?report, "scan report");
                        OKAY
                    }
                    Err(e) => {
                        warn!(error = %e, "scan failed");
                        ERROR
                    }
                };
                self.reply(key).await?;
            }
            Command::Assign { direction, target } => {
                let key = self.assign(direction, target);
                self.reply(key).await?;
            }
            Command::Dump => {
                self.manager.log_state();
                self.reply(OKAY).await?;
            }
            Command::LogOn => self.set_logging(true),
            Command::LogOff => self.set_logging(false),
            Command::Exit => {
                info!("exit requested");
                return Ok(Flow::Exit);
            }
            Command::Unknown(key) => info!(key = %key, message = %message, "ignoring command"),
        }
        Ok(Flow::Continue)
    }

    fn assign(&mut self, direction: Direction, target: Target) -> &'static str {
        let id = match target {
            Target::Default => None,
            Target::Id(raw) => match DeviceFingerprint::from_raw(raw) {
                Some(id) => Some(id),
                None => {
                    warn!(raw, direction = %direction, "not a device id");
                    return ERROR;
                }
            },
        };
        match self.manager.assign(direction, id) {
            Ok(_) => OKAY,
            Err(e) => {
                warn!(error = %e, direction = %direction, "assignment failed");
                ERROR
            }
        }
    }

    fn set_logging(&mut self, enabled: bool) {
        if let Err(e) = self.log.set_enabled(enabled) {
            warn!(error = %e, "could not change log filter");
        }
    }

    async fn reply(&mut self, key: &str) -> Result<()> {
        encode_ack(&mut self.output, key).await?;
        Ok(())
    }
}
