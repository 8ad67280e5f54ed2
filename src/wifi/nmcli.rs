//! NetworkManager-backed wireless driver

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{LinkError, LinkEvent, WifiDriver};

/// Polling cadence for link state once the queue is drained
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Drives the system `nmcli` tool: connects to the configured network
/// and polls the device state, translating changes into link events.
pub struct NmcliDriver {
    ssid: String,
    passphrase: String,
    interface: String,
    pending: VecDeque<LinkEvent>,
    started: bool,
    last_connected: bool,
}

impl NmcliDriver {
    pub fn new(ssid: &str, passphrase: &str, interface: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
            interface: interface.to_string(),
            pending: VecDeque::new(),
            started: false,
            last_connected: false,
        }
    }

    async fn device_connected(&self) -> Result<bool, LinkError> {
        let mut cmd = Command::new("nmcli");
        cmd.args(["-t", "-f", "GENERAL.STATE", "device", "show"]);
        if !self.interface.is_empty() {
            cmd.arg(&self.interface);
        }

        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        // nmcli prints one "GENERAL.STATE:100 (connected)" per device.
        Ok(stdout.lines().any(|line| line.contains("(connected)")))
    }
}

#[async_trait]
impl WifiDriver for NmcliDriver {
    async fn start_stack(&mut self) -> Result<(), LinkError> {
        let output = Command::new("nmcli")
            .args(["radio", "wifi", "on"])
            .output()
            .await
            .map_err(|e| LinkError::StackInit(format!("nmcli not available: {e}")))?;

        if !output.status.success() {
            return Err(LinkError::StackInit(format!(
                "nmcli radio wifi on exited with {}",
                output.status
            )));
        }

        self.pending.push_back(LinkEvent::StackStarted);
        self.started = true;
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), LinkError> {
        debug!(ssid = %self.ssid, "Starting nmcli connection attempt");

        let mut cmd = Command::new("nmcli");
        cmd.args(["device", "wifi", "connect", &self.ssid]);
        if !self.passphrase.is_empty() {
            cmd.args(["password", &self.passphrase]);
        }
        if !self.interface.is_empty() {
            cmd.args(["ifname", &self.interface]);
        }

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(err) => {
                // Still surface the failed attempt as an event so the
                // retry budget runs down instead of stalling.
                self.pending.push_back(LinkEvent::Disconnected);
                self.last_connected = false;
                return Err(err.into());
            }
        };

        if output.status.success() {
            self.pending.push_back(LinkEvent::AddressAcquired);
            self.last_connected = true;
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(ssid = %self.ssid, error = %stderr.trim(), "nmcli connect failed");
            self.pending.push_back(LinkEvent::Disconnected);
            self.last_connected = false;
        }

        Ok(())
    }

    async fn next_event(&mut self) -> Option<LinkEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        if !self.started {
            return None;
        }

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            match self.device_connected().await {
                Ok(connected) if connected != self.last_connected => {
                    self.last_connected = connected;
                    return Some(if connected {
                        LinkEvent::AddressAcquired
                    } else {
                        LinkEvent::Disconnected
                    });
                }
                Ok(_) => continue,
                Err(err) => {
                    warn!(error = %err, "nmcli poll failed, stopping link supervision");
                    return None;
                }
            }
        }
    }
}
