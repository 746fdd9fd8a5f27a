use anyhow::{Context, Result, bail};
use log::{info, warn};
use pcap::{Capture, Device, Error, Linktype};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dns::{QueryEvent, filter, filter::LinkLayer};

/// BPF program handed to libpcap: DNS traffic in either direction, UDP and
/// TCP, v4 and v6. Finer filtering happens in `dns::filter`.
const CAPTURE_FILTER: &str = "port 53";

pub struct CaptureLoader;

impl CaptureLoader {
    pub fn list_interfaces() -> Result<Vec<Device>> {
        Ok(Device::list()?)
    }

    pub fn select_default_interface() -> Result<String> {
        let devices = Device::list()?;

        for device in &devices {
            if device.name == "any" {
                continue;
            }
            if !device.flags.is_loopback() && device.flags.is_up() && device.flags.is_running() {
                return Ok(device.name.clone());
            }
        }

        for device in &devices {
            if device.name != "any" && device.flags.is_up() {
                return Ok(device.name.clone());
            }
        }

        bail!("No suitable network interface found")
    }

    /// Open a capture on `interface` and start the blocking read loop.
    ///
    /// Query events flow out of the returned channel in observation order.
    /// Setup failures (unknown interface, insufficient privilege) fail
    /// loudly here; once running, the loop has no termination path other
    /// than cancellation of the returned token, which it swallows rather
    /// than surfacing as an error.
    pub fn load(
        interface: &str,
    ) -> Result<(
        JoinHandle<()>,
        mpsc::Receiver<QueryEvent>,
        CancellationToken,
    )> {
        info!("Opening capture on interface: {interface}");

        let mut cap = if interface == "any" {
            Capture::from_device("any")?
                .immediate_mode(true)
                .timeout(100)
                .open()?
        } else {
            let device = Device::list()?
                .into_iter()
                .find(|d| d.name == interface)
                .context(format!("Interface {interface} not found"))?;

            Capture::from_device(device)?
                .immediate_mode(true)
                .timeout(100)
                .open()?
        };

        cap.filter(CAPTURE_FILTER, true)?;

        // The "any" pseudo-device hands out Linux cooked frames, real
        // interfaces Ethernet; anything else would make the filter drop
        // every packet, so refuse it up front instead of running silent.
        let link = match cap.get_datalink() {
            Linktype::ETHERNET => LinkLayer::Ethernet,
            Linktype::LINUX_SLL => LinkLayer::LinuxSll,
            other => bail!(
                "Unsupported datalink {} on interface {interface}",
                other.get_name().unwrap_or_else(|_| format!("{}", other.0))
            ),
        };

        info!("Capture started on interface: {interface}");

        let (tx, rx) = mpsc::channel(10000);
        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        // The pcap read blocks inside C, so cancellation is polled via a
        // flag between the short read timeouts.
        let should_stop = Arc::new(AtomicBool::new(false));
        let should_stop_clone = should_stop.clone();

        let handle = tokio::task::spawn_blocking(move || {
            while !should_stop_clone.load(Ordering::Relaxed) {
                match cap.next_packet() {
                    Ok(packet) => {
                        if should_stop_clone.load(Ordering::Relaxed) {
                            break;
                        }

                        if let Some(event) = filter::parse_query_packet(link, packet.data)
                            && tx.blocking_send(event).is_err()
                        {
                            info!("Channel closed, stopping capture");
                            break;
                        }
                    }
                    Err(Error::TimeoutExpired) => {
                        // Expected; loop back to check the stop flag.
                        continue;
                    }
                    Err(e) => {
                        warn!("Error reading packet: {e}");
                        continue;
                    }
                }
            }
            info!("Packet capture task terminated");
        });

        let stop_handle = should_stop.clone();
        tokio::spawn(async move {
            token_clone.cancelled().await;
            stop_handle.store(true, Ordering::Relaxed);
        });

        Ok((handle, rx, cancel_token))
    }
}
