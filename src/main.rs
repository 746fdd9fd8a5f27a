mod cli;
mod dns;
mod pcap;
mod schema;
mod sink;

use std::process::exit;

use anyhow::Result;
use clap::Parser;
use cli::Args;
use dns::RecordCollector;
use log::info;
use schema::Matcher;
use sink::JsonLinesSink;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_interfaces {
        let interfaces = pcap::CaptureLoader::list_interfaces()?;
        println!("Available network interfaces:");
        for device in interfaces {
            let status = if device.flags.is_up() { "UP" } else { "DOWN" };
            let running = if device.flags.is_running() {
                "RUNNING"
            } else {
                ""
            };
            let loopback = if device.flags.is_loopback() {
                "LOOPBACK"
            } else {
                ""
            };

            println!("  {} [{}] {} {}", device.name, status, running, loopback);

            if let Some(desc) = device.desc {
                println!("    Description: {desc}");
            }
        }
        return Ok(());
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let interface = if let Some(ref iface) = args.interface {
        iface.clone()
    } else {
        pcap::CaptureLoader::select_default_interface()?
    };

    // clap guarantees host is present when we are not listing interfaces.
    let host = args.host.as_deref().unwrap_or_default();
    let matcher = Matcher::new(host.as_bytes());

    info!("Starting DNS exfil monitor");
    info!("Interface: {interface}");
    info!(
        "Watching for records under host: {}",
        String::from_utf8_lossy(matcher.host())
    );

    let sink = JsonLinesSink::open(&args.output)?;

    let (_capture_handle, event_rx, cancel_token) = pcap::CaptureLoader::load(&interface)?;
    info!("Packet capture started successfully");

    let collector = RecordCollector::new(matcher, event_rx, sink);
    let collector_handle = tokio::spawn(async move {
        if let Err(e) = collector.run().await {
            eprintln!("Collector error: {e}");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");

    // Cancel packet capture first; the collector drains and exits once the
    // channel closes.
    cancel_token.cancel();
    drop(collector_handle);

    // Don't wait for the capture handle - the blocking pcap read may take
    // one more timeout cycle to notice the flag on some systems.
    info!("DNS exfil monitor stopped");
    exit(0)
}
