use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dns-exfil-monitor")]
#[command(about = "Passive sniffer decoding records smuggled in DNS query names", long_about = None)]
pub struct Args {
    /// Interface to capture on; picked automatically when omitted
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Parent domain the exfiltration client sends queries under
    #[arg(long, required_unless_present = "list_interfaces")]
    pub host: Option<String>,

    /// File decoded records are appended to, one JSON object per line
    #[arg(short, long, default_value = "exfil-records.jsonl")]
    pub output: PathBuf,

    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub list_interfaces: bool,
}
