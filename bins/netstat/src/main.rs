//! netstat command - socket listing.
//!
//! Lists TCP, UDP, UDP-Lite and raw sockets from `/proc/net`, optionally with
//! the owning process, across one or more network namespaces.

mod output;

use clap::Parser;
use procnet::netstat::{
    self, FeatureSelection, NamespaceSelection, ScanConfig, SocketEntry, Transport, accept,
    process::is_privileged,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "netstat", version, about = "Print network connections")]
struct Cli {
    /// Display listening server sockets.
    #[arg(short = 'l', long)]
    listening: bool,

    /// Display all sockets (default: connected).
    #[arg(short = 'a', long)]
    all: bool,

    /// Display sockets of all supported transport protocols.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Display only IPv4 sockets.
    #[arg(short = '4', long)]
    ipv4: bool,

    /// Display only IPv6 sockets.
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Display PID/Program name for sockets.
    #[arg(short = 'p', long)]
    programs: bool,

    /// Display TCP sockets.
    #[arg(short = 't', long)]
    tcp: bool,

    /// Display UDP sockets.
    #[arg(short = 'u', long)]
    udp: bool,

    /// Display UDP-Lite sockets.
    #[arg(short = 'U', long)]
    udplite: bool,

    /// Display raw sockets.
    #[arg(short = 'w', long)]
    raw: bool,

    /// Comma separated list of named network namespaces.
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["pids", "allnetns"])]
    netns: Vec<String>,

    /// Scan all network namespaces.
    #[arg(long, conflicts_with = "pids")]
    allnetns: bool,

    /// Comma separated list of pids in different network namespaces.
    #[arg(long, value_delimiter = ',')]
    pids: Vec<u32>,

    /// Output in JSON format.
    #[arg(short = 'j', long)]
    json: bool,
}

impl Cli {
    fn features(&self) -> FeatureSelection {
        let mut features = if self.verbose {
            FeatureSelection::new().all_transports()
        } else if self.tcp || self.udp || self.udplite || self.raw {
            let mut selected = Vec::new();
            if self.tcp {
                selected.extend([Transport::Tcp, Transport::Tcp6]);
            }
            if self.udp {
                selected.extend([Transport::Udp, Transport::Udp6]);
            }
            if self.udplite {
                selected.extend([Transport::UdpLite, Transport::UdpLite6]);
            }
            if self.raw {
                selected.extend([Transport::Raw, Transport::Raw6]);
            }
            FeatureSelection::new().transports(&selected)
        } else {
            FeatureSelection::new()
        };

        // Both flags together mean both families
        if self.ipv4 && !self.ipv6 {
            features = features.ipv4_only();
        }
        if self.ipv6 && !self.ipv4 {
            features = features.ipv6_only();
        }

        let namespaces = if self.allnetns {
            NamespaceSelection::All
        } else if !self.pids.is_empty() {
            NamespaceSelection::Pids(self.pids.clone())
        } else if !self.netns.is_empty() {
            NamespaceSelection::Names(self.netns.clone())
        } else {
            NamespaceSelection::HostOnly
        };

        features
            .resolve_processes(self.programs)
            .namespaces(namespaces)
    }

    fn accept(&self) -> fn(&SocketEntry) -> bool {
        if self.all {
            accept::all
        } else if self.listening {
            accept::listening
        } else {
            accept::connected
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = netstat::netstat(ScanConfig::default(), cli.features(), cli.accept(), cancel).await;

    let scan = match result {
        Ok(scan) => scan,
        Err(netstat::Error::Cancelled { partial }) => {
            eprintln!("interrupted, output is incomplete");
            *partial
        }
        Err(e) => return Err(e.into()),
    };

    if !cli.json && !is_privileged() {
        println!(
            "Not all processes could be identified, you would have to be root to see it all."
        );
    }

    if cli.json {
        output::print_json(&scan)?;
    } else {
        output::print_text(&scan.entries)?;
    }
    output::print_report(&scan.report)?;

    Ok(())
}
