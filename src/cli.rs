use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "romulus", about = "Declarative libvirt/KVM provisioning for Kubernetes clusters")]
pub struct Cli {
    /// Path to the cluster configuration file
    #[arg(short, long, default_value = "romulus.yaml")]
    pub config: PathBuf,

    /// libvirt connection URI
    #[arg(long, default_value = "qemu:///system")]
    pub connect: String,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the plan: what would change to reach the desired state
    Plan,

    /// Apply the plan against the hypervisor
    Apply {
        /// Skip the confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },

    /// Destroy every managed resource
    Destroy {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Render the cloud-init user-data/network-config/meta-data for one VM
    RenderCloudinit {
        /// Domain name, e.g. "romulus-master-1"
        vm: String,

        /// Directory to write the rendered files into (default: current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run a Kubernetes bootstrap script over SSH on every node
    BootstrapK8s {
        /// Path to the init script to run on each node (masters before workers)
        #[arg(long)]
        script: PathBuf,
    },

    /// Scaffold a starter configuration file
    Init,
}
