use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;

use romulus::adapter::libvirt::LibvirtAdapter;
use romulus::adapter::HypervisorAdapter;
use romulus::cli::{Cli, Command};
use romulus::error::RomulusError;
use romulus::state::State;
use romulus::{cloudinit, config, executor, init, k8s, logging, planner, progress, projector};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), RomulusError> {
    // `init` scaffolds the config file the other subcommands would load —
    // it must not try to load one that doesn't exist yet.
    if let Command::Init = cli.command {
        init::run(&cli.config)?;
        println!("Wrote {}", cli.config.display());
        println!("Edit it, then run `romulus plan`.");
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let desired = projector::project(&cfg);

    match cli.command {
        Command::Init => unreachable!(),

        Command::Plan => {
            let adapter = LibvirtAdapter::new(cli.connect.clone());
            let current = adapter.current_state().await?;
            let plan = planner::optimize(planner::diff(&current, &desired)?);
            planner::validate(&plan, &current)?;
            print!("{}", planner::format(&plan));
            let summary = planner::summary(&plan);
            println!(
                "{} create, {} update, {} destroy (~{}s)",
                summary.creates, summary.updates, summary.destroys, summary.estimated_duration_secs
            );
        }

        Command::Apply { auto_approve } => {
            let adapter = LibvirtAdapter::new(cli.connect.clone());
            let current = adapter.current_state().await?;
            let plan = planner::optimize(planner::diff(&current, &desired)?);
            planner::validate(&plan, &current)?;

            if plan.is_empty() {
                println!("No changes needed — infrastructure is up to date.");
                return Ok(());
            }

            print!("{}", planner::format(&plan));
            if !auto_approve && !confirm("Apply these changes?")? {
                println!("Cancelled.");
                return Ok(());
            }

            let mut steps = progress::StepProgress::new(plan.len(), progress::OutputMode::Normal);
            let result =
                executor::execute(&plan, &current, &desired, &cfg, &adapter, &mut steps).await?;
            println!(
                "Apply complete: {} created, {} updated, {} destroyed.",
                result.created, result.updated, result.destroyed
            );
        }

        Command::Destroy { force } => {
            let adapter = LibvirtAdapter::new(cli.connect.clone());
            let current = adapter.current_state().await?;
            let plan = planner::optimize(planner::diff(&current, &State::empty())?);
            planner::validate(&plan, &current)?;

            if plan.is_empty() {
                println!("Nothing to destroy.");
                return Ok(());
            }

            print!("{}", planner::format(&plan));
            if !force && !confirm("Destroy ALL of the above?")? {
                println!("Cancelled.");
                return Ok(());
            }

            let mut steps = progress::StepProgress::new(plan.len(), progress::OutputMode::Normal);
            let result =
                executor::execute(&plan, &current, &State::empty(), &cfg, &adapter, &mut steps).await?;
            println!("Destroy complete: {} destroyed.", result.destroyed);
        }

        Command::RenderCloudinit { vm, out } => {
            let domain = desired
                .domains
                .iter()
                .find(|d| d.name == vm)
                .ok_or_else(|| RomulusError::Validation {
                    message: format!("no domain named '{vm}' in the projected desired state"),
                })?;
            let ssh_key = romulus::paths::read_public_key(&cfg.ssh_public_key_path())?;
            let (meta_data, user_data, network_config) = cloudinit::render_files(domain, &ssh_key)?;

            let out_dir = out.unwrap_or_else(|| std::path::PathBuf::from("."));
            std::fs::create_dir_all(&out_dir).map_err(|e| RomulusError::Io {
                context: format!("creating output directory {}", out_dir.display()),
                source: e,
            })?;
            for (name, contents) in [
                ("meta-data", meta_data.as_str()),
                ("user-data", user_data.as_str()),
                ("network-config", network_config.as_str()),
            ] {
                let path = out_dir.join(name);
                std::fs::write(&path, contents).map_err(|e| RomulusError::Io {
                    context: format!("writing {}", path.display()),
                    source: e,
                })?;
                println!("Wrote {}", path.display());
            }
        }

        Command::BootstrapK8s { script } => {
            let script_text = k8s::load_script(&script).await?;
            let domains = k8s::masters_first(desired.domains.clone());
            let runner = k8s::SshBootstrapRunner::new(
                cfg.ssh.user.clone(),
                cfg.ssh_private_key_path(),
            );
            use romulus::k8s::K8sBootstrapRunner;
            runner.bootstrap(&domains, &script_text).await?;
            println!("Bootstrap complete on {} node(s).", domains.len());
        }
    }

    Ok(())
}

/// Simple y/N prompt — `apply`/`destroy` without `--auto-approve`/`--force`.
fn confirm(prompt: &str) -> Result<bool, RomulusError> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(|e| RomulusError::Io {
        context: "reading confirmation from stdin".into(),
        source: e,
    })?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
