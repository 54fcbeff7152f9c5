//! Applies a validated, optimized [`Plan`] against a [`HypervisorAdapter`].
//! No resource kind has a safe in-place update path on the adapter trait, so
//! every `Update` action is rewritten into a destroy-then-create pair before
//! execution and the rewritten plan is re-validated.

use std::time::Duration;

use crate::adapter::HypervisorAdapter;
use crate::cloudinit;
use crate::config::Config;
use crate::error::RomulusError;
use crate::paths;
use crate::planner::{self, Action, ActionType, Plan, Resource};
use crate::progress::StepProgress;
use crate::state::{Domain, State};

/// Per-action timeout. Generous enough for a base-image qcow2 overlay or a
/// domain define/start, short enough that a wedged libvirt call doesn't hang
/// `apply`/`destroy` forever.
const ACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Completed-action counts by the *logical* action they satisfy. A
/// rewritten `Update` is two physical adapter calls (destroy, then create)
/// but counts once, as `updated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    pub failed: usize,
}

/// What a physical, post-rewrite action should tally toward once it
/// succeeds. The destroy half of a rewritten update tallies nothing — only
/// its paired create does, so the pair counts once as `updated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tally {
    Create,
    Update,
    Destroy,
    Silent,
}

/// Rewrite every `Update` into a `[Destroy, Create]` pair, tagging each
/// physical action with what it should count toward in the result summary.
/// The resource's identity (name, or pool+name for volumes) is unchanged
/// across an update — only attributes differ — so the same [`Resource`]
/// value serves both the destroy-by-identity call and the
/// create-with-new-attributes call.
fn rewrite_updates(plan: Plan) -> Vec<(Action, Tally)> {
    let mut out = Vec::with_capacity(plan.len());
    for action in plan {
        match action.action_type {
            ActionType::Update => {
                out.push((
                    Action {
                        action_type: ActionType::Destroy,
                        resource: action.resource.clone(),
                        reason: action.reason.clone(),
                    },
                    Tally::Silent,
                ));
                out.push((
                    Action { action_type: ActionType::Create, resource: action.resource, reason: action.reason },
                    Tally::Update,
                ));
            }
            ActionType::Create => out.push((action, Tally::Create)),
            ActionType::Destroy => out.push((action, Tally::Destroy)),
        }
    }
    out
}

/// Apply `plan` (diffed from `current` against `desired`) via `adapter`,
/// reporting one [`StepProgress`] step per action.
///
/// On the first failing action, returns [`RomulusError::Execution`] naming
/// how many actions already completed — the caller should re-run `plan` to
/// see what's left. `ctrl_c` is raced against each in-flight action; the
/// action is allowed to finish, and a press returns [`RomulusError::Cancelled`]
/// naming how many actions completed before it.
pub async fn execute(
    plan: &Plan,
    current: &State,
    desired: &State,
    config: &Config,
    adapter: &dyn HypervisorAdapter,
    progress: &mut StepProgress,
) -> Result<ExecutionResult, RomulusError> {
    let rewritten = rewrite_updates(plan.clone());
    let plan_for_validation: Plan = rewritten.iter().map(|(a, _)| a.clone()).collect();
    planner::validate(&plan_for_validation, current)?;

    let mut result = ExecutionResult::default();

    if rewritten.is_empty() {
        progress.println("No changes needed — infrastructure is up to date.");
        return Ok(result);
    }

    for (completed, (action, tally)) in rewritten.iter().enumerate() {
        let label = format!(
            "{} {} {}",
            action.action_type,
            action.resource_kind(),
            action.resource.display_name()
        );

        let outcome = progress
            .run(&label, |step| async move {
                let call = apply_action(action, desired, config, adapter);
                tokio::select! {
                    biased;
                    _ = tokio::signal::ctrl_c() => Outcome::Cancelled,
                    result = tokio::time::timeout(ACTION_TIMEOUT, call) => {
                        match result {
                            Ok(Ok(())) => {
                                step.log("done");
                                Outcome::Done
                            }
                            Ok(Err(e)) => Outcome::Failed(e),
                            Err(_) => Outcome::Failed(RomulusError::Timeout {
                                what: label_for(action),
                                timeout_s: ACTION_TIMEOUT.as_secs(),
                            }),
                        }
                    }
                }
            })
            .await;

        match outcome {
            Outcome::Done => match tally {
                Tally::Create => result.created += 1,
                Tally::Update => result.updated += 1,
                Tally::Destroy => result.destroyed += 1,
                Tally::Silent => {}
            },
            Outcome::Cancelled => {
                return Err(RomulusError::Cancelled { completed });
            }
            Outcome::Failed(reason) => {
                return Err(RomulusError::Execution {
                    completed,
                    action: action.action_type.to_string(),
                    resource: action.resource.display_name(),
                    reason: reason.to_string(),
                });
            }
        }
    }

    Ok(result)
}

enum Outcome {
    Done,
    Cancelled,
    Failed(RomulusError),
}

fn label_for(action: &Action) -> String {
    format!("{} {}", action.resource_kind(), action.resource.display_name())
}

/// Dispatch one action to the matching adapter method. Cloud-init volumes
/// are rendered here (not in the adapter) since rendering needs the
/// domain's role/static IP and the operator's SSH public key — both
/// config-level concerns the adapter trait deliberately knows nothing about.
async fn apply_action(
    action: &Action,
    desired: &State,
    config: &Config,
    adapter: &dyn HypervisorAdapter,
) -> Result<(), RomulusError> {
    match (&action.action_type, &action.resource) {
        (ActionType::Create, Resource::Pool(p)) => adapter.create_pool(p).await,
        (ActionType::Destroy, Resource::Pool(p)) => adapter.destroy_pool(p).await,

        (ActionType::Create, Resource::Network(n)) => adapter.create_network(n).await,
        (ActionType::Destroy, Resource::Network(n)) => adapter.destroy_network(n).await,

        (ActionType::Create, Resource::Volume(v)) if v.name.ends_with(".iso") => {
            let domain = desired
                .domains
                .iter()
                .find(|d| d.cloudinit_volume == v.name)
                .ok_or_else(|| RomulusError::Adapter {
                    action: "create".into(),
                    resource: v.name.clone(),
                    message: "cloud-init volume has no owning domain in the desired state".into(),
                })?;
            let iso_bytes = render_seed_iso(domain, config)?;
            adapter.create_cloudinit_volume(v, iso_bytes).await
        }
        (ActionType::Create, Resource::Volume(v)) => adapter.create_disk_volume(v).await,
        (ActionType::Destroy, Resource::Volume(v)) => adapter.destroy_volume(v).await,

        (ActionType::Create, Resource::Domain(d)) => adapter.create_domain(d).await,
        (ActionType::Destroy, Resource::Domain(d)) => adapter.destroy_domain(d).await,

        (action_type, resource) => Err(RomulusError::Adapter {
            action: action_type.to_string(),
            resource: resource.display_name(),
            message: "no adapter operation for this action/resource combination".into(),
        }),
    }
}

fn render_seed_iso(domain: &Domain, config: &Config) -> Result<Vec<u8>, RomulusError> {
    let ssh_key = paths::read_public_key(&config.ssh_public_key_path())?;
    cloudinit::build_seed_iso(domain, &ssh_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use crate::config::*;
    use crate::progress::OutputMode;
    use crate::projector;

    fn config() -> Config {
        Config {
            cluster: ClusterConfig { name: "k8s".into(), domain: "cluster.local".into() },
            network: NetworkConfig {
                name: "n".into(),
                mode: "nat".into(),
                cidr: "192.168.100.0/24".into(),
                dhcp: true,
                dns: true,
            },
            storage: StorageConfig {
                pool_name: "p".into(),
                pool_path: "/var/lib/romulus/p".into(),
                base_image: BaseImageConfig {
                    name: "base".into(),
                    url: "https://example.com/base.qcow2".into(),
                    format: "qcow2".into(),
                },
            },
            nodes: NodesConfig {
                masters: NodeGroupConfig {
                    count: 1,
                    memory: 2048,
                    vcpus: 2,
                    disk_size: "20G".into(),
                    ip_prefix: "10.10.10.".into(),
                },
                workers: NodeGroupConfig::default(),
            },
            ssh: SshConfig {
                public_key_path: String::new(),
                private_key_path: None,
                user: "ubuntu".into(),
            },
        }
    }

    fn write_ssh_key(config: &mut Config) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519.pub");
        std::fs::write(&path, "ssh-ed25519 AAAA...\n").unwrap();
        config.ssh.public_key_path = path.to_string_lossy().into_owned();
        dir
    }

    #[tokio::test]
    async fn apply_full_plan_to_empty_adapter() {
        let mut cfg = config();
        let _guard = write_ssh_key(&mut cfg);
        let desired = projector::project(&cfg);
        let plan = planner::diff(&State::empty(), &desired).unwrap();

        let adapter = MemoryAdapter::new();
        let mut progress = StepProgress::new(plan.len(), OutputMode::Quiet);
        let result =
            execute(&plan, &State::empty(), &desired, &cfg, &adapter, &mut progress).await.unwrap();

        let final_state = adapter.current_state().await.unwrap();
        assert_eq!(final_state.domains.len(), 1);
        assert_eq!(final_state, desired);
        assert_eq!(result.created, plan.len());
        assert_eq!(result.updated, 0);
        assert_eq!(result.destroyed, 0);
    }

    #[tokio::test]
    async fn replanning_after_apply_yields_no_further_changes() {
        let mut cfg = config();
        let _guard = write_ssh_key(&mut cfg);
        let desired = projector::project(&cfg);
        let plan = planner::diff(&State::empty(), &desired).unwrap();

        let adapter = MemoryAdapter::new();
        let mut progress = StepProgress::new(plan.len(), OutputMode::Quiet);
        execute(&plan, &State::empty(), &desired, &cfg, &adapter, &mut progress).await.unwrap();

        let observed = adapter.current_state().await.unwrap();
        let next_plan = planner::diff(&observed, &desired).unwrap();
        assert!(next_plan.is_empty());
    }

    #[tokio::test]
    async fn network_update_is_rewritten_to_destroy_then_create() {
        let mut cfg = config();
        let _guard = write_ssh_key(&mut cfg);
        let desired = projector::project(&cfg);
        let mut current = desired.clone();
        current.networks[0].cidr = "10.0.0.0/24".into();

        let adapter = MemoryAdapter::seeded(current.clone());
        let plan = planner::diff(&current, &desired).unwrap();
        let mut progress = StepProgress::new(plan.len().max(1), OutputMode::Quiet);
        let result =
            execute(&plan, &current, &desired, &cfg, &adapter, &mut progress).await.unwrap();

        let calls = adapter.calls.lock().unwrap();
        assert!(calls.iter().any(|c| c.starts_with("destroy network")));
        assert!(calls.iter().any(|c| c.starts_with("create network")));
        assert!(!calls.iter().any(|c| c.starts_with("update network")));
        assert_eq!(result.updated, 1);
        assert_eq!(result.created, 0);
        assert_eq!(result.destroyed, 0);
    }

    #[tokio::test]
    async fn empty_plan_is_a_no_op() {
        let cfg = config();
        let adapter = MemoryAdapter::new();
        let mut progress = StepProgress::new(1, OutputMode::Quiet);
        execute(&Vec::new(), &State::empty(), &State::empty(), &cfg, &adapter, &mut progress)
            .await
            .unwrap();
        assert!(adapter.calls.lock().unwrap().is_empty());
    }
}
