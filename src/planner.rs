//! Diffs two state snapshots into an ordered, dependency-respecting action
//! list, validates that ordering, and offers a conservative optimizer and
//! human-readable summaries.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::RomulusError;
use crate::state::{Domain, Identity, Network, Pool, State, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Update,
    Destroy,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pool,
    Network,
    Volume,
    Domain,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Pool => "pool",
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
            ResourceKind::Domain => "domain",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Network(Network),
    Pool(Pool),
    Volume(Volume),
    Domain(Domain),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Network(_) => ResourceKind::Network,
            Resource::Pool(_) => ResourceKind::Pool,
            Resource::Volume(_) => ResourceKind::Volume,
            Resource::Domain(_) => ResourceKind::Domain,
        }
    }

    pub fn identity(&self) -> Identity {
        match self {
            Resource::Network(n) => n.identity(),
            Resource::Pool(p) => p.identity(),
            Resource::Volume(v) => v.identity(),
            Resource::Domain(d) => d.identity(),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Resource::Network(n) => n.name.clone(),
            Resource::Pool(p) => p.name.clone(),
            Resource::Volume(v) => v.name.clone(),
            Resource::Domain(d) => d.name.clone(),
        }
    }

    /// Identities this resource's *creation* depends on existing first.
    fn dependencies(&self, all_volumes_by_name: &HashMap<String, &Volume>) -> Vec<Identity> {
        match self {
            Resource::Network(_) | Resource::Pool(_) => vec![],
            Resource::Volume(v) => {
                let mut deps = vec![Identity::Pool(v.pool.clone())];
                if let Some(backing) = &v.backing_volume
                    && let Some(bv) = all_volumes_by_name.get(backing)
                {
                    deps.push(bv.identity());
                }
                deps
            }
            Resource::Domain(d) => {
                let mut deps = vec![Identity::Network(d.network.clone())];
                if let Some(v) = all_volumes_by_name.get(&d.disk_volume) {
                    deps.push(v.identity());
                }
                if let Some(v) = all_volumes_by_name.get(&d.cloudinit_volume) {
                    deps.push(v.identity());
                }
                deps
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub action_type: ActionType,
    pub resource: Resource,
    pub reason: String,
}

impl Action {
    pub fn resource_kind(&self) -> ResourceKind {
        self.resource.kind()
    }
}

pub type Plan = Vec<Action>;

// ── diff ────────────────────────────────────────────────────────────

/// Diff `current` against `desired`, returning an ordered [`Plan`].
///
/// Both snapshots are validated for internal consistency first; a
/// violation returns [`RomulusError::Consistency`] naming the offending
/// reference.
pub fn diff(current: &State, desired: &State) -> Result<Plan, RomulusError> {
    current.validate()?;
    desired.validate()?;

    let (pool_actions, pool_destroys) = diff_items(&current.pools, &desired.pools, |p| p.identity());
    let (net_actions, net_destroys) =
        diff_items(&current.networks, &desired.networks, |n| n.identity());
    let (vol_actions, vol_destroys) =
        diff_items(&current.volumes, &desired.volumes, |v| v.identity());
    let (dom_actions, dom_destroys) =
        diff_items(&current.domains, &desired.domains, |d| d.identity());

    let mut plan = Vec::new();

    for (t, p, reason) in pool_actions {
        plan.push(Action { action_type: t, resource: Resource::Pool(p), reason });
    }
    for (t, n, reason) in net_actions {
        plan.push(Action { action_type: t, resource: Resource::Network(n), reason });
    }
    for (t, v, reason) in vol_actions {
        plan.push(Action { action_type: t, resource: Resource::Volume(v), reason });
    }
    for (t, d, reason) in dom_actions {
        plan.push(Action { action_type: t, resource: Resource::Domain(d), reason });
    }

    for (d, reason) in dom_destroys {
        plan.push(Action { action_type: ActionType::Destroy, resource: Resource::Domain(d), reason });
    }
    for (v, reason) in vol_destroys {
        plan.push(Action { action_type: ActionType::Destroy, resource: Resource::Volume(v), reason });
    }
    for (n, reason) in net_destroys {
        plan.push(Action { action_type: ActionType::Destroy, resource: Resource::Network(n), reason });
    }
    for (p, reason) in pool_destroys {
        plan.push(Action { action_type: ActionType::Destroy, resource: Resource::Pool(p), reason });
    }

    Ok(plan)
}

/// Split one resource kind's current/desired lists into (creates+updates,
/// in desired order) and (destroys, in current order), matching by identity.
#[allow(clippy::type_complexity)]
fn diff_items<T, F>(
    current: &[T],
    desired: &[T],
    identity: F,
) -> (Vec<(ActionType, T, String)>, Vec<(T, String)>)
where
    T: Clone + PartialEq,
    F: Fn(&T) -> Identity,
{
    let mut actions = Vec::new();
    for d in desired {
        let did = identity(d);
        match current.iter().find(|c| identity(c) == did) {
            None => actions.push((ActionType::Create, d.clone(), format!("{did} is missing"))),
            Some(c) if c != d => actions.push((
                ActionType::Update,
                d.clone(),
                format!("{did} attributes changed"),
            )),
            Some(_) => {}
        }
    }

    let mut destroys = Vec::new();
    for c in current {
        let cid = identity(c);
        if !desired.iter().any(|d| identity(d) == cid) {
            destroys.push((c.clone(), format!("{cid} is no longer desired")));
        }
    }

    (actions, destroys)
}

// ── validate ────────────────────────────────────────────────────────

/// Walk `plan` in order, maintaining a projected "will exist after step i"
/// set seeded from `current`. Fails with [`RomulusError::Dependency`] if an
/// action references a resource neither already present in `current` nor
/// created by an earlier step, and with [`RomulusError::Order`] if a
/// destroy removes a resource a later, surviving action still depends on.
pub fn validate(plan: &Plan, current: &State) -> Result<(), RomulusError> {
    let all_volumes: HashMap<String, &Volume> =
        plan.iter()
            .filter_map(|a| match &a.resource {
                Resource::Volume(v) => Some((v.name.clone(), v)),
                _ => None,
            })
            .chain(current.volumes.iter().map(|v| (v.name.clone(), v)))
            .collect();

    let mut exists: HashSet<Identity> = HashSet::new();
    for p in &current.pools {
        exists.insert(p.identity());
    }
    for n in &current.networks {
        exists.insert(n.identity());
    }
    for v in &current.volumes {
        exists.insert(v.identity());
    }
    for d in &current.domains {
        exists.insert(d.identity());
    }

    for (i, action) in plan.iter().enumerate() {
        match action.action_type {
            ActionType::Create | ActionType::Update => {
                for dep in action.resource.dependencies(&all_volumes) {
                    if !exists.contains(&dep) {
                        return Err(RomulusError::Dependency {
                            message: format!(
                                "{} references {dep}, which does not exist yet",
                                action.resource.identity()
                            ),
                        });
                    }
                }
                exists.insert(action.resource.identity());
            }
            ActionType::Destroy => {
                let id = action.resource.identity();
                exists.remove(&id);
                for later in &plan[i + 1..] {
                    if later.action_type == ActionType::Destroy {
                        continue;
                    }
                    if later.resource.dependencies(&all_volumes).contains(&id) {
                        return Err(RomulusError::Order {
                            message: format!(
                                "{id} is destroyed before {} stops depending on it",
                                later.resource.identity()
                            ),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

// ── optimize ────────────────────────────────────────────────────────

/// Conservatively rewrite `plan`, collapsing create/destroy pairs for the
/// same identity while never reordering actions across different
/// identities.
pub fn optimize(plan: Plan) -> Plan {
    let mut by_identity: HashMap<Identity, Vec<usize>> = HashMap::new();
    for (i, action) in plan.iter().enumerate() {
        by_identity.entry(action.resource.identity()).or_default().push(i);
    }

    let mut keep = vec![true; plan.len()];
    let mut replace_with: HashMap<usize, Action> = HashMap::new();

    for indices in by_identity.values() {
        let types: Vec<ActionType> = indices.iter().map(|&i| plan[i].action_type).collect();
        match types.as_slice() {
            // destroy(r) then create(r') only cancels if the two share the
            // same attributes — otherwise the create carries a real change
            // that must survive.
            [ActionType::Destroy, ActionType::Create]
                if plan[indices[0]].resource == plan[indices[1]].resource =>
            {
                for &i in indices {
                    keep[i] = false;
                }
            }
            // create(r) then destroy(r') always cancels: nothing ever
            // existed before and nothing exists after, regardless of r's
            // attributes.
            [ActionType::Create, ActionType::Destroy] => {
                for &i in indices {
                    keep[i] = false;
                }
            }
            [ActionType::Create, ActionType::Destroy, ActionType::Create] => {
                let first = indices[0];
                let last = indices[2];
                for &i in indices {
                    keep[i] = false;
                }
                replace_with.insert(first, plan[last].clone());
            }
            _ => {}
        }
    }

    let mut result = Vec::with_capacity(plan.len());
    for (i, action) in plan.into_iter().enumerate() {
        if let Some(replacement) = replace_with.remove(&i) {
            result.push(replacement);
        } else if keep[i] {
            result.push(action);
        }
    }
    result
}

// ── summary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub destroys: usize,
    pub by_kind: HashMap<ResourceKind, usize>,
    pub estimated_duration_secs: u64,
}

/// Coarse per-kind cost constants for the estimate — tests only assert
/// monotonic behavior, not exact durations.
fn cost_secs(kind: ResourceKind) -> u64 {
    match kind {
        ResourceKind::Pool => 2,
        ResourceKind::Network => 3,
        ResourceKind::Volume => 15,
        ResourceKind::Domain => 8,
    }
}

pub fn summary(plan: &Plan) -> PlanSummary {
    let mut s = PlanSummary::default();
    for action in plan {
        match action.action_type {
            ActionType::Create => s.creates += 1,
            ActionType::Update => s.updates += 1,
            ActionType::Destroy => s.destroys += 1,
        }
        *s.by_kind.entry(action.resource_kind()).or_insert(0) += 1;
        s.estimated_duration_secs += cost_secs(action.resource_kind());
    }
    s
}

// ── format ──────────────────────────────────────────────────────────

/// Render a human-readable plan, grouped by action type.
pub fn format(plan: &Plan) -> String {
    if plan.is_empty() {
        return "No changes needed — infrastructure is up to date.\n".to_string();
    }

    let mut out = String::new();
    for (label, action_type) in [
        ("Create", ActionType::Create),
        ("Update", ActionType::Update),
        ("Destroy", ActionType::Destroy),
    ] {
        let group: Vec<&Action> = plan.iter().filter(|a| a.action_type == action_type).collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("{label}:\n"));
        for action in group {
            out.push_str(&format!(
                "  [{}] {} — {}\n",
                action.resource_kind(),
                action.resource.display_name(),
                action.reason
            ));
        }
    }
    out.push_str(&format!("\n{} change(s)\n", plan.len()));
    out
}
