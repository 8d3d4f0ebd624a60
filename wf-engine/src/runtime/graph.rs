// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph traversal and readiness (§4.3.3). A step becomes ready once every
//! incoming edge from a step source is satisfied: the source step run is
//! complete, its `source_port` matches the edge, and the edge's optional
//! condition evaluates truthily. Multiple steps can become ready on the
//! same tick; callers order them by `(created_at, id)` before dispatch.

use crate::vars::VarContext;
use std::collections::{HashMap, HashSet};
use wf_core::id::{BlockGroupId, StepId};
use wf_core::model::project::{BlockGroup, BlockGroupType, Edge, ProjectVersion, Step};
use wf_core::model::run::{BlockGroupRun, Run, StepRun, StepRunStatus};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("CYCLE_DETECTED: step graph contains a cycle outside a loop group")]
    CycleDetected,
}

/// DFS cycle check over step-to-step edges, skipping edges whose endpoints
/// both sit inside the same `loop` block group (§9 "cyclic graph edges
/// only permitted inside loop groups").
pub fn detect_cycle(version: &ProjectVersion) -> Result<(), GraphError> {
    let loop_groups: HashSet<_> = version
        .block_groups
        .iter()
        .filter(|g| g.group_type == wf_core::model::project::BlockGroupType::Loop)
        .map(|g| g.id)
        .collect();

    let steps_by_id: HashMap<StepId, &Step> = version.steps.iter().map(|s| (s.id, s)).collect();

    let mut adjacency: HashMap<StepId, Vec<StepId>> = HashMap::new();
    for edge in &version.edges {
        let (Some(source), Some(target)) = (edge.source_step_id, edge.target_step_id) else {
            continue;
        };
        let in_same_loop = steps_by_id
            .get(&source)
            .zip(steps_by_id.get(&target))
            .and_then(|(s, t)| s.block_group_id.zip(t.block_group_id))
            .is_some_and(|(sg, tg)| sg == tg && loop_groups.contains(&sg));
        if in_same_loop {
            continue;
        }
        adjacency.entry(source).or_default().push(target);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<StepId, Mark> = HashMap::new();

    fn visit(
        node: StepId,
        adjacency: &HashMap<StepId, Vec<StepId>>,
        marks: &mut HashMap<StepId, Mark>,
    ) -> Result<(), GraphError> {
        match marks.get(&node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(GraphError::CycleDetected),
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(children) = adjacency.get(&node) {
            for &child in children {
                visit(child, adjacency, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for &node in adjacency.keys() {
        visit(node, &adjacency, &mut marks)?;
    }
    Ok(())
}

/// The set of steps ready to dispatch on this tick, each already carrying
/// its resolved input context.
pub struct ReadyStep<'a> {
    pub step: &'a Step,
    pub input: serde_json::Value,
}

/// Steps ready to dispatch, including the entry members of every block
/// group that already has an in-flight `BlockGroupRun` (§4.3.4): the group
/// driver itself is folded in `runtime::run::Runtime::tick`, but once a
/// group is active its members become ordinary graph-readiness citizens.
pub fn ready_steps<'a>(
    version: &'a ProjectVersion,
    run: &Run,
    step_runs: &[StepRun],
    block_group_runs: &[BlockGroupRun],
    vars: &serde_json::Value,
) -> Vec<ReadyStep<'a>> {
    let latest_by_step: HashMap<StepId, &StepRun> = latest_attempt_per_step(step_runs);
    let named_outputs: Vec<(&str, &StepRun)> = step_runs_by_name(version, &latest_by_step);
    let ctx = VarContext::build(run, vars, &named_outputs, None);

    let active_groups: HashSet<BlockGroupId> = block_group_runs
        .iter()
        .filter(|g| !g.status.is_terminal())
        .map(|g| g.block_group_id)
        .collect();

    let mut entry_members: HashSet<StepId> = HashSet::new();
    for &group_id in &active_groups {
        let Some(group) = version.block_groups.iter().find(|g| g.id == group_id) else {
            continue;
        };
        let candidates = group_entry_members(version, group_id);
        match group.group_type {
            BlockGroupType::Condition | BlockGroupType::Switch => {
                let branch = select_branch(group, &ctx);
                entry_members.extend(
                    candidates
                        .into_iter()
                        .filter(|s| s.group_role.as_deref() == Some(branch.as_str()))
                        .map(|s| s.id),
                );
            }
            _ => entry_members.extend(candidates.into_iter().map(|s| s.id)),
        }
    }

    let incoming: HashMap<StepId, Vec<&Edge>> = version.edges.iter().filter_map(|e| e.target_step_id.map(|t| (t, e))).fold(
        HashMap::new(),
        |mut acc, (target, edge)| {
            acc.entry(target).or_insert_with(Vec::new).push(edge);
            acc
        },
    );

    let mut ready = Vec::new();

    for step in &version.steps {
        if let Some(group_id) = step.block_group_id {
            // A member whose group has not (yet) started is dispatched by
            // the group driver admitting it, not by direct readiness.
            if !active_groups.contains(&group_id) {
                continue;
            }
        }

        if step.id == run.start_step_id {
            if !latest_by_step.contains_key(&step.id) {
                ready.push(ReadyStep {
                    step,
                    input: run.input.clone(),
                });
            }
            continue;
        }

        if latest_by_step.contains_key(&step.id) {
            continue;
        }

        if entry_members.contains(&step.id) {
            ready.push(ReadyStep {
                step,
                input: ctx.as_value().clone(),
            });
            continue;
        }

        let Some(edges) = incoming.get(&step.id) else {
            continue;
        };
        let step_edges: Vec<&&Edge> = edges.iter().filter(|e| e.source_step_id.is_some()).collect();
        if step_edges.is_empty() {
            continue;
        }

        let all_satisfied = step_edges.iter().all(|edge| edge_satisfied(edge, &latest_by_step, &ctx));
        if all_satisfied {
            ready.push(ReadyStep {
                step,
                input: ctx.as_value().clone(),
            });
        }
    }

    ready.sort_by_key(|r| (r.step.created_at, r.step.id));
    ready
}

/// Top-level block groups (never nested) whose incoming edges have just
/// been satisfied and that have no `BlockGroupRun` on record yet.
pub fn ready_groups<'a>(
    version: &'a ProjectVersion,
    run: &Run,
    step_runs: &[StepRun],
    block_group_runs: &[BlockGroupRun],
    vars: &serde_json::Value,
) -> Vec<&'a BlockGroup> {
    let latest_by_step = latest_attempt_per_step(step_runs);
    let named_outputs = step_runs_by_name(version, &latest_by_step);
    let ctx = VarContext::build(run, vars, &named_outputs, None);

    let started: HashSet<BlockGroupId> = block_group_runs.iter().map(|g| g.block_group_id).collect();

    let incoming_to_group: HashMap<BlockGroupId, Vec<&Edge>> =
        version.edges.iter().filter_map(|e| e.target_block_group_id.map(|g| (g, e))).fold(
            HashMap::new(),
            |mut acc, (group_id, edge)| {
                acc.entry(group_id).or_insert_with(Vec::new).push(edge);
                acc
            },
        );

    let mut ready = Vec::new();
    for group in &version.block_groups {
        // Nested groups are admitted by their parent's own dispatch, not
        // by top-level edge readiness (§3 MAX_GROUP_DEPTH nesting).
        if group.parent_group_id.is_some() {
            continue;
        }
        if started.contains(&group.id) {
            continue;
        }
        let Some(edges) = incoming_to_group.get(&group.id) else {
            continue;
        };
        let group_edges: Vec<&&Edge> = edges.iter().filter(|e| e.source_step_id.is_some()).collect();
        if group_edges.is_empty() {
            continue;
        }
        if group_edges.iter().all(|edge| edge_satisfied(edge, &latest_by_step, &ctx)) {
            ready.push(group);
        }
    }
    ready
}

/// Every step belonging to `group_id`, in no particular order.
pub fn group_members<'a>(version: &'a ProjectVersion, group_id: BlockGroupId) -> Vec<&'a Step> {
    version.steps.iter().filter(|s| s.block_group_id == Some(group_id)).collect()
}

/// The subset of a group's members with no incoming edge from another
/// member of the same group — the steps a group dispatches first.
pub fn group_entry_members<'a>(version: &'a ProjectVersion, group_id: BlockGroupId) -> Vec<&'a Step> {
    let members = group_members(version, group_id);
    let member_ids: HashSet<StepId> = members.iter().map(|s| s.id).collect();
    let has_intra_incoming: HashSet<StepId> = version
        .edges
        .iter()
        .filter_map(|e| match (e.source_step_id, e.target_step_id) {
            (Some(source), Some(target)) if member_ids.contains(&source) && member_ids.contains(&target) => Some(target),
            _ => None,
        })
        .collect();
    members.into_iter().filter(|s| !has_intra_incoming.contains(&s.id)).collect()
}

/// Resolves the branch a `condition`/`switch` group takes (§4.3.4), mirroring
/// the single-step `condition`/`switch` evaluation in `StepExecutor`.
pub fn select_branch(group: &BlockGroup, ctx: &VarContext) -> String {
    match group.group_type {
        BlockGroupType::Condition => {
            let expr = group.config.get("expression").and_then(serde_json::Value::as_str).unwrap_or("");
            let truthy = ctx
                .get(expr)
                .ok()
                .flatten()
                .map(|v| v.as_bool().unwrap_or(!v.is_null()))
                .unwrap_or(false);
            if truthy { "true".to_string() } else { "false".to_string() }
        }
        BlockGroupType::Switch => {
            if let Some(cases) = group.config.get("cases").and_then(serde_json::Value::as_array) {
                for case in cases {
                    let Some(port) = case.get("port").and_then(serde_json::Value::as_str) else {
                        continue;
                    };
                    let Some(expr) = case.get("when").and_then(serde_json::Value::as_str) else {
                        continue;
                    };
                    let truthy = ctx
                        .get(expr)
                        .ok()
                        .flatten()
                        .map(|v| v.as_bool().unwrap_or(!v.is_null()))
                        .unwrap_or(false);
                    if truthy {
                        return port.to_string();
                    }
                }
            }
            group
                .config
                .get("default_port")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("default")
                .to_string()
        }
        _ => "default".to_string(),
    }
}

fn edge_satisfied(edge: &Edge, latest_by_step: &HashMap<StepId, &StepRun>, ctx: &VarContext) -> bool {
    let Some(source_id) = edge.source_step_id else {
        return false;
    };
    let Some(source_run) = latest_by_step.get(&source_id) else {
        return false;
    };
    if source_run.status != StepRunStatus::Completed {
        return false;
    }

    let port_matches = match source_run.output.as_ref().and_then(|o| o.get("port")).and_then(|p| p.as_str()) {
        Some(port) => port == edge.source_port,
        None => edge.source_port == "default",
    };
    if !port_matches {
        return false;
    }

    match &edge.condition {
        None => true,
        Some(condition) => condition
            .as_str()
            .and_then(|expr| ctx.get(expr).ok().flatten())
            .map(|v| v.as_bool().unwrap_or(!v.is_null()))
            .unwrap_or(false),
    }
}

pub(crate) fn latest_attempt_per_step(step_runs: &[StepRun]) -> HashMap<StepId, &StepRun> {
    let mut map: HashMap<StepId, &StepRun> = HashMap::new();
    for step_run in step_runs {
        map.entry(step_run.step_id)
            .and_modify(|existing| {
                if step_run.attempt > existing.attempt {
                    *existing = step_run;
                }
            })
            .or_insert(step_run);
    }
    map
}

pub(crate) fn step_runs_by_name<'a>(
    version: &'a ProjectVersion,
    latest_by_step: &HashMap<StepId, &'a StepRun>,
) -> Vec<(&'a str, &'a StepRun)> {
    version
        .steps
        .iter()
        .filter_map(|s| latest_by_step.get(&s.id).map(|run| (s.name.as_str(), *run)))
        .collect()
}
