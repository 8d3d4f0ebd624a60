// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block-group dispatch and completion rules (§4.3.4). Each group type
//! drives its children differently; this module holds the pure decision
//! logic the runtime's tick consults, kept separate from dispatch so it
//! can be exercised without a full run fixture.

use wf_core::model::project::BlockGroupType;
use wf_core::model::run::StepRunStatus;

pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("LOOP_LIMIT_EXCEEDED: loop group exceeded {0} iterations")]
    LoopLimitExceeded(u32),
    #[error("AGENT_STALLED: agent group made no tool call by iteration {0}")]
    AgentStalled(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    /// Not every member has reached a terminal state yet.
    InProgress,
    /// Every member succeeded (or was legitimately skipped).
    Completed,
    /// At least one member failed in a way that fails the group.
    Failed,
}

/// Evaluates completion for `sequence` and `parallel` groups: both require
/// every member to reach a terminal state; either fails the group the
/// moment one member fails (sequence halts immediately, parallel still
/// waits for siblings already in flight to settle before reporting).
pub fn fan_out_outcome(group_type: BlockGroupType, member_statuses: &[StepRunStatus]) -> GroupOutcome {
    debug_assert!(matches!(group_type, BlockGroupType::Sequence | BlockGroupType::Parallel));

    if member_statuses.iter().any(|s| *s == StepRunStatus::Failed) {
        let all_settled = member_statuses.iter().all(|s| s.is_terminal());
        return if group_type == BlockGroupType::Parallel && !all_settled {
            GroupOutcome::InProgress
        } else {
            GroupOutcome::Failed
        };
    }
    if member_statuses.iter().all(|s| s.is_terminal()) {
        GroupOutcome::Completed
    } else {
        GroupOutcome::InProgress
    }
}

/// `condition`/`switch` groups resolve a single branch; completion follows
/// that branch's own member statuses only.
pub fn branch_outcome(branch_member_statuses: &[StepRunStatus]) -> GroupOutcome {
    if branch_member_statuses.iter().any(|s| *s == StepRunStatus::Failed) {
        GroupOutcome::Failed
    } else if branch_member_statuses.iter().all(|s| s.is_terminal()) {
        GroupOutcome::Completed
    } else {
        GroupOutcome::InProgress
    }
}

/// Admits the next loop iteration, or rejects with `LOOP_LIMIT_EXCEEDED`
/// once `config.max_iterations` (default 100) is reached.
pub fn next_loop_iteration(current_iteration: u32, max_iterations: Option<u32>) -> Result<u32, GroupError> {
    let limit = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
    let next = current_iteration + 1;
    if next > limit {
        return Err(GroupError::LoopLimitExceeded(limit));
    }
    Ok(next)
}

/// Agent groups terminate when a turn produces no tool call, or are
/// rejected once `max_iterations` turns pass without one (§9
/// "agent loop termination bounded by max_iterations + AGENT_STALLED
/// detection").
pub fn should_continue_agent_turn(
    iteration: u32,
    max_iterations: Option<u32>,
    last_turn_made_tool_call: bool,
) -> Result<bool, GroupError> {
    if !last_turn_made_tool_call {
        return Ok(false);
    }
    let limit = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
    if iteration >= limit {
        return Err(GroupError::AgentStalled(limit));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_completes_once_all_members_settle() {
        let statuses = vec![StepRunStatus::Completed, StepRunStatus::Completed];
        assert_eq!(
            fan_out_outcome(BlockGroupType::Sequence, &statuses),
            GroupOutcome::Completed
        );
    }

    #[test]
    fn sequence_fails_immediately_on_a_member_failure() {
        let statuses = vec![StepRunStatus::Completed, StepRunStatus::Failed, StepRunStatus::Pending];
        assert_eq!(fan_out_outcome(BlockGroupType::Sequence, &statuses), GroupOutcome::Failed);
    }

    #[test]
    fn parallel_waits_for_in_flight_siblings_before_failing() {
        let statuses = vec![StepRunStatus::Running, StepRunStatus::Failed];
        assert_eq!(
            fan_out_outcome(BlockGroupType::Parallel, &statuses),
            GroupOutcome::InProgress
        );
    }

    #[test]
    fn loop_rejects_past_the_configured_limit() {
        assert_eq!(next_loop_iteration(2, Some(3)).unwrap(), 3);
        assert_eq!(
            next_loop_iteration(3, Some(3)),
            Err(GroupError::LoopLimitExceeded(3))
        );
    }

    #[test]
    fn loop_falls_back_to_the_default_limit() {
        assert_eq!(
            next_loop_iteration(DEFAULT_MAX_ITERATIONS, None),
            Err(GroupError::LoopLimitExceeded(DEFAULT_MAX_ITERATIONS))
        );
    }

    #[test]
    fn agent_turn_stops_cleanly_without_a_tool_call() {
        assert_eq!(should_continue_agent_turn(1, Some(10), false), Ok(false));
    }

    #[test]
    fn agent_turn_stalls_past_the_limit_while_still_calling_tools() {
        assert_eq!(
            should_continue_agent_turn(10, Some(10), true),
            Err(GroupError::AgentStalled(10))
        );
    }
}
