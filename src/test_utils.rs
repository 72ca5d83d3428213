//! Shared test utilities and arbitrary generators for property-based testing.

use std::ops::Range;

use chrono::DateTime;
use proptest::prelude::*;

use crate::types::{
    Actor, Field, Job, JobId, Repository, RunId, Step, StepNumber, Timestamp, UserId, Workflow,
    WorkflowId, WorkflowRun,
};

pub fn arb_field<T, S>(value: S) -> BoxedStrategy<Field<T>>
where
    T: Clone + std::fmt::Debug + 'static,
    S: Strategy<Value = T> + 'static,
{
    prop_oneof![
        Just(Field::Absent),
        Just(Field::Null),
        value.prop_map(Field::Value),
    ]
    .boxed()
}

pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    (1_500_000_000i64..1_900_000_000)
        .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_default())
}

pub fn arb_status() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["queued", "in_progress", "completed", "waiting"])
        .prop_map(String::from)
}

pub fn arb_conclusion() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["success", "failure", "cancelled", "skipped"]).prop_map(String::from)
}

pub fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,12}".prop_map(String::from)
}

pub fn arb_step(number: u64) -> BoxedStrategy<Step> {
    (
        arb_field(arb_name()),
        arb_field(arb_status()),
        arb_field(arb_conclusion()),
        arb_field(arb_timestamp()),
        arb_field(arb_timestamp()),
    )
        .prop_map(
            move |(name, status, conclusion, started_at, completed_at)| Step {
                number: StepNumber(number),
                name,
                status,
                conclusion,
                started_at,
                completed_at,
            },
        )
        .boxed()
}

fn arb_steps() -> BoxedStrategy<std::collections::BTreeMap<StepNumber, Step>> {
    prop::collection::vec(1u64..6, 0..3).prop_flat_map(|numbers| {
        numbers
            .into_iter()
            .map(|n| arb_step(n).prop_map(move |s| (StepNumber(n), s)))
            .collect::<Vec<_>>()
            .prop_map(|pairs| pairs.into_iter().collect())
    })
    .boxed()
}

fn arb_job_with_id(id: u64) -> BoxedStrategy<Job> {
    (
        (
            arb_field(arb_name()),
            arb_field(arb_status()),
            arb_field(arb_conclusion()),
            arb_field(arb_timestamp()),
            arb_field(arb_timestamp()),
            arb_field(arb_timestamp()),
        ),
        (
            arb_field(0u64..50),
            arb_field(arb_name()),
            arb_field(0u64..5),
            arb_field(arb_name()),
            arb_field(prop::collection::vec(arb_name(), 0..3)),
            arb_steps(),
        ),
    )
        .prop_map(
            move |(
                (name, status, conclusion, created_at, started_at, completed_at),
                (runner_id, runner_name, runner_group_id, runner_group_name, labels, steps),
            )| Job {
                id: JobId(id),
                run_id: Field::Absent,
                name,
                status,
                conclusion,
                created_at,
                started_at,
                completed_at,
                runner_id,
                runner_name,
                runner_group_id,
                runner_group_name,
                labels,
                steps,
            },
        )
        .boxed()
}

pub fn arb_job() -> BoxedStrategy<Job> {
    (0u64..4).prop_flat_map(arb_job_with_id).boxed()
}

fn arb_jobs(keys: Range<u64>) -> BoxedStrategy<std::collections::BTreeMap<JobId, Job>> {
    prop::collection::vec(keys, 0..3).prop_flat_map(|ids| {
        ids.into_iter()
            .map(|id| arb_job_with_id(id).prop_map(move |job| (JobId(id), job)))
            .collect::<Vec<_>>()
            .prop_map(|pairs| pairs.into_iter().collect())
    })
    .boxed()
}

pub fn arb_actor() -> BoxedStrategy<Actor> {
    (arb_field((1u64..100).prop_map(UserId)), arb_field(arb_name()))
        .prop_map(|(id, login)| Actor { id, login })
        .boxed()
}

/// A partial run whose job keys are drawn from `job_keys`.
pub fn arb_run_with_jobs(job_keys: Range<u64>) -> BoxedStrategy<WorkflowRun> {
    (
        (
            arb_field((1u64..4).prop_map(WorkflowId)),
            arb_field(arb_name()),
            arb_field(1u64..500),
            arb_field(1u32..4),
            arb_field(prop::sample::select(vec!["push", "pull_request"]).prop_map(String::from)),
            arb_field(arb_status()),
            arb_field(arb_conclusion()),
        ),
        (
            arb_field(arb_name()),
            arb_field("[0-9a-f]{40}".prop_map(String::from)),
            arb_field(arb_timestamp()),
            arb_field(arb_timestamp()),
            arb_field(arb_timestamp()),
            arb_field(arb_actor()),
            arb_jobs(job_keys),
        ),
    )
        .prop_map(
            |(
                (workflow_id, name, run_number, attempt, event, status, conclusion),
                (head_branch, head_sha, created_at, updated_at, run_started_at, triggered_by, jobs),
            )| WorkflowRun {
                id: RunId(100),
                workflow_id,
                name,
                run_number,
                attempt,
                event,
                status,
                conclusion,
                head_branch,
                head_sha,
                created_at,
                updated_at,
                run_started_at,
                triggered_by,
                jobs,
            },
        )
        .boxed()
}

pub fn arb_run() -> BoxedStrategy<WorkflowRun> {
    arb_run_with_jobs(0..6)
}

/// Two partial views of the same run that never report the same field.
///
/// Scalar fields are assigned to one side or the other by a random mask and
/// the two sides draw job keys from non-overlapping ranges.
pub fn disjoint_runs() -> BoxedStrategy<(WorkflowRun, WorkflowRun)> {
    (
        arb_run_with_jobs(0..10),
        arb_run_with_jobs(10..20),
        prop::collection::vec(any::<bool>(), 13),
    )
        .prop_map(|(mut first, mut second, mask)| {
            macro_rules! split {
                ($($idx:literal => $field:ident),* $(,)?) => {
                    $(
                        if mask[$idx] {
                            second.$field = Field::Absent;
                        } else {
                            first.$field = Field::Absent;
                        }
                    )*
                };
            }
            split!(
                0 => workflow_id,
                1 => name,
                2 => run_number,
                3 => attempt,
                4 => event,
                5 => status,
                6 => conclusion,
                7 => head_branch,
                8 => head_sha,
                9 => created_at,
                10 => updated_at,
                11 => run_started_at,
                12 => triggered_by,
            );
            (first, second)
        })
        .boxed()
}

pub fn arb_workflow(id: u64) -> BoxedStrategy<Workflow> {
    (
        arb_field(arb_name()),
        arb_field(".github/workflows/[a-z]{1,8}\\.yml".prop_map(String::from)),
        arb_field(prop::sample::select(vec!["active", "disabled_manually"]).prop_map(String::from)),
        arb_field(arb_timestamp()),
        prop::option::of(arb_run()),
    )
        .prop_map(move |(name, path, state, updated_at, run)| Workflow {
            id: WorkflowId(id),
            name,
            path,
            state,
            updated_at,
            runs: run.map(|r| (r.id, r)).into_iter().collect(),
            ..Default::default()
        })
        .boxed()
}

pub fn arb_repository() -> BoxedStrategy<Repository> {
    (
        arb_field(arb_name()),
        arb_field("[a-z]{1,6}/[a-z]{1,6}".prop_map(String::from)),
        arb_field(any::<bool>()),
        arb_field(any::<bool>()),
        arb_field("[a-zA-Z ]{0,20}".prop_map(String::from)),
        prop::collection::vec(1u64..4, 0..3),
    )
        .prop_flat_map(|(name, full_name, private, fork, description, workflow_ids)| {
            let workflows = workflow_ids
                .into_iter()
                .map(|id| arb_workflow(id).prop_map(move |w| (WorkflowId(id), w)))
                .collect::<Vec<_>>();
            workflows.prop_map(move |pairs| Repository {
                id: crate::types::RepoId(1),
                name: name.clone(),
                full_name: full_name.clone(),
                private: private.clone(),
                fork: fork.clone(),
                description: description.clone(),
                workflows: pairs.into_iter().collect(),
                ..Default::default()
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    /// The default test thread stack, pinned so `RUST_MIN_STACK` cannot hide
    /// a strategy that nests too deeply.
    const TEST_THREAD_STACK: usize = 2 * 1024 * 1024;

    #[test]
    fn nested_strategies_fit_default_test_stack() {
        let handle = std::thread::Builder::new()
            .stack_size(TEST_THREAD_STACK)
            .spawn(|| {
                let mut runner = TestRunner::deterministic();
                for _ in 0..32 {
                    let (first, second) = disjoint_runs()
                        .new_tree(&mut runner)
                        .unwrap()
                        .current();
                    assert!(first.jobs.keys().all(|id| !second.jobs.contains_key(id)));

                    let repo = arb_repository().new_tree(&mut runner).unwrap().current();
                    assert!(repo.workflows.len() <= 3);
                }
            })
            .unwrap();
        handle.join().unwrap();
    }
}
