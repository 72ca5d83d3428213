//! Field-level reconciliation of partial views into stored state.
//!
//! Both ingestion paths (REST backfill and webhooks) describe the same
//! entities with different subsets of attributes and arrive in no particular
//! order. [`Merge`] folds an incoming partial view into the stored value:
//!
//! - an absent field leaves the stored value untouched
//! - a null or concrete field overwrites it (last writer wins per field)
//! - child collections are merged key by key and never shrink
//!
//! The entity's own key (`id`, `number`, `sha`, `tag_name`) is not merged.
//! The store stamps it before calling [`Merge::merge`].
//!
//! The rule is idempotent and commutes for updates that touch disjoint fields.
//! It does not commute when two updates disagree on the same field.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{
    Actor, Commit, Field, Job, Organization, Release, Repository, Step, User, Workflow,
    WorkflowRun,
};

/// Folds an incoming partial view into `self`.
pub trait Merge {
    fn merge(&mut self, incoming: Self);
}

impl<T> Merge for Field<T> {
    fn merge(&mut self, incoming: Self) {
        if incoming.is_reported() {
            *self = incoming;
        }
    }
}

/// Merges a field whose value is itself a partial view.
///
/// When both sides hold a value the values are merged recursively instead of
/// replaced, so an actor reported with only a login keeps its known ID.
pub fn merge_nested<T: Merge>(stored: &mut Field<T>, incoming: Field<T>) {
    match (&mut *stored, incoming) {
        (_, Field::Absent) => {}
        (Field::Value(current), Field::Value(update)) => current.merge(update),
        (slot, update) => *slot = update,
    }
}

impl<K: Ord, V: Merge> Merge for BTreeMap<K, V> {
    fn merge(&mut self, incoming: Self) {
        for (key, value) in incoming {
            match self.entry(key) {
                Entry::Occupied(mut slot) => slot.get_mut().merge(value),
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
        }
    }
}

impl<K: Ord> Merge for BTreeSet<K> {
    fn merge(&mut self, incoming: Self) {
        self.extend(incoming);
    }
}

impl Merge for Organization {
    fn merge(&mut self, incoming: Self) {
        self.login.merge(incoming.login);
        self.name.merge(incoming.name);
        self.description.merge(incoming.description);
        self.url.merge(incoming.url);
        self.html_url.merge(incoming.html_url);
        Merge::merge(&mut self.members, incoming.members);
        Merge::merge(&mut self.repositories, incoming.repositories);
    }
}

impl Merge for User {
    fn merge(&mut self, incoming: Self) {
        self.login.merge(incoming.login);
        self.name.merge(incoming.name);
        self.email.merge(incoming.email);
        Merge::merge(&mut self.repositories, incoming.repositories);
    }
}

impl Merge for Repository {
    fn merge(&mut self, incoming: Self) {
        self.name.merge(incoming.name);
        self.full_name.merge(incoming.full_name);
        self.owner.merge(incoming.owner.null_as_absent());
        self.private.merge(incoming.private);
        self.fork.merge(incoming.fork);
        self.description.merge(incoming.description);
        self.url.merge(incoming.url);
        self.html_url.merge(incoming.html_url);
        Merge::merge(&mut self.workflows, incoming.workflows);
        Merge::merge(&mut self.commits, incoming.commits);
        Merge::merge(&mut self.releases, incoming.releases);
    }
}

impl Merge for Workflow {
    fn merge(&mut self, incoming: Self) {
        self.name.merge(incoming.name);
        self.path.merge(incoming.path);
        self.state.merge(incoming.state);
        self.created_at.merge(incoming.created_at);
        self.updated_at.merge(incoming.updated_at);
        self.url.merge(incoming.url);
        self.html_url.merge(incoming.html_url);
        self.badge_url.merge(incoming.badge_url);
        Merge::merge(&mut self.runs, incoming.runs);
    }
}

impl Merge for Actor {
    fn merge(&mut self, incoming: Self) {
        self.id.merge(incoming.id);
        self.login.merge(incoming.login);
    }
}

impl Merge for WorkflowRun {
    fn merge(&mut self, incoming: Self) {
        self.workflow_id.merge(incoming.workflow_id.null_as_absent());
        self.name.merge(incoming.name);
        self.run_number.merge(incoming.run_number);
        self.attempt.merge(incoming.attempt);
        self.event.merge(incoming.event);
        self.status.merge(incoming.status);
        self.conclusion.merge(incoming.conclusion);
        self.head_branch.merge(incoming.head_branch);
        self.head_sha.merge(incoming.head_sha);
        self.created_at.merge(incoming.created_at);
        self.updated_at.merge(incoming.updated_at);
        self.run_started_at.merge(incoming.run_started_at);
        merge_nested(&mut self.triggered_by, incoming.triggered_by);
        Merge::merge(&mut self.jobs, incoming.jobs);
    }
}

impl Merge for Job {
    fn merge(&mut self, incoming: Self) {
        self.run_id.merge(incoming.run_id.null_as_absent());
        self.name.merge(incoming.name);
        self.status.merge(incoming.status);
        self.conclusion.merge(incoming.conclusion);
        self.created_at.merge(incoming.created_at);
        self.started_at.merge(incoming.started_at);
        self.completed_at.merge(incoming.completed_at);
        self.runner_id.merge(incoming.runner_id);
        self.runner_name.merge(incoming.runner_name);
        self.runner_group_id.merge(incoming.runner_group_id);
        self.runner_group_name.merge(incoming.runner_group_name);
        self.labels.merge(incoming.labels);
        Merge::merge(&mut self.steps, incoming.steps);
    }
}

impl Merge for Step {
    fn merge(&mut self, incoming: Self) {
        self.name.merge(incoming.name);
        self.status.merge(incoming.status);
        self.conclusion.merge(incoming.conclusion);
        self.started_at.merge(incoming.started_at);
        self.completed_at.merge(incoming.completed_at);
    }
}

impl Merge for Commit {
    fn merge(&mut self, incoming: Self) {
        self.message.merge(incoming.message);
        self.author.merge(incoming.author);
        self.date.merge(incoming.date);
    }
}

impl Merge for Release {
    fn merge(&mut self, incoming: Self) {
        self.released_at.merge(incoming.released_at);
    }
}

/// Returns `stored` with `incoming` merged into it.
pub fn merged<T: Merge>(mut stored: T, incoming: T) -> T {
    stored.merge(incoming);
    stored
}
