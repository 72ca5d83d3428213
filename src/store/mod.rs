//! In-memory entity store.
//!
//! The store owns the whole mirrored tree:
//!
//! ```text
//! organizations ─ repositories ─ workflows ─ runs ─ jobs ─ steps
//! users ───────── repositories ─ ...
//! unowned_repositories           (owner not yet reported)
//! unplaced_runs                  (repository or workflow not yet known)
//! ```
//!
//! Every mutation goes through an `upsert_*` operation that stamps the key on
//! the incoming partial view and folds it into place with [`Merge`]. A child
//! arriving before its parent creates the parent as an ID-only stub. A
//! repository or run whose parent cannot be resolved yet waits in a detached
//! pool and is moved into the tree once a later update resolves it.
//!
//! # Concurrency
//!
//! The tree sits behind a single `std::sync::RwLock`. Upserts take the write
//! lock and reads take the read lock. Nothing awaits while holding it. A
//! poisoned lock is recovered: every merge completes before the guard drops,
//! so a panic elsewhere cannot leave a half-written entity behind.
//!
//! Reads return owned clones. Mutating a returned entity has no effect on the
//! store.

pub mod eviction;
pub mod merge;

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use serde::Serialize;
use tracing::trace;

pub use eviction::run_eviction_loop;
pub use merge::Merge;

use crate::types::{
    Field, Job, JobId, OrgId, Organization, Owner, OwnerRef, RepoId, Repository, RunId, User,
    UserId, Workflow, WorkflowId, WorkflowRun,
};

/// Where a placed run lives in the tree.
type RunLocation = (RepoId, WorkflowId);

/// The mirrored GitHub Actions state.
#[derive(Debug, Default)]
pub struct EntityStore {
    tree: RwLock<Tree>,
}

/// A serializable copy of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSnapshot {
    pub organizations: BTreeMap<OrgId, Organization>,
    pub users: BTreeMap<UserId, User>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unowned_repositories: BTreeMap<RepoId, Repository>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unplaced_runs: BTreeMap<RunId, WorkflowRun>,
}

#[derive(Debug, Default)]
struct Tree {
    organizations: BTreeMap<OrgId, Organization>,
    users: BTreeMap<UserId, User>,
    unowned_repositories: BTreeMap<RepoId, Repository>,
    unplaced_runs: BTreeMap<RunId, WorkflowRun>,
    index: Index,
    /// Last time each run was upserted, directly or through one of its jobs.
    touched: HashMap<RunId, Instant>,
}

/// Reverse lookups from a child key to its parent.
#[derive(Debug, Default)]
struct Index {
    repo_owner: HashMap<RepoId, OwnerRef>,
    workflow_repo: HashMap<WorkflowId, RepoId>,
    run_location: HashMap<RunId, RunLocation>,
    /// Repository reported alongside a run, kept until the run is placed.
    run_repo_hint: HashMap<RunId, RepoId>,
    job_run: HashMap<JobId, RunId>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Upserts ─────────────────────────────────────────────────────────────

    pub fn upsert_organization(&self, id: OrgId, partial: Organization) {
        self.write().upsert_organization(id, partial);
    }

    pub fn upsert_user(&self, id: UserId, partial: User) {
        self.write().upsert_user(id, partial);
    }

    /// Merges a repository, placing it under `partial.owner` when reported.
    ///
    /// A repository whose owner has never been reported is kept in the
    /// unowned pool. Reporting a different owner moves it, children included.
    pub fn upsert_repository(&self, id: RepoId, partial: Repository) {
        self.write().upsert_repository(id, partial);
    }

    /// Merges a workflow under `repo_id`, creating the repository stub if needed.
    pub fn upsert_workflow(&self, repo_id: RepoId, id: WorkflowId, partial: Workflow) {
        self.write().upsert_workflow(repo_id, id, partial);
    }

    /// Merges a workflow run.
    ///
    /// The run is placed under its repository and workflow once both are
    /// known. The repository comes from `repo` when given, otherwise from a
    /// previous hint or the workflow index. The workflow comes from
    /// `partial.workflow_id` or an earlier update of the same run. Until then
    /// the run waits in the unplaced pool.
    pub fn upsert_run(&self, repo: Option<RepoId>, id: RunId, partial: WorkflowRun) {
        self.write().upsert_run(repo, id, partial, Instant::now());
    }

    /// Merges a job under `run_id`, creating an unplaced run stub if the run
    /// is not known yet.
    pub fn upsert_job(&self, run_id: RunId, id: JobId, partial: Job) {
        self.write().upsert_job(run_id, id, partial, Instant::now());
    }

    /// Records that `user` is a member of `org`.
    pub fn add_member(&self, org: OrgId, user: UserId) {
        let mut tree = self.write();
        tree.users.entry(user).or_insert_with(|| User::stub(user));
        tree.org_mut(org).members.insert(user);
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    pub fn get_organization(&self, id: OrgId) -> Option<Organization> {
        self.read().organizations.get(&id).cloned()
    }

    pub fn get_user(&self, id: UserId) -> Option<User> {
        self.read().users.get(&id).cloned()
    }

    pub fn get_owner(&self, owner: OwnerRef) -> Option<Owner> {
        let tree = self.read();
        match owner {
            OwnerRef::Organization(id) => tree.organizations.get(&id).cloned().map(Owner::Organization),
            OwnerRef::User(id) => tree.users.get(&id).cloned().map(Owner::User),
        }
    }

    pub fn get_repository(&self, id: RepoId) -> Option<Repository> {
        self.read().repo(id).cloned()
    }

    pub fn get_workflow(&self, id: WorkflowId) -> Option<Workflow> {
        let tree = self.read();
        let repo = tree.index.workflow_repo.get(&id)?;
        tree.repo(*repo)?.workflows.get(&id).cloned()
    }

    pub fn get_run(&self, id: RunId) -> Option<WorkflowRun> {
        self.read().run(id).cloned()
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        let tree = self.read();
        let run = tree.index.job_run.get(&id)?;
        tree.run(*run)?.jobs.get(&id).cloned()
    }

    pub fn all_organizations(&self) -> BTreeMap<OrgId, Organization> {
        self.read().organizations.clone()
    }

    pub fn all_users(&self) -> BTreeMap<UserId, User> {
        self.read().users.clone()
    }

    /// Every known repository regardless of owner, keyed by ID.
    pub fn all_repositories(&self) -> BTreeMap<RepoId, Repository> {
        let tree = self.read();
        tree.repositories()
            .map(|(id, repo)| (*id, repo.clone()))
            .collect()
    }

    /// Every workflow of every known repository, keyed by ID.
    pub fn all_workflows(&self) -> BTreeMap<WorkflowId, Workflow> {
        let tree = self.read();
        tree.repositories()
            .flat_map(|(_, repo)| &repo.workflows)
            .map(|(id, workflow)| (*id, workflow.clone()))
            .collect()
    }

    /// Every run, placed or not, keyed by ID.
    pub fn all_runs(&self) -> BTreeMap<RunId, WorkflowRun> {
        let tree = self.read();
        tree.runs()
            .map(|(id, run)| (*id, run.clone()))
            .collect()
    }

    /// Every job of every run, keyed by ID.
    pub fn all_jobs(&self) -> BTreeMap<JobId, Job> {
        let tree = self.read();
        tree.runs()
            .flat_map(|(_, run)| &run.jobs)
            .map(|(id, job)| (*id, job.clone()))
            .collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let tree = self.read();
        StoreSnapshot {
            organizations: tree.organizations.clone(),
            users: tree.users.clone(),
            unowned_repositories: tree.unowned_repositories.clone(),
            unplaced_runs: tree.unplaced_runs.clone(),
        }
    }

    /// Number of runs held, placed or not.
    pub fn run_count(&self) -> usize {
        self.read().touched.len()
    }
}

impl Tree {
    // ─── Lookup ──────────────────────────────────────────────────────────────

    fn org_mut(&mut self, id: OrgId) -> &mut Organization {
        self.organizations
            .entry(id)
            .or_insert_with(|| Organization::stub(id))
    }

    fn user_mut(&mut self, id: UserId) -> &mut User {
        self.users.entry(id).or_insert_with(|| User::stub(id))
    }

    fn repo(&self, id: RepoId) -> Option<&Repository> {
        match self.index.repo_owner.get(&id) {
            Some(OwnerRef::Organization(org)) => self.organizations.get(org)?.repositories.get(&id),
            Some(OwnerRef::User(user)) => self.users.get(user)?.repositories.get(&id),
            None => self.unowned_repositories.get(&id),
        }
    }

    /// Returns the stored repository, creating an unowned stub if it is unknown.
    fn repo_mut(&mut self, id: RepoId) -> &mut Repository {
        let repositories = match self.index.repo_owner.get(&id).copied() {
            Some(OwnerRef::Organization(org)) => &mut self.org_mut(org).repositories,
            Some(OwnerRef::User(user)) => &mut self.user_mut(user).repositories,
            None => &mut self.unowned_repositories,
        };
        repositories
            .entry(id)
            .or_insert_with(|| Repository::stub(id))
    }

    fn take_repo(&mut self, id: RepoId) -> Option<Repository> {
        match self.index.repo_owner.remove(&id) {
            Some(OwnerRef::Organization(org)) => self.organizations.get_mut(&org)?.repositories.remove(&id),
            Some(OwnerRef::User(user)) => self.users.get_mut(&user)?.repositories.remove(&id),
            None => self.unowned_repositories.remove(&id),
        }
    }

    fn repositories(&self) -> impl Iterator<Item = (&RepoId, &Repository)> {
        let owned_by_orgs = self.organizations.values().flat_map(|o| &o.repositories);
        let owned_by_users = self.users.values().flat_map(|u| &u.repositories);
        owned_by_orgs
            .chain(owned_by_users)
            .chain(&self.unowned_repositories)
    }

    fn runs(&self) -> impl Iterator<Item = (&RunId, &WorkflowRun)> {
        self.repositories()
            .flat_map(|(_, repo)| repo.workflows.values())
            .flat_map(|workflow| &workflow.runs)
            .chain(&self.unplaced_runs)
    }

    fn run(&self, id: RunId) -> Option<&WorkflowRun> {
        match self.index.run_location.get(&id) {
            Some((repo, workflow)) => self.repo(*repo)?.workflows.get(workflow)?.runs.get(&id),
            None => self.unplaced_runs.get(&id),
        }
    }

    fn run_mut(&mut self, id: RunId) -> &mut WorkflowRun {
        match self.index.run_location.get(&id).copied() {
            Some((repo, workflow)) => self.run_slot(repo, workflow, id),
            None => self
                .unplaced_runs
                .entry(id)
                .or_insert_with(|| WorkflowRun::stub(id)),
        }
    }

    /// Returns the run slot at a location, creating stubs along the way.
    fn run_slot(&mut self, repo: RepoId, workflow: WorkflowId, id: RunId) -> &mut WorkflowRun {
        self.index.workflow_repo.entry(workflow).or_insert(repo);
        self.repo_mut(repo)
            .workflows
            .entry(workflow)
            .or_insert_with(|| Workflow::stub(workflow))
            .runs
            .entry(id)
            .or_insert_with(|| WorkflowRun::stub(id))
    }

    fn take_run(&mut self, id: RunId) -> Option<WorkflowRun> {
        match self.index.run_location.remove(&id) {
            Some((repo, workflow)) => {
                let repo = match self.index.repo_owner.get(&repo).copied() {
                    Some(OwnerRef::Organization(org)) => {
                        self.organizations.get_mut(&org)?.repositories.get_mut(&repo)
                    }
                    Some(OwnerRef::User(user)) => {
                        self.users.get_mut(&user)?.repositories.get_mut(&repo)
                    }
                    None => self.unowned_repositories.get_mut(&repo),
                }?;
                repo.workflows.get_mut(&workflow)?.runs.remove(&id)
            }
            None => self.unplaced_runs.remove(&id),
        }
    }

    // ─── Upserts ─────────────────────────────────────────────────────────────

    fn upsert_organization(&mut self, id: OrgId, mut partial: Organization) {
        partial.id = id;
        let repositories = std::mem::take(&mut partial.repositories);
        self.org_mut(id).merge(partial);

        for (repo_id, mut repo) in repositories {
            repo.owner = Field::Value(OwnerRef::Organization(id));
            self.upsert_repository(repo_id, repo);
        }
    }

    fn upsert_user(&mut self, id: UserId, mut partial: User) {
        partial.id = id;
        let repositories = std::mem::take(&mut partial.repositories);
        self.user_mut(id).merge(partial);

        for (repo_id, mut repo) in repositories {
            repo.owner = Field::Value(OwnerRef::User(id));
            self.upsert_repository(repo_id, repo);
        }
    }

    fn upsert_repository(&mut self, id: RepoId, mut partial: Repository) {
        partial.id = id;
        partial.owner = partial.owner.null_as_absent();
        let workflows = std::mem::take(&mut partial.workflows);

        let current_owner = self.index.repo_owner.get(&id).copied();
        let reported_owner = partial.owner.value().copied();
        match reported_owner {
            Some(owner) if Some(owner) != current_owner => {
                let mut repo = self.take_repo(id).unwrap_or_else(|| Repository::stub(id));
                repo.merge(partial);
                trace!(repo_id = %id, owner = %owner, "Placing repository under owner");

                let repositories = match owner {
                    OwnerRef::Organization(org) => &mut self.org_mut(org).repositories,
                    OwnerRef::User(user) => &mut self.user_mut(user).repositories,
                };
                repositories
                    .entry(id)
                    .or_insert_with(|| Repository::stub(id))
                    .merge(repo);
                self.index.repo_owner.insert(id, owner);
            }
            _ => self.repo_mut(id).merge(partial),
        }

        for (workflow_id, workflow) in workflows {
            self.upsert_workflow(id, workflow_id, workflow);
        }
    }

    fn upsert_workflow(&mut self, repo_id: RepoId, id: WorkflowId, mut partial: Workflow) {
        partial.id = id;
        let runs = std::mem::take(&mut partial.runs);

        let previous = self.index.workflow_repo.insert(id, repo_id);
        let mut workflow = match previous {
            Some(old_repo) if old_repo != repo_id => {
                // Runs placed under the old repository move with the workflow.
                let moved = self.repo_mut(old_repo).workflows.remove(&id);
                if let Some(moved) = &moved {
                    for run_id in moved.runs.keys() {
                        self.index.run_location.insert(*run_id, (repo_id, id));
                    }
                }
                moved.unwrap_or_else(|| Workflow::stub(id))
            }
            _ => Workflow::stub(id),
        };
        workflow.merge(partial);
        self.repo_mut(repo_id)
            .workflows
            .entry(id)
            .or_insert_with(|| Workflow::stub(id))
            .merge(workflow);

        for (run_id, mut run) in runs {
            run.workflow_id = Field::Value(id);
            self.upsert_run(Some(repo_id), run_id, run, Instant::now());
        }
        self.adopt_unplaced_runs(id);
    }

    /// Places detached runs that were waiting for this workflow's repository.
    fn adopt_unplaced_runs(&mut self, workflow: WorkflowId) {
        let waiting: Vec<RunId> = self
            .unplaced_runs
            .iter()
            .filter(|(_, run)| run.workflow_id.value() == Some(&workflow))
            .map(|(id, _)| *id)
            .collect();

        for id in waiting {
            if let Some(location) = self.resolve_run_location(id, None, None) {
                self.place_run(id, location, WorkflowRun::stub(id));
            }
        }
    }

    fn upsert_run(&mut self, repo: Option<RepoId>, id: RunId, mut partial: WorkflowRun, now: Instant) {
        partial.id = id;
        partial.workflow_id = partial.workflow_id.null_as_absent();
        let jobs = std::mem::take(&mut partial.jobs);

        if let Some(repo) = repo {
            self.index.run_repo_hint.insert(id, repo);
        }
        self.touched.insert(id, now);

        let current = self.index.run_location.get(&id).copied();
        let target = self.resolve_run_location(id, repo, partial.workflow_id.value().copied());
        match target {
            Some(location) if Some(location) != current => self.place_run(id, location, partial),
            _ => self.run_mut(id).merge(partial),
        }

        for (job_id, job) in jobs {
            self.upsert_job(id, job_id, job, now);
        }
    }

    /// Works out where a run belongs from everything known about it.
    fn resolve_run_location(
        &self,
        id: RunId,
        repo: Option<RepoId>,
        workflow: Option<WorkflowId>,
    ) -> Option<RunLocation> {
        let current = self.index.run_location.get(&id).copied();
        let workflow = workflow
            .or(current.map(|(_, w)| w))
            .or_else(|| self.unplaced_runs.get(&id)?.workflow_id.value().copied())?;
        let repo = repo
            .or_else(|| self.index.run_repo_hint.get(&id).copied())
            .or(current.map(|(r, _)| r))
            .or_else(|| self.index.workflow_repo.get(&workflow).copied())?;
        Some((repo, workflow))
    }

    /// Moves a run (placed or detached) to `location`, merging `partial` on the way.
    fn place_run(&mut self, id: RunId, location: RunLocation, partial: WorkflowRun) {
        let mut run = self.take_run(id).unwrap_or_else(|| WorkflowRun::stub(id));
        run.merge(partial);
        let (repo, workflow) = location;
        trace!(run_id = %id, repo_id = %repo, workflow_id = %workflow, "Placing run");

        self.run_slot(repo, workflow, id).merge(run);
        self.index.run_location.insert(id, location);
        self.index.run_repo_hint.remove(&id);
    }

    fn upsert_job(&mut self, run_id: RunId, id: JobId, mut partial: Job, now: Instant) {
        partial.id = id;
        partial.run_id = Field::Value(run_id);

        self.touched.insert(run_id, now);
        self.index.job_run.insert(id, run_id);
        self.run_mut(run_id)
            .jobs
            .entry(id)
            .or_insert_with(|| Job::stub(id))
            .merge(partial);
    }

    // ─── Removal ─────────────────────────────────────────────────────────────

    /// Removes a run and every index entry pointing at it or its jobs.
    fn remove_run(&mut self, id: RunId) -> Option<WorkflowRun> {
        let run = self.take_run(id);
        self.index.run_repo_hint.remove(&id);
        self.touched.remove(&id);
        if let Some(run) = &run {
            for job_id in run.jobs.keys() {
                self.index.job_run.remove(job_id);
            }
        }
        run
    }
}
