//! Convergence executor: walks the resource graph in declaration order,
//! applies planned steps through a `Host`, and dispatches notifications.
//!
//! Each resource moves `Pending -> Examining -> UpToDate | Applying ->
//! Converged | Failed`. The first failure halts the run; nothing declared
//! after it is examined and queued notifications are dropped.

use std::collections::{HashSet, VecDeque};

use log::{debug, error, info};

use crate::convergence::graph::ResourceGraph;
use crate::convergence::planner::{self, Step};
use crate::convergence::{alternatives, limits};
use crate::host::Host;
use crate::template::Renderer;
use crate::types::config::RunSettings;
use crate::types::report::{Failure, Report, ResourceOutcome, ResourceState};
use crate::types::resource::{Resource, ResourceId, Timing};

/// Marker for a halted run; the cause is already in the report.
struct Halt;

/// Converge every resource in `graph` against `host`.
pub fn converge(
    graph: &ResourceGraph,
    host: &mut dyn Host,
    renderer: &dyn Renderer,
    settings: &RunSettings,
) -> Report {
    let mut run = Run {
        host,
        renderer,
        settings,
        report: Report::new(settings.dry_run),
        notified: HashSet::new(),
        delayed: VecDeque::new(),
    };

    for resource in graph.resources() {
        if run.converge_one(graph, resource, false).is_err() {
            return run.report;
        }
    }

    while let Some(id) = run.delayed.pop_front() {
        let Some(resource) = graph.get(&id) else {
            continue;
        };
        if run.converge_one(graph, resource, true).is_err() {
            break;
        }
    }

    info!("{}", run.report.summary());
    run.report
}

struct Run<'a> {
    host: &'a mut dyn Host,
    renderer: &'a dyn Renderer,
    settings: &'a RunSettings,
    report: Report,
    /// Targets that have already been notified this run.
    notified: HashSet<ResourceId>,
    delayed: VecDeque<ResourceId>,
}

impl<'a> Run<'a> {
    fn converge_one(&mut self, graph: &ResourceGraph, resource: &Resource, notified: bool) -> Result<(), Halt> {
        let changed = self.examine_and_apply(resource, notified)?;
        if changed {
            self.fire(graph, resource)?;
        }
        Ok(())
    }

    /// Returns whether the resource changed the host (or would have).
    fn examine_and_apply(&mut self, resource: &Resource, notified: bool) -> Result<bool, Halt> {
        let id = resource.id();
        transition(&id, ResourceState::Pending, ResourceState::Examining);

        let steps = match planner::examine(resource, &*self.host, self.renderer, notified) {
            Ok(steps) => steps,
            Err(e) => return Err(self.fail(id, Vec::new(), notified, e.to_string())),
        };

        if steps.is_empty() {
            transition(&id, ResourceState::Examining, ResourceState::UpToDate);
            debug!("{} up to date", id);
            self.record(id, ResourceState::UpToDate, Vec::new(), notified);
            return Ok(false);
        }

        let described: Vec<String> = steps.iter().map(|s| s.to_string()).collect();

        if self.settings.dry_run {
            for step in &described {
                info!("{} would {}", id, step);
            }
            self.record(id, ResourceState::WouldApply, described, notified);
            return Ok(true);
        }

        transition(&id, ResourceState::Examining, ResourceState::Applying);
        for step in &steps {
            if let Err(cause) = apply_step(&mut *self.host, step) {
                return Err(self.fail(id, described, notified, cause));
            }
            debug!("{}: {}", id, step);
        }
        transition(&id, ResourceState::Applying, ResourceState::Converged);
        info!("{} converged ({})", id, described.join(", "));
        self.record(id, ResourceState::Converged, described, notified);
        Ok(true)
    }

    fn fire(&mut self, graph: &ResourceGraph, resource: &Resource) -> Result<(), Halt> {
        for n in &resource.notifies {
            if !self.notified.insert(n.target.clone()) {
                debug!("{} already notified; ignoring {}", n.target, resource.id());
                continue;
            }
            match n.timing {
                Timing::Immediate => {
                    let Some(target) = graph.get(&n.target) else {
                        continue;
                    };
                    debug!("{} notifies {} (immediate)", resource.id(), n.target);
                    self.converge_one(graph, target, true)?;
                }
                Timing::Delayed => {
                    if self.delayed.len() >= self.settings.max_notifications {
                        let cause = format!(
                            "notification queue full ({} pending)",
                            self.delayed.len()
                        );
                        return Err(self.fail_recorded(resource.id(), cause));
                    }
                    debug!("{} notifies {} (delayed)", resource.id(), n.target);
                    self.delayed.push_back(n.target.clone());
                }
            }
        }
        Ok(())
    }

    fn record(&mut self, id: ResourceId, state: ResourceState, steps: Vec<String>, notified: bool) {
        debug_assert!(state.is_terminal(), "{} recorded as {}", id, state);
        self.report.outcomes.push(ResourceOutcome {
            id,
            state,
            steps,
            notified,
        });
    }

    fn fail(&mut self, id: ResourceId, steps: Vec<String>, notified: bool, cause: String) -> Halt {
        error!("{} failed: {}", id, cause);
        self.record(id.clone(), ResourceState::Failed, steps, notified);
        self.report.failure = Some(Failure { resource: id, cause });
        Halt
    }

    /// Fail a resource whose outcome is already in the report.
    fn fail_recorded(&mut self, id: ResourceId, cause: String) -> Halt {
        match self.report.outcomes.iter_mut().rev().find(|o| o.id == id) {
            Some(outcome) => {
                error!("{} failed: {}", id, cause);
                outcome.state = ResourceState::Failed;
                self.report.failure = Some(Failure { resource: id, cause });
                Halt
            }
            None => self.fail(id, Vec::new(), false, cause),
        }
    }
}

fn transition(id: &ResourceId, from: ResourceState, to: ResourceState) {
    debug!("{}: {} -> {}", id, from, to);
}

/// Carry out one planned step.
pub fn apply_step(host: &mut dyn Host, step: &Step) -> Result<(), String> {
    let result = match step {
        Step::InstallPackage(name) => host.install_package(name),
        Step::CreateDir { path, recursive } => host.create_dir(path, *recursive),
        Step::SetOwner { path, owner, group } => {
            host.set_owner(path, owner.as_deref(), group.as_deref())
        }
        Step::SetMode { path, mode } => host.set_mode(path, *mode),
        Step::RemoveDir(path) => host.remove_dir_all(path),
        Step::RemoveFile(path) => host.remove_file(path),
        Step::Symlink { path, target } => host.symlink(target, path),
        Step::WriteFile { path, content } => host.write_file(path, content),
        Step::UpsertLimit { file, entry } => host
            .update_file(file, &|current| limits::upsert(current, entry))
            .map(|_| ()),
        Step::RunCommand(command) => return host.run_command(command).map(|_| ()).map_err(|e| e.to_string()),
        Step::SelectAlternative {
            name,
            link,
            path,
            priority,
            previous,
        } => return alternatives::apply(host, name, link, path, *priority, previous.as_deref()),
    };
    result.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::MockHost;
    use crate::host::HostState;
    use crate::template::BuiltinRenderer;
    use crate::types::resource::{Guard, ResourceKind};
    use std::path::Path;

    fn settings() -> RunSettings {
        RunSettings::default()
    }

    fn run(resources: Vec<Resource>, host: &mut MockHost) -> Report {
        let graph = ResourceGraph::from_resources(resources).unwrap();
        converge(&graph, host, &BuiltinRenderer, &settings())
    }

    fn states(report: &Report) -> Vec<(String, ResourceState)> {
        report
            .outcomes
            .iter()
            .map(|o| (o.id.to_string(), o.state))
            .collect()
    }

    #[test]
    fn converges_in_declaration_order() {
        let mut host = MockHost::new();
        let report = run(
            vec![
                Resource::package("hadoop-client"),
                Resource::directory("/etc/hadoop/conf.chef").recursive().mode(0o755),
            ],
            &mut host,
        );
        assert!(report.is_success());
        assert_eq!(
            states(&report),
            vec![
                ("package[hadoop-client]".to_string(), ResourceState::Converged),
                ("directory[/etc/hadoop/conf.chef]".to_string(), ResourceState::Converged),
            ]
        );
        assert_eq!(host.mutations()[0], "install hadoop-client");
    }

    #[test]
    fn unknown_host_state_still_converges() {
        let mut host = MockHost::new();
        host.seed_dir("/etc/hadoop/conf.chef", "root", "root", 0o755);
        host.seed_file("/etc/hadoop/conf.chef/core-site.xml", "stale");
        host.make_unreadable("/etc/hadoop/conf.chef/core-site.xml", "EACCES");
        host.break_package_query("hadoop-client", "rpmdb: lock held");
        let report = run(
            vec![
                Resource::package("hadoop-client"),
                Resource::template(
                    "/etc/hadoop/conf.chef/core-site.xml",
                    crate::template::SITE_XML,
                    serde_json::json!({"fs.defaultFS": "hdfs://nn:8020"}),
                ),
            ],
            &mut host,
        );
        assert!(report.is_success());
        assert_eq!(
            host.mutations(),
            &[
                "install hadoop-client".to_string(),
                "write /etc/hadoop/conf.chef/core-site.xml".to_string(),
            ]
        );
        assert!(host
            .file_text("/etc/hadoop/conf.chef/core-site.xml")
            .unwrap()
            .contains("hdfs://nn:8020"));
    }

    #[test]
    fn halts_on_first_failure() {
        let mut host = MockHost::new();
        host.seed_dir("/data", "root", "root", 0o755);
        host.deny("/data/log", "permission denied");
        let report = run(
            vec![
                Resource::directory("/data/log"),
                Resource::directory("/data/other"),
            ],
            &mut host,
        );
        assert_eq!(report.exit_code(), 1);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.resource, ResourceId::new(ResourceKind::Directory, "/data/log"));
        assert!(failure.cause.contains("permission denied"));
        assert_eq!(report.outcomes.len(), 1);
        assert!(host.entry("/data/other").is_none());
    }

    #[test]
    fn delayed_notification_runs_after_everything() {
        let mut host = MockHost::new();
        let exec = ResourceId::new(ResourceKind::Execute, "reload");
        let report = run(
            vec![
                Resource::directory("/etc/hadoop").notifies(exec.clone(), Timing::Delayed),
                Resource::execute("reload", "reload-hadoop").not_if(Guard::Shell {
                    command: "true".into(),
                }),
                Resource::directory("/etc/hadoop/conf.chef"),
            ],
            &mut host,
        );
        assert_eq!(
            states(&report),
            vec![
                ("directory[/etc/hadoop]".to_string(), ResourceState::Converged),
                ("execute[reload]".to_string(), ResourceState::UpToDate),
                ("directory[/etc/hadoop/conf.chef]".to_string(), ResourceState::Converged),
                ("execute[reload]".to_string(), ResourceState::Converged),
            ]
        );
        assert!(report.outcomes[3].notified);
        assert_eq!(host.mutations().last().unwrap(), "exec reload-hadoop");
    }

    #[test]
    fn immediate_notification_runs_next() {
        let mut host = MockHost::new();
        let exec = ResourceId::new(ResourceKind::Execute, "reload");
        let report = run(
            vec![
                Resource::directory("/etc/hadoop").notifies(exec.clone(), Timing::Immediate),
                Resource::directory("/etc/hadoop/conf.chef"),
                Resource::execute("reload", "reload-hadoop"),
            ],
            &mut host,
        );
        let order: Vec<String> = report.outcomes.iter().map(|o| o.id.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "directory[/etc/hadoop]",
                "execute[reload]",
                "directory[/etc/hadoop/conf.chef]",
                "execute[reload]",
            ]
        );
    }

    #[test]
    fn target_notified_at_most_once() {
        let mut host = MockHost::new();
        let exec = ResourceId::new(ResourceKind::Execute, "reload");
        let report = run(
            vec![
                Resource::directory("/a").notifies(exec.clone(), Timing::Delayed),
                Resource::directory("/b").notifies(exec.clone(), Timing::Delayed),
                Resource::execute("reload", "reload-hadoop").not_if(Guard::Shell {
                    command: "true".into(),
                }),
            ],
            &mut host,
        );
        let runs = host
            .mutations()
            .iter()
            .filter(|m| *m == "exec reload-hadoop")
            .count();
        assert_eq!(runs, 1);
        assert_eq!(report.outcomes.len(), 4);
    }

    #[test]
    fn up_to_date_resources_do_not_notify() {
        let mut host = MockHost::new();
        host.seed_dir("/etc/hadoop", "root", "root", 0o755);
        let exec = ResourceId::new(ResourceKind::Execute, "reload");
        run(
            vec![
                Resource::directory("/etc/hadoop").notifies(exec, Timing::Delayed),
                Resource::execute("reload", "reload-hadoop").not_if(Guard::Shell {
                    command: "true".into(),
                }),
            ],
            &mut host,
        );
        assert!(host.mutations().is_empty());
    }

    #[test]
    fn queue_bound_halts_run() {
        let mut host = MockHost::new();
        let a = ResourceId::new(ResourceKind::Execute, "a");
        let b = ResourceId::new(ResourceKind::Execute, "b");
        let graph = ResourceGraph::from_resources(vec![
            Resource::directory("/x")
                .notifies(a, Timing::Delayed)
                .notifies(b, Timing::Delayed),
            Resource::execute("a", "a"),
            Resource::execute("b", "b"),
        ])
        .unwrap();
        let mut s = settings();
        s.max_notifications = 1;
        let report = converge(&graph, &mut host, &BuiltinRenderer, &s);
        assert!(report.failure.unwrap().cause.contains("notification queue full"));
        let x = ResourceId::new(ResourceKind::Directory, "/x");
        let entries: Vec<_> = report.outcomes.iter().filter(|o| o.id == x).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, ResourceState::Failed);
        assert_eq!(entries[0].steps, vec!["create directory /x".to_string()]);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let mut host = MockHost::new();
        let graph = ResourceGraph::from_resources(vec![
            Resource::package("hadoop-client"),
            Resource::directory("/etc/hadoop/conf.chef").recursive(),
        ])
        .unwrap();
        let mut s = settings();
        s.dry_run = true;
        let report = converge(&graph, &mut host, &BuiltinRenderer, &s);
        assert!(host.mutations().is_empty());
        assert_eq!(report.applied_count(), 2);
        assert_eq!(report.outcomes[0].steps, vec!["install package hadoop-client"]);
        assert_eq!(report.outcomes[1].state, ResourceState::WouldApply);
    }

    #[test]
    fn limits_step_rewrites_file() {
        let mut host = MockHost::new();
        host.seed_file("/etc/security/limits.d/hdfs.conf", "hdfs - nofile 1024\n");
        let step = Step::UpsertLimit {
            file: "/etc/security/limits.d/hdfs.conf".into(),
            entry: crate::types::resource::LimitsEntry::new("hdfs", "-", "nofile", 32768),
        };
        apply_step(&mut host, &step).unwrap();
        assert_eq!(
            host.read_to_string(Path::new("/etc/security/limits.d/hdfs.conf")).unwrap().as_deref(),
            Some("hdfs - nofile 32768\n")
        );
    }
}
