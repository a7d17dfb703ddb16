//! Accounting engine
//!
//! Drives one pass over a snapshot: build a ledger per node, resolve the
//! memory unit, fold every pod's contribution into its node's ledger and
//! aggregate the sealed ledgers into a [`Report`].

use crate::{
    DeviceAllocationResolver, FractionalGpuAccountant, Ledger, MemoryUnit, PodAccount, Report,
    Result, TopologyAllocationResolver, UnitResolver,
};
use gputop_core::{AccountingConfig, ClusterSnapshot, ClusterSource, Config, GpuMode, Pod, PodScope};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AccountingEngine {
    options: AccountingConfig,
    allocation: DeviceAllocationResolver,
    fractional: FractionalGpuAccountant,
    topology: TopologyAllocationResolver,
    units: UnitResolver,
}

impl AccountingEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            options: config.accounting.clone(),
            allocation: DeviceAllocationResolver::new(config.resources.clone()),
            fractional: FractionalGpuAccountant::new(config.resources.clone()),
            topology: TopologyAllocationResolver::new(config.resources.clone()),
            units: UnitResolver::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&Config::default())
    }

    /// Sticky memory unit, once any pass has resolved it
    pub fn unit(&self) -> Option<MemoryUnit> {
        self.units.unit()
    }

    pub fn reset_unit(&mut self) {
        self.units.reset();
    }

    /// Account a snapshot
    pub fn run(&mut self, snapshot: &ClusterSnapshot) -> Result<Report> {
        let names = self.allocation.names();

        let mut ledgers: Vec<Ledger> = Vec::with_capacity(snapshot.nodes.len());
        let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(snapshot.nodes.len());
        for node in &snapshot.nodes {
            if !self.options.selects_node(&node.name) {
                continue;
            }
            if by_name.contains_key(node.name.as_str()) {
                debug!(node = %node.name, "Ignoring duplicate node");
                continue;
            }
            by_name.insert(node.name.as_str(), ledgers.len());
            ledgers.push(Ledger::new(node, names));
        }

        for ledger in &ledgers {
            if ledger.total_memory() > 0.0 {
                self.units.resolve(ledger.total_memory(), ledger.total_devices());
            }
        }

        let mut skipped = 0usize;
        for pod in &snapshot.pods {
            if !self.selects_pod(pod) {
                skipped += 1;
                continue;
            }
            let Some(node_name) = pod.node_name.as_deref() else {
                debug!(pod = %pod.key(), "Skipping unscheduled pod");
                skipped += 1;
                continue;
            };
            let Some(&index) = by_name.get(node_name) else {
                debug!(pod = %pod.key(), node = node_name, "Skipping pod on unknown node");
                skipped += 1;
                continue;
            };

            let ledger = &mut ledgers[index];
            match ledger.mode() {
                GpuMode::Share => {
                    if let Some(account) = self.contribution(pod, ledger) {
                        ledger.fold_account(&account, pod)?;
                    }
                }
                GpuMode::Exclusive => {
                    let gpus = pod.whole_gpus(names);
                    if gpus > 0 {
                        ledger.record_whole_devices(gpus)?;
                    }
                }
                GpuMode::Topology => {
                    let gpus = pod.topology_gpus(names);
                    if gpus > 0 {
                        let account = self.topology.account_pod(pod, |slot| ledger.capacity_of(slot));
                        ledger.record_whole_devices(gpus)?;
                        ledger.fold_account(&account, pod)?;
                    }
                }
                GpuMode::None => {}
            }
        }

        for ledger in &mut ledgers {
            ledger.seal();
        }

        let report = Report::from_ledgers(ledgers, self.units.unit());
        info!(
            nodes = report.cluster.node_count,
            pods = snapshot.pods.len(),
            skipped,
            memory_percent = report.cluster.memory_percent,
            pending = report.cluster.has_pending_allocations,
            "Accounting pass complete"
        );

        Ok(report)
    }

    /// What one pod adds to a share-mode ledger, `None` when nothing
    pub fn contribution(&self, pod: &Pod, ledger: &Ledger) -> Option<PodAccount> {
        let account = if self.fractional.is_fractional(pod) {
            self.fractional.account_pod(pod, |slot| ledger.capacity_of(slot))
        } else {
            self.allocation.account(pod)?
        };

        (!account.is_empty()).then_some(account)
    }

    /// Fetch nodes and pods from a source and account them
    pub async fn collect(&mut self, source: &dyn ClusterSource, scope: &PodScope) -> Result<Report> {
        debug!(source = %source.describe(), "Fetching cluster inventory");
        let nodes = source.list_nodes().await.map_err(|e| {
            warn!(category = e.category(), error = %e, "Listing nodes failed");
            e
        })?;
        let pods = source.list_pods(scope).await.map_err(|e| {
            warn!(category = e.category(), error = %e, "Listing pods failed");
            e
        })?;
        self.run(&ClusterSnapshot::new(nodes, pods))
    }

    /// Pod scope matching the configured namespace filter
    pub fn scope(&self) -> PodScope {
        match &self.options.namespace {
            Some(ns) => PodScope::all().with_namespace(ns.clone()),
            None => PodScope::all(),
        }
    }

    fn selects_pod(&self, pod: &Pod) -> bool {
        if pod.is_completed() && !self.options.include_completed_pods {
            debug!(pod = %pod.key(), phase = %pod.phase, "Skipping completed pod");
            return false;
        }
        match &self.options.namespace {
            Some(ns) => &pod.namespace == ns,
            None => true,
        }
    }
}
