//! Training jobs assembled from their pods
//!
//! Job operators label every pod of a job with the job kind (`app`) and the
//! job name (`release`). The registry groups pods by those labels in one pass
//! and picks each job's chief pod with the kind's chief rules.

use gputop_core::{Node, Pod, PodPhase, ResourceNames};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// Pod label naming the job kind
pub const APP_LABEL: &str = "app";

/// Pod label naming the job
pub const RELEASE_LABEL: &str = "release";

/// Shown in place of a chief address for jobs that are not running
pub const NO_ADDRESS: &str = "N/A";

/// Labels a pod must carry, all of them, to be chosen as chief
pub type ChiefRule = Vec<(String, String)>;

/// How one job kind is recognized and where its chief is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKind {
    /// Value of the `app` label
    pub name: String,

    /// Tried in order; the first rule any pod satisfies picks the chief.
    /// With no match the first pod by name is the chief.
    pub chief_rules: Vec<ChiefRule>,
}

impl JobKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chief_rules: Vec::new(),
        }
    }

    /// Add a chief rule requiring every listed label
    pub fn with_chief(mut self, labels: &[(&str, &str)]) -> Self {
        self.chief_rules.push(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    fn is_chief(rule: &ChiefRule, pod: &Pod) -> bool {
        rule.iter().all(|(key, value)| pod.label(key) == Some(value.as_str()))
    }

    /// Index of the chief among `pods`, which are sorted by name
    fn select_chief(&self, pods: &[Pod]) -> Option<usize> {
        self.chief_rules
            .iter()
            .find_map(|rule| pods.iter().position(|pod| Self::is_chief(rule, pod)))
            .or(if pods.is_empty() { None } else { Some(0) })
    }

    /// Kinds known out of the box
    pub fn builtin() -> Vec<JobKind> {
        let launcher = [("mpi_role_type", "launcher")];
        vec![
            JobKind::new("tfjob")
                .with_chief(&[("tf-replica-type", "chief")])
                .with_chief(&[("tf-replica-type", "master")])
                .with_chief(&[("tf-replica-type", "worker"), ("tf-replica-index", "0")]),
            JobKind::new("pytorchjob").with_chief(&[("pytorch-replica-type", "master")]),
            JobKind::new("mpijob").with_chief(&launcher),
            JobKind::new("horovodjob").with_chief(&launcher),
            JobKind::new("etjob").with_chief(&launcher),
            JobKind::new("volcanojob"),
            JobKind::new("sparkjob"),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// What every job kind answers, whatever its pod layout
pub trait JobCapabilities {
    fn chief_pod(&self) -> Option<&Pod>;
    fn all_pods(&self) -> &[Pod];
    fn status(&self) -> JobStatus;
    fn requested_gpu(&self) -> u64;
    fn allocated_gpu(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pods: Vec<Pod>,
    chief: Option<usize>,
    requested_gpu: u64,
    allocated_gpu: u64,
}

impl Job {
    fn new(kind: &JobKind, namespace: String, name: String, mut pods: Vec<Pod>, names: &ResourceNames) -> Self {
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        let chief = kind.select_chief(&pods);

        let annotated = pods.iter().find_map(|pod| {
            let value = pod.annotation(&names.job_gpu_request_annotation)?;
            match value.trim().parse::<u64>() {
                Ok(gpus) => Some(gpus),
                Err(e) => {
                    warn!(pod = %pod.key(), value, error = %e, "Malformed job GPU request annotation");
                    None
                }
            }
        });
        let requested_gpu = annotated.unwrap_or_else(|| pods.iter().map(|p| p.whole_gpus(names)).sum());
        let allocated_gpu = pods
            .iter()
            .filter(|p| p.started && !p.is_completed())
            .map(|p| p.whole_gpus(names))
            .sum();

        Self {
            name,
            namespace,
            kind: kind.name.clone(),
            pods,
            chief,
            requested_gpu,
            allocated_gpu,
        }
    }

    /// Node address of the chief while the job runs, `N/A` otherwise
    pub fn chief_host_ip(&self, nodes: &[Node]) -> String {
        if self.status() != JobStatus::Running {
            return NO_ADDRESS.to_string();
        }
        self.chief_pod()
            .and_then(|chief| chief.node_name.as_deref())
            .and_then(|node| nodes.iter().find(|n| n.name == node))
            .and_then(|node| node.address.clone())
            .unwrap_or_else(|| NO_ADDRESS.to_string())
    }
}

impl JobCapabilities for Job {
    fn chief_pod(&self) -> Option<&Pod> {
        self.chief.and_then(|index| self.pods.get(index))
    }

    fn all_pods(&self) -> &[Pod] {
        &self.pods
    }

    fn status(&self) -> JobStatus {
        let chief_phase = self.chief_pod().map(|chief| chief.phase);
        if chief_phase == Some(PodPhase::Running) {
            return JobStatus::Running;
        }
        if self.pods.iter().any(|pod| pod.phase == PodPhase::Pending) {
            return JobStatus::Pending;
        }
        match chief_phase {
            Some(PodPhase::Succeeded) => JobStatus::Succeeded,
            Some(PodPhase::Failed) => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }

    fn requested_gpu(&self) -> u64 {
        self.requested_gpu
    }

    fn allocated_gpu(&self) -> u64 {
        self.allocated_gpu
    }
}

/// Job kinds keyed by their `app` label
#[derive(Debug, Clone)]
pub struct JobRegistry {
    kinds: HashMap<String, JobKind>,
    names: ResourceNames,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(ResourceNames::default())
    }
}

impl JobRegistry {
    /// Registry with the built-in kinds
    pub fn new(names: ResourceNames) -> Self {
        let mut registry = Self {
            kinds: HashMap::new(),
            names,
        };
        for kind in JobKind::builtin() {
            registry.register(kind);
        }
        registry
    }

    /// Add a kind, replacing any kind with the same name
    pub fn register(&mut self, kind: JobKind) {
        self.kinds.insert(kind.name.clone(), kind);
    }

    pub fn kind(&self, name: &str) -> Option<&JobKind> {
        self.kinds.get(name)
    }

    /// Group pods into jobs, ordered by namespace then name
    pub fn index(&self, pods: &[Pod]) -> Vec<Job> {
        let mut groups: BTreeMap<(String, String, String), Vec<Pod>> = BTreeMap::new();
        for pod in pods {
            let Some(app) = pod.label(APP_LABEL) else {
                continue;
            };
            if !self.kinds.contains_key(app) {
                continue;
            }
            let Some(release) = pod.label(RELEASE_LABEL) else {
                debug!(pod = %pod.key(), kind = app, "Job pod without release label");
                continue;
            };
            groups
                .entry((pod.namespace.clone(), release.to_string(), app.to_string()))
                .or_default()
                .push(pod.clone());
        }

        groups
            .into_iter()
            .filter_map(|((namespace, name, app), pods)| {
                let kind = self.kinds.get(&app)?;
                Some(Job::new(kind, namespace, name, pods, &self.names))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gputop_core::resources::{JOB_GPU_REQUEST_ANNOTATION, NVIDIA_GPU};
    use gputop_core::Container;

    fn job_pod(kind: &str, job: &str, name: &str, gpus: f64) -> Pod {
        Pod::new("default", name)
            .on_node("node-a")
            .with_label(APP_LABEL, kind)
            .with_label(RELEASE_LABEL, job)
            .with_container(Container::new("main").with_limit(NVIDIA_GPU, gpus))
    }

    fn nodes() -> Vec<Node> {
        vec![Node::new("node-a").with_address("10.0.0.7")]
    }

    #[test]
    fn test_groups_pods_by_kind_and_release() {
        let registry = JobRegistry::default();
        let pods = vec![
            job_pod("tfjob", "mnist", "mnist-worker-0", 1.0),
            job_pod("tfjob", "mnist", "mnist-ps-0", 0.0),
            job_pod("mpijob", "bert", "bert-launcher", 0.0),
            job_pod("unknown", "x", "x-0", 1.0),
            Pod::new("default", "plain").on_node("node-a"),
        ];

        let jobs = registry.index(&pods);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "bert");
        assert_eq!(jobs[1].name, "mnist");
        assert_eq!(jobs[1].all_pods().len(), 2);
    }

    #[test]
    fn test_tfjob_chief_selection() {
        let registry = JobRegistry::default();
        let pods = vec![
            job_pod("tfjob", "mnist", "mnist-ps-0", 0.0)
                .with_label("tf-replica-type", "ps")
                .with_label("tf-replica-index", "0"),
            job_pod("tfjob", "mnist", "mnist-worker-0", 1.0)
                .with_label("tf-replica-type", "worker")
                .with_label("tf-replica-index", "0"),
        ];
        let jobs = registry.index(&pods);
        assert_eq!(jobs[0].chief_pod().unwrap().name, "mnist-worker-0");

        let mut with_chief = pods.clone();
        with_chief.push(job_pod("tfjob", "mnist", "mnist-chief-0", 1.0).with_label("tf-replica-type", "chief"));
        let jobs = registry.index(&with_chief);
        assert_eq!(jobs[0].chief_pod().unwrap().name, "mnist-chief-0");
    }

    #[test]
    fn test_status_and_chief_address() {
        let registry = JobRegistry::default();
        let launcher = job_pod("mpijob", "bert", "bert-launcher", 0.0).with_label("mpi_role_type", "launcher");
        let worker = job_pod("mpijob", "bert", "bert-worker-0", 2.0).with_phase(PodPhase::Pending);

        let jobs = registry.index(&[launcher.clone(), worker.clone()]);
        assert_eq!(jobs[0].status(), JobStatus::Running);
        assert_eq!(jobs[0].chief_host_ip(&nodes()), "10.0.0.7");

        let finished = launcher.with_phase(PodPhase::Succeeded);
        let jobs = registry.index(&[finished.clone(), worker]);
        assert_eq!(jobs[0].status(), JobStatus::Pending);
        assert_eq!(jobs[0].chief_host_ip(&nodes()), NO_ADDRESS);

        let jobs = registry.index(&[finished]);
        assert_eq!(jobs[0].status(), JobStatus::Succeeded);
    }

    #[test]
    fn test_gpu_counts() {
        let registry = JobRegistry::default();
        let pods = vec![
            job_pod("pytorchjob", "gpt", "gpt-master-0", 2.0),
            job_pod("pytorchjob", "gpt", "gpt-worker-0", 2.0).with_phase(PodPhase::Failed),
        ];
        let jobs = registry.index(&pods);
        assert_eq!(jobs[0].requested_gpu(), 4);
        assert_eq!(jobs[0].allocated_gpu(), 2);

        let annotated: Vec<Pod> = pods
            .into_iter()
            .map(|p| p.with_annotation(JOB_GPU_REQUEST_ANNOTATION, "8"))
            .collect();
        assert_eq!(registry.index(&annotated)[0].requested_gpu(), 8);
    }

    #[test]
    fn test_register_custom_kind() {
        let mut registry = JobRegistry::default();
        registry.register(JobKind::new("rayjob").with_chief(&[("ray-node-type", "head")]));
        assert!(registry.kind("rayjob").is_some());

        let pods = vec![
            job_pod("rayjob", "tune", "tune-worker", 1.0),
            job_pod("rayjob", "tune", "tune-head", 0.0).with_label("ray-node-type", "head"),
        ];
        let jobs = registry.index(&pods);
        assert_eq!(jobs[0].kind, "rayjob");
        assert_eq!(jobs[0].chief_pod().unwrap().name, "tune-head");
    }
}
