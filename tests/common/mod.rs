//! In-memory control plane and copier used by the integration tests
//!
//! Volumes and pod filesystems are real directories under a temp dir, and
//! the exec handler understands the three commands helper pods run (tar
//! create, tar extract, rm), so runs move real bytes end to end.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::core::{Selector, SelectorExt};
use tempfile::TempDir;

use ais_state_manager::archive;
use ais_state_manager::cluster::{
    ClusterFacade, ControlPlane, ExecOutput, FileCopier, UnitInfo, UnitSpec, VolumeInfo,
    VolumeRole, VolumeSpec,
};
use ais_state_manager::config::{ClusterRef, StateManagerConfig};
use ais_state_manager::prompt::Confirm;
use ais_state_manager::template::{COMPONENT_LABEL, NAME_LABEL};
use ais_state_manager::{Error, Result};

pub const NAMESPACE: &str = "ais-ns";
pub const CLUSTER: &str = "ais";
pub const LOCAL_STORAGE: &str = "ais-local-storage";

pub fn cluster_ref() -> ClusterRef {
    ClusterRef::new(NAMESPACE, CLUSTER)
}

#[derive(Debug, Clone)]
struct FakeVolume {
    storage_class: Option<String>,
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct FakeUnit {
    spec: UnitSpec,
    phase: String,
}

#[derive(Debug)]
struct State {
    volumes: BTreeMap<String, FakeVolume>,
    units: BTreeMap<String, FakeUnit>,
    cluster_pods: Vec<BTreeMap<String, String>>,
    created_volumes: Vec<VolumeSpec>,
    created_units: Vec<String>,
    exec_log: Vec<(String, String)>,
    new_unit_phase: String,
    ignore_deletes: bool,
    fail_exec_on: Option<String>,
}

/// A namespace with PVCs and pods, backed by directories on disk
pub struct FakeCluster {
    root: TempDir,
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: tempfile::tempdir().unwrap(),
            state: Mutex::new(State {
                volumes: BTreeMap::new(),
                units: BTreeMap::new(),
                cluster_pods: Vec::new(),
                created_volumes: Vec::new(),
                created_units: Vec::new(),
                exec_log: Vec::new(),
                new_unit_phase: "Running".to_string(),
                ignore_deletes: false,
                fail_exec_on: None,
            }),
        })
    }

    /// Add an existing AIS state volume
    pub fn add_volume(&self, name: &str, role: VolumeRole, storage_class: Option<&str>) {
        let mut labels = BTreeMap::new();
        labels.insert(NAME_LABEL.to_string(), CLUSTER.to_string());
        labels.insert(COMPONENT_LABEL.to_string(), role.as_str().to_string());
        self.add_volume_with_labels(name, labels, storage_class);
    }

    pub fn add_volume_with_labels(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        storage_class: Option<&str>,
    ) {
        fs::create_dir_all(self.volume_dir(name)).unwrap();
        self.state.lock().unwrap().volumes.insert(
            name.to_string(),
            FakeVolume {
                storage_class: storage_class.map(str::to_string),
                labels,
            },
        );
    }

    /// Add a pod that is left in place by teardown, e.g. from an aborted run
    pub fn add_stale_unit(&self, spec: UnitSpec) {
        fs::create_dir_all(self.unit_dir(&spec.name)).unwrap();
        self.state.lock().unwrap().units.insert(
            spec.name.clone(),
            FakeUnit {
                spec,
                phase: "Running".to_string(),
            },
        );
    }

    /// Start or stop the cluster's proxy/target pods
    pub fn set_live(&self, live: bool) {
        let mut state = self.state.lock().unwrap();
        state.cluster_pods.clear();
        if live {
            for role in ["proxy", "target"] {
                let mut labels = BTreeMap::new();
                labels.insert(NAME_LABEL.to_string(), CLUSTER.to_string());
                labels.insert(COMPONENT_LABEL.to_string(), role.to_string());
                state.cluster_pods.push(labels);
            }
        }
    }

    /// Phase reported by pods created from now on
    pub fn set_new_unit_phase(&self, phase: &str) {
        self.state.lock().unwrap().new_unit_phase = phase.to_string();
    }

    /// Make pod deletion a no-op, so deletion never converges
    pub fn ignore_deletes(&self) {
        self.state.lock().unwrap().ignore_deletes = true;
    }

    /// Make commands executed in `unit` report failure
    pub fn fail_exec_on(&self, unit: &str) {
        self.state.lock().unwrap().fail_exec_on = Some(unit.to_string());
    }

    pub fn volume_dir(&self, volume: &str) -> PathBuf {
        self.root.path().join("volumes").join(volume)
    }

    pub fn unit_dir(&self, unit: &str) -> PathBuf {
        self.root.path().join("units").join(unit)
    }

    /// Local path backing `remote` inside `unit`
    pub fn unit_path(&self, unit: &str, remote: &str) -> PathBuf {
        self.unit_dir(unit).join(remote.trim_start_matches('/'))
    }

    pub fn write_volume_file(&self, volume: &str, rel: &str, content: &[u8]) {
        let path = self.volume_dir(volume).join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn read_volume_file(&self, volume: &str, rel: &str) -> Option<Vec<u8>> {
        fs::read(self.volume_dir(volume).join(rel)).ok()
    }

    pub fn volume_names(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().volumes.keys().cloned().collect()
    }

    pub fn created_volumes(&self) -> Vec<VolumeSpec> {
        self.state.lock().unwrap().created_volumes.clone()
    }

    pub fn created_units(&self) -> Vec<String> {
        self.state.lock().unwrap().created_units.clone()
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.state.lock().unwrap().units.keys().cloned().collect()
    }

    /// `(unit, shell command)` pairs in execution order
    pub fn exec_log(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().exec_log.clone()
    }

    pub fn facade(self: &Arc<Self>) -> ClusterFacade {
        self.facade_with(StateManagerConfig::default())
    }

    pub fn facade_with(self: &Arc<Self>, config: StateManagerConfig) -> ClusterFacade {
        let plane: Arc<dyn ControlPlane> = self.clone();
        ClusterFacade::new(plane, cluster_ref(), config)
    }

    fn volume_for_unit(&self, unit: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .units
            .get(unit)
            .map(|u| u.spec.volume_name.clone())
            .ok_or_else(|| Error::transport(format!("pods \"{}\" not found", unit)))
    }

    /// Interpret the shell command a helper pod was asked to run
    fn run_shell(&self, unit: &str, script: &str) -> Result<String> {
        let volume = self.volume_for_unit(unit)?;
        let data = self.volume_dir(&volume);
        let words = script.split_whitespace().collect::<Vec<_>>();

        match words.as_slice() {
            ["tar", "-czvf", out, "-C", "/data", "."] => {
                let dest = self.unit_path(unit, out);
                fs::create_dir_all(dest.parent().unwrap())?;
                archive::pack_dir(&data, &dest)?;
                Ok(format!("created {}", out))
            }
            ["tar", "-xzvf", input, "-C", "/data"] => {
                archive::unpack(&self.unit_path(unit, input), &data)?;
                Ok(format!("extracted {}", input))
            }
            ["rm", "-f", targets @ ..] => {
                for target in targets {
                    let rel = target.trim_start_matches("/data/");
                    remove_matching(&data, rel)?;
                }
                Ok(String::new())
            }
            _ => Err(Error::transport(format!("unsupported command: {}", script))),
        }
    }
}

fn remove_matching(dir: &Path, pattern: &str) -> Result<()> {
    match pattern.strip_suffix('*') {
        Some(prefix) => {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                let name = path.file_name().unwrap().to_string_lossy().to_string();
                if path.is_file() && name.starts_with(prefix) {
                    fs::remove_file(path)?;
                }
            }
        }
        None => {
            let path = dir.join(pattern);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ControlPlane for FakeCluster {
    async fn list_volumes(&self, selector: &Selector) -> Result<Vec<VolumeInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .volumes
            .iter()
            .filter(|(_, v)| selector.matches(&v.labels))
            .map(|(name, v)| VolumeInfo {
                name: name.clone(),
                storage_class: v.storage_class.clone(),
                role: v
                    .labels
                    .get(COMPONENT_LABEL)
                    .and_then(|r| VolumeRole::from_label(r)),
            })
            .collect())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.volumes.contains_key(&spec.name) {
                return Err(Error::transport(format!(
                    "persistentvolumeclaims \"{}\" already exists",
                    spec.name
                )));
            }
        }
        self.add_volume_with_labels(&spec.name, spec.labels.clone(), Some(&spec.storage_class));
        self.state
            .lock()
            .unwrap()
            .created_volumes
            .push(spec.clone());
        Ok(())
    }

    async fn create_unit(&self, spec: &UnitSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.units.contains_key(&spec.name) {
            return Err(Error::transport(format!(
                "pods \"{}\" already exists",
                spec.name
            )));
        }
        if !state.volumes.contains_key(&spec.volume_name) {
            return Err(Error::transport(format!(
                "persistentvolumeclaim \"{}\" not found",
                spec.volume_name
            )));
        }
        fs::create_dir_all(self.unit_dir(&spec.name))?;
        let phase = state.new_unit_phase.clone();
        state.units.insert(
            spec.name.clone(),
            FakeUnit {
                spec: spec.clone(),
                phase,
            },
        );
        state.created_units.push(spec.name.clone());
        Ok(())
    }

    async fn delete_unit(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.ignore_deletes {
            return Ok(());
        }
        if state.units.remove(name).is_some() {
            let _ = fs::remove_dir_all(self.unit_dir(name));
        }
        Ok(())
    }

    async fn list_units(&self, selector: &Selector) -> Result<Vec<UnitInfo>> {
        let state = self.state.lock().unwrap();
        let helpers = state
            .units
            .values()
            .filter(|u| selector.matches(&u.spec.labels))
            .map(|u| UnitInfo {
                name: u.spec.name.clone(),
                phase: Some(u.phase.clone()),
            });
        let cluster = state
            .cluster_pods
            .iter()
            .enumerate()
            .filter(|(_, labels)| selector.matches(labels))
            .map(|(i, _)| UnitInfo {
                name: format!("{}-pod-{}", CLUSTER, i),
                phase: Some("Running".to_string()),
            });
        Ok(helpers.chain(cluster).collect())
    }

    async fn exec(&self, unit: &str, container: &str, command: &[String]) -> Result<ExecOutput> {
        let script = command.last().cloned().unwrap_or_default();
        let fail = {
            let mut state = self.state.lock().unwrap();
            let unit_state = state
                .units
                .get(unit)
                .ok_or_else(|| Error::transport(format!("pods \"{}\" not found", unit)))?;
            if unit_state.spec.container_name != container {
                return Err(Error::transport(format!(
                    "container {} is not valid for pod {}",
                    container, unit
                )));
            }
            state.exec_log.push((unit.to_string(), script.clone()));
            state.fail_exec_on.as_deref() == Some(unit)
        };

        if fail {
            return Ok(ExecOutput {
                output: "sh: simulated failure".to_string(),
                success: false,
            });
        }
        let output = self.run_shell(unit, &script)?;
        Ok(ExecOutput {
            output,
            success: true,
        })
    }
}

/// Copier moving files between the local disk and fake pod filesystems
pub struct FakeCopier {
    cluster: Arc<FakeCluster>,
    fail_on: Mutex<Option<String>>,
    pushed: Mutex<BTreeMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeCopier {
    pub fn new(cluster: &Arc<FakeCluster>) -> Self {
        Self {
            cluster: cluster.clone(),
            fail_on: Mutex::new(None),
            pushed: Mutex::new(BTreeMap::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Make every copy involving `unit` fail
    pub fn fail_on(&self, unit: &str) {
        *self.fail_on.lock().unwrap() = Some(unit.to_string());
    }

    /// Bytes copied into each pod, keyed by `<unit>:<remote>`
    pub fn pushed(&self) -> BTreeMap<String, Vec<u8>> {
        self.pushed.lock().unwrap().clone()
    }

    /// Units files were copied out of, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn check(&self, unit: &str) -> Result<()> {
        if self.fail_on.lock().unwrap().as_deref() == Some(unit) {
            return Err(Error::transport(format!("Failed to copy file for pod {}", unit)));
        }
        Ok(())
    }
}

#[async_trait]
impl FileCopier for FakeCopier {
    async fn copy_from_unit(
        &self,
        unit: &str,
        _container: &str,
        remote: &str,
        local: &Path,
    ) -> Result<()> {
        self.check(unit)?;
        let src = self.cluster.unit_path(unit, remote);
        fs::copy(&src, local).map_err(|e| {
            Error::transport(format!("Failed to copy {}:{}: {}", unit, remote, e))
        })?;
        self.fetched.lock().unwrap().push(unit.to_string());
        Ok(())
    }

    async fn copy_to_unit(
        &self,
        local: &Path,
        unit: &str,
        _container: &str,
        remote: &str,
    ) -> Result<()> {
        self.check(unit)?;
        let dest = self.cluster.unit_path(unit, remote);
        fs::create_dir_all(dest.parent().unwrap())?;
        fs::copy(local, &dest).map_err(|e| {
            Error::transport(format!("Failed to copy to {}:{}: {}", unit, remote, e))
        })?;
        self.pushed
            .lock()
            .unwrap()
            .insert(format!("{}:{}", unit, remote), fs::read(local)?);
        Ok(())
    }
}

/// Confirmation double that records the questions it was asked
pub struct ScriptedConfirm {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, question: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(question.to_string());
        Ok(self.answer)
    }
}
