//! The deployment lifecycle.
//!
//! A [`Deployment`] drives exactly one provisioning run from `pending auth`
//! to `done`. Each step is awaited before the next one starts; progress is
//! published on a watch channel so observers never block the run.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tb_infra::digitalocean::DigitalOceanProvider;
use tb_infra::macos::MacOsProfileInstaller;
use tb_infra::public_ip::CheckIpProbe;
use tb_infra::ssh::SshExecutor;
use tb_infra::tcp::TcpPortProber;
use tb_infra::types::{FirewallSpec, MachineId, MachineSpec, RemoteTarget};
use tb_infra::{PortProber, ProfileInstaller, Provisioner, PublicIpProbe, RemoteExecutor};
use tokio::sync::watch;

use crate::artifacts::{
    self, ANDROID_PROFILE_TEMPLATE, APPLE_PROFILE_TEMPLATE, ArtifactKind, ConfigDir, VPN_ARTIFACTS,
};
use crate::error::{DeployError, Result};
use crate::name::DeploymentName;
use crate::poll;
use crate::profiles;
use crate::services::{self, ServiceKeys};
use crate::settings::{SSH_PORT, Settings};
use crate::status::{Progress, Status, Transition};

/// External collaborators a deployment talks to.
pub struct Backends {
    pub provisioner: Box<dyn Provisioner>,
    pub executor: Box<dyn RemoteExecutor>,
    pub ports: Box<dyn PortProber>,
    pub public_ip: Box<dyn PublicIpProbe>,
    pub installer: Box<dyn ProfileInstaller>,
}

impl Backends {
    /// DigitalOcean droplets reached over the system ssh client.
    pub async fn digitalocean(token: &str) -> Result<Self> {
        let executor = SshExecutor::new().await.map_err(DeployError::Identity)?;
        Ok(Self {
            provisioner: Box::new(DigitalOceanProvider::new(token)),
            executor: Box::new(executor),
            ports: Box::new(TcpPortProber::default()),
            public_ip: Box::new(CheckIpProbe::default()),
            installer: Box::new(MacOsProfileInstaller),
        })
    }
}

/// What a finished deployment hands back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub name: String,
    pub machine_id: MachineId,
    pub vpn_address: String,
    pub passphrase: String,
    pub initial_public_ip: Option<String>,
    pub final_public_ip: Option<String>,
    pub artifacts: Vec<PathBuf>,
    pub apple_profile: PathBuf,
    pub android_profile: PathBuf,
}

pub struct Deployment {
    name: DeploymentName,
    region: String,
    auto_configure: bool,
    settings: Settings,
    backends: Backends,
    user_data: String,
    machine_id: Option<MachineId>,
    passphrase: Option<String>,
    progress: watch::Sender<Progress>,
}

/// Cloud-config for the default services, authorizing `authorized_key`.
pub fn render_user_data(settings: &Settings, authorized_key: &str) -> Result<String> {
    let services = services::default_services(
        &settings.workload,
        &settings.vpn_image,
        &settings.pihole_image,
    );
    Ok(services::render_user_data(
        &ServiceKeys { authorized_key },
        &services,
    )?)
}

impl Deployment {
    /// New DigitalOcean deployment with settings from the environment.
    pub async fn create(token: &str, region: &str, auto_configure: bool) -> Result<Self> {
        Self::create_with_settings(token, region, auto_configure, Settings::from_env()).await
    }

    pub async fn create_with_settings(
        token: &str,
        region: &str,
        auto_configure: bool,
        settings: Settings,
    ) -> Result<Self> {
        let name = DeploymentName::generate(&mut rand::rng(), region);
        let backends = Backends::digitalocean(token).await?;
        let user_data = render_user_data(&settings, backends.executor.authorized_key())?;

        tracing::info!(deployment = %name, region, auto_configure, "deployment created");
        Ok(Self::with_backends(
            name,
            region,
            auto_configure,
            settings,
            backends,
            user_data,
        ))
    }

    /// Build a deployment around already constructed collaborators.
    pub fn with_backends(
        name: DeploymentName,
        region: &str,
        auto_configure: bool,
        settings: Settings,
        backends: Backends,
        user_data: String,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::new(name.as_str(), region));
        Self {
            name,
            region: region.to_string(),
            auto_configure,
            settings,
            backends,
            user_data,
            machine_id: None,
            passphrase: None,
            progress,
        }
    }

    pub fn name(&self) -> &DeploymentName {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.progress.borrow().status
    }

    pub fn progress(&self) -> Progress {
        self.progress.borrow().clone()
    }

    /// Receiver that sees every published progress snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn machine_id(&self) -> Option<&MachineId> {
        self.machine_id.as_ref()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    pub fn user_data(&self) -> &str {
        &self.user_data
    }

    /// Drive the deployment to `done`.
    ///
    /// On a fatal error the status becomes `failed` and the deployment
    /// cannot be run again. Resources created before the failure are left
    /// in place.
    pub async fn run(&mut self) -> Result<DeploymentReport> {
        let status = self.status();
        if status != Status::PendingAuth {
            return Err(DeployError::AlreadyStarted(status));
        }

        match self.execute().await {
            Ok(report) => {
                tracing::info!(
                    deployment = %self.name,
                    vpn_address = %report.vpn_address,
                    passphrase = %report.passphrase,
                    apple_profile = %report.apple_profile.display(),
                    android_profile = %report.android_profile.display(),
                    initial_ip = ?report.initial_public_ip,
                    final_ip = ?report.final_public_ip,
                    "deployment complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    deployment = %self.name,
                    status = %self.status(),
                    machine_id = ?self.machine_id,
                    error = %e,
                    "deployment failed"
                );
                self.advance(Status::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<DeploymentReport> {
        let initial_ip = self.lookup_initial_ip().await;
        self.publish(|p| p.initial_public_ip = initial_ip.clone());

        self.advance(Status::Provisioning);
        let provisioner = self.backends.provisioner.as_ref();
        let spec = MachineSpec {
            name: self.name.to_string(),
            region: self.region.clone(),
            size: self.settings.droplet_size.clone(),
            image: self.settings.droplet_image.clone(),
            user_data: self.user_data.clone(),
        };
        let machine = provisioner
            .create_machine(&spec)
            .await
            .map_err(|source| DeployError::Provisioning {
                step: "creating machine",
                source,
            })?;
        tracing::info!(deployment = %self.name, machine_id = %machine.id, "machine created");
        self.machine_id = Some(machine.id.clone());

        let address = match machine.address {
            Some(address) => address,
            None => {
                poll::wait_for_address(provisioner, &machine.id, self.settings.address_wait).await?
            }
        };
        tracing::info!(deployment = %self.name, address = %address, "machine has an address");
        self.publish(|p| p.vpn_address = Some(address.clone()));

        let firewall = FirewallSpec {
            name: format!("{}-fw", self.name),
            machine_id: machine.id.clone(),
            inbound: self.settings.inbound.clone(),
        };
        provisioner
            .create_firewall(&firewall)
            .await
            .map_err(|source| DeployError::Provisioning {
                step: "creating firewall",
                source,
            })?;

        self.advance(Status::WaitingForSsh);
        poll::wait_for_port(
            self.backends.ports.as_ref(),
            &address,
            SSH_PORT,
            "SSH",
            self.settings.ssh_wait,
        )
        .await?;

        self.advance(Status::WaitingForService);
        let executor = self.backends.executor.as_ref();
        let target = RemoteTarget::new(&self.settings.ssh_user, &address);
        let workload = self.settings.workload.as_str();
        poll::wait_for_workload_output(executor, &target, workload, self.settings.workload_wait)
            .await?;
        tokio::time::sleep(self.settings.workload_settle).await;

        self.advance(Status::RetrievingArtifacts);
        let passphrase = artifacts::fetch_passphrase(executor, &target, workload).await?;
        self.passphrase = Some(passphrase.clone());
        let dir = ConfigDir::new(self.settings.config_dir.clone());
        let fetched = artifacts::fetch_artifacts(
            executor,
            &target,
            workload,
            &dir,
            &self.name,
            &VPN_ARTIFACTS,
        )
        .await?;

        self.advance(Status::RenderingClientConfigs);
        let private_key = artifacts::contents_of(&fetched, ArtifactKind::ClientKey);
        let ca_cert = artifacts::contents_of(&fetched, ArtifactKind::CaCert);
        let server_cert = artifacts::contents_of(&fetched, ArtifactKind::ServerCert);

        let apple = profiles::render_apple_profile(
            &address,
            self.name.as_str(),
            &passphrase,
            private_key,
            ca_cert,
            server_cert,
        )?;
        let android =
            profiles::render_android_profile(&address, self.name.as_str(), private_key, ca_cert)?;

        let apple_profile = dir.path_for(APPLE_PROFILE_TEMPLATE, &self.name);
        let android_profile = dir.path_for(ANDROID_PROFILE_TEMPLATE, &self.name);
        dir.write_atomic(&apple_profile, apple.into_bytes()).await?;
        dir.write_atomic(&android_profile, android.into_bytes()).await?;

        let mut final_ip = None;
        if self.auto_configure {
            self.advance(Status::AddingVpnToOsx);
            if let Err(e) = self.backends.installer.apply_profile(&apple_profile).await {
                let err = DeployError::LocalApply(e);
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::warn!(
                    deployment = %self.name,
                    error = %err,
                    "continuing without local profile"
                );
            }

            self.advance(Status::WaitingForIpChange);
            final_ip = poll::wait_for_ip_change(
                self.backends.public_ip.as_ref(),
                initial_ip.as_deref(),
                self.settings.ip_change_wait,
            )
            .await;
            match &final_ip {
                Some(ip) => tracing::info!(deployment = %self.name, ip = %ip, "public ip changed"),
                None => tracing::warn!(deployment = %self.name, "public ip never changed"),
            }
            self.publish(|p| p.final_public_ip = final_ip.clone());
        }

        self.advance(Status::Done);

        Ok(DeploymentReport {
            name: self.name.to_string(),
            machine_id: machine.id,
            vpn_address: address,
            passphrase,
            initial_public_ip: initial_ip,
            final_public_ip: final_ip,
            artifacts: fetched.into_iter().map(|a| a.path).collect(),
            apple_profile,
            android_profile,
        })
    }

    async fn lookup_initial_ip(&self) -> Option<String> {
        match self.backends.public_ip.fetch_public_ip().await {
            Ok(ip) if !ip.is_empty() => {
                tracing::info!(deployment = %self.name, ip = %ip, "initial public ip");
                Some(ip)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    deployment = %self.name,
                    error = %e,
                    "could not look up initial public ip"
                );
                None
            }
        }
    }

    fn publish(&self, update: impl FnOnce(&mut Progress)) {
        self.progress.send_modify(update);
    }

    fn advance(&self, next: Status) {
        let moved = self.progress.send_if_modified(|p| {
            if !p.status.can_advance_to(next) {
                return false;
            }
            p.status = next;
            p.timeline.push(Transition {
                status: next,
                at: Utc::now(),
            });
            true
        });

        if moved {
            tracing::info!(deployment = %self.name, status = %next, "status changed");
        } else {
            tracing::warn!(deployment = %self.name, status = %next, "refusing status regression");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tb_infra::types::{MachineInfo, MachineState};

    use super::*;
    use crate::poll::PollPolicy;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFake tunnelbox";

    type Journal = Arc<Mutex<Vec<String>>>;

    fn record(journal: &Journal, event: impl Into<String>) {
        journal.lock().unwrap().push(event.into());
    }

    fn count(journal: &Journal, event: &str) -> usize {
        journal.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    struct FakeProvisioner {
        journal: Journal,
        fail_create: bool,
        address_on_create: bool,
        user_data: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn create_machine(&self, spec: &MachineSpec) -> tb_infra::Result<MachineInfo> {
            record(&self.journal, "create_machine");
            *self.user_data.lock().unwrap() = Some(spec.user_data.clone());
            if self.fail_create {
                return Err(tb_infra::Error::DigitalOcean(do_api::Error::Api {
                    endpoint: "create droplet",
                    status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
                    body: "droplet limit reached".into(),
                }));
            }
            Ok(MachineInfo {
                id: MachineId("1001".into()),
                state: MachineState::Starting,
                address: self.address_on_create.then(|| "10.0.0.1".to_string()),
            })
        }

        async fn get_machine(&self, id: &MachineId) -> tb_infra::Result<MachineInfo> {
            record(&self.journal, "get_machine");
            Ok(MachineInfo {
                id: id.clone(),
                state: MachineState::Running,
                address: Some("10.0.0.1".into()),
            })
        }

        async fn create_firewall(&self, spec: &FirewallSpec) -> tb_infra::Result<()> {
            record(&self.journal, "create_firewall");
            assert_eq!(spec.machine_id, MachineId("1001".into()));
            Ok(())
        }

        async fn destroy_machine(&self, _id: &MachineId) -> tb_infra::Result<()> {
            record(&self.journal, "destroy_machine");
            Ok(())
        }
    }

    struct FakeExecutor {
        journal: Journal,
        files: HashMap<&'static str, Vec<u8>>,
    }

    const CA_PATH: &str = "/etc/ipsec.d/cacerts/ca.cert.pem";

    impl FakeExecutor {
        fn new(journal: Journal, opts: &Options) -> Self {
            let mut files = HashMap::from([
                ("/etc/ipsec.d/client.cert.p12.password", b"pw\n".to_vec()),
                ("/etc/ipsec.d/client.cert.p12", b"\x30\x82p12".to_vec()),
                (CA_PATH, b"CA PEM".to_vec()),
                ("/etc/ipsec.d/certs/server.cert.pem", b"SERVER PEM".to_vec()),
            ]);
            if opts.missing_ca {
                files.remove(CA_PATH);
            } else if opts.empty_ca {
                files.insert(CA_PATH, Vec::new());
            }
            Self { journal, files }
        }
    }

    #[async_trait]
    impl RemoteExecutor for FakeExecutor {
        fn authorized_key(&self) -> &str {
            KEY
        }

        async fn run(&self, _target: &RemoteTarget, _command: &str) -> tb_infra::Result<Vec<u8>> {
            record(&self.journal, "run");
            Ok(b"0".to_vec())
        }

        async fn fetch_file_from_workload(
            &self,
            _target: &RemoteTarget,
            _workload: &str,
            path: &str,
        ) -> tb_infra::Result<Vec<u8>> {
            record(&self.journal, format!("fetch {path}"));
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| tb_infra::Error::RemoteExecution {
                    command: format!("cat {path}"),
                    detail: "missing".into(),
                })
        }
    }

    struct FakePorts {
        journal: Journal,
        open: bool,
    }

    #[async_trait]
    impl PortProber for FakePorts {
        async fn probe(&self, _host: &str, port: u16) -> bool {
            record(&self.journal, format!("probe {port}"));
            self.open
        }
    }

    struct FakeIp {
        journal: Journal,
        answers: Mutex<VecDeque<&'static str>>,
    }

    #[async_trait]
    impl PublicIpProbe for FakeIp {
        async fn fetch_public_ip(&self) -> tb_infra::Result<String> {
            record(&self.journal, "public_ip");
            Ok(self
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or("1.2.3.4")
                .to_string())
        }
    }

    struct FakeInstaller {
        journal: Journal,
        fail: bool,
    }

    #[async_trait]
    impl ProfileInstaller for FakeInstaller {
        async fn apply_profile(&self, path: &Path) -> tb_infra::Result<()> {
            record(&self.journal, "apply_profile");
            assert!(path.to_string_lossy().ends_with(".apple.mobileconfig"));
            if self.fail {
                return Err(tb_infra::Error::LocalApply("user declined".into()));
            }
            Ok(())
        }
    }

    struct Harness {
        deployment: Deployment,
        journal: Journal,
        user_data: Arc<Mutex<Option<String>>>,
        dir: tempfile::TempDir,
    }

    #[derive(Default)]
    struct Options {
        auto_configure: bool,
        fail_create: bool,
        address_later: bool,
        ssh_closed: bool,
        install_fails: bool,
        missing_ca: bool,
        empty_ca: bool,
    }

    fn harness(opts: Options) -> Harness {
        let journal: Journal = Arc::default();
        let user_data = Arc::new(Mutex::new(None));
        let dir = tempfile::tempdir().unwrap();

        let settings = Settings {
            config_dir: dir.path().join("configs"),
            ssh_wait: PollPolicy::immediate(3),
            address_wait: PollPolicy::immediate(3),
            workload_wait: PollPolicy::immediate(3),
            workload_settle: std::time::Duration::ZERO,
            ip_change_wait: PollPolicy::immediate(10),
            ..Settings::default()
        };

        let backends = Backends {
            provisioner: Box::new(FakeProvisioner {
                journal: journal.clone(),
                fail_create: opts.fail_create,
                address_on_create: !opts.address_later,
                user_data: user_data.clone(),
            }),
            executor: Box::new(FakeExecutor::new(journal.clone(), &opts)),
            ports: Box::new(FakePorts {
                journal: journal.clone(),
                open: !opts.ssh_closed,
            }),
            public_ip: Box::new(FakeIp {
                journal: journal.clone(),
                answers: Mutex::new(VecDeque::from(["1.2.3.4", "1.2.3.4", "1.2.3.4", "5.6.7.8"])),
            }),
            installer: Box::new(FakeInstaller {
                journal: journal.clone(),
                fail: opts.install_fails,
            }),
        };

        let user_data_doc = render_user_data(&settings, KEY).unwrap();
        let deployment = Deployment::with_backends(
            DeploymentName::new("test-dep"),
            "nyc3",
            opts.auto_configure,
            settings,
            backends,
            user_data_doc,
        );

        Harness {
            deployment,
            journal,
            user_data,
            dir,
        }
    }

    #[tokio::test]
    async fn full_run_walks_every_status_in_order() {
        let mut h = harness(Options {
            auto_configure: true,
            ..Options::default()
        });
        let report = h.deployment.run().await.unwrap();

        assert_eq!(
            h.deployment.progress().statuses(),
            vec![
                Status::PendingAuth,
                Status::Provisioning,
                Status::WaitingForSsh,
                Status::WaitingForService,
                Status::RetrievingArtifacts,
                Status::RenderingClientConfigs,
                Status::AddingVpnToOsx,
                Status::WaitingForIpChange,
                Status::Done,
            ]
        );
        assert_eq!(report.vpn_address, "10.0.0.1");
        assert_eq!(report.passphrase, "pw");
        assert_eq!(report.initial_public_ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(report.final_public_ip.as_deref(), Some("5.6.7.8"));
        assert_eq!(count(&h.journal, "apply_profile"), 1);
        // one baseline lookup plus three convergence probes
        assert_eq!(count(&h.journal, "public_ip"), 4);

        let progress = h.deployment.progress();
        assert_eq!(progress.vpn_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(progress.final_public_ip.as_deref(), Some("5.6.7.8"));
    }

    #[tokio::test]
    async fn full_run_writes_artifacts_and_profiles() {
        let mut h = harness(Options::default());
        let report = h.deployment.run().await.unwrap();

        let configs = h.dir.path().join("configs");
        for file in [
            "test-dep.client.cert.p12",
            "test-dep.ca.cert.pem",
            "test-dep.server.cert.pem",
            "test-dep.apple.mobileconfig",
            "test-dep.android.sswan",
        ] {
            assert!(configs.join(file).is_file(), "{file} missing");
        }
        assert_eq!(report.artifacts.len(), 3);
        assert_eq!(std::fs::read(&report.artifacts[1]).unwrap(), b"CA PEM");
        assert!(!configs.join("test-dep.client.cert.p12.password").exists());

        let android = std::fs::read_to_string(&report.android_profile).unwrap();
        assert!(android.contains("\"addr\": \"10.0.0.1\""));
    }

    #[tokio::test]
    async fn without_auto_configure_skips_install_and_convergence() {
        let mut h = harness(Options::default());
        let report = h.deployment.run().await.unwrap();

        let statuses = h.deployment.progress().statuses();
        assert!(!statuses.contains(&Status::AddingVpnToOsx));
        assert!(!statuses.contains(&Status::WaitingForIpChange));
        assert_eq!(statuses.last(), Some(&Status::Done));
        assert_eq!(count(&h.journal, "apply_profile"), 0);
        assert_eq!(count(&h.journal, "public_ip"), 1);
        assert!(report.final_public_ip.is_none());
    }

    #[tokio::test]
    async fn local_apply_failure_does_not_abort() {
        let mut h = harness(Options {
            auto_configure: true,
            install_fails: true,
            ..Options::default()
        });
        let report = h.deployment.run().await.unwrap();

        assert_eq!(h.deployment.status(), Status::Done);
        assert_eq!(report.final_public_ip.as_deref(), Some("5.6.7.8"));
    }

    #[tokio::test]
    async fn provisioning_failure_is_terminal() {
        let mut h = harness(Options {
            fail_create: true,
            ..Options::default()
        });

        let err = h.deployment.run().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Provisioning {
                step: "creating machine",
                ..
            }
        ));
        assert_eq!(h.deployment.status(), Status::Failed);
        assert!(h.deployment.machine_id().is_none());

        let events_before = h.journal.lock().unwrap().len();
        let err = h.deployment.run().await.unwrap_err();
        assert!(matches!(err, DeployError::AlreadyStarted(Status::Failed)));
        assert_eq!(h.journal.lock().unwrap().len(), events_before);
    }

    #[tokio::test]
    async fn completed_deployment_cannot_run_again() {
        let mut h = harness(Options::default());
        h.deployment.run().await.unwrap();
        let err = h.deployment.run().await.unwrap_err();
        assert!(matches!(err, DeployError::AlreadyStarted(Status::Done)));
    }

    #[tokio::test]
    async fn ssh_timeout_fails_after_machine_exists() {
        let mut h = harness(Options {
            ssh_closed: true,
            ..Options::default()
        });
        let err = h.deployment.run().await.unwrap_err();

        assert_eq!(err.to_string(), "timed out waiting for SSH after 3 attempts");
        assert_eq!(count(&h.journal, "probe 22"), 3);
        assert_eq!(count(&h.journal, "run"), 0);
        assert_eq!(h.deployment.machine_id(), Some(&MachineId("1001".into())));
        assert_eq!(h.deployment.status(), Status::Failed);
    }

    #[tokio::test]
    async fn missing_address_is_polled_before_firewall() {
        let mut h = harness(Options {
            address_later: true,
            ..Options::default()
        });
        h.deployment.run().await.unwrap();

        let journal = h.journal.lock().unwrap().clone();
        let get = journal.iter().position(|e| e == "get_machine").unwrap();
        let fw = journal.iter().position(|e| e == "create_firewall").unwrap();
        assert!(get < fw);
    }

    #[tokio::test]
    async fn machine_receives_rendered_user_data() {
        let mut h = harness(Options::default());
        h.deployment.run().await.unwrap();

        let user_data = h.user_data.lock().unwrap().clone().unwrap();
        assert_eq!(user_data, h.deployment.user_data());
        assert!(user_data.contains(KEY));
        assert!(user_data.contains("tunnelbox-vpn.service"));
    }

    #[tokio::test]
    async fn observers_see_final_snapshot() {
        let mut h = harness(Options::default());
        let mut rx = h.deployment.subscribe();
        h.deployment.run().await.unwrap();

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.status, Status::Done);
        assert_eq!(snapshot.initial_public_ip.as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test]
    async fn artifact_fetch_failure_stops_before_profiles() {
        let mut h = harness(Options {
            missing_ca: true,
            ..Options::default()
        });
        let err = h.deployment.run().await.unwrap_err();

        match &err {
            DeployError::ArtifactFetch {
                label, remote_path, ..
            } => {
                assert_eq!(*label, "CA certificate");
                assert_eq!(remote_path, CA_PATH);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.deployment.status(), Status::Failed);
        assert!(
            !h.deployment
                .progress()
                .statuses()
                .contains(&Status::RenderingClientConfigs)
        );

        let configs = h.dir.path().join("configs");
        assert!(configs.join("test-dep.client.cert.p12").is_file());
        assert!(!configs.join("test-dep.ca.cert.pem").exists());
        assert!(!configs.join("test-dep.apple.mobileconfig").exists());
        assert!(!configs.join("test-dep.android.sswan").exists());
    }

    #[tokio::test]
    async fn empty_ca_certificate_fails_rendering() {
        let mut h = harness(Options {
            empty_ca: true,
            auto_configure: true,
            ..Options::default()
        });
        let err = h.deployment.run().await.unwrap_err();

        assert!(matches!(
            err,
            DeployError::ConfigRender(profiles::ConfigRenderError::MissingInput {
                field: "CA certificate",
                ..
            })
        ));
        assert_eq!(h.deployment.status(), Status::Failed);
        assert_eq!(count(&h.journal, "apply_profile"), 0);

        let configs = h.dir.path().join("configs");
        assert!(configs.join("test-dep.ca.cert.pem").is_file());
        assert!(!configs.join("test-dep.apple.mobileconfig").exists());
        assert!(!configs.join("test-dep.android.sswan").exists());
    }
}
