//! Test doubles shared across unit and integration tests.
//!
//! [`FakeGateway`] keeps an in-memory model of instances, volumes, images and
//! floating IPs, records every call it receives and fails selected operations
//! on demand. Status queries can be scripted: scripted values are returned in
//! order and the last one sticks as the modelled status.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::ready;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};

use crate::descriptor::{FloatingIp, ImageMetadata, ProviderEndpoint, VolumeSpec};
use crate::gateway::{
    AddressKind, Connector, FlavorId, FloatingIpId, GatewayError, GatewayFuture, ImageId,
    ImageStatus, InstanceAddress, InstanceId, InstanceSpec, InstanceStatus, ProviderGateway,
    ResourceKind, VolumeId, VolumeStatus,
};
use crate::ssh::{ProbeFuture, SshProbe};

/// Gateway operation that can be made to fail.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// [`ProviderGateway::resolve_flavor`]
    ResolveFlavor,
    /// [`ProviderGateway::find_images_by_name`]
    FindImages,
    /// [`ProviderGateway::upload_image`]
    UploadImage,
    /// [`ProviderGateway::image_status`]
    ImageStatus,
    /// [`ProviderGateway::create_instance`]
    CreateInstance,
    /// [`ProviderGateway::delete_instance`]
    DeleteInstance,
    /// [`ProviderGateway::start_instance`]
    StartInstance,
    /// [`ProviderGateway::stop_instance`]
    StopInstance,
    /// [`ProviderGateway::instance_status`]
    InstanceStatus,
    /// [`ProviderGateway::instance_addresses`]
    InstanceAddresses,
    /// [`ProviderGateway::allocate_floating_ip`]
    AllocateFloatingIp,
    /// [`ProviderGateway::associate_floating_ip`]
    AssociateFloatingIp,
    /// [`ProviderGateway::disassociate_floating_ip`]
    DisassociateFloatingIp,
    /// [`ProviderGateway::delete_floating_ip`]
    DeleteFloatingIp,
    /// [`ProviderGateway::create_volume`]
    CreateVolume,
    /// [`ProviderGateway::attach_volume`]
    AttachVolume,
    /// [`ProviderGateway::detach_volume`]
    DetachVolume,
    /// [`ProviderGateway::delete_volume`]
    DeleteVolume,
    /// [`ProviderGateway::volume_status`]
    VolumeStatus,
}

/// Call received by a [`FakeGateway`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GatewayCall {
    /// Flavor lookup by name.
    ResolveFlavor(String),
    /// Image search by name.
    FindImages(String),
    /// Image upload.
    UploadImage {
        /// Image name.
        name: String,
        /// File uploaded.
        path: Utf8PathBuf,
    },
    /// Image status query.
    ImageStatus(ImageId),
    /// Instance creation.
    CreateInstance(InstanceSpec),
    /// Instance deletion.
    DeleteInstance(InstanceId),
    /// Instance boot.
    StartInstance(InstanceId),
    /// Instance shutdown.
    StopInstance(InstanceId),
    /// Instance status query.
    InstanceStatus(InstanceId),
    /// Instance address listing.
    InstanceAddresses(InstanceId),
    /// Floating IP allocation from a pool.
    AllocateFloatingIp(String),
    /// Floating IP association.
    AssociateFloatingIp {
        /// Target instance.
        instance: InstanceId,
        /// Address associated.
        ip: String,
    },
    /// Floating IP disassociation.
    DisassociateFloatingIp {
        /// Instance the address was associated with.
        instance: InstanceId,
        /// Address disassociated.
        ip: String,
    },
    /// Floating IP release.
    DeleteFloatingIp(FloatingIpId),
    /// Volume creation, by volume name.
    CreateVolume(String),
    /// Volume attachment.
    AttachVolume {
        /// Volume attached.
        volume: VolumeId,
        /// Target instance.
        instance: InstanceId,
        /// Requested device.
        device: Option<String>,
    },
    /// Volume detachment.
    DetachVolume(VolumeId),
    /// Volume deletion.
    DeleteVolume(VolumeId),
    /// Volume status query.
    VolumeStatus(VolumeId),
}

#[derive(Debug)]
struct Instance {
    status: InstanceStatus,
    addresses: Vec<InstanceAddress>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<GatewayCall>,
    failures: HashMap<Operation, GatewayError>,
    flavors: HashMap<String, FlavorId>,
    images: Vec<(String, ImageId)>,
    image_models: HashMap<ImageId, ImageStatus>,
    image_script: VecDeque<ImageStatus>,
    next_instance_ids: VecDeque<InstanceId>,
    instances: HashMap<InstanceId, Instance>,
    instance_script: VecDeque<InstanceStatus>,
    floating_ips: HashSet<FloatingIpId>,
    volumes: HashMap<VolumeId, VolumeStatus>,
    volume_script: VecDeque<VolumeStatus>,
    counter: u32,
}

impl State {
    fn check(&self, operation: Operation) -> Result<(), GatewayError> {
        self.failures
            .get(&operation)
            .map_or(Ok(()), |error| Err(error.clone()))
    }

    fn next(&mut self) -> u32 {
        self.counter = self.counter.saturating_add(1);
        self.counter
    }

    fn instance_mut(&mut self, id: &InstanceId) -> Result<&mut Instance, GatewayError> {
        self.instances.get_mut(id).ok_or_else(|| GatewayError::NotFound {
            kind: ResourceKind::Instance,
            name: id.to_string(),
        })
    }
}

/// Pops the next scripted status; the last scripted value is written back to
/// the model so it keeps being reported.
fn next_scripted<T>(script: &mut VecDeque<T>, model: &mut T) {
    if let Some(status) = script.pop_front() {
        *model = status;
    }
}

/// In-memory [`ProviderGateway`] that records calls and injects failures.
///
/// Floating IP association against an unknown instance is accepted so the
/// floating IP manager can be exercised on its own.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the lifecycle owns another through [`FakeConnector`].
#[derive(Clone, Debug, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<State>>,
}

impl FakeGateway {
    /// Creates a gateway with no flavors, images or resources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a flavor.
    pub fn add_flavor(&self, name: &str, id: &str) {
        self.lock()
            .flavors
            .insert(name.to_owned(), FlavorId::from(id));
    }

    /// Registers an existing active image.
    pub fn add_image(&self, name: &str, id: &str) {
        let mut state = self.lock();
        state.images.push((name.to_owned(), ImageId::from(id)));
        state
            .image_models
            .insert(ImageId::from(id), ImageStatus::Active);
    }

    /// Sets the identifier the next created instance receives.
    pub fn push_instance_id(&self, id: &str) {
        self.lock().next_instance_ids.push_back(InstanceId::from(id));
    }

    /// Makes every call to `operation` fail with a provider error.
    pub fn fail(&self, operation: Operation, message: &str) {
        self.fail_with(operation, GatewayError::provider(message));
    }

    /// Makes every call to `operation` fail with `error`.
    pub fn fail_with(&self, operation: Operation, error: GatewayError) {
        self.lock().failures.insert(operation, error);
    }

    /// Stops failing `operation`.
    pub fn recover(&self, operation: Operation) {
        self.lock().failures.remove(&operation);
    }

    /// Queues instance statuses (provider strings such as `BUILD`).
    pub fn script_instance_statuses(&self, statuses: &[&str]) {
        self.lock()
            .instance_script
            .extend(statuses.iter().map(|raw| InstanceStatus::from_provider(raw)));
    }

    /// Queues volume statuses (provider strings such as `in-use`).
    pub fn script_volume_statuses(&self, statuses: &[&str]) {
        self.lock()
            .volume_script
            .extend(statuses.iter().map(|raw| VolumeStatus::from_provider(raw)));
    }

    /// Queues image statuses (provider strings such as `queued`).
    pub fn script_image_statuses(&self, statuses: &[&str]) {
        self.lock()
            .image_script
            .extend(statuses.iter().map(|raw| ImageStatus::from_provider(raw)));
    }

    /// Overrides the modelled status of an existing instance.
    pub fn set_instance_status(&self, id: &str, raw: &str) {
        let mut state = self.lock();
        state.instance_script.clear();
        if let Some(instance) = state.instances.get_mut(&InstanceId::from(id)) {
            instance.status = InstanceStatus::from_provider(raw);
        }
    }

    /// Replaces the addresses reported for an existing instance.
    pub fn set_addresses(&self, id: &str, addresses: Vec<InstanceAddress>) {
        if let Some(instance) = self.lock().instances.get_mut(&InstanceId::from(id)) {
            instance.addresses = addresses;
        }
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Returns `true` while the provider still knows the instance.
    #[must_use]
    pub fn instance_exists(&self, id: &str) -> bool {
        self.lock().instances.contains_key(&InstanceId::from(id))
    }

    /// Returns `true` while the provider still knows the volume.
    #[must_use]
    pub fn volume_exists(&self, id: &str) -> bool {
        self.lock().volumes.contains_key(&VolumeId::from(id))
    }

    /// Returns `true` while the floating IP allocation exists.
    #[must_use]
    pub fn floating_ip_exists(&self, id: &str) -> bool {
        self.lock().floating_ips.contains(&FloatingIpId::from(id))
    }

    fn run<T, F>(&self, call: GatewayCall, operation: Operation, body: F) -> GatewayFuture<'_, T>
    where
        T: Send + 'static,
        F: FnOnce(&mut State) -> Result<T, GatewayError>,
    {
        let mut state = self.lock();
        state.calls.push(call);
        let result = state.check(operation).and_then(|()| body(&mut *state));
        Box::pin(ready(result))
    }
}

impl ProviderGateway for FakeGateway {
    fn resolve_flavor<'a>(&'a self, name: &'a str) -> GatewayFuture<'a, FlavorId> {
        self.run(
            GatewayCall::ResolveFlavor(name.to_owned()),
            Operation::ResolveFlavor,
            |state| {
                state
                    .flavors
                    .get(name)
                    .cloned()
                    .ok_or_else(|| GatewayError::NotFound {
                        kind: ResourceKind::Flavor,
                        name: name.to_owned(),
                    })
            },
        )
    }

    fn find_images_by_name<'a>(&'a self, name: &'a str) -> GatewayFuture<'a, Vec<ImageId>> {
        self.run(
            GatewayCall::FindImages(name.to_owned()),
            Operation::FindImages,
            |state| {
                Ok(state
                    .images
                    .iter()
                    .filter(|(image_name, _)| image_name == name)
                    .map(|(_, id)| id.clone())
                    .collect())
            },
        )
    }

    fn upload_image<'a>(
        &'a self,
        metadata: &'a ImageMetadata,
        path: &'a Utf8Path,
    ) -> GatewayFuture<'a, ImageId> {
        self.run(
            GatewayCall::UploadImage {
                name: metadata.name.clone(),
                path: path.to_owned(),
            },
            Operation::UploadImage,
            |state| {
                let id = ImageId::new(format!("img-uploaded-{}", state.next()));
                state.images.push((metadata.name.clone(), id.clone()));
                state.image_models.insert(id.clone(), ImageStatus::Active);
                Ok(id)
            },
        )
    }

    fn image_status<'a>(&'a self, id: &'a ImageId) -> GatewayFuture<'a, ImageStatus> {
        self.run(
            GatewayCall::ImageStatus(id.clone()),
            Operation::ImageStatus,
            |state| {
                let mut status = state
                    .image_models
                    .get(id)
                    .cloned()
                    .unwrap_or(ImageStatus::Deleted);
                next_scripted(&mut state.image_script, &mut status);
                if state.image_models.contains_key(id) {
                    state.image_models.insert(id.clone(), status.clone());
                }
                Ok(status)
            },
        )
    }

    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> GatewayFuture<'a, InstanceId> {
        self.run(
            GatewayCall::CreateInstance(spec.clone()),
            Operation::CreateInstance,
            |state| {
                let serial = state.next();
                let id = state
                    .next_instance_ids
                    .pop_front()
                    .unwrap_or_else(|| InstanceId::new(format!("instance-{serial}")));
                let network = spec
                    .networks
                    .first()
                    .cloned()
                    .unwrap_or_else(|| String::from("private"));
                state.instances.insert(
                    id.clone(),
                    Instance {
                        status: InstanceStatus::Active,
                        addresses: vec![InstanceAddress {
                            network,
                            kind: AddressKind::Fixed,
                            addr: format!("10.0.0.{serial}"),
                        }],
                    },
                );
                Ok(id)
            },
        )
    }

    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::DeleteInstance(id.clone()),
            Operation::DeleteInstance,
            |state| {
                state.instance_mut(id)?;
                state.instances.remove(id);
                state.instance_script.clear();
                Ok(())
            },
        )
    }

    fn start_instance<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::StartInstance(id.clone()),
            Operation::StartInstance,
            |state| {
                state.instance_mut(id)?.status = InstanceStatus::Active;
                Ok(())
            },
        )
    }

    fn stop_instance<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::StopInstance(id.clone()),
            Operation::StopInstance,
            |state| {
                state.instance_mut(id)?.status = InstanceStatus::Shutoff;
                Ok(())
            },
        )
    }

    fn instance_status<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> GatewayFuture<'a, Option<InstanceStatus>> {
        self.run(
            GatewayCall::InstanceStatus(id.clone()),
            Operation::InstanceStatus,
            |state| {
                let State {
                    instances,
                    instance_script,
                    ..
                } = state;
                Ok(instances.get_mut(id).map(|instance| {
                    next_scripted(instance_script, &mut instance.status);
                    instance.status.clone()
                }))
            },
        )
    }

    fn instance_addresses<'a>(
        &'a self,
        id: &'a InstanceId,
        _networks: &'a [String],
    ) -> GatewayFuture<'a, Vec<InstanceAddress>> {
        self.run(
            GatewayCall::InstanceAddresses(id.clone()),
            Operation::InstanceAddresses,
            |state| Ok(state.instance_mut(id)?.addresses.clone()),
        )
    }

    fn allocate_floating_ip<'a>(&'a self, pool: &'a str) -> GatewayFuture<'a, FloatingIp> {
        self.run(
            GatewayCall::AllocateFloatingIp(pool.to_owned()),
            Operation::AllocateFloatingIp,
            |state| {
                let serial = state.next();
                let id = FloatingIpId::new(format!("fip-{serial}"));
                state.floating_ips.insert(id.clone());
                Ok(FloatingIp {
                    id,
                    ip: format!("203.0.113.{}", serial.saturating_add(9)),
                    pool: pool.to_owned(),
                })
            },
        )
    }

    fn associate_floating_ip<'a>(
        &'a self,
        instance: &'a InstanceId,
        ip: &'a str,
    ) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::AssociateFloatingIp {
                instance: instance.clone(),
                ip: ip.to_owned(),
            },
            Operation::AssociateFloatingIp,
            |state| {
                if let Some(target) = state.instances.get_mut(instance) {
                    let network = target
                        .addresses
                        .first()
                        .map_or_else(|| String::from("private"), |addr| addr.network.clone());
                    target.addresses.push(InstanceAddress {
                        network,
                        kind: AddressKind::Floating,
                        addr: ip.to_owned(),
                    });
                }
                Ok(())
            },
        )
    }

    fn disassociate_floating_ip<'a>(
        &'a self,
        instance: &'a InstanceId,
        ip: &'a str,
    ) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::DisassociateFloatingIp {
                instance: instance.clone(),
                ip: ip.to_owned(),
            },
            Operation::DisassociateFloatingIp,
            |state| {
                if let Some(target) = state.instances.get_mut(instance) {
                    target
                        .addresses
                        .retain(|addr| !(addr.kind == AddressKind::Floating && addr.addr == ip));
                }
                Ok(())
            },
        )
    }

    fn delete_floating_ip<'a>(&'a self, id: &'a FloatingIpId) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::DeleteFloatingIp(id.clone()),
            Operation::DeleteFloatingIp,
            |state| {
                state.floating_ips.remove(id);
                Ok(())
            },
        )
    }

    fn create_volume<'a>(&'a self, spec: &'a VolumeSpec) -> GatewayFuture<'a, VolumeId> {
        self.run(
            GatewayCall::CreateVolume(spec.name.clone()),
            Operation::CreateVolume,
            |state| {
                let id = VolumeId::new(format!("vol-{}", state.next()));
                state.volumes.insert(id.clone(), VolumeStatus::Available);
                Ok(id)
            },
        )
    }

    fn attach_volume<'a>(
        &'a self,
        volume: &'a VolumeId,
        instance: &'a InstanceId,
        device: Option<&'a str>,
    ) -> GatewayFuture<'a, String> {
        self.run(
            GatewayCall::AttachVolume {
                volume: volume.clone(),
                instance: instance.clone(),
                device: device.map(str::to_owned),
            },
            Operation::AttachVolume,
            |state| {
                state.volumes.insert(volume.clone(), VolumeStatus::InUse);
                Ok(device.unwrap_or("/dev/vdb").to_owned())
            },
        )
    }

    fn detach_volume<'a>(
        &'a self,
        volume: &'a VolumeId,
        _instance: &'a InstanceId,
    ) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::DetachVolume(volume.clone()),
            Operation::DetachVolume,
            |state| {
                if let Some(status) = state.volumes.get_mut(volume) {
                    *status = VolumeStatus::Available;
                }
                Ok(())
            },
        )
    }

    fn delete_volume<'a>(&'a self, id: &'a VolumeId) -> GatewayFuture<'a, ()> {
        self.run(
            GatewayCall::DeleteVolume(id.clone()),
            Operation::DeleteVolume,
            |state| {
                state.volumes.remove(id);
                Ok(())
            },
        )
    }

    fn volume_status<'a>(&'a self, id: &'a VolumeId) -> GatewayFuture<'a, VolumeStatus> {
        self.run(
            GatewayCall::VolumeStatus(id.clone()),
            Operation::VolumeStatus,
            |state| {
                let mut status = state
                    .volumes
                    .get(id)
                    .cloned()
                    .unwrap_or(VolumeStatus::Deleted);
                next_scripted(&mut state.volume_script, &mut status);
                if status != VolumeStatus::Deleted {
                    state.volumes.insert(id.clone(), status.clone());
                }
                Ok(status)
            },
        )
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    connects: u32,
    rejection: Option<String>,
}

/// [`Connector`] handing out clones of one [`FakeGateway`].
#[derive(Clone, Debug, Default)]
pub struct FakeConnector {
    gateway: FakeGateway,
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    /// Creates a connector that always yields `gateway`.
    #[must_use]
    pub fn new(gateway: FakeGateway) -> Self {
        Self {
            gateway,
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rejects later connection attempts with an authentication error.
    pub fn reject(&self, message: &str) {
        self.lock().rejection = Some(message.to_owned());
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn connects(&self) -> u32 {
        self.lock().connects
    }
}

impl Connector for FakeConnector {
    type Gateway = FakeGateway;

    fn connect<'a>(&'a self, _endpoint: &'a ProviderEndpoint) -> GatewayFuture<'a, FakeGateway> {
        let mut state = self.lock();
        state.connects = state.connects.saturating_add(1);
        let result = state.rejection.clone().map_or_else(
            || Ok(self.gateway.clone()),
            |message| Err(GatewayError::Auth { message }),
        );
        Box::pin(ready(result))
    }
}

#[derive(Debug)]
struct ProbeState {
    reachable: bool,
    probed: Vec<SocketAddr>,
}

/// [`SshProbe`] with a switchable answer that records probed addresses.
#[derive(Clone, Debug)]
pub struct FakeProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl FakeProbe {
    /// Creates a probe that reports every address as reachable.
    #[must_use]
    pub fn reachable() -> Self {
        Self::with(true)
    }

    /// Creates a probe that reports every address as unreachable.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::with(false)
    }

    fn with(reachable: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                reachable,
                probed: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the answer for later probes.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Addresses probed so far.
    #[must_use]
    pub fn probed(&self) -> Vec<SocketAddr> {
        self.lock().probed.clone()
    }
}

impl SshProbe for FakeProbe {
    fn probe(&self, addr: SocketAddr) -> ProbeFuture<'_> {
        let mut state = self.lock();
        state.probed.push(addr);
        Box::pin(ready(state.reachable))
    }
}
